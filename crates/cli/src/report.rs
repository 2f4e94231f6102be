//! Human-readable rendering of run reports and status listings.
//!
//! Everything returns a `String` so the command decides where it goes.

use console::style;
use shiftlog_engine::{
    ExecutionResult, ExecutionStatus, MigrationState, MigrationStatus, RunReport, RunStatus,
};

const CHECKSUM_PREFIX: usize = 12;

pub fn render_run_report(report: &RunReport) -> String {
    let mut lines = Vec::new();

    if !report.previously_applied.is_empty() {
        let versions: Vec<String> = report.previously_applied.iter().map(|v| v.to_string()).collect();
        lines.push(format!(
            "{} {} (not re-run)",
            style("Already applied:").dim(),
            versions.join(", ")
        ));
    }

    if report.dry_run {
        lines.push(format!(
            "{} {} pending migration(s) would be applied",
            style("Dry run:").cyan().bold(),
            report.results.len()
        ));
        for result in &report.results {
            lines.push(format!("  {} {} {}", style("-").dim(), result.version, result.description));
        }
    } else if report.results.is_empty() {
        lines.push(format!("{}", style("Database is up to date").green()));
    } else {
        for result in &report.results {
            lines.extend(render_result(result));
        }
    }

    if !report.drift.is_empty() || !report.orphans.is_empty() {
        lines.push(String::new());
        lines.push(format!("{}", style("Warnings:").yellow().bold()));
        for drift in &report.drift {
            lines.push(format!(
                "  {} {} changed on disk after it was applied (recorded {}, now {})",
                style("!").yellow(),
                drift.version,
                short(&drift.recorded),
                short(&drift.current)
            ));
        }
        for orphan in &report.orphans {
            lines.push(format!(
                "  {} {} is in the ledger (applied {}) but has no file",
                style("!").yellow(),
                orphan.version,
                orphan.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
    }

    lines.push(String::new());
    let failed = report.results.iter().filter(|r| r.status.is_failure()).count();
    lines.push(format!(
        "{} {} applied, {} failed, {} skipped, {} already applied ({} ms)",
        style("Summary:").bold(),
        report.applied_count(),
        failed,
        report.skipped_count(),
        report.previously_applied.len(),
        report.execution_time_ms
    ));

    let status = match report.status {
        RunStatus::Completed => style("completed").green().bold(),
        RunStatus::CompletedWithFailure => style("completed with failure").red().bold(),
    };
    lines.push(format!("{} {}", style("Status:").bold(), status));

    lines.join("\n")
}

fn render_result(result: &ExecutionResult) -> Vec<String> {
    let marker = match result.status {
        ExecutionStatus::Applied => style("✓").green(),
        ExecutionStatus::Failed => style("✗").red(),
        ExecutionStatus::Skipped => style("-").dim(),
        ExecutionStatus::AppliedConcurrently => style("~").cyan(),
    };

    let mut lines = vec![format!(
        "  {} {} {} {} ({} ms)",
        marker, result.version, result.description, result.status, result.duration_ms
    )];
    if let Some(error) = &result.error {
        for line in error.lines() {
            lines.push(format!("      {}", style(line).red()));
        }
    }
    lines
}

pub fn render_status(statuses: &[MigrationStatus]) -> String {
    if statuses.is_empty() {
        return "No migrations found".to_string();
    }

    let mut lines = vec![format!("{}", style("Migration Status:").bold())];
    let mut pending = 0;
    for status in statuses {
        match &status.state {
            MigrationState::Pending => {
                pending += 1;
                lines.push(format!(
                    "  {} {} {}",
                    style("pending ").yellow(),
                    status.version,
                    status.description
                ));
            }
            MigrationState::Applied { applied_at, drifted } => {
                let note = if *drifted {
                    format!(" {}", style("(changed on disk)").yellow())
                } else {
                    String::new()
                };
                lines.push(format!(
                    "  {} {} {} {}{}",
                    style("applied ").green(),
                    status.version,
                    status.description,
                    style(applied_at.format("%Y-%m-%d %H:%M:%S UTC")).dim(),
                    note
                ));
            }
        }
    }
    lines.push(String::new());
    lines.push(format!(
        "{} of {} migration(s) pending",
        pending,
        statuses.len()
    ));

    lines.join("\n")
}

fn short(checksum: &str) -> &str {
    checksum.get(..CHECKSUM_PREFIX).unwrap_or(checksum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shiftlog_engine::{ChecksumDrift, OrphanedEntry, Version};

    fn result(version: u64, status: ExecutionStatus, error: Option<&str>) -> ExecutionResult {
        ExecutionResult {
            version: Version::new(version),
            description: format!("step_{}", version),
            status,
            error: error.map(str::to_string),
            duration_ms: 2,
        }
    }

    fn report(results: Vec<ExecutionResult>, status: RunStatus) -> RunReport {
        RunReport {
            status,
            dry_run: false,
            results,
            previously_applied: vec![Version::new(1)],
            drift: Vec::new(),
            orphans: Vec::new(),
            execution_time_ms: 7,
        }
    }

    #[test]
    fn test_failed_run_shows_raw_error_and_skips() {
        console::set_colors_enabled(false);
        let rendered = render_run_report(&report(
            vec![
                result(2, ExecutionStatus::Applied, None),
                result(3, ExecutionStatus::Failed, Some("no such table: missing_table")),
                result(4, ExecutionStatus::Skipped, None),
            ],
            RunStatus::CompletedWithFailure,
        ));

        assert!(rendered.starts_with("Already applied: 1 (not re-run)"));
        assert!(rendered.contains("✓ 2 step_2 applied"));
        assert!(rendered.contains("✗ 3 step_3 failed"));
        assert!(rendered.contains("      no such table: missing_table"));
        assert!(rendered.contains("- 4 step_4 skipped"));
        assert!(rendered.contains("1 applied, 1 failed, 1 skipped, 1 already applied (7 ms)"));
        assert!(rendered.ends_with("Status: completed with failure"));
    }

    #[test]
    fn test_up_to_date_and_dry_run() {
        console::set_colors_enabled(false);
        let mut up_to_date = report(Vec::new(), RunStatus::Completed);
        up_to_date.previously_applied.clear();
        let rendered = render_run_report(&up_to_date);
        assert!(rendered.starts_with("Database is up to date"));
        assert!(rendered.ends_with("Status: completed"));

        let mut dry = report(vec![result(5, ExecutionStatus::Skipped, None)], RunStatus::Completed);
        dry.dry_run = true;
        dry.previously_applied = vec![Version::new(1), Version::new(2)];
        let rendered = render_run_report(&dry);
        assert!(rendered.starts_with("Already applied: 1, 2 (not re-run)"));
        assert!(rendered.contains("Dry run: 1 pending migration(s) would be applied"));
        assert!(rendered.contains("  - 5 step_5"));
    }

    #[test]
    fn test_warnings_for_drift_and_orphans() {
        console::set_colors_enabled(false);
        let mut with_warnings = report(Vec::new(), RunStatus::Completed);
        with_warnings.drift.push(ChecksumDrift {
            version: Version::new(1),
            recorded: "aaaaaaaaaaaaaaaaaaaa".to_string(),
            current: "bbbbbbbbbbbbbbbbbbbb".to_string(),
        });
        with_warnings.orphans.push(OrphanedEntry {
            version: Version::new(9),
            applied_at: Utc.with_ymd_and_hms(2025, 10, 31, 1, 29, 58).unwrap(),
        });

        let rendered = render_run_report(&with_warnings);
        assert!(rendered.contains("Warnings:"));
        assert!(rendered.contains("1 changed on disk after it was applied (recorded aaaaaaaaaaaa, now bbbbbbbbbbbb)"));
        assert!(rendered.contains("9 is in the ledger (applied 2025-10-31 01:29:58 UTC) but has no file"));
    }

    #[test]
    fn test_status_listing() {
        console::set_colors_enabled(false);
        assert_eq!(render_status(&[]), "No migrations found");

        let statuses = vec![
            MigrationStatus {
                version: Version::new(1),
                description: "create_users".to_string(),
                state: MigrationState::Applied {
                    applied_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
                    drifted: true,
                },
            },
            MigrationStatus {
                version: Version::new(2),
                description: "create_posts".to_string(),
                state: MigrationState::Pending,
            },
        ];

        let rendered = render_status(&statuses);
        assert!(rendered.contains("applied  1 create_users 2025-01-02 03:04:05 UTC (changed on disk)"));
        assert!(rendered.contains("pending  2 create_posts"));
        assert!(rendered.ends_with("1 of 2 migration(s) pending"));
    }

    #[test]
    fn test_short_checksum() {
        assert_eq!(short("abc"), "abc");
        assert_eq!(short("0123456789abcdef"), "0123456789ab");
    }
}
