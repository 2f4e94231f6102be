//! Execution Planner - pending set and ledger consistency checks
//!
//! Everything here is pure: no I/O, no failure modes.

use std::collections::{BTreeMap, BTreeSet};

use super::definitions::{ChecksumDrift, LedgerEntry, MigrationFile, OrphanedEntry, Version};

/// Ordered migrations still missing from the ledger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    migrations: Vec<MigrationFile>,
}

impl ExecutionPlan {
    pub fn migrations(&self) -> &[MigrationFile] {
        &self.migrations
    }

    pub fn versions(&self) -> Vec<Version> {
        self.migrations.iter().map(|m| m.version).collect()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl IntoIterator for ExecutionPlan {
    type Item = MigrationFile;
    type IntoIter = std::vec::IntoIter<MigrationFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.migrations.into_iter()
    }
}

/// Migrations from `all` whose identity is not in `applied`, in the order of `all`
pub fn plan(all: &[MigrationFile], applied: &BTreeSet<Version>) -> ExecutionPlan {
    ExecutionPlan {
        migrations: all
            .iter()
            .filter(|m| !applied.contains(&m.version))
            .cloned()
            .collect(),
    }
}

/// Applied migrations whose file content no longer matches the recorded checksum
pub fn detect_drift(all: &[MigrationFile], entries: &[LedgerEntry]) -> Vec<ChecksumDrift> {
    let recorded: BTreeMap<Version, &str> = entries
        .iter()
        .map(|e| (e.version, e.checksum.as_str()))
        .collect();

    all.iter()
        .filter_map(|migration| {
            let recorded = recorded.get(&migration.version)?;
            let current = migration.checksum();
            (*recorded != current).then(|| ChecksumDrift {
                version: migration.version,
                recorded: recorded.to_string(),
                current,
            })
        })
        .collect()
}

/// Ledger entries with no file left in the migrations directory
pub fn find_orphans(all: &[MigrationFile], entries: &[LedgerEntry]) -> Vec<OrphanedEntry> {
    let on_disk: BTreeSet<Version> = all.iter().map(|m| m.version).collect();
    entries
        .iter()
        .filter(|e| !on_disk.contains(&e.version))
        .map(|e| OrphanedEntry {
            version: e.version,
            applied_at: e.applied_at,
        })
        .collect()
}
