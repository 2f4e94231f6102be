//! Migration Source - File system discovery of migration scripts
//!
//! Lists `<digits>_<description>.sql` files in one directory (not
//! recursively), parses their identities and reads them eagerly.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::definitions::{MigrationFile, Version};
use crate::error::{MigrateError, MigrateResult};

const MIGRATION_EXTENSION: &str = "sql";

/// Reader for a directory of migration files
#[derive(Debug, Clone)]
pub struct MigrationSource {
    dir: PathBuf,
}

impl MigrationSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load every migration file, sorted ascending by identity.
    ///
    /// Fails without touching the database on a missing directory, a
    /// malformed or duplicated identity, or an unreadable file.
    pub fn discover(&self) -> MigrateResult<Vec<MigrationFile>> {
        if !self.dir.is_dir() {
            return Err(MigrateError::MissingDirectory(self.dir.clone()));
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| MigrateError::UnreadableFile {
            path: self.dir.clone(),
            source: e,
        })?;

        let mut by_version: BTreeMap<Version, MigrationFile> = BTreeMap::new();

        for entry in entries {
            let entry = entry.map_err(|e| MigrateError::UnreadableFile {
                path: self.dir.clone(),
                source: e,
            })?;

            let path = entry.path();
            if !path.is_file()
                || path.extension().map_or(true, |ext| ext != MIGRATION_EXTENSION)
            {
                continue;
            }

            let migration = Self::read_migration(&path)?;
            if let Some(existing) = by_version.get(&migration.version) {
                return Err(MigrateError::DuplicateIdentity {
                    version: migration.version,
                    first: existing.path.clone(),
                    second: migration.path,
                });
            }
            by_version.insert(migration.version, migration);
        }

        debug!(
            dir = %self.dir.display(),
            count = by_version.len(),
            "discovered migration files"
        );

        Ok(by_version.into_values().collect())
    }

    fn read_migration(path: &Path) -> MigrateResult<MigrationFile> {
        let (version, description) = parse_file_name(path)?;
        let sql = fs::read_to_string(path).map_err(|e| MigrateError::UnreadableFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(MigrationFile {
            version,
            description,
            sql,
            path: path.to_path_buf(),
        })
    }
}

/// Split `<digits>_<description>.sql` into its identity and description
pub fn parse_file_name(path: &Path) -> MigrateResult<(Version, String)> {
    let malformed = |reason: String| MigrateError::MalformedIdentity {
        path: path.to_path_buf(),
        reason,
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| malformed("file name is not valid UTF-8".to_string()))?;

    let (prefix, description) = stem
        .split_once('_')
        .ok_or_else(|| malformed("expected <identity>_<description>.sql".to_string()))?;

    let version: Version = prefix.parse().map_err(malformed)?;

    if description.is_empty() {
        return Err(malformed("description after the identity is empty".to_string()));
    }

    Ok((version, description.to_string()))
}
