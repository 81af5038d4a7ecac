//! Package database
//!
//! Durable record of which modules are installed, at which freshness token,
//! and when. Stored as TOML keyed by module name under
//! `<prefix>/_modbuild/packagedb.toml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PackageDbError;
use crate::infra::filesystem;

/// Relative location of the database under the install prefix
pub const PACKAGEDB_PATH: &str = "_modbuild/packagedb.toml";

/// One installed module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    #[serde(skip)]
    pub name: String,
    /// Freshness token at install time
    pub version: String,
    /// Install timestamp
    pub installed: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    packages: BTreeMap<String, PackageRecord>,
}

/// Install records backed by a TOML file
#[derive(Debug)]
pub struct PackageDatabase {
    path: PathBuf,
    records: BTreeMap<String, PackageRecord>,
}

impl PackageDatabase {
    /// Default database path for an install prefix
    pub fn default_path(prefix: &Path) -> PathBuf {
        prefix.join(PACKAGEDB_PATH)
    }

    /// Load the database, treating a missing file as empty
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PackageDbError> {
        let path = path.into();
        let records = Self::load(&path)?;
        Ok(Self { path, records })
    }

    fn load(path: &Path) -> Result<BTreeMap<String, PackageRecord>, PackageDbError> {
        if !path.exists() {
            debug!("No package database at {}, starting empty", path.display());
            return Ok(BTreeMap::new());
        }
        let content = filesystem::read_file(path)?;
        let store: StoreFile = toml::from_str(&content).map_err(|e| PackageDbError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Ok(store
            .packages
            .into_iter()
            .map(|(name, mut record)| {
                record.name.clone_from(&name);
                (name, record)
            })
            .collect())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Install record for a module
    pub fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.records.get(name)
    }

    /// All records, sorted by name
    pub fn records(&self) -> impl Iterator<Item = &PackageRecord> {
        self.records.values()
    }

    /// Insert or overwrite a record and persist before returning
    pub fn add(
        &mut self,
        name: &str,
        version: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), PackageDbError> {
        let previous = self.records.insert(
            name.to_string(),
            PackageRecord {
                name: name.to_string(),
                version: version.to_string(),
                installed: timestamp,
            },
        );
        if let Err(e) = self.save() {
            match previous {
                Some(record) => self.records.insert(name.to_string(), record),
                None => self.records.remove(name),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Drop a record; returns whether one existed
    pub fn remove(&mut self, name: &str) -> Result<bool, PackageDbError> {
        if self.records.remove(name).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Install date of a module
    pub fn installdate(&self, name: &str) -> Result<DateTime<Utc>, PackageDbError> {
        self.records
            .get(name)
            .map(|r| r.installed)
            .ok_or_else(|| PackageDbError::NotFound {
                name: name.to_string(),
            })
    }

    /// Re-read the store from disk
    pub fn reload(&mut self) -> Result<(), PackageDbError> {
        self.records = Self::load(&self.path)?;
        Ok(())
    }

    fn save(&self) -> Result<(), PackageDbError> {
        let store = StoreFile {
            packages: self.records.clone(),
        };
        let content = toml::to_string_pretty(&store).map_err(|e| PackageDbError::Write {
            path: self.path.clone(),
            error: e.to_string(),
        })?;
        filesystem::write_file_atomic(&self.path, &content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let db = PackageDatabase::open(temp.path().join("packagedb.toml")).unwrap();
        assert!(db.get("zlib").is_none());
        assert_eq!(db.records().count(), 0);
    }

    #[test]
    fn test_add_then_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("_modbuild/packagedb.toml");

        let mut db = PackageDatabase::open(&path).unwrap();
        db.add("zlib", "1.3", ts(1_700_000_000)).unwrap();

        let reopened = PackageDatabase::open(&path).unwrap();
        let record = reopened.get("zlib").unwrap();
        assert_eq!(record.name, "zlib");
        assert_eq!(record.version, "1.3");
        assert_eq!(record.installed, ts(1_700_000_000));
    }

    #[test]
    fn test_add_overwrites() {
        let temp = TempDir::new().unwrap();
        let mut db = PackageDatabase::open(temp.path().join("db.toml")).unwrap();
        db.add("zlib", "1.2", ts(1)).unwrap();
        db.add("zlib", "1.3", ts(2)).unwrap();

        assert_eq!(db.records().count(), 1);
        assert_eq!(db.get("zlib").unwrap().version, "1.3");
        assert_eq!(db.installdate("zlib").unwrap(), ts(2));
    }

    #[test]
    fn test_installdate_not_found() {
        let temp = TempDir::new().unwrap();
        let db = PackageDatabase::open(temp.path().join("db.toml")).unwrap();
        assert!(matches!(
            db.installdate("ghost"),
            Err(PackageDbError::NotFound { .. })
        ));
    }

    #[test]
    fn test_remove() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("db.toml");
        let mut db = PackageDatabase::open(&path).unwrap();
        db.add("zlib", "1.3", ts(1)).unwrap();

        assert!(db.remove("zlib").unwrap());
        assert!(!db.remove("zlib").unwrap());
        assert!(PackageDatabase::open(&path).unwrap().get("zlib").is_none());
    }

    #[test]
    fn test_unparsable_store_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("db.toml");
        std::fs::write(&path, "this is [not toml").unwrap();
        assert!(matches!(
            PackageDatabase::open(&path),
            Err(PackageDbError::Parse { .. })
        ));
    }

    #[test]
    fn test_reload_sees_external_write() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("db.toml");
        let mut first = PackageDatabase::open(&path).unwrap();
        let mut second = PackageDatabase::open(&path).unwrap();

        second.add("glib", "2.80", ts(5)).unwrap();
        assert!(first.get("glib").is_none());
        first.reload().unwrap();
        assert_eq!(first.get("glib").unwrap().version, "2.80");
    }

    #[test]
    fn test_failed_write_keeps_memory_consistent() {
        let temp = TempDir::new().unwrap();
        // parent is a file, so the store can never be written
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let mut db = PackageDatabase::open(blocker.join("db.toml")).unwrap();

        assert!(db.add("zlib", "1.3", ts(1)).is_err());
        assert!(db.get("zlib").is_none());
    }
}
