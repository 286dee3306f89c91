//! JSONL backend
//!
//! No database server - one JSONL file per table under `.crflow/`.
//!
//! Every command is its own process, so a handle never trusts what it loaded
//! earlier: mutations take an exclusive lock on `.crflow/lock` and reload
//! before they run, reads take a shared lock and reload.

use super::StoreResult;
use super::tables::{Persist, Table, TableStore, Tables};
use crate::config::Config;
use crate::error::StoreError;
use crate::{Error, Result};
use serde::Serialize;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Directory holding the store, found by walking up from the working dir
pub const CRFLOW_DIR: &str = ".crflow";

const CHANGE_REQUESTS_FILE: &str = "change_requests.jsonl";
const APPROVAL_LOG_FILE: &str = "approval_log.jsonl";
const ASSIGNMENTS_FILE: &str = "assignments.jsonl";
const DOCUMENTS_FILE: &str = "documents.jsonl";
const USERS_FILE: &str = "users.jsonl";
const NOTIFICATIONS_FILE: &str = "notifications.jsonl";
const CONFIG_FILE: &str = "config.toml";
const BLOBS_DIR: &str = "blobs";
const LOCK_FILE: &str = "lock";

const ALL_FILES: [&str; 6] = [
    CHANGE_REQUESTS_FILE,
    APPROVAL_LOG_FILE,
    ASSIGNMENTS_FILE,
    DOCUMENTS_FILE,
    USERS_FILE,
    NOTIFICATIONS_FILE,
];

fn file_for(table: Table) -> &'static str {
    match table {
        Table::ChangeRequests => CHANGE_REQUESTS_FILE,
        Table::ApprovalLog => APPROVAL_LOG_FILE,
        Table::Assignments => ASSIGNMENTS_FILE,
        Table::Documents => DOCUMENTS_FILE,
        Table::Users => USERS_FILE,
        Table::Notifications => NOTIFICATIONS_FILE,
    }
}

/// Persists each table to its own JSONL file
#[derive(Debug, Clone)]
pub struct JsonlFiles {
    dir: PathBuf,
}

/// Store backed by JSONL files
pub type JsonlStore = TableStore<JsonlFiles>;

impl JsonlFiles {
    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn open_lock(&self) -> StoreResult<File> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.path(LOCK_FILE))?;
        Ok(file)
    }

    fn load<T: DeserializeOwned>(&self, file: &str) -> StoreResult<Vec<T>> {
        let path = self.path(file);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| StoreError::Corrupt {
                file: file.to_string(),
                reason: format!("line {}: {}", n + 1, e),
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Write to a temp file and rename over the table
    fn write_all<'a, T: Serialize + 'a>(
        &self,
        file: &str,
        records: impl Iterator<Item = &'a T>,
    ) -> StoreResult<()> {
        let path = self.path(file);
        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for record in records {
                serde_json::to_writer(&mut writer, record)?;
                writeln!(writer)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load_tables(&self) -> StoreResult<Tables> {
        let mut tables = Tables::default();

        for cr in self.load::<crate::ChangeRequest>(CHANGE_REQUESTS_FILE)? {
            if !cr.is_consistent() {
                return Err(StoreError::Corrupt {
                    file: CHANGE_REQUESTS_FILE.to_string(),
                    reason: format!(
                        "{} has status {} with approver {:?}",
                        cr.id,
                        cr.status(),
                        cr.current_approver_role()
                    ),
                });
            }
            tables.crs.insert(cr.id.clone(), cr);
        }
        for user in self.load::<crate::User>(USERS_FILE)? {
            tables.users.insert(user.id.clone(), user);
        }
        tables.approval_log = self.load(APPROVAL_LOG_FILE)?;
        tables.assignments = self.load(ASSIGNMENTS_FILE)?;
        tables.documents = self.load(DOCUMENTS_FILE)?;
        tables.notifications = self.load(NOTIFICATIONS_FILE)?;

        Ok(tables)
    }
}

impl Persist for JsonlFiles {
    fn save(&self, tables: &Tables, table: Table) -> StoreResult<()> {
        let file = file_for(table);
        match table {
            Table::ChangeRequests => {
                let mut crs: Vec<_> = tables.crs.values().collect();
                crs.sort_by(|a, b| a.id.cmp(&b.id));
                self.write_all(file, crs.into_iter())
            }
            Table::ApprovalLog => self.write_all(file, tables.approval_log.iter()),
            Table::Assignments => self.write_all(file, tables.assignments.iter()),
            Table::Documents => self.write_all(file, tables.documents.iter()),
            Table::Users => {
                let mut users: Vec<_> = tables.users.values().collect();
                users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
                self.write_all(file, users.into_iter())
            }
            Table::Notifications => self.write_all(file, tables.notifications.iter()),
        }
    }

    fn lock_exclusive(&self) -> StoreResult<Option<File>> {
        let file = self.open_lock()?;
        FileExt::lock_exclusive(&file)?;
        Ok(Some(file))
    }

    fn reload(&self) -> StoreResult<Option<Tables>> {
        self.load_tables().map(Some)
    }

    fn snapshot(&self) -> StoreResult<Option<Tables>> {
        let lock = self.open_lock()?;
        FileExt::lock_shared(&lock)?;
        let tables = self.load_tables()?;
        drop(lock);
        Ok(Some(tables))
    }
}

impl TableStore<JsonlFiles> {
    /// Find and open the store for the current directory
    pub fn open() -> Result<Self> {
        let root = Self::find_root()?;
        Self::open_at(&root)
    }

    /// Open the store rooted at `root` (the directory containing `.crflow`)
    pub fn open_at(root: &Path) -> Result<Self> {
        let dir = root.join(CRFLOW_DIR);
        if !dir.is_dir() {
            return Err(Error::NotInitialized);
        }
        let files = JsonlFiles { dir };
        let tables = files.snapshot()?.unwrap_or_default();
        Ok(Self::with_tables(tables, files))
    }

    /// Initialize a new store under `root`
    pub fn init(root: &Path) -> Result<Self> {
        let dir = root.join(CRFLOW_DIR);
        if dir.exists() {
            return Err(Error::AlreadyInitialized(dir.display().to_string()));
        }

        fs::create_dir_all(dir.join(BLOBS_DIR))?;
        fs::write(dir.join(CONFIG_FILE), Config::default_with_comments())?;
        for file in ALL_FILES {
            fs::write(dir.join(file), "")?;
        }

        Ok(Self::with_tables(Tables::default(), JsonlFiles { dir }))
    }

    /// Find the repository root (directory containing .crflow)
    pub fn find_root() -> Result<PathBuf> {
        let mut current = std::env::current_dir()?;
        loop {
            if current.join(CRFLOW_DIR).is_dir() {
                return Ok(current);
            }
            if !current.pop() {
                return Err(Error::NotInitialized);
            }
        }
    }

    /// Path to the .crflow directory
    pub fn crflow_dir(&self) -> &Path {
        &self.persist().dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.crflow_dir().join(CONFIG_FILE)
    }

    /// Root directory for the filesystem blob store
    pub fn blobs_dir(&self) -> PathBuf {
        self.crflow_dir().join(BLOBS_DIR)
    }

    /// Load `.crflow/config.toml`, falling back to defaults
    pub fn config(&self) -> Result<Config> {
        Config::load(&self.config_path())
    }
}
