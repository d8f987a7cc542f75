//! Local state store
//!
//! Manages the `.stackmig/state.json` file which records the last state
//! each resource instance returned to the host.

use crate::error::{FrameworkError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".stackmig";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_TEMP: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// All resource instances tracked for one working directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources indexed by `type.name`
    pub resources: BTreeMap<String, ResourceState>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update a resource, keeping its original creation time
    pub fn set_resource(&mut self, key: String, mut state: ResourceState) {
        if let Some(existing) = self.resources.get(&key) {
            state.created_at = existing.created_at;
        }
        self.resources.insert(key, state);
        self.updated_at = Utc::now();
    }

    pub fn remove_resource(&mut self, key: &str) -> Option<ResourceState> {
        let result = self.resources.remove(key);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    pub fn get_resource(&self, key: &str) -> Option<&ResourceState> {
        self.resources.get(key)
    }
}

/// Persisted state of a single resource instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type
    pub resource_type: String,

    /// Attribute values as last returned by the resource
    pub attributes: serde_json::Value,

    /// When the resource was created
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(resource_type: impl Into<String>, attributes: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            resource_type: resource_type.into(),
            attributes,
            created_at: now,
            updated_at: now,
        }
    }

    /// Decode the attributes into a typed model
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.attributes.clone())?)
    }
}

/// State manager for reading/writing state files
pub struct StateManager {
    /// Working directory the state belongs to
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn temp_path(&self) -> PathBuf {
        self.state_dir().join(STATE_TEMP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!(dir = %dir.display(), "created state directory");
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("state file not found, returning empty state");
            return Ok(GlobalState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: GlobalState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(FrameworkError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!(resources = state.resources.len(), "loaded state");
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup.
    ///
    /// The new state is written to a temporary file and renamed into place,
    /// so `state.json` always holds either the old or the new content.
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let temp = self.temp_path();

        let content = serde_json::to_string_pretty(state)?;
        let mut file = fs::File::create(&temp).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
            tracing::trace!("created state backup");
        }
        fs::rename(&temp, &path).await?;

        tracing::debug!(resources = state.resources.len(), "saved state");
        Ok(())
    }

    /// Acquire a lock for exclusive access.
    ///
    /// The lock file is created with `create_new`, so two runs racing for
    /// the lock cannot both win. A lock older than an hour is taken over.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();
        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&lock_info)?;

        let mut file = match create_lock_file(&lock_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                ensure_stale(&lock_path).await?;
                match fs::remove_file(&lock_path).await {
                    Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
                    _ => {}
                }
                create_lock_file(&lock_path).await.map_err(|e| {
                    if e.kind() == ErrorKind::AlreadyExists {
                        FrameworkError::LockError(
                            "State lock was taken over by another run".to_string(),
                        )
                    } else {
                        e.into()
                    }
                })?
            }
            Err(e) => return Err(e.into()),
        };

        // Own the lock before writing, so a failed write still releases it
        let lock = StateLock {
            lock_path,
            released: false,
        };
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!("acquired state lock");
        Ok(lock)
    }
}

async fn create_lock_file(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
}

/// Fail unless the lock at `path` is older than an hour
async fn ensure_stale(path: &Path) -> Result<()> {
    let content = fs::read_to_string(path).await?;
    let Ok(lock_info) = serde_json::from_str::<LockInfo>(&content) else {
        return Err(FrameworkError::LockError(format!(
            "State lock {} is unreadable; remove it if no other run is active",
            path.display()
        )));
    };

    let age = Utc::now().signed_duration_since(lock_info.acquired_at);
    if age.num_hours() < 1 {
        return Err(FrameworkError::LockError(format!(
            "State is locked by {} since {}",
            lock_info.holder, lock_info.acquired_at
        )));
    }

    tracing::warn!(holder = %lock_info.holder, "removing stale lock");
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
