//! Local file-based deployment store.
//!
//! This module keeps one JSON file per deployment under a base directory, for
//! local development and single-machine brokers.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{BrokerError, Result, StateError};

use super::store::DeploymentStore;
use super::types::DeploymentRecord;

/// Default state directory name.
pub const STATE_DIR: &str = ".tfbroker";

/// Record file extension.
const RECORD_EXT: &str = "json";

/// Local file-based deployment store.
#[derive(Debug)]
pub struct LocalDeploymentStore {
    /// Base directory for record files.
    base_dir: PathBuf,
}

impl LocalDeploymentStore {
    /// Creates a new local store under `.tfbroker` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the working directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| BrokerError::internal(format!("Cannot determine current directory: {e}")))?
            .join(STATE_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a new local store with a custom base directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Path of the record file for an id.
    fn record_path(&self, id: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.{RECORD_EXT}", encode_file_name(id)))
    }

    /// Ensures the state directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir)
                .await
                .map_err(|e| StateError::backend(format!("Failed to create state directory: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl DeploymentStore for LocalDeploymentStore {
    async fn get(&self, id: &str) -> Result<DeploymentRecord> {
        let path = self.record_path(id);
        if !path.exists() {
            debug!("Record file does not exist: {}", path.display());
            return Err(StateError::not_found(id).into());
        }

        debug!("Loading deployment {id} from: {}", path.display());

        let content = fs::read_to_string(&path).await.map_err(|e| StateError::Corrupted {
            message: format!("Failed to read record file: {e}"),
        })?;

        let record: DeploymentRecord = serde_json::from_str(&content).map_err(|e| StateError::Corrupted {
            message: format!("Failed to parse record file: {e}"),
        })?;

        Ok(record)
    }

    async fn store(&self, record: &DeploymentRecord) -> Result<()> {
        self.ensure_dir().await?;

        let path = self.record_path(&record.id);
        debug!("Saving deployment {} to: {}", record.id, path.display());

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| StateError::serialization(format!("Failed to serialize record: {e}")))?;

        // Write to a temporary file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StateError::backend(format!("Failed to create temp record file: {e}")))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StateError::backend(format!("Failed to write record file: {e}")))?;

        file.sync_all()
            .await
            .map_err(|e| StateError::backend(format!("Failed to sync record file: {e}")))?;

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StateError::backend(format!("Failed to rename record file: {e}")))?;

        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.record_path(id).exists())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let path = self.record_path(id);
        if path.exists() {
            debug!("Deleting record file: {}", path.display());
            fs::remove_file(&path)
                .await
                .map_err(|e| StateError::backend(format!("Failed to delete record file: {e}")))?;
        }
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&self.base_dir)
            .await
            .map_err(|e| StateError::backend(format!("Failed to list state directory: {e}")))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StateError::backend(format!("Failed to list state directory: {e}")))?
        {
            let name = entry.file_name();
            let Some(stem) = name
                .to_str()
                .and_then(|n| n.strip_suffix(&format!(".{RECORD_EXT}")))
            else {
                continue;
            };
            ids.push(decode_file_name(stem));
        }

        ids.sort();
        Ok(ids)
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

/// Escapes characters that are not safe in file names.
fn encode_file_name(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for c in id.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            _ => out.push(c),
        }
    }
    out
}

fn decode_file_name(name: &str) -> String {
    name.replace("%3A", ":")
        .replace("%2F", "/")
        .replace("%5C", "\\")
        .replace("%25", "%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LastOperationState;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalDeploymentStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalDeploymentStore::with_base_dir(temp_dir.path());
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let (store, _temp) = create_test_store();

        let record = DeploymentRecord::new("tf:inst:bind", b"{\"modules\":[]}".to_vec());
        store.store(&record).await.expect("Failed to store record");

        let loaded = store.get("tf:inst:bind").await.expect("Failed to load record");
        assert_eq!(loaded, record);
        assert_eq!(loaded.last_operation_state, LastOperationState::Succeeded);
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (store, _temp) = create_test_store();

        let err = store.get("tf:missing:").await.expect_err("no record");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let (store, _temp) = create_test_store();

        assert!(!store.exists("tf:a:").await.expect("exists check failed"));
        store
            .store(&DeploymentRecord::new("tf:a:", Vec::new()))
            .await
            .expect("Failed to store record");
        assert!(store.exists("tf:a:").await.expect("exists check failed"));

        store.delete("tf:a:").await.expect("Failed to delete record");
        assert!(!store.exists("tf:a:").await.expect("exists check failed"));
        store.delete("tf:a:").await.expect("Deleting twice is fine");
    }

    #[tokio::test]
    async fn test_list_ids_decodes_file_names() {
        let (store, _temp) = create_test_store();

        for id in ["tf:b:", "tf:a:x", "tf:a:"] {
            store
                .store(&DeploymentRecord::new(id, Vec::new()))
                .await
                .expect("Failed to store record");
        }

        let ids = store.list_ids().await.expect("Failed to list ids");
        assert_eq!(ids, vec!["tf:a:", "tf:a:x", "tf:b:"]);
    }

    #[test]
    fn test_file_name_escaping() {
        let id = "tf:50%/x:y";
        assert_eq!(encode_file_name(id), "tf%3A50%25%2Fx%3Ay");
        assert_eq!(decode_file_name(&encode_file_name(id)), id);
    }
}
