use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::core::infractions::{InfractionError, InfractionLedger, InfractionStore};

/// JSON file store for the infraction ledger.
///
/// The whole ledger lives in one file:
/// { "nextId": 4, "infractions": [ { "id": 1, "userId": "...", ... } ] }
///
/// Writes go to a sibling temp file that is then renamed over the real one,
/// so a crash mid-write leaves the previous ledger intact.
pub struct JsonInfractionStore {
    path: PathBuf,
}

impl JsonInfractionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "infractions.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn storage_error(context: &str, err: impl std::fmt::Display) -> InfractionError {
    InfractionError::StorageError(format!("{}: {}", context, err))
}

#[async_trait]
impl InfractionStore for JsonInfractionStore {
    async fn load(&self) -> Result<InfractionLedger, InfractionError> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "No infraction file yet, starting empty");
            return Ok(InfractionLedger::default());
        }

        let text = fs::read_to_string(&self.path)
            .await
            .map_err(|e| storage_error("reading infraction file", e))?;

        serde_json::from_str(&text).map_err(|e| storage_error("parsing infraction file", e))
    }

    async fn save(&self, ledger: &InfractionLedger) -> Result<(), InfractionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error("creating data directory", e))?;
        }

        let text = serde_json::to_string_pretty(ledger)
            .map_err(|e| storage_error("serializing infractions", e))?;

        let temp = self.temp_path();
        let mut file = fs::File::create(&temp)
            .await
            .map_err(|e| storage_error("creating temp file", e))?;
        file.write_all(text.as_bytes())
            .await
            .map_err(|e| storage_error("writing temp file", e))?;
        file.sync_all()
            .await
            .map_err(|e| storage_error("syncing temp file", e))?;
        drop(file);

        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| storage_error("replacing infraction file", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::infractions::{InfractionKind, InfractionService};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_empty_ledger() {
        let dir = TempDir::new().unwrap();
        let store = JsonInfractionStore::new(dir.path().join("infractions.json"));

        let ledger = store.load().await.unwrap();
        assert!(ledger.is_empty());
        assert_eq!(ledger.next_id, 0);
    }

    #[tokio::test]
    async fn test_json_persistence_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("infractions.json");
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 2, 10, 8, 30, 0).unwrap(),
        ));

        let service = InfractionService::load(JsonInfractionStore::new(&path), clock.clone())
            .await
            .unwrap();
        service
            .issue("U1", "M1", InfractionKind::Warning, "Late to shift", Some("first"))
            .await
            .unwrap();
        service
            .record_action("U1", "M2", InfractionKind::Timeout, "Spam", Some(10))
            .await
            .unwrap();
        let newest = service
            .issue("U2", "M1", InfractionKind::Blacklisted, "Exploiting", None)
            .await
            .unwrap();
        service.delete(newest.id).await.unwrap();

        let before = JsonInfractionStore::new(&path).load().await.unwrap();
        let reloaded = InfractionService::load(JsonInfractionStore::new(&path), clock)
            .await
            .unwrap();

        assert_eq!(reloaded.list_by_user("U1").await, service.list_by_user("U1").await);
        assert_eq!(reloaded.list_by_user("U2").await, service.list_by_user("U2").await);
        assert_eq!(before.next_id, 4);

        // The watermark survives a restart, so the deleted id stays retired
        let next = reloaded
            .issue("U3", "M1", InfractionKind::Notice, "New", None)
            .await
            .unwrap();
        assert_eq!(next.id, 4);
        assert!(!dir.path().join("nested").join("infractions.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("infractions.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonInfractionStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, InfractionError::StorageError(_)));
    }

    #[tokio::test]
    async fn test_reads_hand_written_ledger() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("infractions.json");
        std::fs::write(
            &path,
            r#"{ "infractions": [ { "id": 7, "userId": "U1", "issuerId": "M1",
                "type": "Under Investigation", "reason": "Audit",
                "createdAt": "2024-01-01T00:00:00Z", "expiresAt": 1705881600 } ] }"#,
        )
        .unwrap();

        let ledger = JsonInfractionStore::new(&path).load().await.unwrap();
        let record = &ledger.infractions[0];
        assert_eq!(record.kind, InfractionKind::UnderInvestigation);
        assert_eq!(record.notes, "");
        assert_eq!(
            record.expires_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 22, 0, 0, 0).unwrap())
        );
    }
}
