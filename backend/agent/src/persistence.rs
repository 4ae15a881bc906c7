//! JSON-file session store: one `<session id>.json` per session, written
//! atomically through a temp file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use forgeloop_core::{SessionPersistence, SessionSnapshot};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    /// Ids of every stored session, sorted. A missing directory is empty.
    pub async fn list(&self) -> Result<Vec<Uuid>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {}", self.dir.display()));
            }
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl SessionPersistence for JsonFileStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create session dir: {}", self.dir.display()))?;
        let path = self.path_for(snapshot.session_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(snapshot).context("Failed to serialize session")?;
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move session file into {}", path.display()))?;
        debug!(session_id = %snapshot.session_id, path = %path.display(), "Saved session");
        Ok(())
    }

    async fn load(&self, session_id: Uuid) -> Result<Option<SessionSnapshot>> {
        let path = self.path_for(session_id);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        let snapshot = serde_json::from_slice(&raw)
            .with_context(|| format!("Corrupt session file: {}", path.display()))?;
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeloop_core::{SessionState, TerminationReason, ToolCallRequest, Turn};
    use serde_json::json;

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("sessions"));

        let mut session = SessionState::new();
        session.append(Turn::user("list files")).unwrap();
        session
            .append(Turn::assistant(
                "",
                vec![ToolCallRequest::new("c1", "ls", json!({"path": "."}))],
            ))
            .unwrap();
        session.record_turn();
        store.save(&session.snapshot()).await.unwrap();

        let loaded = store.load(session.id()).await.unwrap().unwrap();
        let restored = SessionState::from_snapshot(loaded).unwrap();
        assert_eq!(restored.conversation().len(), 2);
        assert_eq!(restored.conversation().pending(), ["c1".to_string()]);
        assert_eq!(restored.counters().turns_used, 1);
        assert_eq!(store.list().await.unwrap(), vec![session.id()]);
    }

    #[tokio::test]
    async fn test_missing_session_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
        assert!(JsonFileStore::new(dir.path().join("nope")).list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let mut session = SessionState::new();
        store.save(&session.snapshot()).await.unwrap();
        session.terminate(TerminationReason::Completed, None);
        store.save(&session.snapshot()).await.unwrap();

        let loaded = store.load(session.id()).await.unwrap().unwrap();
        assert_eq!(loaded.termination_reason, TerminationReason::Completed);
        assert!(!store.path_for(session.id()).with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let id = Uuid::new_v4();
        tokio::fs::write(store.path_for(id), b"{not json").await.unwrap();
        assert!(store.load(id).await.is_err());
    }
}
