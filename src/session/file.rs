use std::{io::ErrorKind, path::PathBuf};

use tokio::sync::Mutex;

use super::{SessionId, SessionStore, StoreError};
use crate::{types::Credential, utils};

/// Session store that keeps one JSON file per session in a directory.
///
/// File names are derived from a hash of the session id. Writes land in a
/// temporary file that is renamed over the record, so readers never observe
/// a half-written credential.
pub struct FileSessionStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileSessionStore {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn record_path(&self, id: &SessionId) -> PathBuf {
        self.dir
            .join(format!("{}.json", utils::session_file_stem(id.as_str())))
    }

    async fn read(&self, id: &SessionId) -> Result<Option<Credential>, StoreError> {
        match async_fs::read_to_string(self.record_path(id)).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    // Callers hold `write_lock`.
    async fn write(&self, id: &SessionId, credential: &Credential) -> Result<(), StoreError> {
        async_fs::create_dir_all(&self.dir).await?;

        let path = self.record_path(id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(credential)?;
        async_fs::write(&tmp, json).await?;
        async_fs::rename(&tmp, &path).await?;
        Ok(())
    }

    // Callers hold `write_lock`.
    async fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        match async_fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

impl SessionStore for FileSessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<Credential>, StoreError> {
        self.read(id).await
    }

    async fn set(&self, id: &SessionId, credential: Credential) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write(id, &credential).await
    }

    async fn compare_and_swap(
        &self,
        id: &SessionId,
        expected: Option<&Credential>,
        new: Option<Credential>,
    ) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let current = self.read(id).await?;
        if current.as_ref() != expected {
            return Ok(false);
        }

        match new {
            Some(credential) => self.write(id, &credential).await?,
            None => self.delete(id).await?,
        }
        Ok(true)
    }

    async fn remove(&self, id: &SessionId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::auth::Scopes;

    fn credential(token: &str) -> Credential {
        Credential {
            access_token: token.to_string(),
            refresh_token: None,
            expires_at: Utc::now() + Duration::hours(1),
            scope: Scopes::parse("playlist-read-private"),
        }
    }

    #[tokio::test]
    async fn records_survive_a_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        let id = SessionId::generate();
        let stored = credential("persisted");

        FileSessionStore::new(dir.path())
            .set(&id, stored.clone())
            .await
            .unwrap();

        let reopened = FileSessionStore::new(dir.path());
        assert_eq!(reopened.get(&id).await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn missing_directory_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("not-created-yet"));

        assert_eq!(store.get(&SessionId::generate()).await.unwrap(), None);
        store.remove(&SessionId::generate()).await.unwrap();
    }

    #[tokio::test]
    async fn file_names_do_not_contain_the_session_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let id = SessionId::generate();
        store.set(&id, credential("x")).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names.len(), 1);
        assert!(!names[0].contains(id.as_str()));
        assert!(names[0].ends_with(".json"));
    }

    #[tokio::test]
    async fn compare_and_swap_rejects_stale_expectations() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let id = SessionId::generate();
        let old = credential("old");
        let new = credential("new");

        store.set(&id, old.clone()).await.unwrap();
        assert!(!store.compare_and_swap(&id, Some(&new), None).await.unwrap());
        assert!(
            store
                .compare_and_swap(&id, Some(&old), Some(new.clone()))
                .await
                .unwrap()
        );
        assert_eq!(store.get(&id).await.unwrap(), Some(new.clone()));

        assert!(store.compare_and_swap(&id, Some(&new), None).await.unwrap());
        assert_eq!(store.get(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_records_surface_as_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let id = SessionId::generate();

        std::fs::write(store.record_path(&id), "{ not json").unwrap();
        assert!(matches!(store.get(&id).await, Err(StoreError::Serde(_))));
    }
}
