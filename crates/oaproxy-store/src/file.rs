//! File-backed credential store.
//!
//! The credential is a single JSON object on disk. Saves go through a sibling
//! temp file, fsync, and an atomic rename, so a concurrent load observes
//! either the old credential or the new one. The file is created with mode
//! `0600` and its parent directory with `0700`.

use async_trait::async_trait;
use oaproxy_types::{Credential, Error, Result, TokenStore};
use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt as _, PermissionsExt as _};

/// A [`TokenStore`] persisting to a JSON file with owner-only permissions.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store for the given path. A leading `~/` is expanded against
    /// `$HOME`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: expand_tilde(&path.into()),
        }
    }

    /// The resolved on-disk location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_sync(path: &Path) -> Result<Option<Credential>> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Store(format!("read {}: {e}", path.display()))),
        };
        let credential = serde_json::from_str(&raw)
            .map_err(|e| Error::Store(format!("corrupt credential file {}: {e}", path.display())))?;
        Ok(Some(credential))
    }

    fn save_sync(path: &Path, credential: &Credential) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::Store("credential path has no parent directory".into()))?;
        fs::create_dir_all(parent)
            .map_err(|e| Error::Store(format!("create {}: {e}", parent.display())))?;
        #[cfg(unix)]
        fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
            .map_err(|e| Error::Store(format!("chmod {}: {e}", parent.display())))?;

        // Temp file in the same directory; rename is only atomic within one
        // filesystem.
        let temp = path.with_file_name(format!(
            ".{}.tmp.{}",
            path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id()
        ));

        let json = serde_json::to_string_pretty(credential)?;
        {
            let mut opts = OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            #[cfg(unix)]
            opts.mode(0o600);
            let mut file = opts
                .open(&temp)
                .map_err(|e| Error::Store(format!("open {}: {e}", temp.display())))?;
            file.write_all(json.as_bytes())
                .map_err(|e| Error::Store(format!("write {}: {e}", temp.display())))?;
            file.sync_all()
                .map_err(|e| Error::Store(format!("fsync {}: {e}", temp.display())))?;
        }

        fs::rename(&temp, path)
            .map_err(|e| Error::Store(format!("rename into {}: {e}", path.display())))?;

        #[cfg(unix)]
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    fn clear_sync(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Store(format!("remove {}: {e}", path.display()))),
        }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<Credential>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::load_sync(&path))
            .await
            .map_err(|e| Error::Store(e.to_string()))?
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        let path = self.path.clone();
        let credential = credential.clone();
        tokio::task::spawn_blocking(move || Self::save_sync(&path, &credential))
            .await
            .map_err(|e| Error::Store(e.to_string()))?
    }

    async fn clear(&self) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::clear_sync(&path))
            .await
            .map_err(|e| Error::Store(e.to_string()))?
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Credential {
        Credential {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            expires_at: 4_000_000_000,
        }
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json"));
        store.save(&sample()).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, sample());
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(&path, "{not json").unwrap();
        let store = FileTokenStore::new(&path);
        let err = store.load().await.unwrap_err();
        assert!(err.to_string().contains("corrupt"));
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json"));
        store.save(&sample()).await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let dir = tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join("tokens.json"));
        store.save(&sample()).await.unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("tokens.json")]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_owner_only_permissions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secrets").join("tokens.json");
        let store = FileTokenStore::new(&path);
        store.save(&sample()).await.unwrap();

        let file_mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_previous() {
        let dir = tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json"));
        store.save(&sample()).await.unwrap();
        let newer = Credential {
            access_token: "newer".into(),
            ..sample()
        };
        store.save(&newer).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().access_token, "newer");
    }

    #[test]
    fn test_tilde_expansion() {
        if let Ok(home) = std::env::var("HOME") {
            let store = FileTokenStore::new("~/x/tokens.json");
            assert_eq!(store.path(), PathBuf::from(home).join("x/tokens.json"));
        }
        let plain = FileTokenStore::new("/tmp/tokens.json");
        assert_eq!(plain.path(), Path::new("/tmp/tokens.json"));
    }
}
