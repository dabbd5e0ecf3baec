//! Filesystem-backed artifact store.
//!
//! Layout: `<root>/<key>.json` for documents, `<root>/<key><ext>` for blobs.
//! Writes go through a sibling temp file and a rename so readers never see a
//! half-written document.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde_json::Value;

use crate::artifacts::key::ArtifactKey;
use crate::artifacts::store::{ArtifactStore, StoreError, StoreResult};
use crate::observability::metrics;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);
const LOCK_MAX_ATTEMPTS: u32 = 500;
/// A lock file older than this was left by a process that died holding it.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

/// Artifact store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            key: root.display().to_string(),
            source,
        })?;
        tracing::debug!(root = %root.display(), "Artifact store opened");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_json(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(format!("{}.json", key.as_str()))
    }

    fn path_blob(&self, key: &ArtifactKey, ext: &str) -> PathBuf {
        let ext = if ext.starts_with('.') {
            ext.to_string()
        } else {
            format!(".{}", ext)
        };
        self.root.join(format!("{}{}", key.as_str(), ext))
    }

    fn io_err(key: &ArtifactKey) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            key: key.to_string(),
            source,
        }
    }

    fn write_atomic(&self, key: &ArtifactKey, path: &Path, data: &[u8]) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Self::io_err(key))?;
        }
        let tmp = path.with_extension(format!("tmp{}", std::process::id()));
        {
            let mut file = File::create(&tmp).map_err(Self::io_err(key))?;
            file.write_all(data).map_err(Self::io_err(key))?;
            file.sync_all().map_err(Self::io_err(key))?;
        }
        fs::rename(&tmp, path).map_err(Self::io_err(key))?;
        metrics::record_artifact_write();
        Ok(())
    }

    fn encode(key: &ArtifactKey, value: &Value) -> StoreResult<Vec<u8>> {
        serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })
    }

    /// Take the per-key lock used by `compare_and_swap`.
    fn lock(&self, key: &ArtifactKey) -> StoreResult<LockGuard> {
        let path = self.root.join(format!("{}.json.lock", key.as_str()));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Self::io_err(key))?;
        }
        for _ in 0..LOCK_MAX_ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(LockGuard { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path) {
                        tracing::warn!(key = %key, path = %path.display(), "Reclaiming stale store lock");
                        match fs::remove_file(&path) {
                            Ok(()) => continue,
                            Err(e) if e.kind() == ErrorKind::NotFound => continue,
                            Err(source) => {
                                return Err(StoreError::Io {
                                    key: key.to_string(),
                                    source,
                                })
                            }
                        }
                    }
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(source) => {
                    return Err(StoreError::Io {
                        key: key.to_string(),
                        source,
                    })
                }
            }
        }
        Err(StoreError::LockContended(key.to_string()))
    }
}

fn lock_is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > LOCK_STALE_AFTER)
}

/// Removes the lock file when dropped.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release store lock");
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn write_json(&self, key: &ArtifactKey, value: &Value) -> StoreResult<String> {
        let path = self.path_json(key);
        let data = Self::encode(key, value)?;
        self.write_atomic(key, &path, &data)?;
        tracing::debug!(key = %key, "Wrote JSON artifact");
        Ok(path.display().to_string())
    }

    fn read_json(&self, key: &ArtifactKey) -> StoreResult<Option<Value>> {
        let path = self.path_json(key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    key: key.to_string(),
                    source,
                })
            }
        };
        // Tolerate a UTF-8 BOM from hand-edited files.
        let raw = raw.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(&raw);
        serde_json::from_slice(raw)
            .map(Some)
            .map_err(|e| StoreError::Malformed {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    fn write_bytes(&self, key: &ArtifactKey, data: &[u8], ext: &str) -> StoreResult<String> {
        let path = self.path_blob(key, ext);
        self.write_atomic(key, &path, data)?;
        Ok(path.display().to_string())
    }

    fn read_bytes(&self, key: &ArtifactKey, ext: &str) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.path_blob(key, ext)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn delete(&self, key: &ArtifactKey) -> StoreResult<bool> {
        match fs::remove_file(self.path_json(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn compare_and_swap(
        &self,
        key: &ArtifactKey,
        expected: Option<&Value>,
        new: &Value,
    ) -> StoreResult<bool> {
        let _guard = self.lock(key)?;
        let current = self.read_json(key)?;
        if current.as_ref() != expected {
            return Ok(false);
        }
        let data = Self::encode(key, new)?;
        self.write_atomic(key, &self.path_json(key), &data)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_store(name: &str) -> FsArtifactStore {
        let dir = std::env::temp_dir().join(format!("attest-fs-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        FsArtifactStore::open(&dir).unwrap()
    }

    fn key(s: &str) -> ArtifactKey {
        ArtifactKey::new(s).unwrap()
    }

    #[test]
    fn test_json_round_trip() {
        let store = temp_store("roundtrip");
        let values = [
            json!({}),
            json!([]),
            json!({"name": "données – ✓ 数据", "nested": {"list": [1, 2.5, null, true]}}),
            json!("plain string"),
        ];
        for (i, value) in values.iter().enumerate() {
            let k = key(&format!("suite/{}/doc", i));
            store.write_json(&k, value).unwrap();
            assert_eq!(store.read_json(&k).unwrap().as_ref(), Some(value));
        }
        assert!(store.root().join("suite/0/doc.json").exists());
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn test_missing_and_malformed() {
        let store = temp_store("malformed");
        let k = key("broken/doc");
        assert_eq!(store.read_json(&k).unwrap(), None);

        fs::create_dir_all(store.root().join("broken")).unwrap();
        fs::write(store.root().join("broken/doc.json"), b"{not json").unwrap();
        assert!(matches!(store.read_json(&k), Err(StoreError::Malformed { .. })));
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn test_overwrite_latest() {
        let store = temp_store("overwrite");
        let k = key("stage/response");
        store.write_json(&k, &json!({"run": 1})).unwrap();
        store.write_json(&k, &json!({"run": 2})).unwrap();
        assert_eq!(store.read_json(&k).unwrap(), Some(json!({"run": 2})));
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn test_bytes_and_delete() {
        let store = temp_store("bytes");
        let k = key("reports/r1");
        store.write_bytes(&k, b"<html></html>", "html").unwrap();
        assert_eq!(store.read_bytes(&k, ".html").unwrap().unwrap(), b"<html></html>");
        assert_eq!(store.read_bytes(&k, "bin").unwrap(), None);

        store.write_json(&k, &json!(1)).unwrap();
        assert!(store.delete(&k).unwrap());
        assert!(!store.delete(&k).unwrap());
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn test_compare_and_swap() {
        let store = temp_store("cas");
        let k = key("links/set");
        assert!(store.compare_and_swap(&k, None, &json!(["a"])).unwrap());
        assert!(!store.compare_and_swap(&k, None, &json!(["b"])).unwrap());
        assert!(store.compare_and_swap(&k, Some(&json!(["a"])), &json!(["a", "b"])).unwrap());
        assert_eq!(store.read_json(&k).unwrap(), Some(json!(["a", "b"])));
        assert!(!store.root().join("links/set.json.lock").exists());
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn test_stale_lock_is_reclaimed() {
        let store = temp_store("stale-lock");
        let k = key("links/set");
        let lock = store.root().join("links/set.json.lock");
        fs::create_dir_all(lock.parent().unwrap()).unwrap();
        let file = File::create(&lock).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(120)).unwrap();
        drop(file);

        assert!(store.compare_and_swap(&k, None, &json!(["a"])).unwrap());
        assert_eq!(store.read_json(&k).unwrap(), Some(json!(["a"])));
        assert!(!lock.exists());
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn test_fresh_lock_is_not_stale() {
        let store = temp_store("fresh-lock");
        let lock = store.root().join("held.json.lock");
        File::create(&lock).unwrap();
        assert!(!lock_is_stale(&lock));
        assert!(!lock_is_stale(&store.root().join("absent.json.lock")));
        let _ = fs::remove_dir_all(store.root());
    }
}
