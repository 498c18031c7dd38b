//! Object storage the builder reads tarballs from and writes slugs to.

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

/// Where source tarballs are uploaded. `kind` and `secret_name` are passed to
/// the builder and runner images so they can reach the same store.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    fn kind(&self) -> &str;

    fn secret_name(&self) -> &str;

    async fn upload_file(&self, path: &str, data: Bytes) -> io::Result<()>;
}

/// Rejects absolute paths and `..` so uploads stay under the store root.
fn relative_path(path: &str) -> io::Result<PathBuf> {
    let candidate = Path::new(path);
    let safe = !path.is_empty()
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(candidate.to_path_buf())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid object path: {path:?}"),
        ))
    }
}

/// Filesystem-backed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    kind: String,
    secret_name: String,
}

impl LocalStorage {
    pub fn new(
        root: impl Into<PathBuf>,
        kind: impl Into<String>,
        secret_name: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            kind: kind.into(),
            secret_name: secret_name.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn secret_name(&self) -> &str {
        &self.secret_name
    }

    async fn upload_file(&self, path: &str, data: Bytes) -> io::Result<()> {
        let target = self.root.join(relative_path(path)?);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &data).await?;
        debug!(path = %target.display(), bytes = data.len(), "object stored");
        Ok(())
    }
}

#[derive(Default)]
struct MemoryInner {
    objects: BTreeMap<String, Bytes>,
    fail: bool,
}

/// In-memory store for tests.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upload fail.
    pub fn set_failing(&self, fail: bool) {
        self.lock().fail = fail;
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.lock().objects.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    fn kind(&self) -> &str {
        "memory"
    }

    fn secret_name(&self) -> &str {
        "memory-creds"
    }

    async fn upload_file(&self, path: &str, data: Bytes) -> io::Result<()> {
        relative_path(path)?;
        let mut inner = self.lock();
        if inner.fail {
            return Err(io::Error::other("object store unavailable"));
        }
        inner.objects.insert(path.to_string(), data);
        Ok(())
    }
}
