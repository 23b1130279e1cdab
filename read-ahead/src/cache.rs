use crate::config::Config;
use crate::dispatcher;
use crate::downstream::Downstream;
use crate::error::{Error, Result};
use crate::file_state::FileState;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

/// Holds no FileState registry of its own — the canonical reference is the
/// [`FileHandle`] the upstream side holds.
pub struct Cache<D: Downstream> {
    downstream: Arc<D>,
    config: Config,
}

/// Upstream-visible handle bound to one open file. Cloning bumps the
/// underlying `FileState`'s reference count.
pub struct FileHandle<D: Downstream> {
    file: Arc<FileState<D::Handle>>,
}

impl<D: Downstream> Clone for FileHandle<D> {
    fn clone(&self) -> Self {
        self.file.acquire();
        Self {
            file: self.file.clone(),
        }
    }
}

impl<D: Downstream> Cache<D> {
    pub fn new(downstream: D, config: Config) -> Self {
        Self {
            downstream: Arc::new(downstream),
            config,
        }
    }

    /// Validates `options` against exactly one configured child.
    pub fn from_options(
        downstream: D,
        options: &HashMap<String, String>,
        child_count: usize,
    ) -> Result<Self> {
        let config = Config::from_options(options, child_count)?;
        Ok(Self::new(downstream, config))
    }

    pub fn config(&self) -> Config {
        self.config
    }

    pub fn downstream(&self) -> &D {
        &self.downstream
    }

    pub async fn open(&self, path: &str, flags: i32, mode: u32) -> Result<FileHandle<D>> {
        let (handle, size) = self.downstream.open(path, flags, mode).await?;
        Ok(self.bind(handle, path.to_string(), size))
    }

    pub async fn create(&self, path: &str, mode: u32) -> Result<FileHandle<D>> {
        let (handle, size) = self.downstream.create(path, mode).await?;
        Ok(self.bind(handle, path.to_string(), size))
    }

    fn bind(&self, handle: D::Handle, filename: String, size: u64) -> FileHandle<D> {
        let file = Arc::new(FileState::new(handle, filename, self.config, size));
        FileHandle { file }
    }

    pub async fn readv(&self, handle: &FileHandle<D>, size: usize, offset: u64) -> Result<Bytes> {
        dispatcher::readv(&self.downstream, &handle.file, size, offset).await
    }

    /// Invalidates the cached range before winding downstream.
    pub async fn writev(&self, handle: &FileHandle<D>, vectors: &[Bytes], offset: u64) -> Result<usize> {
        self.invalidate(handle).await;
        Ok(self.downstream.writev(&handle.file.handle, vectors, offset).await?)
    }

    pub async fn flush(&self, handle: &FileHandle<D>) -> Result<()> {
        self.invalidate(handle).await;
        self.downstream.flush(&handle.file.handle).await?;
        Ok(())
    }

    pub async fn fsync(&self, handle: &FileHandle<D>, datasync: bool) -> Result<()> {
        self.invalidate(handle).await;
        self.downstream.fsync(&handle.file.handle, datasync).await?;
        Ok(())
    }

    pub async fn release(&self, handle: FileHandle<D>) -> Result<()> {
        if handle.file.release() {
            let mut inner = handle.file.lock().await;
            inner.pages.clear();
            drop(inner);
            self.downstream.release(&handle.file.handle).await?;
        }
        Ok(())
    }

    async fn invalidate(&self, handle: &FileHandle<D>) {
        let mut inner = handle.file.lock().await;
        inner.pages.flush_region(0, u64::MAX);
    }
}
