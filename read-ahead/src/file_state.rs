use crate::config::Config;
use crate::page_index::PageIndex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, MutexGuard};

/// Lookup, page state and waiter-list edits must all happen under the same
/// lock, so they're bundled into one guarded struct rather than three
/// independently-locked fields.
pub struct FileStateInner {
    /// Last-seen reader offset (byte, not page-aligned). Seeds the
    /// prefetcher's window.
    pub offset: u64,
    /// Known file length at open; 0 means unknown.
    pub size: u64,
    pub pages: PageIndex,
}

/// Per-open-file record. Referenced once by the upstream handle binding and
/// once per in-flight fetch targeting this file; torn down when the
/// reference count reaches zero.
pub struct FileState<H> {
    pub handle: H,
    pub filename: String,
    pub config: Config,
    refcount: AtomicUsize,
    inner: Mutex<FileStateInner>,
}

impl<H> FileState<H> {
    pub fn new(handle: H, filename: String, config: Config, size: u64) -> Self {
        Self {
            handle,
            filename,
            config,
            refcount: AtomicUsize::new(1),
            inner: Mutex::new(FileStateInner {
                offset: u64::MAX,
                size,
                pages: PageIndex::new(),
            }),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, FileStateInner> {
        self.inner.lock().await
    }

    /// Take an additional reference, e.g. for an in-flight fetch that
    /// outlives the frame that issued it.
    pub fn acquire(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Release a reference. Returns `true` if this was the last one, in
    /// which case the caller must tear down the page index and close the
    /// downstream handle — at that point no waiters can remain, or the
    /// refcount would not have reached zero.
    pub fn release(&self) -> bool {
        self.refcount.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub fn ref_count(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_with_one_reference() {
        let file = FileState::new((), "f".to_string(), Config::default(), 0);
        assert_eq!(file.ref_count(), 1);
    }

    #[tokio::test]
    async fn acquire_release_balance() {
        let file = FileState::new((), "f".to_string(), Config::default(), 0);
        file.acquire();
        assert_eq!(file.ref_count(), 2);
        assert!(!file.release());
        assert!(file.release());
    }

    #[tokio::test]
    async fn record_read_through_lock() {
        let file = FileState::new((), "f".to_string(), Config::default(), 0);
        file.lock().await.offset = 42;
        assert_eq!(file.lock().await.offset, 42);
    }
}
