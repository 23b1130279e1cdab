use crate::downstream::{to_op_result, Downstream};
use crate::file_state::FileState;
use crate::page::PageError;
use std::sync::Arc;

/// Issues one downstream `readv(handle, page_size, offset)` for a page
/// already inserted as `Pending`, and arranges for the reply to fill it.
/// Caller must have already inserted the page and dropped the lock.
pub(crate) fn spawn_fetch<D>(downstream: Arc<D>, file: Arc<FileState<D::Handle>>, offset: u64)
where
    D: Downstream,
{
    file.acquire();
    let page_size = file.config.page_size;
    tokio::spawn(async move {
        let result = downstream.readv(&file.handle, page_size, offset).await;
        complete_fetch(&downstream, &file, offset, result).await;
    });
}

/// Releases the reference `spawn_fetch` took, tearing the file down if it
/// was the last one.
async fn complete_fetch<D>(
    downstream: &D,
    file: &Arc<FileState<D::Handle>>,
    offset: u64,
    result: std::io::Result<Vec<bytes::Bytes>>,
) where
    D: Downstream,
{
    let (op_ret, op_errno) = to_op_result(&result);

    let woken = {
        let mut inner = file.lock().await;
        match inner.pages.lookup_mut(offset) {
            None => {
                // Page was flushed while the fetch was in flight. No waiters
                // could exist for it (a page with waiters is never evicted)
                // — this is a diagnostic, not an error.
                tracing::debug!(offset, size = file.config.page_size, "wasted fetch");
                None
            }
            Some(page) => {
                let woken = match result {
                    Ok(vectors) => {
                        let size: usize = vectors.iter().map(|v| v.len()).sum();
                        page.fill(vectors, size)
                    }
                    Err(_) => page.error(PageError { op_ret, op_errno }),
                };
                let outcome = page.outcome().expect("page left Pending by fill/error");
                Some((woken, outcome))
            }
        }
    };

    if let Some((woken, outcome)) = woken {
        for tx in woken {
            let _ = tx.send(outcome.clone());
        }
    }

    if file.release() {
        let mut inner = file.lock().await;
        inner.pages.clear();
        drop(inner);
        let _ = downstream.release(&file.handle).await;
    }
}
