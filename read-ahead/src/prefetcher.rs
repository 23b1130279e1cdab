use crate::downstream::Downstream;
use crate::fetch::spawn_fetch;
use crate::file_state::FileState;
use crate::page::Page;
use std::sync::Arc;

/// Speculative window fetch, independent of the upstream request frame that
/// triggered it. Caller must `file.acquire()` before spawning this.
pub(crate) async fn run<D>(downstream: Arc<D>, file: Arc<FileState<D::Handle>>)
where
    D: Downstream,
{
    let page_size = file.config.page_size as u64;
    let window = file.config.window();

    let to_fetch = {
        let mut inner = file.lock().await;
        let (offset, size) = (inner.offset, inner.size);
        let base = (offset / page_size) * page_size;
        let limit = if size > 0 {
            (offset + window).min(size)
        } else {
            offset + window
        };

        // Walk ascending from `base`; stop at the first missing page.
        let mut cursor = base;
        while cursor < limit && inner.pages.lookup(cursor).is_some() {
            cursor += page_size;
        }

        if cursor >= limit {
            // Already comfortable: the whole window is covered.
            Vec::new()
        } else {
            let mut created = Vec::new();
            let mut trav = cursor;
            while trav < limit {
                if inner.pages.lookup(trav).is_none() {
                    inner.pages.insert(Page::new(trav));
                    created.push(trav);
                }
                trav += page_size;
            }
            created
        }
    };

    for offset in to_fetch {
        spawn_fetch(downstream.clone(), file.clone(), offset);
    }

    if file.release() {
        let mut inner = file.lock().await;
        inner.pages.clear();
        drop(inner);
        let _ = downstream.release(&file.handle).await;
    }
}
