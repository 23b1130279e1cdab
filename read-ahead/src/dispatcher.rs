use crate::downstream::Downstream;
use crate::error::{Error, Result};
use crate::fetch::spawn_fetch;
use crate::file_state::FileState;
use crate::page::{copy_range, Page, PageError};
use crate::prefetcher;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::oneshot;

enum Fragment {
    Ready(std::result::Result<Bytes, PageError>),
    Waiting {
        rx: oneshot::Receiver<crate::page::PageOutcome>,
        page_offset: u64,
        lo: u64,
        hi: u64,
    },
}

/// Nothing is awaited until every fragment has been classified under the
/// lock, so there's no race between a page completing and it being
/// recognized as a hit.
pub(crate) async fn readv<D>(
    downstream: &Arc<D>,
    file: &Arc<FileState<D::Handle>>,
    size: usize,
    offset: u64,
) -> Result<Bytes>
where
    D: Downstream,
{
    let page_size = file.config.page_size as u64;
    let rounded_lo = file.config.floor(offset);
    let rounded_hi = file.config.ceil(offset + size as u64);

    let mut fragments = Vec::new();
    let mut new_pages = Vec::new();

    {
        let mut inner = file.lock().await;

        let mut p = rounded_lo;
        while p < rounded_hi {
            let lo = offset.max(p);
            let hi = (offset + size as u64).min(p + page_size);

            if inner.pages.lookup(p).is_none() {
                inner.pages.insert(Page::new(p));
                new_pages.push(p);
            }
            let page = inner
                .pages
                .lookup_mut(p)
                .expect("just inserted or already present");

            fragments.push(match page.outcome() {
                Some(Ok(vectors)) => Fragment::Ready(Ok(copy_range(&vectors, p, lo, hi))),
                Some(Err(e)) => Fragment::Ready(Err(e)),
                None => {
                    let (tx, rx) = oneshot::channel();
                    page.attach_waiter(tx);
                    Fragment::Waiting {
                        rx,
                        page_offset: p,
                        lo,
                        hi,
                    }
                }
            });

            p += page_size;
        }

        inner.offset = offset;
        // Drop-behind: everything strictly before this read is discardable.
        inner.pages.flush_region(0, rounded_lo);
    }

    for p in new_pages {
        spawn_fetch(downstream.clone(), file.clone(), p);
    }

    // The prefetch frame is independent of this one: fire-and-forget.
    file.acquire();
    tokio::spawn(prefetcher::run(downstream.clone(), file.clone()));

    assemble(fragments, size).await
}

/// First error wins, ties broken by page offset.
async fn assemble(fragments: Vec<Fragment>, size: usize) -> Result<Bytes> {
    let mut first_error: Option<PageError> = None;
    let mut slices = Vec::with_capacity(fragments.len());

    for fragment in fragments {
        let resolved = match fragment {
            Fragment::Ready(r) => r,
            Fragment::Waiting {
                rx,
                page_offset,
                lo,
                hi,
            } => match rx.await {
                Ok(Ok(vectors)) => Ok(copy_range(&vectors, page_offset, lo, hi)),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(PageError {
                    op_ret: -1,
                    op_errno: 5,
                }),
            },
        };

        match resolved {
            Ok(bytes) if first_error.is_none() => slices.push(bytes),
            Ok(_) => {}
            Err(e) => {
                first_error.get_or_insert(e);
            }
        };
    }

    if let Some(e) = first_error {
        return Err(Error::from(e));
    }

    let mut out = Vec::with_capacity(size);
    for s in slices {
        out.extend_from_slice(&s);
    }
    Ok(Bytes::from(out))
}
