use bytes::Bytes;
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// `(op_ret, op_errno)` pair recorded on a page whose downstream fetch failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageError {
    pub op_ret: i32,
    pub op_errno: i32,
}

/// What a page delivers to a waiter once it leaves `Pending`.
pub type PageOutcome = Result<Vec<Bytes>, PageError>;

#[derive(Debug)]
enum PageState {
    Pending,
    Ready { vectors: Vec<Bytes>, size: usize },
    Errored(PageError),
}

/// A single page-aligned cache unit belonging to one file.
#[derive(Debug)]
pub struct Page {
    pub offset: u64,
    state: PageState,
    waiters: VecDeque<oneshot::Sender<PageOutcome>>,
}

impl Page {
    /// Callers are responsible for issuing exactly one downstream fetch per
    /// page creation.
    pub fn new(offset: u64) -> Self {
        Self {
            offset,
            state: PageState::Pending,
            waiters: VecDeque::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        !matches!(self.state, PageState::Pending)
    }

    /// `waiters == ∅` — the page may be dropped by `flush_region`, whether
    /// or not its fetch has completed yet.
    pub fn is_evictable(&self) -> bool {
        self.waiters.is_empty()
    }

    pub fn has_waiters(&self) -> bool {
        !self.waiters.is_empty()
    }

    /// Only meaningful while the page is `Pending`; callers must check
    /// [`Page::outcome`] first and only attach a waiter on a miss.
    pub fn attach_waiter(&mut self, tx: oneshot::Sender<PageOutcome>) {
        self.waiters.push_back(tx);
    }

    pub fn outcome(&self) -> Option<PageOutcome> {
        match &self.state {
            PageState::Pending => None,
            PageState::Ready { vectors, .. } => Some(Ok(vectors.clone())),
            PageState::Errored(e) => Some(Err(*e)),
        }
    }

    pub fn filled_size(&self) -> usize {
        match &self.state {
            PageState::Ready { size, .. } => *size,
            _ => 0,
        }
    }

    /// A second fetch landing on an already-`Ready` page overwrites its
    /// contents, releasing the old buffers.
    pub fn fill(&mut self, vectors: Vec<Bytes>, size: usize) -> Vec<oneshot::Sender<PageOutcome>> {
        self.state = PageState::Ready { vectors, size };
        self.drain_waiters()
    }

    pub fn error(&mut self, err: PageError) -> Vec<oneshot::Sender<PageOutcome>> {
        self.state = PageState::Errored(err);
        self.drain_waiters()
    }

    fn drain_waiters(&mut self) -> Vec<oneshot::Sender<PageOutcome>> {
        self.waiters.drain(..).collect()
    }
}

/// Copy the intersection of `[lo, hi)` (absolute file offsets) out of a
/// page's vectors, given the page starts at `page_offset`.
pub fn copy_range(vectors: &[Bytes], page_offset: u64, lo: u64, hi: u64) -> Bytes {
    debug_assert!(lo <= hi);
    let mut out = Vec::with_capacity((hi - lo) as usize);
    let mut cursor = page_offset;
    for v in vectors {
        let v_lo = cursor;
        let v_hi = cursor + v.len() as u64;
        let start = lo.max(v_lo);
        let end = hi.min(v_hi);
        if start < end {
            let rel_start = (start - v_lo) as usize;
            let rel_end = (end - v_lo) as usize;
            out.extend_from_slice(&v[rel_start..rel_end]);
        }
        cursor = v_hi;
        if cursor >= hi {
            break;
        }
    }
    Bytes::from(out)
}
