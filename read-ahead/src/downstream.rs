use bytes::Bytes;
use std::future::Future;
use std::io;

/// The single downstream collaborator this translator consumes.
///
/// Implementations should be cheap to clone / share (e.g. an `Arc<...>`
/// around a client handle) since one `Downstream` instance backs every open
/// file in a `Cache`.
pub trait Downstream: Send + Sync + 'static {
    /// Opaque handle identifying an open downstream file.
    type Handle: Clone + Send + Sync + 'static;

    /// Open an existing file. Returns the handle and the file's current
    /// size (used to seed `FileState::size`).
    fn open(
        &self,
        path: &str,
        flags: i32,
        mode: u32,
    ) -> impl Future<Output = io::Result<(Self::Handle, u64)>> + Send;

    /// Create a new file. Returns the handle and its (typically zero) size.
    fn create(
        &self,
        path: &str,
        mode: u32,
    ) -> impl Future<Output = io::Result<(Self::Handle, u64)>> + Send;

    /// Read `size` bytes starting at `offset`. May return fewer bytes (short
    /// read / EOF) — callers must not assume the returned vectors sum to
    /// exactly `size`.
    fn readv(
        &self,
        handle: &Self::Handle,
        size: usize,
        offset: u64,
    ) -> impl Future<Output = io::Result<Vec<Bytes>>> + Send;

    /// Write `vectors` at `offset`. Returns the number of bytes written.
    fn writev(
        &self,
        handle: &Self::Handle,
        vectors: &[Bytes],
        offset: u64,
    ) -> impl Future<Output = io::Result<usize>> + Send;

    fn flush(&self, handle: &Self::Handle) -> impl Future<Output = io::Result<()>> + Send;

    fn fsync(
        &self,
        handle: &Self::Handle,
        datasync: bool,
    ) -> impl Future<Output = io::Result<()>> + Send;

    fn release(&self, handle: &Self::Handle) -> impl Future<Output = io::Result<()>> + Send;
}

/// Translate an `io::Result` into the `(op_ret, op_errno)` pair a page
/// fetch records on failure. Mirrors glibc convention: `op_ret` is `-1` on
/// error, `op_errno` is the raw errno, defaulting to `EIO` (5) when the
/// platform doesn't expose one.
pub(crate) fn to_op_result(result: &io::Result<Vec<Bytes>>) -> (i32, i32) {
    match result {
        Ok(_) => (0, 0),
        Err(e) => (-1, e.raw_os_error().unwrap_or(libc_eio())),
    }
}

/// `EIO`, used when an `io::Error` carries no raw OS error code.
fn libc_eio() -> i32 {
    5
}
