use crate::page::PageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
///
/// A failed downstream page fetch is recorded on the page as a
/// [`PageError`] and only converted into this type once it reaches the
/// upstream frame that was waiting on it — `Error::Page` is that conversion,
/// carrying the `(op_ret, op_errno)` pair verbatim.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("operation on a file handle that was already released")]
    NotOpen,
    #[error("page fetch failed: op_ret={0}, op_errno={1}")]
    Page(i32, i32),
}

impl From<PageError> for Error {
    fn from(e: PageError) -> Self {
        Error::Page(e.op_ret, e.op_errno)
    }
}
