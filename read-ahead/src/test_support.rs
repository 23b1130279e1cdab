//! An in-memory [`crate::Downstream`] test double, public behind the
//! `test-support` feature so both this crate's unit tests and its
//! `tests/` integration suite can exercise the cache against a
//! deterministic, injectable downstream without any real I/O.

use crate::downstream::Downstream;
use bytes::Bytes;
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

/// Echoes `(offset, size) -> deterministic bytes`: byte `i` of the reply
/// is `(offset + i) mod 251`.
///
/// Supports injecting a one-shot error or delay at a given offset so tests
/// can exercise the wake-all and first-error-wins invariants deterministically.
pub struct EchoDownstream {
    size: Mutex<Option<u64>>,
    calls: Mutex<Vec<(u64, usize)>>,
    fail_once_at: Mutex<Option<u64>>,
    delay_once_at: Mutex<HashMap<u64, Duration>>,
}

impl Default for EchoDownstream {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoDownstream {
    pub fn new() -> Self {
        Self {
            size: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            fail_once_at: Mutex::new(None),
            delay_once_at: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_size(size: u64) -> Self {
        let ds = Self::new();
        *ds.size.lock().unwrap() = Some(size);
        ds
    }

    /// Make the next `readv` at `offset` fail with `EIO`, once.
    pub fn fail_once_at(&self, offset: u64) {
        *self.fail_once_at.lock().unwrap() = Some(offset);
    }

    /// Delay the next `readv` at `offset` by `delay`, once.
    pub fn delay_once_at(&self, offset: u64, delay: Duration) {
        self.delay_once_at.lock().unwrap().insert(offset, delay);
    }

    /// `(offset, size)` of every `readv` issued so far, in call order.
    pub fn calls(&self) -> Vec<(u64, usize)> {
        self.calls.lock().unwrap().clone()
    }

    fn generate(offset: u64, len: usize) -> Bytes {
        Bytes::from((0..len).map(|i| ((offset + i as u64) % 251) as u8).collect::<Vec<u8>>())
    }
}

impl Downstream for EchoDownstream {
    type Handle = ();

    async fn open(&self, _path: &str, _flags: i32, _mode: u32) -> io::Result<((), u64)> {
        Ok(((), self.size.lock().unwrap().unwrap_or(0)))
    }

    async fn create(&self, _path: &str, _mode: u32) -> io::Result<((), u64)> {
        Ok(((), self.size.lock().unwrap().unwrap_or(0)))
    }

    async fn readv(&self, _handle: &(), size: usize, offset: u64) -> io::Result<Vec<Bytes>> {
        self.calls.lock().unwrap().push((offset, size));

        let delay = self.delay_once_at.lock().unwrap().remove(&offset);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self.fail_once_at.lock().unwrap().take() == Some(offset);
        if should_fail {
            return Err(io::Error::from_raw_os_error(5));
        }

        let total = *self.size.lock().unwrap();
        let len = match total {
            Some(total) if offset >= total => 0,
            Some(total) => size.min((total - offset) as usize),
            None => size,
        };
        Ok(vec![Self::generate(offset, len)])
    }

    async fn writev(&self, _handle: &(), vectors: &[Bytes], _offset: u64) -> io::Result<usize> {
        Ok(vectors.iter().map(|v| v.len()).sum())
    }

    async fn flush(&self, _handle: &()) -> io::Result<()> {
        Ok(())
    }

    async fn fsync(&self, _handle: &(), _datasync: bool) -> io::Result<()> {
        Ok(())
    }

    async fn release(&self, _handle: &()) -> io::Result<()> {
        Ok(())
    }
}
