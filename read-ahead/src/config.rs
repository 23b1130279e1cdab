use crate::error::{Error, Result};
use std::collections::HashMap;

/// Default page granularity, in bytes (128 KiB).
pub const DEFAULT_PAGE_SIZE: usize = 128 * 1024;
/// Default read-ahead window, in pages.
pub const DEFAULT_PAGE_COUNT: usize = 16;

/// # Example
/// ```
/// use read_ahead::Config;
/// use std::collections::HashMap;
///
/// let config = Config::from_options(&HashMap::new(), 1).unwrap();
/// assert_eq!(config.page_size, read_ahead::config::DEFAULT_PAGE_SIZE);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    pub page_size: usize,
    pub page_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_count: DEFAULT_PAGE_COUNT,
        }
    }
}

impl Config {
    /// Read-ahead window size in bytes: `page_size * page_count`.
    pub fn window(&self) -> u64 {
        (self.page_size as u64) * (self.page_count as u64)
    }

    /// Round `offset` down to the enclosing page-aligned offset.
    pub fn floor(&self, offset: u64) -> u64 {
        offset - (offset % self.page_size as u64)
    }

    /// Round `offset` up to the next page-aligned offset.
    pub fn ceil(&self, offset: u64) -> u64 {
        self.floor(offset) + if offset % self.page_size as u64 == 0 {
            0
        } else {
            self.page_size as u64
        }
    }

    /// Exactly one downstream child is required; unrecognized keys are ignored.
    pub fn from_options(options: &HashMap<String, String>, child_count: usize) -> Result<Self> {
        if child_count != 1 {
            return Err(Error::Config(format!(
                "read-ahead not configured with exactly one child (got {child_count})"
            )));
        }

        let mut config = Config::default();

        if let Some(raw) = options.get("page-size") {
            config.page_size = raw
                .parse()
                .map_err(|_| Error::Config(format!("page-size: not a number: {raw}")))?;
            if config.page_size == 0 {
                return Err(Error::Config("page-size must be > 0".into()));
            }
        }

        if let Some(raw) = options.get("page-count") {
            config.page_count = raw
                .parse()
                .map_err(|_| Error::Config(format!("page-count: not a number: {raw}")))?;
            if config.page_count == 0 {
                return Err(Error::Config("page-count must be > 0".into()));
            }
        }

        Ok(config)
    }
}
