//! Read-ahead cache: a stackable filesystem translator that sits between an
//! upstream file consumer and a downstream file provider, accelerating
//! sequential reads by speculatively fetching fixed-size pages ahead of the
//! reader's current offset.
//!
//! The translator framework, wire transport, memory accounting and option
//! parsing this would normally sit inside are out of scope — see
//! [`Downstream`] for the narrow seam this crate actually depends on.
//!
//! The public entry point is [`Cache`]; [`metrics`] is the self-contained
//! sibling subsystem that snapshots counters to a file on demand.

pub mod cache;
pub mod config;
mod dispatcher;
pub mod downstream;
pub mod error;
mod fetch;
pub mod file_state;
pub mod metrics;
pub mod page;
pub mod page_index;
mod prefetcher;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use cache::{Cache, FileHandle};
pub use config::Config;
pub use downstream::Downstream;
pub use error::{Error, Result};
