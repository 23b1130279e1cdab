//! On-demand snapshot of per-translator counters and latency histograms,
//! written to a temp file in a plaintext key/value format.

use crate::error::{Error, Result};
use chrono::Local;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_METRICS_DIR: &str = "/var/lib/glusterfs/metrics";

/// One upstream operation's running counters: a lifetime total plus an
/// interval window that [`OpStats::take_interval`] reads and resets.
#[derive(Debug, Default)]
pub struct OpStats {
    total_count: AtomicU64,
    interval_count: AtomicU64,
    interval_fail_count: AtomicU64,
    interval_latency_total_micros: AtomicU64,
    interval_latency_count: AtomicU64,
    interval_latency_min_micros: AtomicU64,
    interval_latency_max_micros: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalSnapshot {
    pub count: u64,
    pub fail_count: u64,
    pub latency_avg: Option<f64>,
    pub latency_min_micros: u64,
    pub latency_max_micros: u64,
}

impl OpStats {
    pub fn record(&self, latency: std::time::Duration, failed: bool) {
        self.total_count.fetch_add(1, Ordering::Relaxed);
        self.interval_count.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.interval_fail_count.fetch_add(1, Ordering::Relaxed);
        }

        let micros = latency.as_micros().min(u64::MAX as u128) as u64;
        self.interval_latency_total_micros.fetch_add(micros, Ordering::Relaxed);
        self.interval_latency_count.fetch_add(1, Ordering::Relaxed);
        self.interval_latency_min_micros
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                Some(if cur == 0 { micros } else { cur.min(micros) })
            })
            .ok();
        self.interval_latency_max_micros
            .fetch_max(micros, Ordering::Relaxed);
    }

    pub fn total_count(&self) -> u64 {
        self.total_count.load(Ordering::Relaxed)
    }

    /// Read-and-reset: two consecutive dumps with no activity between them
    /// yield zero for every `interval.*` counter in the second.
    pub fn take_interval(&self) -> IntervalSnapshot {
        let count = self.interval_count.swap(0, Ordering::Relaxed);
        let fail_count = self.interval_fail_count.swap(0, Ordering::Relaxed);
        let latency_total = self.interval_latency_total_micros.swap(0, Ordering::Relaxed);
        let latency_count = self.interval_latency_count.swap(0, Ordering::Relaxed);
        let latency_min = self.interval_latency_min_micros.swap(0, Ordering::Relaxed);
        let latency_max = self.interval_latency_max_micros.swap(0, Ordering::Relaxed);

        IntervalSnapshot {
            count,
            fail_count,
            latency_avg: if latency_count > 0 {
                Some(latency_total as f64 / latency_count as f64)
            } else {
                None
            },
            latency_min_micros: latency_min,
            latency_max_micros: latency_max,
        }
    }
}

/// Per-translator counters dumped as `<name>.total.*` / `<name>.interval.*`.
#[derive(Debug, Default)]
pub struct Metrics {
    ops: BTreeMap<&'static str, OpStats>,
    pending_winds: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_op(&mut self, op: &'static str, latency: std::time::Duration, failed: bool) {
        self.ops.entry(op).or_default().record(latency, failed);
    }

    pub fn note_pending_wind(&self) {
        self.pending_winds.fetch_add(1, Ordering::Relaxed);
    }

    fn pending_winds(&self) -> u64 {
        self.pending_winds.load(Ordering::Relaxed)
    }
}

/// Global, context-wide counters (`total.stack.*`, `total.dict.*`). Plain
/// fields a caller wires up to whatever owns them, defaulting to zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalMetrics {
    pub stack_total_count: u64,
    pub stack_in_flight: u64,
    pub dict_used: u64,
    pub dict_pairs_used: u64,
    pub dict_max_pairs_per: u64,
}

impl GlobalMetrics {
    fn dict_average_pairs(&self) -> Option<u64> {
        (self.dict_used > 0).then(|| self.dict_pairs_used / self.dict_used)
    }
}

/// One line per type; `max_size`/`max_units` only present in the debug variant.
#[derive(Debug, Clone)]
pub struct MemRecord {
    pub typestr: String,
    pub in_use_size: u64,
    pub total_allocs: u64,
    pub debug: Option<(u64, u64)>, // (max_size, max_units)
}

pub struct TranslatorSection<'a> {
    pub name: &'a str,
    pub metrics: &'a Metrics,
    pub mem_records: &'a [MemRecord],
}

/// Identifying context written into the dump header.
pub struct DumpContext<'a> {
    pub cmdline: &'a str,
    pub brick: &'a str,
    pub mount: &'a str,
    pub volume: &'a str,
}

/// Directory/temp-file creation failures are fatal; everything after the
/// file is open is best-effort — a write or fsync failure is logged and
/// swallowed, leaving a partial but fsynced file.
pub fn dump(
    dir: &Path,
    ctx: &DumpContext,
    global: &GlobalMetrics,
    translators: &[TranslatorSection],
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    set_mode(dir, 0o755)?;

    let mut file = tempfile::Builder::new().prefix("gmetrics.").tempfile_in(dir)?;
    set_mode(file.path(), 0o600)?;

    if let Err(e) = write_body(file.as_file_mut(), ctx, global, translators) {
        tracing::warn!(error = %e, "metrics dump write failed, keeping partial file");
    }

    if let Err(e) = file.as_file().sync_all() {
        tracing::warn!(error = %e, "metrics dump fsync failed");
    }

    let (_, path) = file.keep().map_err(|e| Error::Io(e.error))?;
    Ok(path)
}

fn write_body(
    out: &mut std::fs::File,
    ctx: &DumpContext,
    global: &GlobalMetrics,
    translators: &[TranslatorSection],
) -> std::io::Result<()> {
    let now = Local::now().format("%Y-%m-%d %H:%M:%S");
    writeln!(out, "## {}", ctx.cmdline)?;
    writeln!(out, "### {now}")?;
    writeln!(out, "### BrickName: {}", ctx.brick)?;
    writeln!(out, "### MountName: {}", ctx.mount)?;
    writeln!(out, "### VolumeName: {}", ctx.volume)?;

    writeln!(out, "total.stack.count {}", global.stack_total_count)?;
    writeln!(out, "total.stack.in-flight {}", global.stack_in_flight)?;
    writeln!(out, "total.dict.max-pairs-per {}", global.dict_max_pairs_per)?;
    writeln!(out, "total.dict.pairs-used {}", global.dict_pairs_used)?;
    writeln!(out, "total.dict.used {}", global.dict_used)?;
    if let Some(avg) = global.dict_average_pairs() {
        writeln!(out, "total.dict.average-pairs {avg}")?;
    }
    writeln!(out, "# -----")?;

    for section in translators {
        write_translator(out, section)?;
    }

    writeln!(out, "\n# End of metrics")
}

fn write_translator(out: &mut std::fs::File, section: &TranslatorSection) -> std::io::Result<()> {
    let name = section.name;
    let pending = section.metrics.pending_winds();
    if pending > 0 {
        writeln!(out, "{name}.total.pending-winds.count {pending}")?;
    }

    let mut total_fop_count = 0u64;
    let mut interval_fop_count = 0u64;

    for (op, stats) in &section.metrics.ops {
        let total = stats.total_count();
        if total > 0 {
            writeln!(out, "{name}.total.{op}.count {total}")?;
            total_fop_count += total;
        }

        let interval = stats.take_interval();
        if interval.count > 0 {
            writeln!(out, "{name}.interval.{op}.count {}", interval.count)?;
            interval_fop_count += interval.count;
        }
        if interval.fail_count > 0 {
            writeln!(out, "{name}.interval.{op}.fail_count {}", interval.fail_count)?;
        }
        if let Some(avg) = interval.latency_avg {
            writeln!(out, "{name}.interval.{op}.latency {avg}")?;
            writeln!(out, "{name}.interval.{op}.max {}", interval.latency_max_micros)?;
            writeln!(out, "{name}.interval.{op}.min {}", interval.latency_min_micros)?;
        }
    }

    writeln!(out, "{name}.total.fop-count {total_fop_count}")?;
    writeln!(out, "{name}.interval.fop-count {interval_fop_count}")?;

    for rec in section.mem_records {
        match rec.debug {
            Some((max_size, max_units)) => writeln!(
                out,
                "# {}, {}, {}, {}, {}",
                rec.typestr, rec.in_use_size, max_size, max_units, rec.total_allocs
            )?,
            None => writeln!(out, "# {}, {}, {}", rec.typestr, rec.in_use_size, rec.total_allocs)?,
        }
    }

    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
