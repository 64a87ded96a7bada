//! Stderr logging for the calibration tools.
//!
//! Records from the `camcalib*` crates are shown at the requested level;
//! everything else (image decoders and other dependencies) only from `warn`
//! up. Lines look like `[  0.412s  INFO] message`, foreign records also
//! carry their target.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const OWN_PREFIX: &str = "camcalib";

fn is_own(target: &str) -> bool {
    target.starts_with(OWN_PREFIX)
}

/// Whether a record at `level` from `target` passes a `filter` set for the
/// calibration crates.
fn passes(target: &str, level: Level, filter: LevelFilter) -> bool {
    if is_own(target) {
        level <= filter
    } else {
        level <= filter.min(LevelFilter::Warn)
    }
}

struct CalibLogger {
    filter: LevelFilter,
    started: Instant,
}

impl Log for CalibLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        passes(metadata.target(), metadata.level(), self.filter)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let (level, target, args) = (record.level(), record.target(), record.args());
        let mut stderr = std::io::stderr().lock();
        let _ = if is_own(target) {
            writeln!(stderr, "[{elapsed:7.3}s {level:>5}] {args}")
        } else {
            writeln!(stderr, "[{elapsed:7.3}s {level:>5} {target}] {args}")
        };
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<CalibLogger> = OnceLock::new();

/// Install the stderr logger. Only the first call has an effect.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| CalibLogger {
            filter: level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Install a `tracing` subscriber. `RUST_LOG` wins when set; otherwise the
/// calibration crates log at `level` and dependencies at `warn`.
///
/// Span close events carry the timing of the instrumented detection, scan
/// and solver stages.
#[cfg(feature = "tracing")]
pub fn init_tracing(level: LevelFilter, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let deps = level.min(LevelFilter::Warn);
        EnvFilter::new(format!("{deps},{OWN_PREFIX}={level}"))
    });
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
