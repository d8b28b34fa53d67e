//! Logging setup and the per-run logging context

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info_span, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

/// Install the global subscriber
///
/// `RUST_LOG` overrides the level chosen by `verbose`. When `log_file` is
/// given, every line is also appended to that file without ANSI colors.
pub fn init_tracing(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to set tracing subscriber")
}

/// Logging context scoped to one pipeline run
///
/// Every event emitted while the context's span is entered carries the
/// run id, so concurrent or consecutive runs stay distinguishable in a
/// shared log file.
#[derive(Debug)]
pub struct RunContext {
    run_id: Uuid,
    span: Span,
    started: Instant,
}

impl RunContext {
    pub fn new(command: &'static str) -> Self {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, command);
        Self {
            run_id,
            span,
            started: Instant::now(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Run `f` inside the run's span
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        self.span.in_scope(f)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
