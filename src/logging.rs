use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "FOCUS_LEDGER_LOG";
const LOG_FILE_PREFIX: &str = "focus-ledger";
const DEFAULT_FILTER: &str = "info";

/// Sends `tracing` output to `focus-ledger.log` in `state_dir`, keeping the
/// terminal free for the dashboard. The filter comes from `FOCUS_LEDGER_LOG`.
pub fn init(state_dir: &Path) -> Result<()> {
	fs::create_dir_all(state_dir)
		.with_context(|| format!("failed to create {}", state_dir.display()))?;

	let appender = RollingFileAppender::builder()
		.rotation(Rotation::NEVER)
		.filename_prefix(LOG_FILE_PREFIX)
		.filename_suffix("log")
		.build(state_dir)
		.context("failed to open log file")?;

	let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

	// A subscriber may already be installed (tests); keep it.
	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(appender)
		.with_ansi(false)
		.try_init();

	Ok(())
}
