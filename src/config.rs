use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

const CONFIG_FILE: &str = "config.toml";
const DEFAULT_STORE_FILE: &str = "store.json";
const STATE_DIR_NAME: &str = "focus_ledger";
pub const STORE_ENV: &str = "FOCUS_LEDGER_STORE";
pub const STATE_DIR_ENV: &str = "FOCUS_LEDGER_STATE_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read {}: {source}", path.display())]
	Io {
		path: PathBuf,
		source: std::io::Error,
	},
	#[error("failed to parse {}: {source}", path.display())]
	Toml {
		path: PathBuf,
		source: toml::de::Error,
	},
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
	pub store_path: Option<PathBuf>,
	pub insight: InsightConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
	pub endpoint: String,
	pub model: String,
	pub api_key_env: String,
	pub timeout_secs: u64,
}

impl Default for InsightConfig {
	fn default() -> Self {
		Self {
			endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
			model: "gemini-2.5-flash".to_string(),
			api_key_env: "GEMINI_API_KEY".to_string(),
			timeout_secs: 20,
		}
	}
}

/// Reads `config.toml` from `state_dir`; a missing file yields the defaults.
pub fn load_config(state_dir: &Path) -> Result<Config, ConfigError> {
	let path = state_dir.join(CONFIG_FILE);
	let raw = match fs::read_to_string(&path) {
		Ok(raw) => raw,
		Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Config::default()),
		Err(source) => return Err(ConfigError::Io { path, source }),
	};

	toml::from_str(&raw).map_err(|source| ConfigError::Toml { path, source })
}

/// `--store`, then `FOCUS_LEDGER_STORE`, then `store_path` from the config
/// file, then `store.json` in the state directory.
pub fn resolve_store_path(cli_path: Option<PathBuf>, config: &Config, state_dir: &Path) -> PathBuf {
	store_path_from(cli_path, env::var_os(STORE_ENV), config, state_dir)
}

fn store_path_from(
	cli_path: Option<PathBuf>,
	env_path: Option<OsString>,
	config: &Config,
	state_dir: &Path,
) -> PathBuf {
	if let Some(path) = cli_path {
		return absolutize(path);
	}

	if let Some(path) = env_path {
		let path = PathBuf::from(path);
		if !path.as_os_str().is_empty() {
			return absolutize(path);
		}
	}

	if let Some(path) = &config.store_path {
		if path.is_relative() {
			return state_dir.join(path);
		}
		return path.clone();
	}

	state_dir.join(DEFAULT_STORE_FILE)
}

pub fn state_dir() -> PathBuf {
	if let Some(path) = env::var_os(STATE_DIR_ENV) {
		return PathBuf::from(path);
	}

	#[cfg(target_os = "windows")]
	{
		if let Some(path) = env::var_os("LOCALAPPDATA") {
			return PathBuf::from(path).join(STATE_DIR_NAME);
		}
	}

	if let Some(path) = env::var_os("XDG_STATE_HOME") {
		return PathBuf::from(path).join(STATE_DIR_NAME);
	}

	if let Some(path) = env::var_os("HOME") {
		return PathBuf::from(path)
			.join(".local")
			.join("state")
			.join(STATE_DIR_NAME);
	}

	PathBuf::from(".focus_ledger")
}

fn absolutize(path: PathBuf) -> PathBuf {
	if path.is_absolute() {
		path
	} else if let Ok(cwd) = env::current_dir() {
		cwd.join(path)
	} else {
		path
	}
}
