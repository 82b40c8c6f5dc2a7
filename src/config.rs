use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = r#"
[api]
base_url = "http://localhost:8000/api/v1"
api_key = ""

[general]
poll_interval_ms = 2000
page_size = 50
downloads_dir = "~/.roost/downloads"

[notifications]
enabled = true
on_completed = true
on_failed = true
on_attention = true
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	pub api: Api,
	pub general: General,
	pub notifications: Notifications,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Api {
	#[serde(default = "default_base_url")]
	pub base_url: String,
	#[serde(default)]
	pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct General {
	pub poll_interval_ms: u64,
	pub page_size: u32,
	pub downloads_dir: String,
	#[serde(default = "default_model")]
	pub default_model: String,
	#[serde(default = "default_status_style")]
	pub status_style: String, // "emoji", "unicode", "text"
}

fn default_base_url() -> String {
	"http://localhost:8000/api/v1".to_string()
}

fn default_model() -> String {
	"gpt-4o".to_string()
}

fn default_status_style() -> String {
	"emoji".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notifications {
	pub enabled: bool,
	pub on_completed: bool,
	pub on_failed: bool,
	pub on_attention: bool,
}

pub fn load_or_init() -> Result<Config> {
	let base_dir = base_dir()?;
	if !base_dir.exists() {
		fs::create_dir_all(&base_dir)?;
	}

	let logs_dir = base_dir.join("logs");
	let credentials_dir = base_dir.join("credentials");
	if !logs_dir.exists() {
		fs::create_dir_all(&logs_dir)?;
	}
	if !credentials_dir.exists() {
		fs::create_dir_all(&credentials_dir)?;
	}

	let config_path = base_dir.join("config.toml");
	if !config_path.exists() {
		fs::write(&config_path, DEFAULT_CONFIG.trim_start())?;
	}
	let content = fs::read_to_string(&config_path)?;
	let mut cfg: Config = toml::from_str(&content)?;
	cfg.general.downloads_dir = expand_path(&cfg.general.downloads_dir);
	let _ = fs::create_dir_all(Path::new(&cfg.general.downloads_dir));

	// The environment wins over the file so keys stay out of dotfiles.
	if let Ok(key) = std::env::var("ROOST_API_KEY") {
		if !key.trim().is_empty() {
			cfg.api.api_key = key.trim().to_string();
		}
	}
	Ok(cfg)
}

/// Parse the config file as written, without path expansion or the
/// environment override. Edits go through this so a key coming from
/// ROOST_API_KEY is never written back into the file.
pub fn load_raw() -> Result<Config> {
	let path = base_dir()?.join("config.toml");
	if !path.exists() {
		return Ok(toml::from_str(DEFAULT_CONFIG.trim_start())?);
	}
	let content = fs::read_to_string(&path)?;
	Ok(toml::from_str(&content)?)
}

pub fn save(cfg: &Config) -> Result<PathBuf> {
	let dir = base_dir()?;
	fs::create_dir_all(&dir)?;
	let path = dir.join("config.toml");
	fs::write(&path, toml::to_string_pretty(cfg)?)?;
	Ok(path)
}

pub fn expand_path(input: &str) -> String {
	if input.starts_with("~/") {
		if let Some(home) = dirs::home_dir() {
			return home
				.join(input.trim_start_matches("~/"))
				.to_string_lossy()
				.into_owned();
		}
	}
	input.to_string()
}

pub fn base_dir() -> Result<PathBuf> {
	dirs::home_dir()
		.map(|p| p.join(".roost"))
		.ok_or_else(|| anyhow::anyhow!("Failed to resolve home directory"))
}

pub fn logs_dir() -> Result<PathBuf> {
	let dir = base_dir()?.join("logs");
	fs::create_dir_all(&dir)?;
	Ok(dir)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_config_template_parses() {
		let cfg: Config = toml::from_str(DEFAULT_CONFIG.trim_start()).unwrap();
		assert_eq!(cfg.api.base_url, "http://localhost:8000/api/v1");
		assert_eq!(cfg.general.page_size, 50);
		// Fields missing from the template fall back to their defaults.
		assert_eq!(cfg.general.default_model, "gpt-4o");
		assert_eq!(cfg.general.status_style, "emoji");
		assert!(cfg.notifications.on_attention);
	}

	#[test]
	fn test_edited_config_round_trips() {
		let mut cfg: Config = toml::from_str(DEFAULT_CONFIG.trim_start()).unwrap();
		cfg.api.base_url = "https://agents.example.com/api/v1".to_string();
		cfg.api.api_key = "sk-live-1234".to_string();
		let serialized = toml::to_string_pretty(&cfg).unwrap();
		let back: Config = toml::from_str(&serialized).unwrap();
		assert_eq!(back.api.base_url, "https://agents.example.com/api/v1");
		assert_eq!(back.api.api_key, "sk-live-1234");
		assert_eq!(back.general.page_size, cfg.general.page_size);
	}
}
