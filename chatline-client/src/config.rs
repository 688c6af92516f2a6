use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const MAX_SERVER_URL_LEN: usize = 2048;
pub const MAX_USERNAME_LEN: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedClientConfig {
    pub server_url: String,
    pub username: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Invalid(String),
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write config file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

pub fn validate_saved_config(cfg: &SavedClientConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    let username = cfg.username.trim();
    if username.is_empty() {
        errors.push("Username is required.".to_owned());
    } else if username.len() > MAX_USERNAME_LEN {
        errors.push(format!(
            "Username is too long ({} > {} chars).",
            username.len(),
            MAX_USERNAME_LEN
        ));
    }

    let server_url = cfg.server_url.trim();
    if server_url.is_empty() {
        errors.push("Server URL is required.".to_owned());
    } else if server_url.len() > MAX_SERVER_URL_LEN {
        errors.push(format!(
            "Server URL is too long ({} > {} chars).",
            server_url.len(),
            MAX_SERVER_URL_LEN
        ));
    } else {
        match Url::parse(server_url) {
            Ok(url) => {
                let scheme = url.scheme();
                if scheme != "ws" && scheme != "wss" {
                    errors.push(
                        "Server URL must start with ws:// or wss:// (WebSocket).".to_owned(),
                    );
                }
            }
            Err(err) => {
                errors.push(format!("Server URL is invalid: {err}"));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "Please fix the following:\n- {}",
            errors.join("\n- ")
        )))
    }
}

/// The per-username channel address: `{server_url}/ws/{username}`. The path
/// shape is the server's contract; only the username is substituted here.
pub fn channel_url(server_url: &str, username: &str) -> Result<String, ConfigError> {
    let base = server_url.trim().trim_end_matches('/');
    let url = Url::parse(base).map_err(|err| ConfigError::Invalid(err.to_string()))?;
    let scheme = url.scheme();
    if scheme != "ws" && scheme != "wss" {
        return Err(ConfigError::Invalid(format!(
            "unsupported server URL scheme: {scheme}"
        )));
    }
    Ok(format!("{base}/ws/{username}"))
}

pub fn client_config_path() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("CHATLINE_CONFIG_DIR") {
        let dir = PathBuf::from(override_dir);
        let _ = fs::create_dir_all(&dir);
        return dir.join("config.json");
    }

    let base = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let dir = base.join(".chatline");
    let _ = fs::create_dir_all(&dir);
    dir.join("config.json")
}

pub fn load_saved_config_from_path(path: &Path) -> Result<Option<SavedClientConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_owned(),
        source,
    })?;
    let cfg: SavedClientConfig =
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;

    validate_saved_config(&cfg)?;
    Ok(Some(cfg))
}

pub fn load_saved_config() -> Result<Option<SavedClientConfig>, ConfigError> {
    load_saved_config_from_path(&client_config_path())
}

pub fn save_saved_config_to_path(path: &Path, cfg: &SavedClientConfig) -> Result<(), ConfigError> {
    validate_saved_config(cfg)?;

    const MAX_ATTEMPTS: u32 = 3;
    const BACKOFF_BASE_MS: u64 = 50;

    let tmp_path = path.with_extension("json.tmp");
    let payload = serde_json::to_string_pretty(cfg).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })?;

    let mut last_err: Option<ConfigError> = None;
    for attempt in 1..=MAX_ATTEMPTS {
        let result = write_atomically(path, &tmp_path, payload.as_bytes());
        match result {
            Ok(()) => return Ok(()),
            Err(err) => {
                last_err = Some(err);
                if attempt >= MAX_ATTEMPTS {
                    break;
                }
                let backoff_ms = BACKOFF_BASE_MS.saturating_mul(1_u64 << (attempt - 1));
                std::thread::sleep(Duration::from_millis(backoff_ms));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| ConfigError::Invalid("config save failed".to_owned())))
}

pub fn save_saved_config(cfg: &SavedClientConfig) -> Result<(), ConfigError> {
    save_saved_config_to_path(&client_config_path(), cfg)
}

fn write_atomically(path: &Path, tmp_path: &Path, payload: &[u8]) -> Result<(), ConfigError> {
    fs::write(tmp_path, payload).map_err(|source| ConfigError::Write {
        path: tmp_path.to_owned(),
        source,
    })?;

    if path.exists() {
        let _ = fs::remove_file(path);
    }
    fs::rename(tmp_path, path).map_err(|source| ConfigError::Write {
        path: path.to_owned(),
        source,
    })
}
