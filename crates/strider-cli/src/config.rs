//! Configuration vault: reads and writes `~/.strider/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use strider_control::MotionParams;
use tracing::warn;

/// Persisted operator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Per-topic buffer size of the event bus.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    /// Mirror every velocity command onto the `Commands` topic.
    #[serde(default = "default_mirror_commands")]
    pub mirror_commands: bool,

    /// Print goal-status transitions as they happen.
    #[serde(default = "default_echo_status")]
    pub echo_status: bool,

    #[serde(default)]
    pub motion: MotionParams,
}

fn default_bus_capacity() -> usize {
    256
}
fn default_mirror_commands() -> bool {
    true
}
fn default_echo_status() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus_capacity: default_bus_capacity(),
            mirror_commands: default_mirror_commands(),
            echo_status: default_echo_status(),
            motion: MotionParams::default(),
        }
    }
}

/// Return the path to `~/.strider/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".strider").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Environment variable that overrides motion parameter `name`, e.g.
/// `STRIDER_MAX_LINEAR_VELOCITY`.
pub fn env_var_for(name: &str) -> String {
    format!("STRIDER_{}", name.to_ascii_uppercase())
}

/// Apply `STRIDER_*` environment overrides.
///
/// `STRIDER_BUS_CAPACITY` sets the bus size; every motion parameter can be
/// overridden through [`env_var_for`].  Unparsable values are ignored with a
/// warning.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides_from(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("STRIDER_BUS_CAPACITY") {
        match v.parse::<usize>() {
            Ok(cap) if cap > 0 => cfg.bus_capacity = cap,
            _ => warn!(value = %v, "ignoring invalid STRIDER_BUS_CAPACITY"),
        }
    }
    for name in MotionParams::NAMES {
        let key = env_var_for(name);
        if let Some(v) = lookup(&key)
            && let Err(e) = cfg.motion.set_field(name, &v)
        {
            warn!(var = %key, error = %e, "ignoring environment override");
        }
    }
}

/// Save the config to disk, creating `~/.strider/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
