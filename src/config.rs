//! Configuration loading and defaults for poisonctl.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::OperationMode;

// === Types ===

/// Generation parameter defaults loaded from config files.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GenerationConfig {
    pub prompt: Option<String>,
    pub max_new_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub num_beams: Option<u32>,
}

/// Ledger configuration loaded from config files.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LedgerConfig {
    pub block_name: Option<String>,
    pub clean_block: Option<String>,
}

/// Resolved generation parameters with defaults applied.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub prompt: String,
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub num_beams: u32,
}

/// Resolved CLI configuration, including defaults and environment overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub base_url: Option<String>,
    pub mode: Option<OperationMode>,
    pub countdown_secs: Option<u32>,
    pub poison_count: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub generation: Option<GenerationConfig>,
    pub ledger: Option<LedgerConfig>,
}

// === Config Loading ===

impl Config {
    /// Load configuration from disk and merge with environment overrides.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.or_else(default_config_path);
        let mut config = if let Some(path) = path.as_ref() {
            if path.exists() {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            } else {
                Config::default()
            }
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Validate that config fields the controller relies on are sane.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref url) = self.base_url
            && url.trim().is_empty()
        {
            anyhow::bail!("base_url cannot be empty string");
        }
        if let Some(count) = self.poison_count
            && !(1..=1000).contains(&count)
        {
            anyhow::bail!("poison_count must be in 1..=1000, got {count}");
        }
        Ok(())
    }

    /// Return the backend base URL (normalized, no trailing slash).
    #[must_use]
    pub fn backend_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| "http://localhost:8000".to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Operation mode selected for this session.
    #[must_use]
    pub fn operation_mode(&self) -> OperationMode {
        self.mode.unwrap_or(OperationMode::Direct)
    }

    /// Seconds the poison confirmation countdown runs before OK unlocks.
    #[must_use]
    pub fn countdown_secs(&self) -> u32 {
        self.countdown_secs.unwrap_or(10)
    }

    /// Initial TPI count for poison requests (clamped again at edit time).
    #[must_use]
    pub fn poison_count(&self) -> u32 {
        self.poison_count.unwrap_or(10).clamp(1, 1000)
    }

    /// HTTP request timeout for gateway calls.
    #[must_use]
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs.unwrap_or(600))
    }

    /// Ledger block name tagged onto generate/poison calls in ledger mode.
    #[must_use]
    pub fn ledger_block(&self) -> String {
        self.ledger
            .as_ref()
            .and_then(|l| l.block_name.clone())
            .unwrap_or_else(|| "latest_block".to_string())
    }

    /// Known-clean block name used as the default revert target in ledger mode.
    #[must_use]
    pub fn clean_block(&self) -> String {
        self.ledger
            .as_ref()
            .and_then(|l| l.clean_block.clone())
            .unwrap_or_else(|| "clean_block".to_string())
    }

    /// Resolved generation parameters, matching the lab UI's defaults.
    #[must_use]
    pub fn generation_params(&self) -> GenerationParams {
        let generation = self.generation.clone().unwrap_or_default();
        GenerationParams {
            prompt: generation
                .prompt
                .unwrap_or_else(|| "Write a Python function that reverses a string.".to_string()),
            max_new_tokens: generation.max_new_tokens.unwrap_or(160),
            temperature: generation.temperature.unwrap_or(0.2),
            num_beams: generation.num_beams.unwrap_or(4),
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("POISONCTL_CONFIG_PATH")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".poisonctl").join("config.toml"))
}

// === Environment Overrides ===

fn apply_env_overrides(config: &mut Config) {
    if let Ok(value) = std::env::var("POISONCTL_BASE_URL") {
        config.base_url = Some(value);
    }
    if let Ok(value) = std::env::var("POISONCTL_MODE") {
        match value.as_str() {
            "direct" => config.mode = Some(OperationMode::Direct),
            "ledger" | "ledger_backed" => config.mode = Some(OperationMode::LedgerBacked),
            other => crate::logging::warn(format!("Ignoring unknown POISONCTL_MODE: {other}")),
        }
    }
    if let Ok(value) = std::env::var("POISONCTL_COUNTDOWN_SECS")
        && let Ok(secs) = value.parse::<u32>()
    {
        config.countdown_secs = Some(secs);
    }
    if let Ok(value) = std::env::var("POISONCTL_BLOCK_NAME") {
        config.ledger.get_or_insert_with(LedgerConfig::default).block_name = Some(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::ffi::OsString;
    use std::path::Path;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    struct EnvGuard {
        saved: Vec<(&'static str, Option<OsString>)>,
    }

    impl EnvGuard {
        fn capture(keys: &[&'static str]) -> Self {
            let saved = keys.iter().map(|k| (*k, env::var_os(k))).collect();
            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                // Safety: test-only environment mutation guarded by a global mutex.
                unsafe {
                    match value {
                        Some(v) => env::set_var(key, v),
                        None => env::remove_var(key),
                    }
                }
            }
        }
    }

    const ENV_KEYS: &[&str] = &[
        "POISONCTL_CONFIG_PATH",
        "POISONCTL_BASE_URL",
        "POISONCTL_MODE",
        "POISONCTL_COUNTDOWN_SECS",
        "POISONCTL_BLOCK_NAME",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            // Safety: test-only environment mutation guarded by a global mutex.
            unsafe { env::remove_var(key) };
        }
    }

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("config.toml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_match_the_lab_ui() {
        let _lock = env_lock().lock().unwrap();
        let _guard = EnvGuard::capture(ENV_KEYS);
        clear_env();

        let config = Config::default();
        assert_eq!(config.backend_base_url(), "http://localhost:8000");
        assert_eq!(config.operation_mode(), OperationMode::Direct);
        assert_eq!(config.countdown_secs(), 10);
        assert_eq!(config.poison_count(), 10);
        assert_eq!(config.ledger_block(), "latest_block");
        assert_eq!(config.clean_block(), "clean_block");

        let params = config.generation_params();
        assert_eq!(params.max_new_tokens, 160);
        assert_eq!(params.num_beams, 4);
    }

    #[test]
    fn loads_file_and_applies_env_overrides() {
        let _lock = env_lock().lock().unwrap();
        let _guard = EnvGuard::capture(ENV_KEYS);
        clear_env();

        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
base_url = "http://backend:9000/"
mode = "ledger_backed"
countdown_secs = 3

[ledger]
clean_block = "baseline"
"#,
        );

        // Safety: test-only environment mutation guarded by a global mutex.
        unsafe { env::set_var("POISONCTL_BASE_URL", "http://override:8000") };

        let config = Config::load(Some(path)).unwrap();
        assert_eq!(config.backend_base_url(), "http://override:8000");
        assert_eq!(config.operation_mode(), OperationMode::LedgerBacked);
        assert_eq!(config.countdown_secs(), 3);
        assert_eq!(config.clean_block(), "baseline");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let _lock = env_lock().lock().unwrap();
        let _guard = EnvGuard::capture(ENV_KEYS);
        clear_env();

        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config.backend_base_url(), "http://localhost:8000");
    }

    #[test]
    fn out_of_range_poison_count_is_rejected() {
        let config = Config {
            poison_count: Some(5000),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
