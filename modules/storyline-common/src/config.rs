use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Duration;
use serde::Deserialize;

use crate::scoring::PopularityWeights;

/// TOML-backed tuning. Every section and field is optional.
/// Secrets (the push server key) stay as env vars.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub engine: EngineConfig,
    pub aggregates: AggregatesConfig,
    pub notifications: NotificationsConfig,
    pub scoring: PopularityWeights,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on propagation waves per dispatched event.
    pub max_rounds: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_rounds: 16 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregatesConfig {
    pub live_window_hours: i64,
}

impl AggregatesConfig {
    pub fn live_window(&self) -> Duration {
        Duration::hours(self.live_window_hours)
    }
}

impl Default for AggregatesConfig {
    fn default() -> Self {
        Self {
            live_window_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Longest quoted text in a push body, in characters.
    pub text_limit: usize,
    pub push_enabled: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            text_limit: 32,
            push_enabled: true,
        }
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

/// Environment-provided settings: where the TOML lives and the push credentials.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub config_path: Option<PathBuf>,
    pub fcm_server_key: Option<String>,
    pub fcm_endpoint: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            config_path: std::env::var("STORYLINE_CONFIG").ok().map(PathBuf::from),
            fcm_server_key: std::env::var("FCM_SERVER_KEY").ok().filter(|k| !k.is_empty()),
            fcm_endpoint: std::env::var("FCM_ENDPOINT").ok(),
        };

        config.log_keys();
        Ok(config)
    }

    /// File config from `STORYLINE_CONFIG` (or `explicit`), defaults when neither is set.
    pub fn file_config(&self, explicit: Option<&Path>) -> Result<FileConfig> {
        match explicit.or(self.config_path.as_deref()) {
            Some(path) => load_config(path),
            None => Ok(FileConfig::default()),
        }
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val.chars().take(5).collect::<String>();
            format!("{n}...({} chars)", val.chars().count())
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => preview(v),
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!(
            "  STORYLINE_CONFIG: {}",
            self.config_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<not set>".to_string())
        );
        tracing::info!("  FCM_SERVER_KEY: {}", preview_opt(&self.fcm_server_key));
        tracing::info!("  FCM_ENDPOINT: {}", preview_opt(&self.fcm_endpoint));
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.max_rounds, 16);
        assert_eq!(config.aggregates.live_window(), Duration::hours(24));
        assert_eq!(config.notifications.text_limit, 32);
        assert!(config.notifications.push_enabled);
        assert_eq!(config.scoring, PopularityWeights::default());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[notifications]\npush_enabled = false\n\n[scoring]\nviewer_weight = 0.5"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert!(!config.notifications.push_enabled);
        assert_eq!(config.notifications.text_limit, 32);
        assert_eq!(config.scoring.viewer_weight, 0.5);
        assert_eq!(config.scoring.post_weight, 1.0);
    }

    #[test]
    fn unknown_section_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 1").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_config(Path::new("/nonexistent/storyline.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/storyline.toml"));
    }

    #[test]
    fn explicit_path_wins_over_env() {
        let app = AppConfig {
            config_path: Some(PathBuf::from("/nonexistent/env.toml")),
            ..AppConfig::default()
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nmax_rounds = 3").unwrap();

        let config = app.file_config(Some(file.path())).unwrap();
        assert_eq!(config.engine.max_rounds, 3);
        assert!(AppConfig::default().file_config(None).is_ok());
    }
}
