// Shell configuration
//
// Layered with the `config` crate: built-in defaults < optional `installer-shell.toml`
// < `INSTALLER_SHELL_*` environment variables.

use crate::shell::progress::DEFAULT_PROGRESS_WEIGHT;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

pub const CONFIG_FILE_STEM: &str = "installer-shell";
pub const ENV_PREFIX: &str = "INSTALLER_SHELL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load shell configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("progress_weight must be in (0, 1], got {0}")]
    InvalidWeight(f64),
    #[error("headless_poll_ms must be greater than zero")]
    InvalidPollInterval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiPreference {
    /// Terminal UI when stdout is a terminal, headless otherwise.
    #[default]
    Auto,
    Tui,
    Headless,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub progress_weight: f64,
    pub ui: UiPreference,
    pub error_dialog_title: String,
    pub user_cancel_phrases: Vec<String>,
    pub demo_step_delay_ms: u64,
    pub headless_poll_ms: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            progress_weight: DEFAULT_PROGRESS_WEIGHT,
            ui: UiPreference::Auto,
            error_dialog_title: "[ErrorDlg_Title]".to_string(),
            user_cancel_phrases: vec![
                "User canceled installation".to_string(),
                "User cancelled installation".to_string(),
            ],
            demo_step_delay_ms: 150,
            headless_poll_ms: 250,
        }
    }
}

impl ShellConfig {
    /// Defaults, then `installer-shell.toml` in the working directory (if any), then the
    /// process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE_STEM).required(false))
            .add_source(env_source(None));
        Self::finish(builder)
    }

    /// Same layering with an explicit file and, for tests, an explicit environment map.
    pub fn load_from(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(env_source(env));
        Self::finish(builder)
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let cfg: ShellConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.progress_weight > 0.0 && self.progress_weight <= 1.0) {
            return Err(ConfigError::InvalidWeight(self.progress_weight));
        }
        if self.headless_poll_ms == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }
        Ok(())
    }

    /// True when an Info record's text announces a user cancel.
    pub fn is_user_cancel_text(&self, text: &str) -> bool {
        self.user_cancel_phrases
            .iter()
            .any(|phrase| !phrase.is_empty() && text.contains(phrase.as_str()))
    }
}

fn env_source(env: Option<HashMap<String, String>>) -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(";")
        .with_list_parse_key("user_cancel_phrases")
        .source(env)
}
