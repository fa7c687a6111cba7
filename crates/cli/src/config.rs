use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tutor_dispatch::ChatCompletionConfig;
use tutor_extract::{ScanConfig, ScanTriggerConfig, Selector};

pub const DEFAULT_CONFIG_FILE: &str = "tutor.toml";
const API_KEY_ENV: &str = "TUTOR_API_KEY";

/// Host settings, read from a TOML file. Every section and field is
/// optional; omitted values fall back to the library defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    pub completion: CompletionSection,
    pub scan: ScanSection,
    pub server: ServerSection,
}

impl HostConfig {
    /// Load from `path`, or from `tutor.toml` in the working directory when
    /// no path is given and that file exists. `TUTOR_API_KEY` overrides the
    /// configured credential.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::read(default)?
                } else {
                    Self::default()
                }
            }
        };
        if let Ok(key) = env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.completion.api_key = Some(key);
            }
        }
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompletionSection {
    /// Opaque credential; the `TUTOR_API_KEY` environment variable wins.
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionSection {
    fn default() -> Self {
        let base = ChatCompletionConfig::default();
        Self {
            api_key: base.api_key,
            endpoint: base.endpoint,
            model: base.model,
            max_tokens: base.max_tokens,
            temperature: base.temperature,
        }
    }
}

impl CompletionSection {
    #[must_use]
    pub fn to_client_config(&self) -> ChatCompletionConfig {
        ChatCompletionConfig {
            api_key: self.api_key.clone(),
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanSection {
    /// Directory of `*.json` page snapshots watched by `serve`. Scanning is
    /// disabled when unset.
    pub snapshot_dir: Option<PathBuf>,
    /// Selector strings (`.class` or `[class*="fragment"]`); empty lists
    /// keep the built-in defaults.
    pub message_selectors: Vec<String>,
    pub name_selectors: Vec<String>,
    pub instructor_keywords: Vec<String>,
    pub min_text_len: usize,
    pub max_ancestor_depth: usize,
    pub initial_delay_ms: u64,
    pub rescan_interval_ms: u64,
    pub change_debounce_ms: u64,
}

impl Default for ScanSection {
    fn default() -> Self {
        let scan = ScanConfig::default();
        let trigger = ScanTriggerConfig::default();
        Self {
            snapshot_dir: None,
            message_selectors: Vec::new(),
            name_selectors: Vec::new(),
            instructor_keywords: Vec::new(),
            min_text_len: scan.min_text_len,
            max_ancestor_depth: scan.max_ancestor_depth,
            initial_delay_ms: as_millis(trigger.initial_delay),
            rescan_interval_ms: as_millis(trigger.rescan_interval),
            change_debounce_ms: as_millis(trigger.change_debounce),
        }
    }
}

impl ScanSection {
    pub fn to_scan_config(&self) -> Result<ScanConfig> {
        let mut config = ScanConfig::default();
        if !self.message_selectors.is_empty() {
            config.message_selectors = Selector::parse_list(&self.message_selectors)
                .context("Invalid selector in scan.message_selectors")?;
        }
        if !self.name_selectors.is_empty() {
            config.name_selectors = Selector::parse_list(&self.name_selectors)
                .context("Invalid selector in scan.name_selectors")?;
        }
        if !self.instructor_keywords.is_empty() {
            config.instructor_keywords = self
                .instructor_keywords
                .iter()
                .map(|keyword| keyword.to_lowercase())
                .collect();
        }
        config.min_text_len = self.min_text_len;
        config.max_ancestor_depth = self.max_ancestor_depth;
        Ok(config)
    }

    #[must_use]
    pub fn to_trigger_config(&self) -> ScanTriggerConfig {
        ScanTriggerConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            rescan_interval: Duration::from_millis(self.rescan_interval_ms),
            change_debounce: Duration::from_millis(self.change_debounce_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7600".to_string(),
        }
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_config_uses_library_defaults() {
        let config = HostConfig::parse("").expect("empty config parses");
        assert_eq!(config.server.bind, "127.0.0.1:7600");
        assert_eq!(config.completion.model, "gpt-3.5-turbo");
        assert_eq!(config.completion.max_tokens, 300);
        assert!(config.scan.snapshot_dir.is_none());
        assert_eq!(config.scan.initial_delay_ms, 3_000);
        assert_eq!(config.scan.rescan_interval_ms, 10_000);
        assert_eq!(config.scan.change_debounce_ms, 1_000);
    }

    #[test]
    fn full_config_round_trips_into_library_types() {
        let config = HostConfig::parse(
            r#"
            [completion]
            api_key = "sk-test"
            model = "gpt-4o-mini"
            max_tokens = 200
            temperature = 0.2

            [scan]
            snapshot_dir = "snapshots"
            message_selectors = [".forum-post", "[class*=\"comment\"]"]
            instructor_keywords = ["Mentor"]
            min_text_len = 5
            max_ancestor_depth = 2
            change_debounce_ms = 250

            [server]
            bind = "0.0.0.0:9000"
            "#,
        )
        .expect("config parses");

        let client = config.completion.to_client_config();
        assert_eq!(client.api_key.as_deref(), Some("sk-test"));
        assert_eq!(client.model, "gpt-4o-mini");
        assert_eq!(client.max_tokens, 200);

        let scan = config.scan.to_scan_config().expect("valid selectors");
        assert_eq!(
            scan.message_selectors,
            vec![
                Selector::Class("forum-post".to_string()),
                Selector::ClassContains("comment".to_string()),
            ]
        );
        // Keywords are matched case-insensitively downstream.
        assert_eq!(scan.instructor_keywords, vec!["mentor".to_string()]);
        assert_eq!(scan.min_text_len, 5);
        assert_eq!(scan.max_ancestor_depth, 2);
        // Name selectors were omitted and keep the defaults.
        assert!(!scan.name_selectors.is_empty());

        let trigger = config.scan.to_trigger_config();
        assert_eq!(trigger.change_debounce, Duration::from_millis(250));
        assert_eq!(trigger.initial_delay, Duration::from_secs(3));

        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn bad_selector_is_a_config_error() {
        let config = HostConfig::parse(
            r#"
            [scan]
            message_selectors = ["div > span"]
            "#,
        )
        .expect("config parses");
        assert!(config.scan.to_scan_config().is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(HostConfig::parse("[scan]\nsnapshots_dir = \"x\"\n").is_err());
    }
}
