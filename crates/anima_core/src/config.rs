use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnimaConfig {
    pub reasoner: ReasonerConfig,
    pub organism: OrganismConfig,
    pub goals: GoalConfig,
    pub facts: FactConfig,
    pub identity: IdentityConfig,
}

impl AnimaConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: AnimaConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ANIMA_PROVIDER") {
            self.reasoner.provider = v;
        }
        if let Ok(v) = std::env::var("ANIMA_MODEL") {
            self.reasoner.model = v;
        }
        if let Ok(v) = std::env::var("OLLAMA_BASE_URL") {
            self.reasoner.base_url = v;
        }
        if let Ok(v) = std::env::var("ANIMA_REASONER_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.reasoner.timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("ANIMA_DATA_DIR") {
            self.organism.data_dir = PathBuf::from(v);
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    /// "ollama" or "mock".
    pub provider: String,
    pub model: String,
    pub base_url: String,
    /// Hard ceiling for a single call; an expired call counts as a failure.
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.1".to_string(),
            base_url: "http://localhost:11434/v1".to_string(),
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

impl ReasonerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrganismConfig {
    pub data_dir: PathBuf,
    pub tick_interval_ms: u64,
    pub metabolism_interval_secs: u64,
    pub introspection_interval_secs: u64,
    pub goal_check_interval_secs: u64,
    /// Vitality lost per metabolism tick while idle.
    pub idle_decay: f64,
    pub input_queue_capacity: usize,
    /// Ask the reasoner for short-term predictions after each reply.
    pub forecast: bool,
}

impl Default for OrganismConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            tick_interval_ms: 100,
            metabolism_interval_secs: 10,
            introspection_interval_secs: 180,
            goal_check_interval_secs: 30,
            idle_decay: 0.2,
            input_queue_capacity: 32,
            forecast: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoalConfig {
    /// A top goal younger than this is resumed instead of re-decided.
    pub resume_ceiling_secs: i64,
    pub history_limit: usize,
    pub max_label_len: usize,
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self {
            resume_ceiling_secs: 600,
            history_limit: 20,
            max_label_len: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FactConfig {
    pub min_len: usize,
    /// Token-overlap ratio at or above which two facts count as the same.
    pub similarity_threshold: f64,
}

impl Default for FactConfig {
    fn default() -> Self {
        Self {
            min_len: 3,
            similarity_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub drift_threshold: f64,
    pub fragmentation_threshold: f64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            drift_threshold: 0.6,
            fragmentation_threshold: 0.3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = AnimaConfig::default();
        assert_eq!(cfg.reasoner.provider, "ollama");
        assert_eq!(cfg.organism.tick_interval_ms, 100);
        assert_eq!(cfg.organism.metabolism_interval_secs, 10);
        assert_eq!(cfg.organism.introspection_interval_secs, 180);
        assert_eq!(cfg.organism.goal_check_interval_secs, 30);
        assert_eq!(cfg.goals.resume_ceiling_secs, 600);
        assert!(!cfg.organism.forecast);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[reasoner]
provider = "mock"
"#;
        let cfg: AnimaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.reasoner.provider, "mock");
        // Defaults for unspecified fields
        assert_eq!(cfg.reasoner.model, "llama3.1");
        assert_eq!(cfg.facts.min_len, 3);
        assert_eq!(cfg.identity.drift_threshold, 0.6);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[reasoner]
provider = "ollama"
model = "qwen2.5"
base_url = "http://gpu-box:11434/v1"
timeout_secs = 15
max_retries = 0

[organism]
data_dir = "/var/lib/anima"
tick_interval_ms = 50
metabolism_interval_secs = 5
introspection_interval_secs = 60
goal_check_interval_secs = 20
idle_decay = 1.0
input_queue_capacity = 4
forecast = true

[goals]
resume_ceiling_secs = 120
history_limit = 5
max_label_len = 24

[facts]
min_len = 5
similarity_threshold = 0.9

[identity]
drift_threshold = 0.5
"#;
        let cfg: AnimaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.reasoner.model, "qwen2.5");
        assert_eq!(cfg.reasoner.timeout(), Duration::from_secs(15));
        assert_eq!(cfg.organism.data_dir, PathBuf::from("/var/lib/anima"));
        assert_eq!(cfg.organism.input_queue_capacity, 4);
        assert!(cfg.organism.forecast);
        assert_eq!(cfg.goals.history_limit, 5);
        assert_eq!(cfg.facts.similarity_threshold, 0.9);
        assert_eq!(cfg.identity.drift_threshold, 0.5);
        assert_eq!(cfg.identity.fragmentation_threshold, 0.3);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let toml_str = r#"
[organism]
tick_interval_ms = 250
legacy_option = "whatever"
"#;
        let cfg: AnimaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.organism.tick_interval_ms, 250);
    }

    #[test]
    fn test_zero_timeout_is_floored() {
        let cfg = ReasonerConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(cfg.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let cfg = AnimaConfig::load_or_default("/nonexistent/anima.toml");
        assert_eq!(cfg.goals.max_label_len, 30);
    }
}
