use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_safety_threshold")]
    pub safety_threshold: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash-exp".to_string(),
            temperature: 0.9,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 300,
            safety_threshold: "BLOCK_NONE".to_string(),
            max_attempts: 3,
            backoff_base_secs: 1,
            timeout_secs: 60,
        }
    }
}

fn default_generation_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}
fn default_temperature() -> f64 {
    0.9
}
fn default_top_p() -> f64 {
    0.95
}
fn default_top_k() -> u32 {
    40
}
fn default_max_output_tokens() -> u32 {
    300
}
fn default_safety_threshold() -> String {
    "BLOCK_NONE".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_secs() -> u64 {
    1
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-004".to_string(),
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_documents")]
    pub documents: Vec<PathBuf>,
    #[serde(default = "default_top_k_passages")]
    pub top_k: usize,
    #[serde(default = "default_chunk_tokens")]
    pub chunk_tokens: usize,
    #[serde(default = "default_passage_chars")]
    pub passage_chars: usize,
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/knowledge.sqlite"),
            documents: default_documents(),
            top_k: 3,
            chunk_tokens: 200,
            passage_chars: 500,
            context_chars: 1000,
            max_sources: 2,
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/knowledge.sqlite")
}
fn default_documents() -> Vec<PathBuf> {
    vec![
        PathBuf::from("docs/psikoloji_sozlugu.pdf"),
        PathBuf::from("docs/mindfulness_egzersizleri.pdf"),
        PathBuf::from("docs/bdt_kilavuzu.pdf"),
    ]
}
fn default_top_k_passages() -> usize {
    3
}
fn default_chunk_tokens() -> usize {
    200
}
fn default_passage_chars() -> usize {
    500
}
fn default_context_chars() -> usize {
    1000
}
fn default_max_sources() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_retained_turns")]
    pub retained_turns: usize,
    #[serde(default = "default_replayed_turns")]
    pub replayed_turns: usize,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retained_turns: 6,
            replayed_turns: 4,
            max_sessions: 1000,
        }
    }
}

fn default_retained_turns() -> usize {
    6
}
fn default_replayed_turns() -> usize {
    4
}
fn default_max_sessions() -> usize {
    1000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    Ok(config)
}

/// Every setting has a default, so a missing config file is not an error.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    load_config(path)
}

fn validate(config: &Config) -> Result<()> {
    if config.generation.max_attempts == 0 {
        anyhow::bail!("generation.max_attempts must be >= 1");
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
    }

    if !(0.0..=1.0).contains(&config.generation.top_p) {
        anyhow::bail!("generation.top_p must be in [0.0, 1.0]");
    }

    match config.generation.safety_threshold.as_str() {
        "BLOCK_NONE" | "BLOCK_ONLY_HIGH" | "BLOCK_MEDIUM_AND_ABOVE" | "BLOCK_LOW_AND_ABOVE" => {}
        other => anyhow::bail!(
            "Unknown safety threshold: '{}'. Must be BLOCK_NONE, BLOCK_ONLY_HIGH, \
             BLOCK_MEDIUM_AND_ABOVE, or BLOCK_LOW_AND_ABOVE.",
            other
        ),
    }

    if config.knowledge.top_k == 0 {
        anyhow::bail!("knowledge.top_k must be >= 1");
    }

    if config.knowledge.chunk_tokens == 0 {
        anyhow::bail!("knowledge.chunk_tokens must be > 0");
    }

    if config.history.retained_turns == 0 {
        anyhow::bail!("history.retained_turns must be >= 1");
    }

    if config.history.replayed_turns == 0 {
        anyhow::bail!("history.replayed_turns must be >= 1");
    }

    if config.history.replayed_turns > config.history.retained_turns {
        anyhow::bail!("history.replayed_turns must not exceed history.retained_turns");
    }

    if config.history.max_sessions == 0 {
        anyhow::bail!("history.max_sessions must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:5000");
        assert_eq!(config.generation.model, "gemini-2.0-flash-exp");
        assert_eq!(config.generation.max_attempts, 3);
        assert_eq!(config.generation.backoff_base_secs, 1);
        assert_eq!(config.history.retained_turns, 6);
        assert_eq!(config.history.replayed_turns, 4);
        assert_eq!(config.history.max_sessions, 1000);
        assert_eq!(config.knowledge.top_k, 3);
        assert_eq!(config.knowledge.documents.len(), 3);
    }

    #[test]
    fn test_partial_override() {
        let config: Config = toml::from_str(
            r#"
[generation]
temperature = 0.2

[history]
retained_turns = 10
"#,
        )
        .unwrap();
        assert_eq!(config.generation.temperature, 0.2);
        assert_eq!(config.generation.top_k, 40);
        assert_eq!(config.history.retained_turns, 10);
        assert_eq!(config.history.replayed_turns, 4);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let config: Config = toml::from_str("[generation]\nmax_attempts = 0").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_unknown_safety_threshold() {
        let config: Config =
            toml::from_str("[generation]\nsafety_threshold = \"BLOCK_EVERYTHING\"").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_window_wider_than_cap() {
        let config: Config =
            toml::from_str("[history]\nretained_turns = 4\nreplayed_turns = 6").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_session_cap() {
        let config: Config = toml::from_str("[history]\nmax_sessions = 0").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_or_default(Path::new("/nonexistent/ayla.toml")).unwrap();
        assert_eq!(config.generation.max_attempts, 3);
    }
}
