use serde::Deserialize;

use crate::models::Threshold;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// PostgreSQL connection URL; the in-memory store is used when unset
    #[serde(default)]
    pub database_url: Option<String>,

    /// Redis connection URL; corpus caching is disabled when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Seconds a cached corpus snapshot stays valid
    #[serde(default = "default_corpus_cache_ttl")]
    pub corpus_cache_ttl: u64,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Threshold used when a request does not supply one
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,

    /// Attempts made by the inventory coordinator when a save hits a stale revision
    #[serde(default = "default_mutation_retries")]
    pub mutation_retries: u32,

    /// Seed the sample recipes into an empty corpus
    #[serde(default = "default_seed_sample_recipes")]
    pub seed_sample_recipes: bool,
}

fn default_corpus_cache_ttl() -> u64 {
    300
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_threshold() -> f64 {
    0.5
}

fn default_mutation_retries() -> u32 {
    3
}

fn default_seed_sample_recipes() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            corpus_cache_ttl: default_corpus_cache_ttl(),
            host: default_host(),
            port: default_port(),
            default_threshold: default_threshold(),
            mutation_retries: default_mutation_retries(),
            seed_sample_recipes: default_seed_sample_recipes(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.threshold()?;
        Ok(config)
    }

    /// The configured default threshold, validated
    pub fn threshold(&self) -> anyhow::Result<Threshold> {
        Threshold::new(self.default_threshold)
            .map_err(|e| anyhow::anyhow!("DEFAULT_THRESHOLD: {}", e))
    }

    /// Socket address the server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
