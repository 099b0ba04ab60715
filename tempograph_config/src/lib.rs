//! # Tempograph Config
//!
//! TOML-based configuration for the Tempograph engine.
//!
//! # Configuration Schema
//!
//! The configuration file (`tempograph.toml`) supports the following
//! sections:
//! - `[resolver]` — entity resolution threshold
//! - `[community]` — Leiden parameters and the build threshold
//! - `[ranking]` — hybrid ranking weights, BM25 parameters, hop decay
//! - `[search]` — result count defaults and context window
//! - `[provider]` — language-model and embedding provider settings
//! - `[retry]` — bounded retry for transient provider failures
//!
//! # Environment Variable Overrides
//!
//! Fields can be overridden via environment variables using the
//! `TEMPOGRAPH_` prefix and `_` as section separator, e.g.
//! `TEMPOGRAPH_RESOLVER_SIMILARITY_THRESHOLD` → `resolver.similarity_threshold`,
//! `TEMPOGRAPH_PROVIDER_CHAT_MODEL` → `provider.chat_model`.

use serde::{Deserialize, Serialize};
use tempograph_core::{CommunityParams, QualityFunctionType, RankWeights, ResolverConfig};

/// Top-level Tempograph configuration.
///
/// Parsed from `tempograph.toml` or constructed programmatically.
/// Environment variables with the `TEMPOGRAPH_` prefix override TOML values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TempographConfig {
    #[serde(default)]
    pub resolver: ResolverSection,
    #[serde(default)]
    pub community: CommunitySection,
    #[serde(default)]
    pub ranking: RankingSection,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub retry: RetrySection,
}

/// Entity resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSection {
    /// Minimum cosine similarity for a fuzzy match proposal (default: 0.85).
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_similarity_threshold() -> f32 {
    0.85
}

/// Community detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunitySection {
    /// Quality function: "cpm" (default) or "modularity".
    #[serde(default = "default_quality_function")]
    pub quality_function: String,
    /// Leiden resolution parameter (default: 0.25).
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    /// Leiden theta parameter (default: 0.3).
    #[serde(default = "default_theta")]
    pub theta: f64,
    /// Leiden gamma parameter (default: 0.05).
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    /// Minimum entities a partition needs before a build runs (default: 20).
    #[serde(default = "default_min_entity_count")]
    pub min_entity_count: usize,
}

impl Default for CommunitySection {
    fn default() -> Self {
        Self {
            quality_function: default_quality_function(),
            resolution: default_resolution(),
            theta: default_theta(),
            gamma: default_gamma(),
            min_entity_count: default_min_entity_count(),
        }
    }
}

fn default_quality_function() -> String {
    "cpm".to_string()
}
fn default_resolution() -> f64 {
    0.25
}
fn default_theta() -> f64 {
    0.3
}
fn default_gamma() -> f64 {
    0.05
}
fn default_min_entity_count() -> usize {
    20
}

/// Hybrid ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingSection {
    /// Weight of the semantic component (default: 0.5).
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,
    /// Weight of the lexical component (default: 0.3).
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f32,
    /// Weight of the graph proximity component (default: 0.2).
    #[serde(default = "default_graph_weight")]
    pub graph_weight: f32,
    /// BM25 k1 (default: 1.2).
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f32,
    /// BM25 b (default: 0.75).
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f32,
    /// Per-hop proximity decay (default: 0.5).
    #[serde(default = "default_hop_decay")]
    pub hop_decay: f32,
    /// Maximum hops from anchor entities (default: 2).
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
}

impl Default for RankingSection {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            lexical_weight: default_lexical_weight(),
            graph_weight: default_graph_weight(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
            hop_decay: default_hop_decay(),
            max_hops: default_max_hops(),
        }
    }
}

fn default_semantic_weight() -> f32 {
    0.5
}
fn default_lexical_weight() -> f32 {
    0.3
}
fn default_graph_weight() -> f32 {
    0.2
}
fn default_bm25_k1() -> f32 {
    1.2
}
fn default_bm25_b() -> f32 {
    0.75
}
fn default_hop_decay() -> f32 {
    0.5
}
fn default_max_hops() -> usize {
    2
}

/// Search behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSection {
    /// Default number of results (default: 10).
    #[serde(default = "default_num_results")]
    pub default_num_results: usize,
    /// Recent episodes included in extraction context (default: 5).
    #[serde(default = "default_context_episodes")]
    pub context_episodes: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            default_num_results: default_num_results(),
            context_episodes: default_context_episodes(),
        }
    }
}

fn default_num_results() -> usize {
    10
}
fn default_context_episodes() -> usize {
    5
}

/// Provider settings. The API key is read from the named environment
/// variable at runtime, never stored in config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSection {
    /// Base URL for an OpenAI-compatible API; empty uses the default.
    #[serde(default)]
    pub api_base_url: String,
    /// Name of the environment variable holding the API key
    /// (default: "OPENAI_API_KEY").
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Chat model used for extraction, equivalence, and enhancement
    /// (default: "gpt-4o-mini").
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Embedding model (default: "text-embedding-3-small").
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            api_key_env: default_api_key_env(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

/// Retry settings for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    /// Additional attempts after the first (default: 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff in milliseconds (default: 250).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}
fn default_base_delay_ms() -> u64 {
    250
}

impl TempographConfig {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        Self::parse_toml(&contents)
    }

    /// Parse configuration from a TOML string, apply env overrides, then
    /// validate.
    pub fn parse_toml(toml_str: &str) -> anyhow::Result<Self> {
        let mut config: TempographConfig = toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TEMPOGRAPH_RESOLVER_SIMILARITY_THRESHOLD") {
            if let Ok(parsed) = v.parse() {
                self.resolver.similarity_threshold = parsed;
            }
        }
        if let Ok(v) = std::env::var("TEMPOGRAPH_COMMUNITY_QUALITY_FUNCTION") {
            self.community.quality_function = v;
        }
        if let Ok(v) = std::env::var("TEMPOGRAPH_COMMUNITY_RESOLUTION") {
            if let Ok(parsed) = v.parse() {
                self.community.resolution = parsed;
            }
        }
        if let Ok(v) = std::env::var("TEMPOGRAPH_COMMUNITY_MIN_ENTITY_COUNT") {
            if let Ok(parsed) = v.parse() {
                self.community.min_entity_count = parsed;
            }
        }
        if let Ok(v) = std::env::var("TEMPOGRAPH_RANKING_SEMANTIC_WEIGHT") {
            if let Ok(parsed) = v.parse() {
                self.ranking.semantic_weight = parsed;
            }
        }
        if let Ok(v) = std::env::var("TEMPOGRAPH_RANKING_LEXICAL_WEIGHT") {
            if let Ok(parsed) = v.parse() {
                self.ranking.lexical_weight = parsed;
            }
        }
        if let Ok(v) = std::env::var("TEMPOGRAPH_RANKING_GRAPH_WEIGHT") {
            if let Ok(parsed) = v.parse() {
                self.ranking.graph_weight = parsed;
            }
        }
        if let Ok(v) = std::env::var("TEMPOGRAPH_SEARCH_DEFAULT_NUM_RESULTS") {
            if let Ok(parsed) = v.parse() {
                self.search.default_num_results = parsed;
            }
        }
        if let Ok(v) = std::env::var("TEMPOGRAPH_PROVIDER_API_BASE_URL") {
            self.provider.api_base_url = v;
        }
        if let Ok(v) = std::env::var("TEMPOGRAPH_PROVIDER_CHAT_MODEL") {
            self.provider.chat_model = v;
        }
        if let Ok(v) = std::env::var("TEMPOGRAPH_PROVIDER_EMBEDDING_MODEL") {
            self.provider.embedding_model = v;
        }
        if let Ok(v) = std::env::var("TEMPOGRAPH_RETRY_MAX_RETRIES") {
            if let Ok(parsed) = v.parse() {
                self.retry.max_retries = parsed;
            }
        }
        if let Ok(v) = std::env::var("TEMPOGRAPH_RETRY_BASE_DELAY_MS") {
            if let Ok(parsed) = v.parse() {
                self.retry.base_delay_ms = parsed;
            }
        }
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.resolver.similarity_threshold) {
            anyhow::bail!(
                "resolver.similarity_threshold must be in [0, 1], got {}",
                self.resolver.similarity_threshold
            );
        }
        if !matches!(self.community.quality_function.as_str(), "cpm" | "modularity") {
            anyhow::bail!(
                "community.quality_function must be \"cpm\" or \"modularity\", got \"{}\"",
                self.community.quality_function
            );
        }
        if self.community.min_entity_count == 0 {
            anyhow::bail!("community.min_entity_count must be at least 1");
        }
        for (name, w) in [
            ("semantic_weight", self.ranking.semantic_weight),
            ("lexical_weight", self.ranking.lexical_weight),
            ("graph_weight", self.ranking.graph_weight),
        ] {
            if w < 0.0 {
                anyhow::bail!("ranking.{} must be non-negative, got {}", name, w);
            }
        }
        if self.search.default_num_results == 0 {
            anyhow::bail!("search.default_num_results must be at least 1");
        }
        Ok(())
    }

    /// Resolution tunables in core form.
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            similarity_threshold: self.resolver.similarity_threshold,
        }
    }

    /// Community parameters in core form.
    pub fn community_params(&self) -> CommunityParams {
        CommunityParams {
            quality_function: if self.community.quality_function == "modularity" {
                QualityFunctionType::Modularity
            } else {
                QualityFunctionType::CPM
            },
            resolution: self.community.resolution,
            theta: self.community.theta,
            gamma: self.community.gamma,
            weighted: true,
            min_entity_count: self.community.min_entity_count,
        }
    }

    /// Ranking weights in core form.
    pub fn rank_weights(&self) -> RankWeights {
        RankWeights {
            semantic: self.ranking.semantic_weight,
            lexical: self.ranking.lexical_weight,
            graph: self.ranking.graph_weight,
            bm25_k1: self.ranking.bm25_k1,
            bm25_b: self.ranking.bm25_b,
            hop_decay: self.ranking.hop_decay,
            max_hops: self.ranking.max_hops,
        }
    }
}
