//! Pipeline configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! strategy = "chunked"          # or "assisted"
//! model = "chatgpt-4o-latest"
//!
//! [llm]
//! temperature = 0.7
//! max_tokens = 1000
//! json_mode = true
//!
//! [chunking]
//! max_chunk_length = 50000
//! cards_per_chunk = 4
//! max_chunks = 5
//! max_flashcards = 10
//!
//! [assistant]
//! name = "Flashcard Generator"
//! poll_interval_ms = 1000
//! indexing_attempts = 30
//! generation_attempts = 60
//! cleanup_remote = true
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::backend::AssistantSpec;
use crate::error::Result;
use crate::poll::PollConfig;
use crate::segment::DEFAULT_MAX_CHUNK_LENGTH;
use crate::PipelineError;

/// Which generation strategy the pipeline runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// One stateless completion per chunk.
    #[default]
    Chunked,
    /// One assistant job over the whole indexed file.
    Assisted,
}

/// Configuration for completion requests.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f64,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Request JSON object output from the model.
    pub json_mode: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1000,
            json_mode: true,
        }
    }
}

impl LlmConfig {
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }
}

/// Segmentation and cap settings for the chunked strategy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub max_chunk_length: usize,
    /// Flashcards requested per chunk.
    pub cards_per_chunk: usize,
    /// Chunks processed per document; the rest are counted but skipped.
    pub max_chunks: usize,
    /// Flashcards returned per document; later cards are dropped.
    pub max_flashcards: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_length: DEFAULT_MAX_CHUNK_LENGTH,
            cards_per_chunk: 4,
            max_chunks: 5,
            max_flashcards: 10,
        }
    }
}

const DEFAULT_INSTRUCTIONS: &str = "You are a flashcard generator. Read the attached document \
and respond ONLY with JSON of the form {\"flashcards\": [{\"question\": \"...\", \"answer\": \"...\"}]}. \
Do not include any prose, markdown, or commentary outside the JSON.";

/// Settings for the assisted strategy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Assistant name; also the lookup key for reuse.
    pub name: String,
    pub instructions: String,
    /// Model for the assistant. Falls back to the top-level model when unset.
    pub model: Option<String>,
    /// Ask the assistant for a JSON object response format.
    pub json_mode: bool,
    pub poll_interval_ms: u64,
    pub indexing_attempts: u32,
    pub generation_attempts: u32,
    /// Delete the uploaded file and vector store after the run.
    pub cleanup_remote: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "Flashcard Generator".to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            model: None,
            json_mode: false,
            poll_interval_ms: 1000,
            indexing_attempts: PollConfig::indexing().max_attempts,
            generation_attempts: PollConfig::generation().max_attempts,
            cleanup_remote: true,
        }
    }
}

impl AssistantConfig {
    pub fn indexing_poll(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.indexing_attempts,
        }
    }

    pub fn generation_poll(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.generation_attempts,
        }
    }

    /// The remote assistant's configuration, with `default_model` as fallback.
    pub fn spec(&self, default_model: &str) -> AssistantSpec {
        AssistantSpec {
            name: self.name.clone(),
            model: self.model.clone().unwrap_or_else(|| default_model.to_string()),
            instructions: self.instructions.clone(),
            json_mode: self.json_mode,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub strategy: StrategyKind,
    pub model: String,
    pub llm: LlmConfig,
    pub chunking: ChunkingConfig,
    pub assistant: AssistantConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            model: "chatgpt-4o-latest".to_string(),
            llm: LlmConfig::default(),
            chunking: ChunkingConfig::default(),
            assistant: AssistantConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| PipelineError::InvalidConfig(format!("invalid TOML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document and validate it.
    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| PipelineError::InvalidConfig(format!("invalid YAML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject settings that would make every run a no-op or spin forever.
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.max_chunk_length == 0 {
            return Err(PipelineError::InvalidConfig(
                "chunking.max_chunk_length must be positive".into(),
            ));
        }
        if c.cards_per_chunk == 0 || c.max_chunks == 0 || c.max_flashcards == 0 {
            return Err(PipelineError::InvalidConfig(
                "chunking caps must be positive".into(),
            ));
        }
        if self.assistant.indexing_attempts == 0 || self.assistant.generation_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "assistant polling attempts must be positive".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("model must not be empty".into()));
        }
        Ok(())
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_llm(mut self, llm: LlmConfig) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_assistant(mut self, assistant: AssistantConfig) -> Self {
        self.assistant = assistant;
        self
    }
}
