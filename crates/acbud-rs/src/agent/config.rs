//! Configuration for the [`TurnController`](super::controller::TurnController).
//!
//! Transport settings (endpoint, timeout, retries) live on
//! [`ClientOptions`](crate::ClientOptions); everything that shapes the
//! conversation itself lives here.
//!
//! ```
//! use acbud_rs::agent::config::BuddyConfig;
//!
//! let config = BuddyConfig::new("anthropic/claude-3-haiku")
//!     .with_max_tokens(400)
//!     .with_temperature(0.2)
//!     .with_min_compression_chars(2_000);
//!
//! assert_eq!(config.compression.min_input_chars, 2_000);
//! ```

use crate::DEFAULT_MODEL;
use crate::agent::template::TemplateSet;
use crate::api::invoker::ModelRequest;
use crate::context::compression::{CompressionConfig, Compressor};

/// Default token limit for generated replies.
pub const DEFAULT_MAX_TOKENS: u32 = 300;

/// Conversation-level settings.
#[derive(Debug, Clone)]
pub struct BuddyConfig {
    /// Model identifier for seed and generation calls.
    pub model: String,
    /// Maximum tokens per generated reply.
    pub max_tokens: u32,
    pub temperature: f32,
    /// Seed template, compression preamble and system role.
    pub templates: TemplateSet,
    pub compression: CompressionConfig,
}

impl Default for BuddyConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

impl BuddyConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.0,
            templates: TemplateSet::default(),
            compression: CompressionConfig::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_templates(mut self, templates: TemplateSet) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    /// Skip the compression call for working transcripts shorter than
    /// `chars` characters. `0` compresses every turn.
    pub fn with_min_compression_chars(mut self, chars: usize) -> Self {
        self.compression.min_input_chars = chars;
        self
    }

    /// Use a separate model for the compression pass.
    pub fn with_compression_model(mut self, model: impl Into<String>) -> Self {
        self.compression.model = Some(model.into());
        self
    }

    /// Request for a seed or generation call.
    pub fn generation_request(&self, prompt: impl Into<String>) -> ModelRequest {
        ModelRequest {
            model: self.model.clone(),
            system: self.templates.system_role().to_string(),
            prompt: prompt.into(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Compressor bound to this config's preamble and system role.
    pub fn compressor(&self) -> Compressor<'_> {
        Compressor::new(
            &self.compression,
            self.templates.compression_preamble(),
            self.templates.system_role(),
        )
    }
}
