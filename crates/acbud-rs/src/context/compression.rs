//! Model-assisted context compression.
//!
//! Every follow-up turn rewrites the working transcript into a compact
//! `<prompt>`-delimited payload in a single model call. Only the extracted
//! payload is carried into the next generation call; the uncompressed text is
//! kept for diagnostics and never fed back into a prompt.

use serde::Serialize;
use tracing::{debug, warn};

use crate::api::invoker::{ModelInvoker, ModelRequest};
use crate::context::budget::TextSize;
use crate::error::{CompressionFormatError, ModelCallError};

/// Opening delimiter of a compressed payload.
pub const PROMPT_OPEN: &str = "<prompt>";
/// Markers wrapped around raw output that lacked [`PROMPT_OPEN`].
pub const FALLBACK_OPEN: &str = "<compression_fallback>";
pub const FALLBACK_CLOSE: &str = "</compression_fallback>";

/// Instructions prepended to the transcript for the compression call.
pub const COMPRESSION_PREAMBLE: &str = "\
<prompt> # Meta Prompt for Prompt Compression
You are a prompt compression specialist. Your task is to compress the input prompt using \
hierarchical structuring and dictionary reference techniques while preserving all functional \
requirements and essential instructions.
Compression Instructions
1. Apply Dictionary References:
    * Identify recurring concepts, formats, and instructions
    * Create abbreviations/codes with DEF: prefix (e.g., \"DEF: XYZ = detailed explanation here\")
    * Replace repetitive content with these references
2. Implement Hierarchical Structure:
    * Organize information into logical categories and subcategories
    * Use headers, subheaders, and indentation to show relationships
    * Group related concepts to reduce redundancy
3. Preserve Essential Elements:
    * Maintain all critical instructions that affect functionality
    * Keep all required data structures, tags, and formatting specifications
    * Ensure the compressed prompt produces identical outputs to the original
4. Optimize for Clarity:
    * Use concise language and remove unnecessary words
    * Convert paragraphs to bullet points where appropriate
    * Maintain readability for humans while compressing
Output Format
The compressed prompt should:
* Begin and end with <prompt> tags
* Include a brief heading identifying it as a compressed version
* Preserve all functional XML tags from the original prompt
* Organize information using # and ## markdown headers
* Present the compression with clear visual hierarchy
* Reduce length by approximately 40-60% while maintaining full functionality
Remember: The compressed prompt will be used directly with an AI system with no additional \
context or information, so it must be complete and self-contained. </prompt>";

/// Configuration for the compression call.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Model to use for compression. `None` uses the generation model.
    pub model: Option<String>,
    /// Maximum tokens for the compressed payload.
    pub max_tokens: u32,
    /// Sampling temperature for the compression call.
    pub temperature: f32,
    /// Transcripts shorter than this many characters skip the model call and
    /// are carried forward as-is. `0` compresses every turn.
    pub min_input_chars: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 2048,
            temperature: 0.0,
            min_input_chars: 0,
        }
    }
}

/// Before/after sizes of one compression pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CompressionStats {
    pub before: TextSize,
    pub after: TextSize,
}

impl CompressionStats {
    pub fn measure(before: &str, after: &str) -> Self {
        Self {
            before: TextSize::of(before),
            after: TextSize::of(after),
        }
    }

    /// Fraction of characters removed (negative when the output grew).
    pub fn reduction(&self) -> f64 {
        if self.before.chars == 0 {
            return 0.0;
        }
        1.0 - self.after.chars as f64 / self.before.chars as f64
    }

    pub fn to_log_string(&self) -> String {
        format!(
            "{} -> {} ({:.0}% reduction)",
            self.before.to_log_string(),
            self.after.to_log_string(),
            self.reduction() * 100.0
        )
    }
}

/// Result of one compression pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Compression {
    /// The context carried into the generation call.
    pub payload: String,
    pub stats: CompressionStats,
    /// The model output lacked [`PROMPT_OPEN`] and was wrapped in fallback
    /// markers.
    pub degraded: bool,
    /// The transcript was below the size gate and was not sent to the model.
    pub skipped: bool,
}

/// Extract the canonical payload from raw compression output.
///
/// Takes everything from the first [`PROMPT_OPEN`] to the end of the string,
/// trimmed. Text after the closing tag is kept.
///
/// ```
/// use acbud_rs::context::extract_compressed_payload;
///
/// let raw = "noise <prompt># H\nbody</prompt> trailer";
/// assert_eq!(
///     extract_compressed_payload(raw).unwrap(),
///     "<prompt># H\nbody</prompt> trailer"
/// );
/// assert!(extract_compressed_payload("no tags here").is_err());
/// ```
pub fn extract_compressed_payload(raw: &str) -> Result<&str, CompressionFormatError> {
    let start = raw.find(PROMPT_OPEN).ok_or(CompressionFormatError)?;
    let (_, payload) = raw.split_at(start);
    Ok(payload.trim())
}

/// Wrap malformed compression output so it stays recognizable downstream.
pub fn fallback_payload(raw: &str) -> String {
    format!("{FALLBACK_OPEN}\n{}\n{FALLBACK_CLOSE}", raw.trim())
}

/// Extract the payload, or fall back to wrapping the raw text.
///
/// Returns the payload and whether the fallback was used.
pub fn payload_or_fallback(raw: &str) -> (String, bool) {
    match extract_compressed_payload(raw) {
        Ok(payload) => (payload.to_string(), false),
        Err(_) => (fallback_payload(raw), true),
    }
}

/// Runs the compression stage against a [`ModelInvoker`].
#[derive(Debug, Clone, Copy)]
pub struct Compressor<'a> {
    config: &'a CompressionConfig,
    preamble: &'a str,
    system_role: &'a str,
}

impl<'a> Compressor<'a> {
    pub fn new(config: &'a CompressionConfig, preamble: &'a str, system_role: &'a str) -> Self {
        Self {
            config,
            preamble,
            system_role,
        }
    }

    /// Get the model to use for compression.
    pub fn compression_model<'b>(&'b self, main_model: &'b str) -> &'b str {
        self.config.model.as_deref().unwrap_or(main_model)
    }

    /// Whether `transcript` is large enough to be worth a model call.
    pub fn should_compress(&self, transcript: &str) -> bool {
        transcript.chars().count() >= self.config.min_input_chars
    }

    /// Build the compression request: preamble, newline, transcript.
    pub fn build_request(&self, transcript: &str, main_model: &str) -> ModelRequest {
        ModelRequest {
            model: self.compression_model(main_model).to_string(),
            system: self.system_role.to_string(),
            prompt: format!("{}\n{transcript}", self.preamble),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    /// Compress `transcript` into a payload for the next generation call.
    pub async fn compress(
        &self,
        invoker: &dyn ModelInvoker,
        transcript: &str,
        main_model: &str,
    ) -> Result<Compression, ModelCallError> {
        if !self.should_compress(transcript) {
            debug!(
                "Compression skipped: {} chars below gate of {}",
                transcript.chars().count(),
                self.config.min_input_chars
            );
            return Ok(Compression {
                payload: transcript.to_string(),
                stats: CompressionStats::measure(transcript, transcript),
                degraded: false,
                skipped: true,
            });
        }

        let request = self.build_request(transcript, main_model);
        let raw = invoker.invoke(&request).await?;
        let (payload, degraded) = payload_or_fallback(&raw);

        if degraded {
            warn!(
                "Compression output lacked {PROMPT_OPEN}; carrying {} chars forward in fallback markers",
                raw.len()
            );
        }

        let stats = CompressionStats::measure(transcript, &payload);
        debug!("Compression: {}", stats.to_log_string());

        Ok(Compression {
            payload,
            stats,
            degraded,
            skipped: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::scripted::ScriptedInvoker;

    #[test]
    fn extraction_runs_from_first_tag_to_end() {
        let raw = "noise <prompt># H\nbody</prompt> trailer";
        assert_eq!(
            extract_compressed_payload(raw).unwrap(),
            "<prompt># H\nbody</prompt> trailer"
        );
    }

    #[test]
    fn extraction_uses_first_occurrence() {
        let raw = "<prompt>a</prompt>\n<prompt>b</prompt>\n";
        assert_eq!(
            extract_compressed_payload(raw).unwrap(),
            "<prompt>a</prompt>\n<prompt>b</prompt>"
        );
    }

    #[test]
    fn extraction_without_delimiter_fails() {
        assert_eq!(
            extract_compressed_payload("# H\nbody</prompt>"),
            Err(CompressionFormatError)
        );
    }

    #[test]
    fn fallback_wraps_trimmed_raw_text() {
        let (payload, degraded) = payload_or_fallback("  plain summary \n");
        assert!(degraded);
        assert_eq!(
            payload,
            "<compression_fallback>\nplain summary\n</compression_fallback>"
        );
    }

    #[test]
    fn request_prepends_preamble() {
        let config = CompressionConfig::default();
        let compressor = Compressor::new(&config, "PREAMBLE", "role");
        let req = compressor.build_request("transcript", "main-model");
        assert_eq!(req.prompt, "PREAMBLE\ntranscript");
        assert_eq!(req.system, "role");
        assert_eq!(req.model, "main-model");
        assert_eq!(req.max_tokens, 2048);
    }

    #[test]
    fn compression_model_override() {
        let config = CompressionConfig {
            model: Some("cheap-model".into()),
            ..Default::default()
        };
        let compressor = Compressor::new(&config, COMPRESSION_PREAMBLE, "role");
        assert_eq!(compressor.compression_model("main"), "cheap-model");
    }

    #[test]
    fn stats_report_reduction() {
        let stats = CompressionStats::measure(&"a ".repeat(50), &"a ".repeat(20));
        assert!((stats.reduction() - 0.6).abs() < 1e-9);
        assert!(stats.to_log_string().contains("60% reduction"));
    }

    #[tokio::test]
    async fn compress_extracts_payload() {
        let invoker = ScriptedInvoker::new().with_reply("Sure! <prompt># Compressed\nctx</prompt>");
        let config = CompressionConfig::default();
        let compressor = Compressor::new(&config, COMPRESSION_PREAMBLE, "role");

        let result = compressor
            .compress(&invoker, "long transcript", "m")
            .await
            .unwrap();
        assert_eq!(result.payload, "<prompt># Compressed\nctx</prompt>");
        assert!(!result.degraded);
        assert!(!result.skipped);

        let sent = invoker.requests();
        assert!(sent[0].prompt.starts_with(COMPRESSION_PREAMBLE));
        assert!(sent[0].prompt.ends_with("\nlong transcript"));
    }

    #[tokio::test]
    async fn compress_degrades_without_delimiter() {
        let invoker = ScriptedInvoker::new().with_reply("just a summary");
        let config = CompressionConfig::default();
        let compressor = Compressor::new(&config, COMPRESSION_PREAMBLE, "role");

        let result = compressor.compress(&invoker, "t", "m").await.unwrap();
        assert!(result.degraded);
        assert!(result.payload.starts_with(FALLBACK_OPEN));
    }

    #[tokio::test]
    async fn short_transcript_skips_model_call() {
        let invoker = ScriptedInvoker::new();
        let config = CompressionConfig {
            min_input_chars: 1000,
            ..Default::default()
        };
        let compressor = Compressor::new(&config, COMPRESSION_PREAMBLE, "role");

        let result = compressor.compress(&invoker, "short", "m").await.unwrap();
        assert!(result.skipped);
        assert_eq!(result.payload, "short");
        assert_eq!(invoker.call_count(), 0);
    }

    #[tokio::test]
    async fn compress_propagates_model_errors() {
        let invoker = ScriptedInvoker::new().with_error(ModelCallError::Empty);
        let config = CompressionConfig::default();
        let compressor = Compressor::new(&config, COMPRESSION_PREAMBLE, "role");

        let err = compressor.compress(&invoker, "t", "m").await.unwrap_err();
        assert_eq!(err, ModelCallError::Empty);
    }
}
