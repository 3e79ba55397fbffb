//! Context window management: compression and size estimates.
//!
//! The context handed to the model is the scarcest resource of a long
//! journey. This module keeps it bounded:
//!
//! 1. **[`compression`]**: the model-assisted compression stage. Rewrites the
//!    working transcript into a compact, structurally-equivalent `<prompt>`
//!    payload and extracts that payload from the raw model output.
//!
//! 2. **[`budget`]**: character, word and token estimates used to report how
//!    much each compression pass saved and to gate compression of short
//!    transcripts.
//!
//! Both run inside the [`TurnController`](crate::agent::controller::TurnController)
//! on every follow-up turn.

pub mod budget;
pub mod compression;

pub use budget::{DEFAULT_CHARS_PER_TOKEN, TextSize, estimate_tokens, word_count};
pub use compression::{
    Compression, CompressionConfig, CompressionStats, Compressor, extract_compressed_payload,
};
