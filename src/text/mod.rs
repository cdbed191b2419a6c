//! Text shaping between the browser and the webhook: normalization with an
//! explicit truncation marker, then chunking into transport-sized pieces.

pub mod chunker;
pub mod normalize;

pub use chunker::chunk;
pub use normalize::{normalize, NormalizedText, MIN_TEXT_LENGTH, TRUNCATION_MARKER};

/// Stand-in text for a page (or chunk list) with nothing in it.
pub const NO_CONTENT: &str = "[no content]";
