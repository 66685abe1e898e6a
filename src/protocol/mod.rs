//! Wire formats
//!
//! The audio channel carries bare PCM bytes with no framing at all, so the
//! only format defined here is the text channel's.

pub mod text;

pub use text::{encode_text, TextDecoder, TextFraming};
