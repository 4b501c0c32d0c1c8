//! Translation between the assistant dialect (Anthropic Messages) and the
//! provider dialect (`OpenAI` Chat Completions).
//!
//! The core of the relay: converts requests, buffered responses, and streaming
//! events between the two shapes. All translation functions are pure (no I/O).

pub mod assistant_types;
pub mod provider_types;
pub mod request;
pub mod response;
pub mod streaming;
