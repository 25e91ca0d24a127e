//! Completion service clients for hassAI.
//!
//! All providers implement the `hassai_core::Provider` trait. The only
//! backend today is OpenRouter's OpenAI-compatible chat completions API.

pub mod openrouter;

pub use openrouter::OpenRouterProvider;
