//! AI-assisted config generation.
//!
//! Turns a free-form architecture or project description into the YAML
//! configs the rest of cloudplan consumes:
//! - `llm` - the `LlmClient` capability and an HTTP client for
//!   Anthropic, OpenAI and Ollama
//! - `prompts` - prompt text with the expected YAML shape embedded
//! - `generator` - `ConfigGenerator`, which calls the model once per config and
//!   validates the reply with the same parsers used for hand-written files
//!
//! # Safety Principle
//!
//! The LLM is strictly a translator. It never prices anything: generated
//! inventories are estimated by the deterministic pricing core like any other
//! input.

pub mod generator;
pub mod llm;
pub mod prompts;

pub use generator::{
    extract_yaml, ConfigGenerator, ConfigKind, Generated, GeneratedBundle, GenerationError,
};
pub use llm::{HttpLlmClient, LlmClient};
