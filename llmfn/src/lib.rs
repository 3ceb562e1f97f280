//! Typed LLM-backed functions.
//!
//! A function is declared by signature and docstring only; each call is
//! satisfied by a model completion that is decoded back into the declared
//! return type. The crate keeps a strict separation:
//!
//! - **[`core`]**: pure logic (type descriptors, schema derivation, prompt
//!   construction, decoding, retry state).
//! - **[`io`]**: providers, configuration, declaration files and attempt logs.
//!
//! [`invoker`] and [`pipeline`] connect the two into the call loop; [`setup`]
//! builds them from configuration.
//!
//! ```no_run
//! use llmfn::core::function::FunctionSpec;
//! use llmfn::invoker::{Invoker, InvokerConfig};
//! use llmfn::io::openai::{OpenAiConfig, OpenAiProvider, DEFAULT_BASE_URL};
//! use llmfn::pipeline::{CallPipeline, PipelineConfig};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let spec = FunctionSpec::builder("guess_letter")
//!     .doc("Check if the letter is in the word.")
//!     .param::<String>("word")
//!     .param::<String>("letter")
//!     .returns::<bool>()
//!     .build()?;
//! let provider = OpenAiProvider::new(OpenAiConfig {
//!     base_url: DEFAULT_BASE_URL.to_string(),
//!     api_key: std::env::var("OPENAI_API_KEY")?,
//! })?;
//! let pipeline = CallPipeline::new(
//!     spec,
//!     Invoker::new(provider, InvokerConfig::default()),
//!     PipelineConfig::default(),
//! )?;
//! let hit: bool = pipeline.call(&[json!("xertz"), json!("t")])?;
//! assert!(hit);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod errors;
pub mod exit_codes;
pub mod invoker;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod setup;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
