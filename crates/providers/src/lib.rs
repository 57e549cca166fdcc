//! Model endpoint adapters for toolweave.
//!
//! All providers implement the `toolweave_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod openai_compat;
pub mod reasoning;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use reasoning::ReasoningFilter;
pub use router::{ProviderRouter, build_from_config};
