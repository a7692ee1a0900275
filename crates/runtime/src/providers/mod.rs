//! Model endpoint backends.

mod anthropic;

pub use anthropic::{AnthropicBackend, AnthropicBackendBuilder};
