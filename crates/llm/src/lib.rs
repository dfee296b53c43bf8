pub mod json;
pub mod provider;
pub mod providers;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use json::extract_json;
pub use provider::{complete_within, LlmError, LlmProvider, Message, Role};
pub use providers::create_provider;
