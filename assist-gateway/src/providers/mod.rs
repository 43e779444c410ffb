pub mod gemini;
pub mod provider;

pub use provider::{
    Provider, ProviderContentBlock, ProviderError, ProviderResponse, ProviderUsage,
    extract_all_text, extract_tool_uses, has_tool_uses,
};
