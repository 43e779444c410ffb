pub mod chat_history;
pub mod context;
pub mod knowledge_search;
pub mod manager;
pub mod python;
pub mod speech;

pub use context::ToolContext;
pub use manager::ToolManager;

use serde_json::Value;

/// Trait that all tools must implement
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Name of the tool (must match regex `^[a-zA-Z0-9_-]{1,64}$`)
    fn name(&self) -> &str;

    /// Description of what the tool does
    fn description(&self) -> &str;

    /// Extra guidance appended to the system prompt when the tool is registered
    fn prompt(&self) -> Option<&'static str> {
        None
    }

    /// JSON Schema for the tool's input
    fn input_schema(&self) -> Value;

    /// Execute the tool with the given arguments
    async fn execute(&self, args: Value, context: &mut ToolContext) -> Result<String, String>;
}
