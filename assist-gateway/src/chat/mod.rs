pub mod history;

pub use history::{
    ChatContentBlock, ChatMessage, ChatRole, ToolResultData, build_history_messages,
    build_tool_result_message, tool_results_to_blocks,
};
