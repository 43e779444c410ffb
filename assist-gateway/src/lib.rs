//! assist-gateway: the agent, its tools and the playground HTTP server.

pub mod agent;
pub mod chat;
pub mod prompt;
pub mod providers;
pub mod server;
pub mod speech;
pub mod state;
pub mod tools;

pub use agent::{Agent, AgentError, AgentInfo, RunRequest, RunResponse};
pub use state::AppState;
