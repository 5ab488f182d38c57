// Conversational résumé editing: line-addressed patches, clarifying questions,
// multi-step plans. One turn per request; the caller owns the session.
// All LLM calls go through llm_client::TextGenerator.

pub mod addressing;
pub mod agents;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod reviewer;
pub mod rules;
pub mod sections;
pub mod streaming;
pub mod validator;

// Re-export the public API consumed by routes and state.
pub use orchestrator::EditOrchestrator;
