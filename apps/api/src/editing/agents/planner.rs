//! Planner: decides whether a turn asks, edits, or chats.
//!
//! Unlike the handlers, a planner that cannot produce a usable decision fails
//! the whole turn: without a decision there is nothing sensible to degrade to.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::editing::agents::{request_structured, AgentContext, CallOutcome, TurnIo};
use crate::editing::prompts::{fill, PLANNER_SCHEMA, PLANNER_SYSTEM};
use crate::errors::AppError;
use crate::llm_client::{ResponseFormat, TextGenerator};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannerDecision {
    pub needs_questions: bool,
    #[serde(default)]
    pub questions: Vec<String>,
    pub changes_needed: bool,
    #[serde(default)]
    pub reasoning: String,
    /// Proposed task titles for a multi-step request.
    #[serde(default)]
    pub plan: Vec<String>,
}

pub struct Planner {
    llm: Arc<dyn TextGenerator>,
    max_attempts: u32,
}

impl Planner {
    pub fn new(llm: Arc<dyn TextGenerator>, max_attempts: u32) -> Self {
        Self { llm, max_attempts }
    }

    /// Returns `Ok(None)` when the turn was cancelled mid-call.
    pub async fn decide(
        &self,
        ctx: &AgentContext<'_>,
        io: &mut TurnIo<'_>,
    ) -> Result<Option<PlannerDecision>, AppError> {
        let system = fill(PLANNER_SYSTEM, &[("context", ctx.context_block().as_str())]);

        let outcome = request_structured(
            "planner",
            self.llm.as_ref(),
            &system,
            ctx.user_message,
            ResponseFormat::Json {
                schema: PLANNER_SCHEMA,
            },
            self.max_attempts,
            io,
            false,
            |d: &PlannerDecision| {
                if d.needs_questions && d.changes_needed && d.reasoning.trim().is_empty() {
                    return Err("decision asks and edits at once without reasoning".to_string());
                }
                Ok(())
            },
        )
        .await;

        match outcome {
            CallOutcome::Done(decision) => {
                info!(
                    "Planner decided: needs_questions={}, changes_needed={}, plan_steps={}",
                    decision.needs_questions,
                    decision.changes_needed,
                    decision.plan.len()
                );
                Ok(Some(decision))
            }
            CallOutcome::Cancelled => Ok(None),
            CallOutcome::Failed(reason) => Err(AppError::Llm(reason)),
        }
    }
}
