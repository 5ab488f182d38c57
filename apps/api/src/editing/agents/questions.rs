//! Question generator: turns the planner's doubts into clickable questions.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::editing::agents::{
    request_structured, AgentContext, AgentReply, CallOutcome, Handler, HandlerOutput, TurnIo,
};
use crate::editing::models::EditQuestion;
use crate::editing::prompts::{fill, QUESTION_SCHEMA, QUESTION_SYSTEM};
use crate::llm_client::prompts::GROUNDING_INSTRUCTION;
use crate::llm_client::{ResponseFormat, TextGenerator};

const DEGRADED_MESSAGE: &str =
    "I need a bit more detail to make this edit, but I couldn't prepare my questions. \
    Could you describe what you'd like changed in a little more detail?";

pub struct QuestionGenerator {
    llm: Arc<dyn TextGenerator>,
    max_attempts: u32,
}

impl QuestionGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>, max_attempts: u32) -> Self {
        Self { llm, max_attempts }
    }
}

/// A usable reply asks at least one question and every question offers answers.
fn check_reply(reply: &AgentReply) -> Result<(), String> {
    let AgentReply::AskQuestion { questions, .. } = reply else {
        return Err(format!("expected ask_question, got {}", reply.action()));
    };
    if questions.is_empty() {
        return Err("ask_question reply without questions".to_string());
    }
    if let Some(q) = questions.iter().find(|q| q.text.trim().is_empty()) {
        return Err(format!("question '{}' has no text", q.id));
    }
    if let Some(q) = questions.iter().find(|q| q.suggested_answers.is_empty()) {
        return Err(format!("question '{}' has no suggested answers", q.text));
    }
    Ok(())
}

/// Fills in missing or duplicate ids so answers can be matched next turn.
fn assign_ids(questions: Vec<EditQuestion>) -> Vec<EditQuestion> {
    let mut seen = std::collections::HashSet::new();
    questions
        .into_iter()
        .enumerate()
        .map(|(i, mut q)| {
            if q.id.trim().is_empty() || !seen.insert(q.id.clone()) {
                let mut n = i + 1;
                while seen.contains(&format!("q{n}")) {
                    n += 1;
                }
                q.id = format!("q{n}");
                seen.insert(q.id.clone());
            }
            q
        })
        .collect()
}

#[async_trait]
impl Handler for QuestionGenerator {
    fn name(&self) -> &'static str {
        "question_generator"
    }

    async fn handle(&self, ctx: &AgentContext<'_>, io: &mut TurnIo<'_>) -> HandlerOutput {
        let system = fill(
            QUESTION_SYSTEM,
            &[
                ("grounding_instruction", GROUNDING_INSTRUCTION),
                ("planner_notes", ctx.planner_notes().as_str()),
                ("context", ctx.context_block().as_str()),
            ],
        );

        let outcome = request_structured(
            self.name(),
            self.llm.as_ref(),
            &system,
            ctx.user_message,
            ResponseFormat::Json {
                schema: QUESTION_SCHEMA,
            },
            self.max_attempts,
            io,
            true,
            check_reply,
        )
        .await;

        match outcome {
            CallOutcome::Done(AgentReply::AskQuestion {
                assistant_message,
                questions,
                warnings,
            }) => {
                info!("Generated {} clarifying question(s)", questions.len());
                HandlerOutput {
                    assistant_message,
                    questions: assign_ids(questions),
                    warnings,
                    ..HandlerOutput::default()
                }
            }
            CallOutcome::Done(other) => HandlerOutput::degraded(
                DEGRADED_MESSAGE,
                format!("question generator returned {}", other.action()),
            ),
            CallOutcome::Cancelled => HandlerOutput::cancelled(io.visible_text()),
            CallOutcome::Failed(reason) => HandlerOutput::degraded(DEGRADED_MESSAGE, reason),
        }
    }
}
