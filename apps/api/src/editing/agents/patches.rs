//! Patch generator: produces line-addressed edits for the current task.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::editing::addressing::build_patch;
use crate::editing::agents::{
    request_structured, AgentContext, AgentReply, CallOutcome, Handler, HandlerOutput, RawChange,
    TurnIo,
};
use crate::editing::models::{Patch, ResumeText};
use crate::editing::prompts::{fill, PATCH_SCHEMA, PATCH_SYSTEM};
use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, STYLE_INSTRUCTION};
use crate::llm_client::{ResponseFormat, TextGenerator};

const DEGRADED_MESSAGE: &str =
    "I couldn't prepare edits for this request. Try rephrasing it or pointing at the lines you want changed.";

pub struct PatchGenerator {
    llm: Arc<dyn TextGenerator>,
    max_attempts: u32,
}

impl PatchGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>, max_attempts: u32) -> Self {
        Self { llm, max_attempts }
    }
}

fn check_reply(reply: &AgentReply) -> Result<(), String> {
    match reply {
        AgentReply::GeneratePatches { patches, .. } if patches.is_empty() => {
            Err("generate_patches reply without patches".to_string())
        }
        AgentReply::GeneratePatches { .. } => Ok(()),
        other => Err(format!("expected generate_patches, got {}", other.action())),
    }
}

/// Addresses each raw change against the résumé. Changes that cannot be
/// addressed are dropped and reported as warnings.
fn address_changes(resume: &ResumeText, changes: Vec<RawChange>) -> (Vec<Patch>, Vec<String>) {
    let mut patches = Vec::with_capacity(changes.len());
    let mut warnings = Vec::new();

    for (i, change) in changes.into_iter().enumerate() {
        let end_line = change.end_line.unwrap_or(change.start_line);
        match build_patch(
            resume,
            change.kind,
            &change.old_text,
            change.new_text.as_deref(),
            change.start_line,
            end_line,
            &change.reason,
        ) {
            Ok(patch) => patches.push(patch),
            Err(e) => {
                warn!("Dropping proposed change #{}: {}", i + 1, e);
                warnings.push(format!("Dropped proposed change #{}: {e}", i + 1));
            }
        }
    }

    (patches, warnings)
}

#[async_trait]
impl Handler for PatchGenerator {
    fn name(&self) -> &'static str {
        "patch_generator"
    }

    async fn handle(&self, ctx: &AgentContext<'_>, io: &mut TurnIo<'_>) -> HandlerOutput {
        let system = fill(
            PATCH_SYSTEM,
            &[
                ("grounding_instruction", GROUNDING_INSTRUCTION),
                ("style_instruction", STYLE_INSTRUCTION),
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
                schema: PATCH_SCHEMA,
            },
            self.max_attempts,
            io,
            true,
            check_reply,
        )
        .await;

        match outcome {
            CallOutcome::Done(AgentReply::GeneratePatches {
                assistant_message,
                patches,
                mut warnings,
            }) => {
                let proposed = patches.len();
                let (patches, dropped) = address_changes(ctx.resume, patches);
                info!(
                    "Addressed {}/{} proposed change(s)",
                    patches.len(),
                    proposed
                );
                warnings.extend(dropped);
                HandlerOutput {
                    assistant_message,
                    patches,
                    warnings,
                    ..HandlerOutput::default()
                }
            }
            CallOutcome::Done(other) => HandlerOutput::degraded(
                DEGRADED_MESSAGE,
                format!("patch generator returned {}", other.action()),
            ),
            CallOutcome::Cancelled => HandlerOutput::cancelled(io.visible_text()),
            CallOutcome::Failed(reason) => HandlerOutput::degraded(DEGRADED_MESSAGE, reason),
        }
    }
}
