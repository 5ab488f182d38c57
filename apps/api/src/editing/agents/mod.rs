//! Text-generation agents.
//!
//! Every agent makes one structured call to a `TextGenerator`, retried up to
//! the policy's attempt budget. The planner decides; the three handlers
//! (questions, patches, chat) act on that decision.

pub mod chat;
pub mod patches;
pub mod planner;
pub mod questions;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::editing::addressing::offsets_to_lines;
use crate::editing::models::{
    EditQuestion, HistoryEntry, HistoryRole, Patch, PatchKind, ResumeText, Task,
};
use crate::editing::prompts::{fill, CONTEXT_TEMPLATE};
use crate::editing::rules::RuleIssue;
use crate::editing::sections::Section;
use crate::editing::streaming::{drive, visible_message, StreamingDiffer, StreamingSink};
use crate::llm_client::{parse_json, ResponseFormat, TextGenerator};

pub use chat::ChatAgent;
pub use patches::PatchGenerator;
pub use planner::{Planner, PlannerDecision};
pub use questions::QuestionGenerator;

// ────────────────────────────────────────────────────────────────────────────
// Wire contract
// ────────────────────────────────────────────────────────────────────────────

/// The one response shape every downstream agent is asked for, keyed by `action`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentReply {
    AskQuestion {
        assistant_message: String,
        #[serde(default)]
        questions: Vec<EditQuestion>,
        #[serde(default)]
        warnings: Vec<String>,
    },
    GeneratePatches {
        assistant_message: String,
        #[serde(default)]
        patches: Vec<RawChange>,
        #[serde(default)]
        warnings: Vec<String>,
    },
    Chat {
        assistant_message: String,
        #[serde(default)]
        warnings: Vec<String>,
    },
}

impl AgentReply {
    pub fn action(&self) -> &'static str {
        match self {
            AgentReply::AskQuestion { .. } => "ask_question",
            AgentReply::GeneratePatches { .. } => "generate_patches",
            AgentReply::Chat { .. } => "chat",
        }
    }
}

/// A change as the model describes it, before addressing validation.
/// Line numbers are signed so out-of-range values reach `build_patch` intact.
#[derive(Debug, Clone, Deserialize)]
pub struct RawChange {
    #[serde(rename = "type")]
    pub kind: PatchKind,
    pub start_line: i64,
    #[serde(default)]
    pub end_line: Option<i64>,
    #[serde(default)]
    pub old_text: String,
    #[serde(default)]
    pub new_text: Option<String>,
    #[serde(default)]
    pub reason: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Turn context and I/O
// ────────────────────────────────────────────────────────────────────────────

/// Everything an agent may put into its prompt. Borrowed from the turn snapshot.
pub struct AgentContext<'a> {
    pub resume: &'a ResumeText,
    pub sections: &'a BTreeMap<Section, String>,
    pub rule_issues: &'a [RuleIssue],
    pub current_task: Option<&'a Task>,
    pub history: &'a [HistoryEntry],
    pub user_message: &'a str,
    pub decision: Option<&'a PlannerDecision>,
}

impl AgentContext<'_> {
    pub fn context_block(&self) -> String {
        let sections = if self.sections.is_empty() {
            "(no recognised section headings)".to_string()
        } else {
            self.sections
                .iter()
                .map(|(section, body)| format!("[{section}]\n{body}"))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let rule_issues = if self.rule_issues.is_empty() {
            "(none)".to_string()
        } else {
            self.rule_issues
                .iter()
                .map(|i| match locate(self.resume, &i.excerpt) {
                    Some(line) => format!("- line {line}: {}", i.message),
                    None => format!("- {}", i.message),
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        let current_task = self
            .current_task
            .map(|t| format!("{} ({})", t.title, t.id))
            .unwrap_or_else(|| "(no plan yet)".to_string());

        let history = if self.history.is_empty() {
            "(new conversation)".to_string()
        } else {
            self.history
                .iter()
                .map(|h| {
                    let role = match h.role {
                        HistoryRole::User => "user",
                        HistoryRole::Assistant => "assistant",
                    };
                    format!("{role}: {}", h.content)
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        fill(
            CONTEXT_TEMPLATE,
            &[
                ("resume_numbered", self.resume.numbered().as_str()),
                ("sections_json", sections.as_str()),
                ("rule_issues", rule_issues.as_str()),
                ("current_task", current_task.as_str()),
                ("history", history.as_str()),
            ],
        )
    }

    pub fn planner_notes(&self) -> String {
        match self.decision {
            Some(d) if !d.questions.is_empty() => format!(
                "{}\nCandidate questions:\n{}",
                d.reasoning,
                d.questions
                    .iter()
                    .map(|q| format!("- {q}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
            Some(d) => d.reasoning.clone(),
            None => "(none)".to_string(),
        }
    }
}

/// 1-based line of the first occurrence of `excerpt`.
fn locate(resume: &ResumeText, excerpt: &str) -> Option<usize> {
    let start = resume.as_str().find(excerpt)?;
    let (line0, _) = offsets_to_lines(resume, start, start + excerpt.len()).ok()?;
    Some(line0 + 1)
}

/// Per-turn streaming state threaded through agent calls.
pub struct TurnIo<'a> {
    pub sink: Option<&'a dyn StreamingSink>,
    pub cancel: &'a CancellationToken,
    pub differ: StreamingDiffer,
}

impl<'a> TurnIo<'a> {
    pub fn new(sink: Option<&'a dyn StreamingSink>, cancel: &'a CancellationToken) -> Self {
        Self {
            sink,
            cancel,
            differ: StreamingDiffer::new(),
        }
    }

    /// Text already shown to the user this turn.
    pub fn visible_text(&self) -> &str {
        self.differ.snapshot()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handler fan-out
// ────────────────────────────────────────────────────────────────────────────

/// What a handler hands back to the controller. Degraded and cancelled
/// outputs are still well-formed.
#[derive(Debug, Default)]
pub struct HandlerOutput {
    pub assistant_message: String,
    pub questions: Vec<EditQuestion>,
    pub patches: Vec<Patch>,
    pub warnings: Vec<String>,
    pub cancelled: bool,
}

impl HandlerOutput {
    pub fn degraded(message: &str, failure: String) -> Self {
        Self {
            assistant_message: message.to_string(),
            warnings: vec![failure],
            ..Self::default()
        }
    }

    pub fn cancelled(partial: &str) -> Self {
        Self {
            assistant_message: partial.to_string(),
            cancelled: true,
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &AgentContext<'_>, io: &mut TurnIo<'_>) -> HandlerOutput;
}

/// Which handler the planner's decision selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Questions,
    Patches,
    Chat,
}

impl From<&PlannerDecision> for Route {
    fn from(decision: &PlannerDecision) -> Self {
        if decision.needs_questions {
            Route::Questions
        } else if decision.changes_needed {
            Route::Patches
        } else {
            Route::Chat
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Structured call with retry
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum CallOutcome<T> {
    Done(T),
    Cancelled,
    /// Every attempt failed; carries the last failure reason.
    Failed(String),
}

/// Calls the generator until a response parses and passes `validate`.
///
/// With `stream` set and a sink present, the visible `assistant_message` is
/// streamed through the turn's differ while the call runs.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn request_structured<T, V>(
    agent: &str,
    llm: &dyn TextGenerator,
    system: &str,
    prompt: &str,
    format: ResponseFormat,
    max_attempts: u32,
    io: &mut TurnIo<'_>,
    stream: bool,
    validate: V,
) -> CallOutcome<T>
where
    T: DeserializeOwned + Send,
    V: Fn(&T) -> Result<(), String> + Send + Sync,
{
    let mut last_failure = "no attempts made".to_string();

    for attempt in 1..=max_attempts {
        let raw = if stream && io.sink.is_some() {
            let snapshots = tokio::select! {
                biased;
                _ = io.cancel.cancelled() => return CallOutcome::Cancelled,
                r = llm.complete_stream(system, prompt, format) => r,
            };
            match snapshots {
                Ok(snapshots) => {
                    let outcome =
                        drive(snapshots, visible_message, &mut io.differ, io.sink, io.cancel)
                            .await;
                    if outcome.cancelled {
                        return CallOutcome::Cancelled;
                    }
                    match outcome.error {
                        Some(e) => Err(e),
                        None => Ok(outcome.raw),
                    }
                }
                Err(e) => Err(e),
            }
        } else {
            tokio::select! {
                biased;
                _ = io.cancel.cancelled() => return CallOutcome::Cancelled,
                r = llm.complete(system, prompt, format) => r,
            }
        };

        let failure = match raw {
            Ok(text) => match parse_json::<T>(&text) {
                Ok(value) => match validate(&value) {
                    Ok(()) => return CallOutcome::Done(value),
                    Err(reason) => reason,
                },
                Err(e) => format!("unparseable response: {e}"),
            },
            Err(e) => format!("generation failed: {e}"),
        };

        warn!(
            "{} attempt {}/{} rejected: {}",
            agent, attempt, max_attempts, failure
        );
        last_failure = failure;
    }

    CallOutcome::Failed(format!(
        "{agent} gave no usable response after {max_attempts} attempts: {last_failure}"
    ))
}
