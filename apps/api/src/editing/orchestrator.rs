//! Edit orchestration: runs one conversational editing turn.
//!
//! Flow: validate input → rule check + section extraction → planner →
//!       adopt plan → question / patch / chat handler → review → advance plan.
//!
//! The controller is stateless between turns; the caller owns the session and
//! passes it back in every `EditRequest`.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::EditPolicy;
use crate::editing::agents::{
    AgentContext, ChatAgent, Handler, PatchGenerator, Planner, QuestionGenerator, Route, TurnIo,
};
use crate::editing::models::{
    advance_plan, first_incomplete, plan_from_titles, EditRequest, EditResult, HistoryEntry,
    QuestionAnswer, ResumeText, Task,
};
use crate::editing::reviewer::review;
use crate::editing::rules::check_all;
use crate::editing::sections::extract;
use crate::editing::streaming::{notify_plan, StreamingSink};
use crate::errors::AppError;
use crate::llm_client::TextGenerator;

// ────────────────────────────────────────────────────────────────────────────
// Controller state machine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Planning,
    AwaitingQuestionAnswers,
    GeneratingPatches,
    Reviewing,
    Chatting,
    Done,
}

impl ControllerState {
    fn is_active(self) -> bool {
        !matches!(self, ControllerState::Idle | ControllerState::Done)
    }

    pub fn can_transition_to(self, next: ControllerState) -> bool {
        use ControllerState::*;

        match (self, next) {
            (Idle, Planning)
            | (Planning, AwaitingQuestionAnswers)
            | (Planning, GeneratingPatches)
            | (Planning, Chatting)
            | (AwaitingQuestionAnswers, Planning)
            | (AwaitingQuestionAnswers, Done)
            | (GeneratingPatches, Reviewing)
            | (Reviewing, Done)
            | (Chatting, Done) => true,
            (from, Idle) => from.is_active(),
            _ => false,
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Tracks the controller through one turn and records every state it visits.
#[derive(Debug)]
pub struct StateTracker {
    trail: Vec<ControllerState>,
}

impl StateTracker {
    pub fn starting_at(state: ControllerState) -> Self {
        Self { trail: vec![state] }
    }

    pub fn current(&self) -> ControllerState {
        self.trail
            .last()
            .copied()
            .unwrap_or(ControllerState::Idle)
    }

    pub fn advance(&mut self, next: ControllerState) -> Result<(), AppError> {
        let current = self.current();
        if !current.can_transition_to(next) {
            return Err(AppError::Internal(anyhow::anyhow!(
                "illegal controller transition {current} -> {next}"
            )));
        }
        debug!("Controller {} -> {}", current, next);
        self.trail.push(next);
        Ok(())
    }

    pub fn trail(&self) -> &[ControllerState] {
        &self.trail
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Turn input
// ────────────────────────────────────────────────────────────────────────────

/// A validated request with history bounded and answers folded in.
#[derive(Debug)]
struct PreparedTurn {
    resume: ResumeText,
    message: String,
    history: Vec<HistoryEntry>,
    plan: Vec<Task>,
    answered: bool,
}

fn prepare(request: EditRequest, policy: &EditPolicy) -> Result<PreparedTurn, AppError> {
    let resume = ResumeText::new(request.resume_text);
    if resume.is_blank() {
        return Err(AppError::Validation(
            "resume_text cannot be empty".to_string(),
        ));
    }
    if request.message.trim().is_empty() {
        return Err(AppError::Validation("message cannot be empty".to_string()));
    }
    let message_chars = request.message.chars().count();
    if message_chars > policy.max_message_chars {
        return Err(AppError::Validation(format!(
            "message is {message_chars} characters, the limit is {}",
            policy.max_message_chars
        )));
    }

    let mut history = request.history;
    let answered = !request.answers.is_empty();
    if answered {
        history.push(HistoryEntry::user(render_answers(&request.answers)));
    }
    if history.len() > policy.max_history {
        let excess = history.len() - policy.max_history;
        debug!("Dropping {} oldest history entries", excess);
        history.drain(..excess);
    }

    // A bare current task stands in for a plan the caller did not send.
    let plan = match (request.plan.is_empty(), request.current_task) {
        (true, Some(task)) => vec![task],
        _ => request.plan,
    };

    Ok(PreparedTurn {
        resume,
        message: request.message,
        history,
        plan,
        answered,
    })
}

fn render_answers(answers: &[QuestionAnswer]) -> String {
    let lines: Vec<String> = answers
        .iter()
        .map(|a| {
            let label = a.question.as_deref().unwrap_or(&a.question_id);
            format!("- {label}: {}", a.answers.join(", "))
        })
        .collect();
    format!("Answers to your questions:\n{}", lines.join("\n"))
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────────────────────────────────────

/// A finished turn together with the states the controller went through.
#[derive(Debug)]
pub struct TurnReport {
    pub result: EditResult,
    pub states: Vec<ControllerState>,
}

pub struct EditOrchestrator {
    planner: Planner,
    questions: QuestionGenerator,
    patches: PatchGenerator,
    chat: ChatAgent,
    policy: EditPolicy,
}

impl EditOrchestrator {
    pub fn new(llm: Arc<dyn TextGenerator>, policy: EditPolicy) -> Self {
        let attempts = policy.max_attempts;
        Self {
            planner: Planner::new(llm.clone(), attempts),
            questions: QuestionGenerator::new(llm.clone(), attempts),
            patches: PatchGenerator::new(llm.clone(), attempts),
            chat: ChatAgent::new(llm, attempts),
            policy,
        }
    }

    fn handler(&self, route: Route) -> &dyn Handler {
        match route {
            Route::Questions => &self.questions,
            Route::Patches => &self.patches,
            Route::Chat => &self.chat,
        }
    }

    /// Runs one editing turn and returns exactly one result.
    ///
    /// Cancellation is not an error: the partial result carries `cancelled`
    /// and the caller's plan unchanged.
    pub async fn generate_edits(
        &self,
        request: EditRequest,
        sink: Option<&dyn StreamingSink>,
        cancel: &CancellationToken,
    ) -> Result<EditResult, AppError> {
        let report = self.run_turn(request, sink, cancel).await?;
        debug!("Controller path: {:?}", report.states);
        Ok(report.result)
    }

    pub async fn run_turn(
        &self,
        request: EditRequest,
        sink: Option<&dyn StreamingSink>,
        cancel: &CancellationToken,
    ) -> Result<TurnReport, AppError> {
        let turn = prepare(request, &self.policy)?;
        info!(
            "Edit turn started: {} resume lines, {} history entries, {} plan tasks",
            turn.resume.line_count(),
            turn.history.len(),
            turn.plan.len()
        );

        let mut tracker = StateTracker::starting_at(if turn.answered {
            ControllerState::AwaitingQuestionAnswers
        } else {
            ControllerState::Idle
        });
        tracker.advance(ControllerState::Planning)?;

        let rule_check = check_all(turn.resume.as_str());
        let sections = extract(turn.resume.as_str());
        debug!(
            "Resume has {} rule issue(s), {} section(s)",
            rule_check.issues.len(),
            sections.len()
        );

        let mut io = TurnIo::new(sink, cancel);

        // Step 1: plan
        let planner_ctx = AgentContext {
            resume: &turn.resume,
            sections: &sections,
            rule_issues: &rule_check.issues,
            current_task: first_incomplete(&turn.plan),
            history: &turn.history,
            user_message: &turn.message,
            decision: None,
        };
        let Some(decision) = self.planner.decide(&planner_ctx, &mut io).await? else {
            return cancelled(tracker, io.visible_text().to_string(), turn.plan);
        };

        // Step 2: adopt a plan when no task is open
        let mut plan = turn.plan.clone();
        if first_incomplete(&plan).is_none() && !decision.plan.is_empty() {
            plan = plan_from_titles(&decision.plan);
            info!("Adopted {}-step plan from planner", plan.len());
            notify_plan(sink, &plan);
        }
        let current_task = first_incomplete(&plan).cloned();

        // Step 3: hand off to the routed handler
        let route = Route::from(&decision);
        tracker.advance(match route {
            Route::Questions => ControllerState::AwaitingQuestionAnswers,
            Route::Patches => ControllerState::GeneratingPatches,
            Route::Chat => ControllerState::Chatting,
        })?;

        let handler = self.handler(route);
        let ctx = AgentContext {
            current_task: current_task.as_ref(),
            decision: Some(&decision),
            ..planner_ctx
        };
        let output = handler.handle(&ctx, &mut io).await;
        if output.cancelled {
            return cancelled(tracker, output.assistant_message, turn.plan);
        }

        let mut warnings = output.warnings;
        let mut patches = output.patches;

        // Step 4: review and advance the plan
        if route == Route::Patches {
            tracker.advance(ControllerState::Reviewing)?;
            let reviewed = review(&turn.resume, patches, &self.policy);
            patches = reviewed.patches;
            warnings.extend(reviewed.warnings);

            if !patches.is_empty() && current_task.is_some() {
                plan = advance_plan(&plan);
                notify_plan(sink, &plan);
            }
        }
        tracker.advance(ControllerState::Done)?;

        info!(
            "Edit turn finished via {}: {} question(s), {} patch(es), {} warning(s)",
            handler.name(),
            output.questions.len(),
            patches.len(),
            warnings.len()
        );

        Ok(TurnReport {
            result: EditResult {
                assistant_message: output.assistant_message,
                questions: output.questions,
                patches,
                plan,
                warnings,
                cancelled: false,
            },
            states: tracker.trail().to_vec(),
        })
    }
}

fn cancelled(
    mut tracker: StateTracker,
    partial: String,
    plan: Vec<Task>,
) -> Result<TurnReport, AppError> {
    info!("Edit turn cancelled during {}", tracker.current());
    tracker.advance(ControllerState::Idle)?;
    Ok(TurnReport {
        result: EditResult {
            assistant_message: partial,
            plan,
            cancelled: true,
            ..EditResult::default()
        },
        states: tracker.trail().to_vec(),
    })
}
