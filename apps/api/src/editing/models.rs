//! Data model shared by every stage of an edit turn.
//!
//! Line numbers on the wire are 1-based and inclusive. Everything that
//! slices text converts to 0-based first (see `addressing`).

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Résumé snapshot
// ────────────────────────────────────────────────────────────────────────────

/// Immutable per-turn snapshot of the résumé, indexed by line.
///
/// A trailing `\n` terminates the last line rather than opening an empty one,
/// so `"a\nb\n"` has two lines.
#[derive(Debug, Clone)]
pub struct ResumeText {
    text: String,
    /// Byte offset of the first character of each line.
    line_starts: Vec<usize>,
}

impl ResumeText {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let line_starts = line_starts(&text);
        Self { text, line_starts }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Content of the 0-based line `index`, without its newline.
    pub fn line(&self, index: usize) -> Option<&str> {
        let start = *self.line_starts.get(index)?;
        Some(&self.text[start..self.line_end(index)])
    }

    /// Renders the résumé with 1-based line numbers for prompting.
    pub fn numbered(&self) -> String {
        let width = self.line_count().to_string().len();
        (0..self.line_count())
            .filter_map(|i| self.line(i).map(|l| format!("{:>width$} | {l}", i + 1)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Exclusive byte offset of the end of line `index`'s content.
    pub(crate) fn line_end(&self, index: usize) -> usize {
        match self.line_starts.get(index + 1) {
            Some(next) => next - 1,
            None => {
                if self.text.ends_with('\n') {
                    self.text.len() - 1
                } else {
                    self.text.len()
                }
            }
        }
    }

    pub(crate) fn line_start(&self, index: usize) -> Option<usize> {
        self.line_starts.get(index).copied()
    }
}

fn line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' && i + 1 < text.len() {
            starts.push(i + 1);
        }
    }
    starts
}

// ────────────────────────────────────────────────────────────────────────────
// Patches
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchKind {
    Replace,
    Insert,
    Delete,
}

/// The edit operation a patch performs. `new_text` exists only where it means something.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatchOp {
    Replace { new_text: String },
    /// Inserted after the anchored line.
    Insert { new_text: String },
    Delete,
}

/// A single line-addressed edit. Built only through `addressing::build_patch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub id: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive. Equal to `start_line` for inserts.
    pub end_line: usize,
    pub old_text: String,
    pub reason: String,
    #[serde(flatten)]
    pub op: PatchOp,
}

impl Patch {
    pub fn kind(&self) -> PatchKind {
        match self.op {
            PatchOp::Replace { .. } => PatchKind::Replace,
            PatchOp::Insert { .. } => PatchKind::Insert,
            PatchOp::Delete => PatchKind::Delete,
        }
    }

    pub fn new_text(&self) -> Option<&str> {
        match &self.op {
            PatchOp::Replace { new_text } | PatchOp::Insert { new_text } => Some(new_text),
            PatchOp::Delete => None,
        }
    }

    /// Internal 0-based inclusive range.
    pub fn zero_based(&self) -> (usize, usize) {
        (
            self.start_line.saturating_sub(1),
            self.end_line.saturating_sub(1),
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Questions, plan, history
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditQuestion {
    #[serde(default)]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub suggested_answers: Vec<String>,
    #[serde(default)]
    pub allow_multiple: bool,
}

/// The user's reply to a question from an earlier turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question_id: String,
    #[serde(default)]
    pub question: Option<String>,
    pub answers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
}

/// The current task: first task that is not completed.
pub fn first_incomplete(plan: &[Task]) -> Option<&Task> {
    plan.iter().find(|t| t.status != TaskStatus::Completed)
}

/// Returns a new plan with the current task completed and the next one started.
pub fn advance_plan(plan: &[Task]) -> Vec<Task> {
    let mut next = plan.to_vec();
    if let Some(pos) = next.iter().position(|t| t.status != TaskStatus::Completed) {
        next[pos].status = TaskStatus::Completed;
        if let Some(following) = next.iter_mut().skip(pos + 1).find(|t| t.status == TaskStatus::Pending) {
            following.status = TaskStatus::InProgress;
        }
    }
    next
}

/// Builds a fresh plan from task titles, the first one in progress.
pub fn plan_from_titles(titles: &[String]) -> Vec<Task> {
    titles
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .enumerate()
        .map(|(i, title)| Task {
            id: format!("task-{}", i + 1),
            title: title.to_string(),
            status: if i == 0 {
                TaskStatus::InProgress
            } else {
                TaskStatus::Pending
            },
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: String,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::User,
            content: content.into(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Turn input / output
// ────────────────────────────────────────────────────────────────────────────

/// One turn of a caller-owned edit session.
#[derive(Debug, Clone, Deserialize)]
pub struct EditRequest {
    pub resume_text: String,
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub plan: Vec<Task>,
    #[serde(default)]
    pub current_task: Option<Task>,
    /// Answers to questions asked in the previous turn.
    #[serde(default)]
    pub answers: Vec<QuestionAnswer>,
}

/// Exactly one of these is produced per turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditResult {
    pub assistant_message: String,
    pub questions: Vec<EditQuestion>,
    pub patches: Vec<Patch>,
    pub plan: Vec<Task>,
    pub warnings: Vec<String>,
    #[serde(default)]
    pub cancelled: bool,
}
