// All LLM prompt constants for the editing module.
// Reuses cross-cutting fragments from llm_client::prompts.

/// Substitutes `{key}` placeholders in one pass. Substituted values are never
/// rescanned, so résumé text containing `{history}` stays literal.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let hit = values.iter().find_map(|&(key, value)| {
            tail.strip_prefix(key)?
                .strip_prefix('}')
                .map(|after| (value, after))
        });
        match hit {
            Some((value, after)) => {
                out.push_str(value);
                rest = after;
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Shared context block. Replace: {resume_numbered}, {sections_json},
/// {rule_issues}, {current_task}, {history}.
pub const CONTEXT_TEMPLATE: &str = r#"RESUME (line numbers on the left are for addressing only, they are not part of the text):
{resume_numbered}

SECTIONS DETECTED:
{sections_json}

STYLE ISSUES ALREADY PRESENT IN THE RESUME:
{rule_issues}

CURRENT TASK OF THE EDITING PLAN:
{current_task}

CONVERSATION SO FAR (oldest first):
{history}"#;

/// Planner system prompt. Replace: {context}.
pub const PLANNER_SYSTEM: &str = r#"You are the planning step of a resume editing assistant.
Read the resume and the user's latest message and decide what happens next.
You do not write edits yourself.

Decide:
- needs_questions: true when the request cannot be done well without facts only the user knows
  (missing metrics, unclear target role, ambiguous scope). Do not ask about things already answered
  in the conversation.
- changes_needed: true when the user wants the resume text changed.
- If neither, the assistant will simply reply in conversation.
- plan: for a multi-step request, a short ordered list of task titles (max 5). Empty otherwise.

{context}"#;

pub const PLANNER_SCHEMA: &str = r#"{
  "needs_questions": false,
  "questions": ["What was the measured latency improvement?"],
  "changes_needed": true,
  "reasoning": "User wants the summary tightened; all facts are present.",
  "plan": ["Tighten the summary", "Rewrite Acme bullets"]
}"#;

/// Question generator system prompt. Replace: {grounding_instruction}, {context}, {planner_notes}.
pub const QUESTION_SYSTEM: &str = r#"You are a resume editing assistant preparing clarifying questions.

{grounding_instruction}

Ask only what is needed to make the requested edit well. Each question MUST offer
2-4 short suggested answers the user can click. Mark a question required only when the
edit is impossible without it. Set allow_multiple when several answers can apply.

PLANNER NOTES:
{planner_notes}

{context}"#;

pub const QUESTION_SCHEMA: &str = r#"{
  "action": "ask_question",
  "assistant_message": "A couple of details before I rewrite this:",
  "questions": [
    {
      "id": "q1",
      "text": "Which metric best shows the impact of the migration?",
      "required": true,
      "suggested_answers": ["Latency", "Cost", "Uptime"],
      "allow_multiple": true
    }
  ],
  "warnings": []
}"#;

/// Patch generator system prompt.
/// Replace: {grounding_instruction}, {style_instruction}, {context}, {planner_notes}.
pub const PATCH_SYSTEM: &str = r#"You are a resume editing assistant producing line-addressed edits.

{grounding_instruction}

{style_instruction}

Each change addresses resume lines by the numbers shown (1-based, inclusive):
- "replace": start_line..end_line are replaced by new_text. old_text MUST quote the current text.
- "delete": start_line..end_line are removed. old_text MUST quote the current text. No new_text.
- "insert": new_text is inserted AFTER start_line; end_line equals start_line.
Keep edits minimal and focused on the current task. Never rewrite lines the user did not ask about.

PLANNER NOTES:
{planner_notes}

{context}"#;

pub const PATCH_SCHEMA: &str = r#"{
  "action": "generate_patches",
  "assistant_message": "I tightened the summary and led with the strongest result.",
  "patches": [
    {
      "type": "replace",
      "start_line": 4,
      "end_line": 4,
      "old_text": "Responsible for backend services",
      "new_text": "Built the billing backend in Rust, cutting invoice latency by 37%",
      "reason": "Lead with an action verb and the measured result"
    }
  ],
  "warnings": []
}"#;

/// Chat agent system prompt. Replace: {grounding_instruction}, {context}.
pub const CHAT_SYSTEM: &str = r#"You are a resume editing assistant in conversation with the user.
Answer their message about the resume directly and briefly. Do not propose line edits here;
if the user wants changes they can ask for them.

{grounding_instruction}

{context}"#;

pub const CHAT_SCHEMA: &str = r#"{
  "action": "chat",
  "assistant_message": "Your experience section is strong; the summary is the weakest part.",
  "warnings": []
}"#;
