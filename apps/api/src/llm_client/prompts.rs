// Shared prompt constants and prompt-building utilities.
// Each feature that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Common instruction appended to every résumé-editing prompt.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Never invent employers, dates, titles, degrees or metrics that are not \
    present in the resume or stated by the user in this conversation. \
    If a fact is missing, ask for it instead of guessing.";

/// Style rules the reviewer checks afterwards; stating them up front saves a round trip.
pub const STYLE_INSTRUCTION: &str = "\
    CRITICAL: Write like a person, not a template: \
    - no em-dashes, use commas or colons \
    - no boilerplate such as 'results-driven', 'proven track record', 'team player' \
    - lead bullets with a past-tense action verb, never 'helped', 'worked on', 'responsible for' \
    - use real figures; do not round to 30%, 50%, 100% unless that is the measured number \
    - plain ASCII punctuation, no decorative symbols";
