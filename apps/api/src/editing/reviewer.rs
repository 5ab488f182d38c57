//! Reviewer: annotates a generated patch batch with warnings.
//!
//! Never drops or rewrites patches. Structural problems from the validator and
//! style issues in each patch's new text both surface as warnings.

use tracing::debug;

use crate::config::EditPolicy;
use crate::editing::models::{Patch, ResumeText};
use crate::editing::rules::check_all;
use crate::editing::validator::validate;

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub patches: Vec<Patch>,
    pub warnings: Vec<String>,
}

pub fn review(resume: &ResumeText, patches: Vec<Patch>, policy: &EditPolicy) -> ReviewOutcome {
    let report = validate(&patches, resume, policy);
    let mut warnings = report.errors;
    warnings.extend(report.warnings);

    for patch in &patches {
        let Some(new_text) = patch.new_text() else {
            continue;
        };
        let check = check_all(new_text);
        for issue in check.issues {
            warnings.push(format!(
                "Patch {} (lines {}-{}): {}",
                patch.id, patch.start_line, patch.end_line, issue.message
            ));
        }
    }

    debug!(
        "Reviewed {} patch(es), {} warning(s)",
        patches.len(),
        warnings.len()
    );
    ReviewOutcome { patches, warnings }
}
