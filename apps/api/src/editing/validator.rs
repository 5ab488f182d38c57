//! Structural validation of a patch batch against the résumé it addresses.
//!
//! Errors mean a patch is structurally wrong. Warnings are policy signals
//! (too many patches, too much of the résumé touched) and never fail a batch.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::EditPolicy;
use crate::editing::addressing::line_to_offsets;
use crate::editing::models::{Patch, PatchKind, ResumeText};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn validate(patches: &[Patch], resume: &ResumeText, policy: &EditPolicy) -> ValidationReport {
    let line_count = resume.line_count();
    let mut errors = Vec::new();

    for patch in patches {
        if let Err(reason) = check_patch(patch, resume) {
            errors.push(format!("Patch {}: {reason}", patch.id));
        }
    }

    let mut warnings = Vec::new();

    if patches.len() > policy.max_patches {
        warnings.push(format!(
            "{} patches exceed the recommended maximum of {} per turn",
            patches.len(),
            policy.max_patches
        ));
    }

    let touched = touched_lines(patches, line_count);
    if line_count > 0 {
        let ratio = touched.len() as f64 / line_count as f64;
        if ratio > policy.max_touched_ratio {
            warnings.push(format!(
                "Patches touch {} of {} lines ({:.0}%), above the {:.0}% guideline",
                touched.len(),
                line_count,
                ratio * 100.0,
                policy.max_touched_ratio * 100.0
            ));
        }
    }

    ValidationReport {
        ok: errors.is_empty(),
        errors,
        warnings,
    }
}

fn check_patch(patch: &Patch, resume: &ResumeText) -> Result<(), String> {
    let line_count = resume.line_count();
    if patch.start_line < 1 || patch.start_line > patch.end_line || patch.end_line > line_count {
        return Err(format!(
            "lines {}-{} are outside 1-{line_count}",
            patch.start_line, patch.end_line
        ));
    }

    let needs_old_text = matches!(patch.kind(), PatchKind::Replace | PatchKind::Delete);
    if needs_old_text && patch.old_text.trim().is_empty() {
        return Err("old_text is empty".to_string());
    }

    if !patch.old_text.trim().is_empty() {
        let (s0, e0) = patch.zero_based();
        let (start, end) = line_to_offsets(resume, s0, e0).map_err(|e| e.to_string())?;
        if !normalize(&resume.as_str()[start..end]).contains(&normalize(&patch.old_text)) {
            return Err(format!(
                "old_text not found in lines {}-{}",
                patch.start_line, patch.end_line
            ));
        }
    }

    Ok(())
}

/// Distinct 0-based lines touched by the batch. Inserts touch their anchor.
fn touched_lines(patches: &[Patch], line_count: usize) -> BTreeSet<usize> {
    patches
        .iter()
        .flat_map(|p| {
            let (s0, e0) = p.zero_based();
            s0..=e0.min(line_count.saturating_sub(1))
        })
        .collect()
}

/// Collapses whitespace runs so line wrapping differences don't fail the match.
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
