//! Patch addressing: line↔offset conversion and patch construction.
//!
//! Callers speak 1-based inclusive line numbers. Internally everything is
//! 0-based; offsets are byte offsets into the résumé text.

use thiserror::Error;
use uuid::Uuid;

use crate::editing::models::{Patch, PatchKind, PatchOp, ResumeText};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressingError {
    #[error("lines {start0}..={end0} are out of range for {line_count} lines")]
    OutOfRange {
        start0: usize,
        end0: usize,
        line_count: usize,
    },

    #[error("offsets {start}..{end} do not address text of length {len}")]
    InvalidRange { start: usize, end: usize, len: usize },

    #[error("invalid line range {start_line}-{end_line} (resume has {line_count} lines)")]
    InvalidLineRange {
        start_line: i64,
        end_line: i64,
        line_count: usize,
    },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

/// Byte offsets `(start, end)` covering 0-based lines `start0..=end0`.
///
/// `end` is exclusive and stops before the newline of `end0`.
pub fn line_to_offsets(
    resume: &ResumeText,
    start0: usize,
    end0: usize,
) -> Result<(usize, usize), AddressingError> {
    let line_count = resume.line_count();
    if start0 > end0 || end0 >= line_count {
        return Err(AddressingError::OutOfRange {
            start0,
            end0,
            line_count,
        });
    }
    let start = resume
        .line_start(start0)
        .ok_or(AddressingError::OutOfRange {
            start0,
            end0,
            line_count,
        })?;
    Ok((start, resume.line_end(end0)))
}

/// 0-based lines `(start0, end0)` containing byte offsets `start..end`.
pub fn offsets_to_lines(
    resume: &ResumeText,
    start: usize,
    end: usize,
) -> Result<(usize, usize), AddressingError> {
    let text = resume.as_str();
    let invalid = AddressingError::InvalidRange {
        start,
        end,
        len: text.len(),
    };
    if start > end
        || end > text.len()
        || !text.is_char_boundary(start)
        || !text.is_char_boundary(end)
    {
        return Err(invalid);
    }

    let start0 = text[..start].matches('\n').count();
    let end0 = start0 + text[start..end].matches('\n').count();
    if end0 >= resume.line_count() {
        return Err(invalid);
    }
    Ok((start0, end0))
}

/// Builds a validated patch from caller-supplied 1-based lines.
///
/// Inserts anchor on `start_line`; their `end_line` is collapsed onto it.
pub fn build_patch(
    resume: &ResumeText,
    kind: PatchKind,
    old_text: &str,
    new_text: Option<&str>,
    start_line: i64,
    end_line: i64,
    reason: &str,
) -> Result<Patch, AddressingError> {
    let line_count = resume.line_count();
    let end_line = if kind == PatchKind::Insert {
        start_line
    } else {
        end_line
    };

    let start0 = start_line - 1;
    let end0 = end_line - 1;
    if start0 < 0 || start0 > end0 || end0 >= line_count as i64 {
        return Err(AddressingError::InvalidLineRange {
            start_line,
            end_line,
            line_count,
        });
    }

    let op = match (kind, new_text) {
        (PatchKind::Delete, Some(_)) => {
            return Err(AddressingError::TypeMismatch(
                "delete patches must not carry new_text".to_string(),
            ))
        }
        (PatchKind::Delete, None) => PatchOp::Delete,
        (PatchKind::Replace, Some(text)) => PatchOp::Replace {
            new_text: text.to_string(),
        },
        (PatchKind::Insert, Some(text)) => PatchOp::Insert {
            new_text: text.to_string(),
        },
        (kind, None) => {
            return Err(AddressingError::TypeMismatch(format!(
                "{kind:?} patches require new_text"
            )))
        }
    };

    Ok(Patch {
        id: new_patch_id(),
        start_line: start_line as usize,
        end_line: end_line as usize,
        old_text: old_text.to_string(),
        reason: reason.to_string(),
        op,
    })
}

fn new_patch_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("p-{}", &id[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Applies patches the way a caller would; inserts go after the anchor line.
    fn apply(resume: &ResumeText, patch: &Patch) -> String {
        let (s0, e0) = patch.zero_based();
        let (start, end) = line_to_offsets(resume, s0, e0).unwrap();
        let text = resume.as_str();
        match &patch.op {
            PatchOp::Replace { new_text } => {
                format!("{}{}{}", &text[..start], new_text, &text[end..])
            }
            PatchOp::Insert { new_text } => {
                format!("{}\n{}{}", &text[..end], new_text, &text[end..])
            }
            PatchOp::Delete => {
                let cut_end = if end < text.len() { end + 1 } else { end };
                format!("{}{}", &text[..start], &text[cut_end..])
            }
        }
    }

    #[test]
    fn test_replace_scenario_applies_cleanly() {
        let resume = ResumeText::new("Line1\nLine2\nLine3");
        let patch = build_patch(
            &resume,
            PatchKind::Replace,
            "Line2",
            Some("Line Two"),
            2,
            2,
            "spell out number",
        )
        .unwrap();
        assert_eq!(patch.zero_based(), (1, 1));
        assert_eq!(apply(&resume, &patch), "Line1\nLine Two\nLine3");
    }

    #[test]
    fn test_start_line_zero_is_rejected() {
        let resume = ResumeText::new("Line1\nLine2\nLine3");
        let err = build_patch(&resume, PatchKind::Replace, "Line1", Some("x"), 0, 1, "r")
            .unwrap_err();
        assert!(matches!(err, AddressingError::InvalidLineRange { .. }));
    }

    #[test]
    fn test_end_past_last_line_is_rejected() {
        let resume = ResumeText::new("Line1\nLine2\nLine3");
        assert!(build_patch(&resume, PatchKind::Delete, "x", None, 2, 4, "r").is_err());
        assert!(build_patch(&resume, PatchKind::Delete, "x", None, 3, 2, "r").is_err());
    }

    #[test]
    fn test_every_valid_range_builds() {
        let resume = ResumeText::new("a\nb\nc\nd\ne");
        let n = resume.line_count() as i64;
        for start in 1..=n {
            for end in start..=n {
                let patch =
                    build_patch(&resume, PatchKind::Replace, "a", Some("z"), start, end, "r")
                        .unwrap();
                let (s0, e0) = patch.zero_based();
                assert!(s0 <= e0 && e0 < resume.line_count());
            }
        }
    }

    #[test]
    fn test_delete_with_new_text_is_type_mismatch() {
        let resume = ResumeText::new("a\nb");
        let err = build_patch(&resume, PatchKind::Delete, "a", Some("x"), 1, 1, "r").unwrap_err();
        assert!(matches!(err, AddressingError::TypeMismatch(_)));
    }

    #[test]
    fn test_replace_and_insert_require_new_text() {
        let resume = ResumeText::new("a\nb");
        for kind in [PatchKind::Replace, PatchKind::Insert] {
            let err = build_patch(&resume, kind, "a", None, 1, 1, "r").unwrap_err();
            assert!(matches!(err, AddressingError::TypeMismatch(_)));
        }
    }

    #[test]
    fn test_insert_collapses_onto_anchor_and_goes_after_it() {
        let resume = ResumeText::new("a\nb");
        let patch = build_patch(&resume, PatchKind::Insert, "", Some("new"), 1, 2, "r").unwrap();
        assert_eq!((patch.start_line, patch.end_line), (1, 1));
        assert_eq!(apply(&resume, &patch), "a\nnew\nb");
    }

    #[test]
    fn test_delete_removes_whole_lines() {
        let resume = ResumeText::new("a\nb\nc");
        let patch = build_patch(&resume, PatchKind::Delete, "b", None, 2, 2, "r").unwrap();
        assert_eq!(apply(&resume, &patch), "a\nc");
    }

    #[test]
    fn test_line_to_offsets_out_of_range() {
        let resume = ResumeText::new("a\nb");
        assert!(matches!(
            line_to_offsets(&resume, 0, 2),
            Err(AddressingError::OutOfRange { .. })
        ));
        assert!(line_to_offsets(&resume, 1, 0).is_err());
    }

    #[test]
    fn test_offsets_roundtrip_for_all_valid_ranges() {
        let resume = ResumeText::new("Summary\n\nRust — systems\nSkills: Go, SQL\nlast\n");
        let n = resume.line_count();
        for s in 0..n {
            for e in s..n {
                let (start, end) = line_to_offsets(&resume, s, e).unwrap();
                assert_eq!(offsets_to_lines(&resume, start, end).unwrap(), (s, e));
            }
        }
    }

    #[test]
    fn test_offsets_to_lines_rejects_bad_ranges() {
        let resume = ResumeText::new("ab\ncd");
        assert!(offsets_to_lines(&resume, 3, 2).is_err());
        assert!(offsets_to_lines(&resume, 0, 99).is_err());
        let multibyte = ResumeText::new("é");
        assert!(offsets_to_lines(&multibyte, 1, 2).is_err());
    }

    #[test]
    fn test_patch_ids_are_unique() {
        let resume = ResumeText::new("a");
        let a = build_patch(&resume, PatchKind::Delete, "a", None, 1, 1, "r").unwrap();
        let b = build_patch(&resume, PatchKind::Delete, "a", None, 1, 1, "r").unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("p-"));
    }
}
