//! Section extractor: splits a résumé into the sections prompts care about.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    About,
    Experience,
    Skills,
    Education,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::About => "about",
            Section::Experience => "experience",
            Section::Skills => "skills",
            Section::Education => "education",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heading patterns, matched against a whole trimmed line.
/// Markdown `#` prefixes and a trailing colon are stripped before matching.
static HEADINGS: LazyLock<Vec<(Section, Regex)>> = LazyLock::new(|| {
    [
        (
            Section::About,
            r"(?i)^(about( me)?|summary|professional summary|profile|objective|о себе|обо мне)$",
        ),
        (
            Section::Experience,
            r"(?i)^((work |professional )?experience|employment( history)?|work history|опыт работы|опыт)$",
        ),
        (
            Section::Skills,
            r"(?i)^((key |technical |core )?skills|competencies|tech stack|навыки|ключевые навыки)$",
        ),
        (
            Section::Education,
            r"(?i)^(education|academic background|образование)$",
        ),
    ]
    .into_iter()
    .map(|(section, pattern)| (section, Regex::new(pattern).expect("static regex")))
    .collect()
});

fn heading_of(line: &str) -> Option<Section> {
    let candidate = line
        .trim()
        .trim_start_matches('#')
        .trim()
        .trim_end_matches(':')
        .trim();
    if candidate.is_empty() {
        return None;
    }
    HEADINGS
        .iter()
        .find(|(_, re)| re.is_match(candidate))
        .map(|(section, _)| *section)
}

/// Maps each recognised section to its body text.
///
/// A section's body runs until the next recognised heading or the end of the
/// text. Text before the first heading belongs to no section. A heading that
/// repeats appends to the earlier body.
pub fn extract(text: &str) -> BTreeMap<Section, String> {
    let mut sections: BTreeMap<Section, Vec<&str>> = BTreeMap::new();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        if let Some(section) = heading_of(line) {
            current = Some(section);
            sections.entry(section).or_default();
            continue;
        }
        if let Some(section) = current {
            sections.entry(section).or_default().push(line);
        }
    }

    sections
        .into_iter()
        .map(|(section, lines)| (section, lines.join("\n").trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESUME: &str = "Jane Doe\n\
        jane@example.com\n\
        \n\
        ## Summary\n\
        Backend engineer, 6 years.\n\
        \n\
        Experience:\n\
        Acme Corp, 2019-2024\n\
        - Built billing in Rust\n\
        \n\
        SKILLS\n\
        Rust, Go, Postgres\n\
        Education\n\
        BSc Computer Science";

    #[test]
    fn test_extracts_all_sections() {
        let sections = extract(RESUME);
        assert_eq!(sections.len(), 4);
        assert_eq!(sections[&Section::About], "Backend engineer, 6 years.");
        assert_eq!(
            sections[&Section::Experience],
            "Acme Corp, 2019-2024\n- Built billing in Rust"
        );
        assert_eq!(sections[&Section::Skills], "Rust, Go, Postgres");
        assert_eq!(sections[&Section::Education], "BSc Computer Science");
    }

    #[test]
    fn test_preamble_is_ignored() {
        let sections = extract(RESUME);
        assert!(sections.values().all(|b| !b.contains("jane@example.com")));
    }

    #[test]
    fn test_russian_headings() {
        let sections = extract("Опыт работы\nЯндекс\nНавыки\nRust");
        assert_eq!(sections[&Section::Experience], "Яндекс");
        assert_eq!(sections[&Section::Skills], "Rust");
    }

    #[test]
    fn test_heading_must_be_whole_line() {
        let sections = extract("Experience\nGained experience with Kafka");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[&Section::Experience], "Gained experience with Kafka");
    }

    #[test]
    fn test_no_headings_yields_empty_map() {
        assert!(extract("just some text\nmore text").is_empty());
    }

    #[test]
    fn test_empty_section_is_present() {
        let sections = extract("Skills\nEducation\nMIT");
        assert_eq!(sections[&Section::Skills], "");
        assert_eq!(sections[&Section::Education], "MIT");
    }
}
