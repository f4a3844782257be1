//! Conversation-aware search query expansion
//!
//! Follow-up questions like "what about that one?" carry no searchable terms.
//! The expander pulls course numbers from the current message and, when the
//! message refers back to earlier turns, from the recent conversation.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::recent_turns;
use crate::models::ConversationTurn;

/// Two-letter subject, optional space, three digits, optional section letter
static COURSE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-z]{2})\s*(\d{3})([a-z]?)\b").expect("course pattern is valid")
});

/// Two-letter words that precede numbers in ordinary prose ("is 101", "at 730")
const NON_SUBJECT_WORDS: &[&str] = &[
    "am", "an", "as", "at", "be", "by", "do", "go", "he", "if", "in", "is", "it", "me", "my",
    "no", "of", "on", "or", "so", "to", "up", "us", "we",
];

const SINGULAR_WORDS: &[&str] = &["that", "it", "this", "its"];
const PLURAL_WORDS: &[&str] = &["all", "them", "these", "those", "others", "they", "both"];

/// Appended when a message names courses without referring back
const SCHEDULE_HINT: &str = "schedule timing location";

/// Prior messages scanned for a singular reference
const SINGULAR_LOOKBACK: usize = 2;
/// Prior messages scanned for a plural reference
const PLURAL_LOOKBACK: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    /// Refers to one earlier thing ("that", "it")
    Singular,
    /// Refers to several earlier things ("all", "those")
    Plural,
}

/// Course numbers in order of appearance, normalized to `"CS 515"` form
pub fn extract_courses(text: &str) -> Vec<String> {
    let mut courses: Vec<String> = Vec::new();
    for caps in COURSE_PATTERN.captures_iter(text) {
        if NON_SUBJECT_WORDS.contains(&caps[1].to_lowercase().as_str()) {
            continue;
        }
        let course = format!(
            "{} {}{}",
            caps[1].to_uppercase(),
            &caps[2],
            caps[3].to_uppercase()
        );
        if !courses.contains(&course) {
            courses.push(course);
        }
    }
    courses
}

/// Detect back-references; plural wins when both kinds occur
pub fn classify_reference(message: &str) -> Option<Reference> {
    let words: Vec<String> = message
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .collect();

    let has = |set: &[&str]| words.iter().any(|w| set.contains(&w.as_str()));

    if has(PLURAL_WORDS) {
        Some(Reference::Plural)
    } else if has(SINGULAR_WORDS) {
        Some(Reference::Singular)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryExpander;

impl QueryExpander {
    /// Rewrite a user message into a search query. Never fails.
    pub fn expand(&self, message: &str, history: &[ConversationTurn]) -> String {
        let current_courses = extract_courses(message);

        if let Some(reference) = classify_reference(message).filter(|_| !history.is_empty()) {
            let courses = match reference {
                Reference::Singular => {
                    let mut mentions: Vec<String> = recent_turns(history, SINGULAR_LOOKBACK)
                        .iter()
                        .flat_map(|turn| extract_courses(&turn.content))
                        .collect();
                    mentions.extend(current_courses);
                    mentions.pop().into_iter().collect::<Vec<_>>()
                }
                Reference::Plural => {
                    let mut courses = current_courses;
                    for turn in recent_turns(history, PLURAL_LOOKBACK) {
                        for course in extract_courses(&turn.content) {
                            if !courses.contains(&course) {
                                courses.push(course);
                            }
                        }
                    }
                    courses
                }
            };

            if courses.is_empty() {
                return message.to_string();
            }
            return format!("{} {message}", courses.join(" "));
        }

        if current_courses.is_empty() {
            message.to_string()
        } else {
            format!("{} {SCHEDULE_HINT} {message}", current_courses.join(" "))
        }
    }
}
