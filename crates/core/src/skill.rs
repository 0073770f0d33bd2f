//! Persona detection.
//!
//! Learner text is scored against a weighted cue table per persona. The
//! highest raw score is mapped onto a saturating confidence curve so a single
//! weak cue never flips the active persona on its own.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Confidence the orchestrator must exceed before switching persona.
pub const SWITCH_THRESHOLD: f32 = 0.7;

/// Minimum raw score for a persona to be considered at all.
const SCORE_FLOOR: u32 = 1;

/// A named response style that parameterizes tone and system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkillTag {
    ConceptExplainer,
    QuizMaster,
    SocraticTutor,
    ProgressMotivator,
    #[default]
    General,
}

impl SkillTag {
    /// Personas in tie-break priority order. `General` is never scored.
    pub const PRIORITY: [SkillTag; 4] = [
        SkillTag::QuizMaster,
        SkillTag::ConceptExplainer,
        SkillTag::SocraticTutor,
        SkillTag::ProgressMotivator,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SkillTag::ConceptExplainer => "concept-explainer",
            SkillTag::QuizMaster => "quiz-master",
            SkillTag::SocraticTutor => "socratic-tutor",
            SkillTag::ProgressMotivator => "progress-motivator",
            SkillTag::General => "general",
        }
    }

    fn priority_rank(self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|s| *s == self)
            .unwrap_or(Self::PRIORITY.len())
    }

    /// Weighted cues for this persona. Strong intent phrases weigh 3.
    fn cues(self) -> &'static [(&'static str, u32)] {
        match self {
            SkillTag::ConceptExplainer => &[
                ("explain", 3),
                ("define", 3),
                ("समझाओ", 3),
                ("समझाइए", 3),
                ("what is", 2),
                ("what are", 2),
                ("how does", 2),
                ("describe", 2),
                ("definition", 2),
                ("tell me about", 2),
                ("clarify", 2),
                ("break down", 2),
                ("meaning", 1),
                ("concept", 1),
                ("example", 1),
                ("understand", 1),
                ("क्या है", 2),
            ],
            SkillTag::QuizMaster => &[
                ("quiz me", 3),
                ("test me", 3),
                ("ask me", 2),
                ("practice", 2),
                ("mcq", 2),
                ("flashcards", 2),
                ("quiz", 1),
                ("test", 1),
                ("questions", 1),
                ("exam", 1),
                ("revise", 1),
                ("revision", 1),
                ("प्रश्न", 1),
            ],
            SkillTag::SocraticTutor => &[
                ("help me think", 3),
                ("guide me", 3),
                ("socratic", 3),
                ("walk me through", 2),
                ("don't tell me", 2),
                ("let me try", 2),
                ("figure out", 2),
                ("hint", 2),
                ("why", 1),
                ("reason", 1),
                ("stuck", 1),
                ("think", 1),
            ],
            SkillTag::ProgressMotivator => &[
                ("motivate", 3),
                ("encourage", 3),
                ("give up", 2),
                ("can't do", 2),
                ("motivation", 2),
                ("progress", 2),
                ("struggling", 2),
                ("frustrated", 2),
                ("tired", 1),
                ("bored", 1),
                ("difficult", 1),
                ("hard", 1),
                ("streak", 1),
            ],
            SkillTag::General => &[],
        }
    }
}

impl fmt::Display for SkillTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The best-matching persona for one piece of learner text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
    pub skill: SkillTag,
    pub confidence: f32,
}

impl ClassificationResult {
    pub fn general() -> Self {
        Self {
            skill: SkillTag::General,
            confidence: 0.0,
        }
    }

    /// Whether this result is strong enough to replace the active persona.
    pub fn should_switch(&self) -> bool {
        self.skill != SkillTag::General && self.confidence > SWITCH_THRESHOLD
    }
}

#[derive(Debug, Clone, Copy)]
struct PersonaScore {
    skill: SkillTag,
    score: u32,
    longest_match: usize,
}

/// Classifies `text` with no active persona preference.
pub fn classify(text: &str) -> ClassificationResult {
    classify_with_active(text, SkillTag::General)
}

/// Classifies `text`, preferring `active` when two personas tie.
pub fn classify_with_active(text: &str, active: SkillTag) -> ClassificationResult {
    let padded = format!(" {} ", normalize(text));
    if padded.trim().is_empty() {
        return ClassificationResult::general();
    }

    let best = SkillTag::PRIORITY
        .iter()
        .map(|&skill| score_persona(skill, &padded))
        .filter(|s| s.score >= SCORE_FLOOR)
        .max_by(|a, b| {
            a.score
                .cmp(&b.score)
                .then(a.longest_match.cmp(&b.longest_match))
                .then((a.skill == active).cmp(&(b.skill == active)))
                .then(b.skill.priority_rank().cmp(&a.skill.priority_rank()))
        });

    match best {
        Some(s) => ClassificationResult {
            skill: s.skill,
            confidence: saturate(s.score),
        },
        None => ClassificationResult::general(),
    }
}

fn score_persona(skill: SkillTag, padded_text: &str) -> PersonaScore {
    let mut score = 0;
    let mut longest_match = 0;
    for (cue, weight) in skill.cues() {
        let needle = format!(" {} ", normalize(cue));
        if padded_text.contains(&needle) {
            score += weight;
            longest_match = longest_match.max(needle.trim().chars().count());
        }
    }
    PersonaScore {
        skill,
        score,
        longest_match,
    }
}

/// Maps a raw weighted score onto `[0, 1]`.
fn saturate(score: u32) -> f32 {
    match score {
        0 => 0.0,
        1 => 0.4,
        2 => 0.7,
        3 => 0.8,
        4 => 0.9,
        _ => 0.95,
    }
}

/// Lowercases and collapses `text` into space-separated words.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(is_separator)
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_separator(c: char) -> bool {
    c.is_whitespace()
        || (c.is_ascii() && !c.is_ascii_alphanumeric())
        || matches!(c, '।' | '‘' | '’' | '“' | '”' | '…' | '¿' | '¡')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiz_request_selects_quiz_master() {
        let result = classify("quiz me on this chapter");
        assert_eq!(result.skill, SkillTag::QuizMaster);
        assert!(result.confidence >= 0.7);
        assert!(result.should_switch());
    }

    #[test]
    fn test_greeting_stays_below_threshold() {
        let result = classify("hello");
        assert!(result.skill == SkillTag::General || result.confidence <= SWITCH_THRESHOLD);
        assert!(!result.should_switch());
    }

    #[test]
    fn test_explain_selects_concept_explainer() {
        let result = classify("Explain neural networks");
        assert_eq!(result.skill, SkillTag::ConceptExplainer);
        assert!((result.confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_empty_and_unrelated_input_is_general() {
        assert_eq!(classify(""), ClassificationResult::general());
        assert_eq!(classify("   ?!  "), ClassificationResult::general());
        assert_eq!(classify("the weather is nice"), ClassificationResult::general());
    }

    #[test]
    fn test_single_weak_cue_does_not_switch() {
        let result = classify("I'm bored");
        assert_eq!(result.skill, SkillTag::ProgressMotivator);
        assert!((result.confidence - 0.4).abs() < f32::EPSILON);
        assert!(!result.should_switch());
    }

    #[test]
    fn test_matching_is_case_insensitive_and_word_bounded() {
        assert_eq!(classify("QUIZ ME!").skill, SkillTag::QuizMaster);
        // "testing" must not match the "test" cue.
        assert_eq!(classify("testing").skill, SkillTag::General);
    }

    #[test]
    fn test_saturation_curve_is_monotonic() {
        let mut last = 0.0;
        for score in 0..8 {
            let c = saturate(score);
            assert!(c >= last);
            assert!((0.0..=1.0).contains(&c));
            last = c;
        }
    }

    #[test]
    fn test_tie_prefers_longer_match() {
        // "hint" (socratic, 2) vs "practice" (quiz, 2): the longer phrase wins.
        let result = classify("hint practice");
        assert_eq!(result.skill, SkillTag::QuizMaster);
    }

    #[test]
    fn test_tie_prefers_active_then_priority() {
        // "quiz" (1) and "hard" (1) are tied in score and length.
        assert_eq!(classify("quiz hard").skill, SkillTag::QuizMaster);
        assert_eq!(
            classify_with_active("quiz hard", SkillTag::ProgressMotivator).skill,
            SkillTag::ProgressMotivator
        );
    }

    #[test]
    fn test_devanagari_cue() {
        let result = classify("न्यूरॉन समझाओ");
        assert_eq!(result.skill, SkillTag::ConceptExplainer);
        assert!(result.should_switch());
    }

    #[test]
    fn test_skill_tag_serialization() {
        assert_eq!(
            serde_json::to_string(&SkillTag::ConceptExplainer).unwrap(),
            "\"concept-explainer\""
        );
        let tag: SkillTag = serde_json::from_str("\"progress-motivator\"").unwrap();
        assert_eq!(tag, SkillTag::ProgressMotivator);
        assert_eq!(SkillTag::QuizMaster.to_string(), "quiz-master");
    }
}
