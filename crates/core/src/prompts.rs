//! System prompt construction.
//!
//! Each persona contributes a fixed block of instructions, looked up by
//! [`SkillTag`]. The general persona adds nothing on top of the base prompt.

use crate::skill::SkillTag;

const BASE_PROMPT: &str = "You are a friendly, patient AI tutor. You help a learner \
understand the material they are currently studying. Keep answers short (under 150 words), \
accurate and encouraging. Use simple language and at most one worked example per answer. \
If the learner asks about something unrelated to studying, gently steer them back.";

const CONCEPT_EXPLAINER_PROMPT: &str = "## Persona: Concept Explainer\n\
Explain ideas step by step, starting from what the learner already knows. \
Use an everyday analogy, then the precise definition, then one concrete example. \
Finish by checking understanding with a single short question.";

const QUIZ_MASTER_PROMPT: &str = "## Persona: Quiz Master\n\
Test the learner with one question at a time about the current chapter. \
Prefer multiple-choice questions with four options labelled A-D. \
When the learner answers, say whether it is correct, explain why in one or two sentences, \
and then ask the next question.";

const SOCRATIC_TUTOR_PROMPT: &str = "## Persona: Socratic Tutor\n\
Never give the final answer directly. Guide the learner with probing questions, \
one at a time, and offer a small hint only when they are stuck. \
Acknowledge correct reasoning before asking the next question.";

const PROGRESS_MOTIVATOR_PROMPT: &str = "## Persona: Progress Motivator\n\
Be warm and encouraging. Acknowledge the effort the learner has made, \
normalize difficulty as part of learning, and suggest one small, achievable next step. \
Keep the tone upbeat without being dismissive of their frustration.";

/// The persona block for `skill`, or `None` for the general persona.
pub fn persona_prompt(skill: SkillTag) -> Option<&'static str> {
    match skill {
        SkillTag::ConceptExplainer => Some(CONCEPT_EXPLAINER_PROMPT),
        SkillTag::QuizMaster => Some(QUIZ_MASTER_PROMPT),
        SkillTag::SocraticTutor => Some(SOCRATIC_TUTOR_PROMPT),
        SkillTag::ProgressMotivator => Some(PROGRESS_MOTIVATOR_PROMPT),
        SkillTag::General => None,
    }
}

/// Builds the system prompt for one turn.
///
/// # Arguments
///
/// * `skill` - The persona active for this turn.
/// * `context` - The chapter or topic the host mounted the tutor for.
/// * `respond_in` - Display name of the learner's language when it is not the
///   default one (e.g. `"Hindi"`).
pub fn build_system_prompt(skill: SkillTag, context: &str, respond_in: Option<&str>) -> String {
    let mut prompt = String::from(BASE_PROMPT);

    if let Some(persona) = persona_prompt(skill) {
        prompt.push_str("\n\n");
        prompt.push_str(persona);
    }

    prompt.push_str("\n\n# Current Context for This Turn\n\n");
    if context.trim().is_empty() {
        prompt.push_str("**Chapter:** general study session");
    } else {
        prompt.push_str(&format!("**Chapter:** {}", context.trim()));
    }

    if let Some(language) = respond_in {
        prompt.push_str(&format!(
            "\n**Language:** Respond in {language}. Keep technical terms in English where a translation would be unclear."
        ));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_persona_except_general_has_a_prompt() {
        for skill in SkillTag::PRIORITY {
            assert!(persona_prompt(skill).is_some(), "{skill} has no prompt");
        }
        assert!(persona_prompt(SkillTag::General).is_none());
    }

    #[test]
    fn test_system_prompt_contains_persona_and_context() {
        let prompt = build_system_prompt(SkillTag::QuizMaster, "Photosynthesis", None);
        assert!(prompt.starts_with(BASE_PROMPT));
        assert!(prompt.contains(QUIZ_MASTER_PROMPT));
        assert!(prompt.contains("**Chapter:** Photosynthesis"));
        assert!(!prompt.contains("**Language:**"));
    }

    #[test]
    fn test_general_prompt_has_no_persona_block() {
        let prompt = build_system_prompt(SkillTag::General, "", Some("Hindi"));
        assert!(!prompt.contains("## Persona"));
        assert!(prompt.contains("general study session"));
        assert!(prompt.contains("Respond in Hindi"));
    }
}
