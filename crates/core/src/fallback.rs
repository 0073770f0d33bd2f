//! Locally generated replies.
//!
//! When the completion endpoint cannot be reached the tutor still answers,
//! using a canned reply chosen by persona and a few keyword rules over the
//! learner's text. Every canned reply has a primary and a secondary rendering.

use crate::{
    gateway::{Reply, ReplySource},
    message::Message,
    skill::SkillTag,
};

/// What the learner's text looks like, as far as canned replies care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Greeting,
    Thanks,
    Definition,
    Practice,
    Other,
}

fn detect_intent(user_text: &str) -> Intent {
    let lower = user_text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || (c.is_ascii() && !c.is_ascii_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect();
    let has_word = |candidates: &[&str]| words.iter().any(|w| candidates.contains(w));

    if has_word(&["thanks", "thank", "thx", "धन्यवाद", "शुक्रिया"]) {
        Intent::Thanks
    } else if lower.contains("what is") || lower.contains("what are") || has_word(&["define", "meaning", "क्या"]) {
        Intent::Definition
    } else if has_word(&["quiz", "test", "practice", "questions"]) {
        Intent::Practice
    } else if has_word(&["hello", "hi", "hey", "namaste", "नमस्ते"]) {
        Intent::Greeting
    } else {
        Intent::Other
    }
}

fn chapter(context: &str) -> &str {
    let trimmed = context.trim();
    if trimmed.is_empty() { "this chapter" } else { trimmed }
}

/// Builds the canned reply for `skill` given the learner's text.
pub fn canned_reply(skill: SkillTag, user_text: &str, context: &str) -> Reply {
    let topic = chapter(context);
    let (primary, secondary) = match (detect_intent(user_text), skill) {
        (Intent::Greeting, _) => (
            format!("Hello! I'm here to help you with {topic}. What would you like to work on?"),
            format!("नमस्ते! मैं {topic} में आपकी मदद के लिए यहाँ हूँ। आप किस पर काम करना चाहेंगे?"),
        ),
        (Intent::Thanks, _) => (
            "You're welcome! Keep going, you're doing great.".to_string(),
            "आपका स्वागत है! ऐसे ही आगे बढ़ते रहिए, आप बहुत अच्छा कर रहे हैं।".to_string(),
        ),
        (Intent::Practice, SkillTag::QuizMaster) | (Intent::Other, SkillTag::QuizMaster) => (
            format!(
                "I can't reach the quiz generator right now. Try this instead: write down three key terms from {topic} and explain each one in a single sentence."
            ),
            format!(
                "अभी मैं क्विज़ नहीं बना पा रहा हूँ। इसके बजाय यह आज़माइए: {topic} से तीन मुख्य शब्द लिखिए और हर एक को एक वाक्य में समझाइए।"
            ),
        ),
        (Intent::Definition, _) | (Intent::Other, SkillTag::ConceptExplainer) => (
            format!(
                "I'm having trouble connecting right now. A good way to understand a new idea in {topic}: find its definition in your notes, rewrite it in your own words, and think of one everyday example."
            ),
            format!(
                "अभी कनेक्ट करने में दिक्कत हो रही है। {topic} के किसी नए विचार को समझने का अच्छा तरीका: अपने नोट्स में उसकी परिभाषा ढूँढिए, उसे अपने शब्दों में लिखिए और रोज़मर्रा का एक उदाहरण सोचिए।"
            ),
        ),
        (_, SkillTag::SocraticTutor) => (
            "Let's think about it together. What do you already know about this, and which part feels unclear?".to_string(),
            "आइए साथ मिलकर सोचें। इसके बारे में आप पहले से क्या जानते हैं, और कौन सा हिस्सा साफ़ नहीं है?".to_string(),
        ),
        (_, SkillTag::ProgressMotivator) => (
            "Every bit of practice counts. Take a short break if you need one, then try one small step. You've got this!".to_string(),
            "हर थोड़ी सी मेहनत मायने रखती है। ज़रूरत हो तो छोटा सा ब्रेक लीजिए, फिर एक छोटा कदम उठाइए। आप यह कर सकते हैं!".to_string(),
        ),
        (Intent::Practice, _) => (
            format!("Practice is a great idea! Try answering the review questions at the end of {topic}, and ask me about any you find tricky."),
            format!("अभ्यास करना बहुत अच्छा विचार है! {topic} के अंत में दिए गए प्रश्नों के उत्तर दीजिए, और जो कठिन लगें उनके बारे में मुझसे पूछिए।"),
        ),
        _ => (
            format!(
                "I'm having trouble connecting right now, but I'm still here. Could you rephrase your question about {topic}, or try again in a moment?"
            ),
            format!(
                "अभी कनेक्ट करने में दिक्कत हो रही है, पर मैं यहीं हूँ। क्या आप {topic} के बारे में अपना प्रश्न दूसरे शब्दों में पूछ सकते हैं, या थोड़ी देर बाद फिर से कोशिश करेंगे?"
            ),
        ),
    };

    Reply {
        content: primary,
        content_secondary: Some(secondary),
        source: ReplySource::Fallback,
    }
}

/// The synthesized greeting that opens every conversation.
pub fn welcome_message(context: &str) -> Message {
    let topic = chapter(context);
    Message::assistant(
        format!(
            "Hi! I'm your AI tutor for {topic}. I can explain concepts, quiz you, guide you with questions, or help you stay motivated. What would you like to do?"
        ),
        Some(format!(
            "नमस्ते! मैं {topic} के लिए आपका AI ट्यूटर हूँ। मैं विषय समझा सकता हूँ, क्विज़ ले सकता हूँ, प्रश्नों से आपका मार्गदर्शन कर सकता हूँ या आपको प्रेरित रख सकता हूँ। आप क्या करना चाहेंगे?"
        )),
        SkillTag::General,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn test_intent_detection() {
        assert_eq!(detect_intent("Hello there"), Intent::Greeting);
        assert_eq!(detect_intent("thanks a lot!"), Intent::Thanks);
        assert_eq!(detect_intent("What is osmosis?"), Intent::Definition);
        assert_eq!(detect_intent("give me a practice test"), Intent::Practice);
        assert_eq!(detect_intent("this is fine"), Intent::Other);
        // "this" must not count as the greeting "hi".
        assert_eq!(detect_intent("this"), Intent::Other);
    }

    #[test]
    fn test_every_persona_gets_a_bilingual_reply() {
        let inputs = ["hello", "thanks", "what is a cell", "quiz me", "hmm"];
        for skill in SkillTag::PRIORITY.into_iter().chain([SkillTag::General]) {
            for input in inputs {
                let reply = canned_reply(skill, input, "Cell Biology");
                assert!(!reply.content.trim().is_empty());
                assert!(reply.content_secondary.as_deref().is_some_and(|s| !s.is_empty()));
                assert_eq!(reply.source, ReplySource::Fallback);
            }
        }
    }

    #[test]
    fn test_reply_mentions_context() {
        let reply = canned_reply(SkillTag::QuizMaster, "quiz me", "Cell Biology");
        assert!(reply.content.contains("Cell Biology"));

        let reply = canned_reply(SkillTag::General, "", "");
        assert!(reply.content.contains("this chapter"));
    }

    #[test]
    fn test_welcome_message() {
        let msg = welcome_message("Neural Networks");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.skill, Some(SkillTag::General));
        assert!(msg.content.contains("Neural Networks"));
        assert!(msg.content_secondary.is_some());
    }
}
