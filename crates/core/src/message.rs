//! Conversation data model.
//!
//! A conversation is an ordered list of immutable [`Message`]s. Each message
//! may carry a secondary-language rendering alongside its primary content so
//! the host can show either one without retranslating history.

use crate::skill::SkillTag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The ordered message history of one learner.
pub type Conversation = Vec<Message>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// The language the learner is currently working in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Primary,
    Secondary,
}

impl Language {
    /// Returns the other language.
    pub fn toggled(self) -> Self {
        match self {
            Language::Primary => Language::Secondary,
            Language::Secondary => Language::Primary,
        }
    }
}

/// BCP-47 tags and display names bound to the two logical languages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageTags {
    pub primary: String,
    pub secondary: String,
}

impl LanguageTags {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    /// The BCP-47 tag for `language` (e.g. `hi-IN`).
    pub fn tag(&self, language: Language) -> &str {
        match language {
            Language::Primary => &self.primary,
            Language::Secondary => &self.secondary,
        }
    }

    /// A human-readable name for `language`, used in prompts.
    pub fn display_name(&self, language: Language) -> String {
        let tag = self.tag(language);
        let base = tag.split(['-', '_']).next().unwrap_or(tag);
        match base.to_ascii_lowercase().as_str() {
            "en" => "English".to_string(),
            "hi" => "Hindi".to_string(),
            "es" => "Spanish".to_string(),
            "fr" => "French".to_string(),
            "de" => "German".to_string(),
            "mr" => "Marathi".to_string(),
            "bn" => "Bengali".to_string(),
            "ta" => "Tamil".to_string(),
            _ => tag.to_string(),
        }
    }
}

impl Default for LanguageTags {
    fn default() -> Self {
        Self::new("en-US", "hi-IN")
    }
}

/// A single turn authored by either the learner or the tutor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_secondary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<SkillTag>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a learner message stamped with the current time.
    pub fn user(content: impl Into<String>, skill: SkillTag) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            content_secondary: None,
            skill: Some(skill),
            timestamp: Utc::now(),
        }
    }

    /// Creates a tutor message stamped with the current time.
    pub fn assistant(
        content: impl Into<String>,
        content_secondary: Option<String>,
        skill: SkillTag,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            content_secondary,
            skill: Some(skill),
            timestamp: Utc::now(),
        }
    }

    /// The rendering of this message to show or speak in `language`.
    pub fn text_for(&self, language: Language) -> &str {
        match (language, &self.content_secondary) {
            (Language::Secondary, Some(secondary)) if !secondary.trim().is_empty() => secondary,
            _ => &self.content,
        }
    }
}
