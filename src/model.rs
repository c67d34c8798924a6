//! Format-independent view of one exported conversation.
//!
//! Both export formats are converted into these types by [`crate::importer`]
//! and rendered by [`crate::renderer`]. Values are built once and never mutated.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which application produced the `conversations.json` file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    #[value(name = "deepseek")]
    DeepSeek,
    #[value(name = "chatgpt")]
    ChatGpt,
}

impl Format {
    /// Name of the application, as shown in headings and the report banner.
    pub fn display_name(self) -> &'static str {
        match self {
            Format::DeepSeek => "DeepSeek",
            Format::ChatGpt => "ChatGPT",
        }
    }

    pub fn default_output_dir(self) -> &'static str {
        match self {
            Format::DeepSeek => "DeepSeek_Conversations",
            Format::ChatGpt => "ChatGPT_Conversations",
        }
    }

    pub fn default_log_file(self) -> &'static str {
        match self {
            Format::DeepSeek => "deepseek_conversion_log.txt",
            Format::ChatGpt => "chatgpt_conversion_log.txt",
        }
    }

    pub fn default_report_file(self) -> &'static str {
        match self {
            Format::DeepSeek => "export_report.txt",
            Format::ChatGpt => "chatgpt_export_report.txt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
    Other(String),
}

impl Role {
    pub fn from_author(role: &str) -> Self {
        match role {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            other => Role::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
            Role::System => write!(f, "System"),
            Role::Tool => write!(f, "Tool"),
            Role::Other(name) if name.is_empty() => write!(f, "Unknown"),
            Role::Other(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    /// Answer or prompt text. May be empty for thinking-only messages.
    pub content: String,
    /// Reasoning trace attached to an assistant message.
    pub thinking: Option<String>,
    pub model: Option<String>,
    /// Display names of attached files. Unnamed attachments are kept as `None`
    /// so the count stays right.
    pub attachments: Vec<Option<String>>,
    pub timestamp: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            thinking: None,
            model: None,
            attachments: Vec::new(),
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub source: Format,
    pub id: String,
    pub title: Option<String>,
    /// Display-formatted creation time (empty when unknown).
    pub created_at: String,
    /// Display-formatted last update time (empty when unknown).
    pub updated_at: String,
    pub messages: Vec<Message>,
    /// Number of root chains walked. Only ChatGPT exports have more than one.
    pub chain_count: Option<usize>,
}

impl Conversation {
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => "Untitled conversation",
        }
    }

    /// First model name mentioned by any assistant message.
    pub fn primary_model(&self) -> Option<&str> {
        self.messages.iter().find_map(|m| m.model.as_deref())
    }
}
