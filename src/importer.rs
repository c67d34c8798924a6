//! Type definitions for the `conversations.json` exports we understand, and
//! their conversion into [`Conversation`].
//!
//! Both applications store a conversation as a `mapping` of message nodes
//! linked by `parent` / `children` ids. The visible thread is found by starting
//! at a root and repeatedly following the first child; alternative branches
//! (regenerated answers, edited prompts) are not exported.
//!
//! DeepSeek:
//! ```json
//! {"id": "...", "title": "...", "inserted_at": "2025-01-01T00:00:00Z", "updated_at": "...",
//!  "mapping": {"root": {"id": "root", "parent": null, "children": ["1"], "message": null},
//!              "1": {"id": "1", "parent": "root", "children": [], "message": {
//!                   "model": "deepseek-reasoner", "files": [], "inserted_at": "...",
//!                   "fragments": [{"type": "REQUEST", "content": "..."}]}}}}
//! ```
//!
//! ChatGPT:
//! ```json
//! {"title": "...", "conversation_id": "...", "create_time": 1700000000.0, "update_time": 1700000100.0,
//!  "mapping": {"a": {"id": "a", "parent": null, "children": ["b"], "message": null},
//!              "b": {"id": "b", "parent": "a", "children": [], "message": {
//!                   "author": {"role": "user"},
//!                   "content": {"content_type": "text", "parts": ["..."]}}}}}
//! ```
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use eyre::{Context, Result, bail, eyre};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::model::{Conversation, Format, Message, Role};
use crate::utils::format_timestamp;

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read the export file and return its top-level records.
///
/// Individual records are kept as raw JSON so that one malformed conversation
/// only fails itself.
pub fn load_export(path: &Path) -> Result<Vec<Value>> {
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read export file: {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .wrap_err_with(|| format!("Failed to parse JSON in {}", path.display()))?;
    match value {
        Value::Array(records) => Ok(records),
        other => Err(eyre!(
            "Expected a JSON array of conversations in {}, found {}",
            path.display(),
            json_kind(&other)
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Best-effort title of a raw record, for log lines written before parsing.
pub fn peek_title(record: &Value) -> Option<&str> {
    record.get("title").and_then(Value::as_str)
}

/// Convert one raw record. `index` is the 1-based position in the export.
pub fn import_conversation(format: Format, record: &Value, index: usize) -> Result<Conversation> {
    match format {
        Format::DeepSeek => {
            let raw = DeepSeekConversation::deserialize(record)
                .wrap_err("Malformed DeepSeek conversation record")?;
            from_deepseek(raw)
        }
        Format::ChatGpt => {
            let raw = ChatGptConversation::deserialize(record)
                .wrap_err("Malformed ChatGPT conversation record")?;
            from_chatgpt(raw, index)
        }
    }
}

/// Treat an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn attachment_name(file: &Value) -> Option<String> {
    ["file_name", "name", "filename"]
        .iter()
        .find_map(|key| file.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

// ---------------------------------------------------------------------------
// DeepSeek
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DeepSeekConversation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub inserted_at: Value,
    #[serde(default)]
    pub updated_at: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mapping: HashMap<String, DeepSeekNode>,
}

#[derive(Debug, Deserialize)]
pub struct DeepSeekNode {
    #[serde(default, deserialize_with = "null_as_default")]
    pub children: Vec<String>,
    #[serde(default)]
    pub message: Option<DeepSeekMessage>,
}

#[derive(Debug, Deserialize)]
pub struct DeepSeekMessage {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub files: Vec<Value>,
    #[serde(default)]
    pub inserted_at: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fragments: Vec<Fragment>,
}

#[derive(Debug, Deserialize)]
pub struct Fragment {
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Text for REQUEST, THINK and RESPONSE fragments. Other kinds (search
    /// results, tool calls) may carry arbitrary JSON here and are skipped.
    #[serde(default)]
    pub content: Value,
}

const DEEPSEEK_ROOT: &str = "root";

fn from_deepseek(raw: DeepSeekConversation) -> Result<Conversation> {
    let mut messages = Vec::new();

    let mut current = match raw.mapping.get(DEEPSEEK_ROOT) {
        None => None,
        Some(root) => Some(
            root.children
                .first()
                .ok_or_else(|| eyre!("Root node has no children"))?
                .as_str(),
        ),
    };

    let mut visited = HashSet::new();
    while let Some(id) = current {
        let Some(node) = raw.mapping.get(id) else {
            break;
        };
        if !visited.insert(id) {
            bail!("Message chain loops back to node {:?}", id);
        }
        if let Some(msg) = &node.message {
            messages.extend(deepseek_messages(msg));
        }
        current = node.children.first().map(String::as_str);
    }

    Ok(Conversation {
        source: Format::DeepSeek,
        id: raw.id.unwrap_or_else(|| "unknown".to_string()),
        title: raw.title,
        created_at: format_timestamp(&raw.inserted_at),
        updated_at: format_timestamp(&raw.updated_at),
        messages,
        chain_count: None,
    })
}

/// Split one DeepSeek node into a user message and/or an assistant message.
fn deepseek_messages(msg: &DeepSeekMessage) -> Vec<Message> {
    let collect = |kind: &str| -> String {
        msg.fragments
            .iter()
            .filter(|f| f.kind.eq_ignore_ascii_case(kind))
            .map(|f| f.content.as_str().unwrap_or(""))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    };
    let request = collect("REQUEST");
    let think = collect("THINK");
    let response = collect("RESPONSE");

    let timestamp = non_empty(format_timestamp(&msg.inserted_at));
    let mut attachments: Vec<Option<String>> = msg.files.iter().map(attachment_name).collect();
    let mut out = Vec::new();

    if !request.is_empty() {
        let mut user = Message::new(Role::User, request);
        user.attachments = std::mem::take(&mut attachments);
        user.timestamp = timestamp.clone();
        out.push(user);
    }

    if !think.is_empty() || !response.is_empty() {
        let mut assistant = Message::new(Role::Assistant, response);
        assistant.thinking = non_empty(think);
        assistant.model = msg.model.clone();
        assistant.attachments = attachments;
        assistant.timestamp = timestamp;
        out.push(assistant);
    }

    out
}

// ---------------------------------------------------------------------------
// ChatGPT
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChatGptConversation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub create_time: Value,
    #[serde(default)]
    pub update_time: Value,
    /// Document order matters: roots are walked in the order they appear.
    #[serde(default, deserialize_with = "null_as_default")]
    pub mapping: IndexMap<String, ChatGptNode>,
}

#[derive(Debug, Deserialize)]
pub struct ChatGptNode {
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub children: Vec<String>,
    #[serde(default)]
    pub message: Option<ChatGptMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatGptMessage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub author: ChatGptAuthor,
    #[serde(default)]
    pub content: Option<ChatGptContent>,
    #[serde(default)]
    pub create_time: Value,
    #[serde(default)]
    pub metadata: Option<ChatGptMetadata>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatGptAuthor {
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatGptContent {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parts: Vec<Value>,
    /// Present on `code` and `execution_output` content.
    #[serde(default)]
    pub text: Option<String>,
    /// Present on `thoughts` content (reasoning models).
    #[serde(default, deserialize_with = "null_as_default")]
    pub thoughts: Vec<ChatGptThought>,
}

#[derive(Debug, Deserialize)]
pub struct ChatGptThought {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatGptMetadata {
    #[serde(default)]
    pub model_slug: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<Value>,
}

fn from_chatgpt(raw: ChatGptConversation, index: usize) -> Result<Conversation> {
    let roots: Vec<&str> = raw
        .mapping
        .iter()
        .filter(|(_, node)| node.parent.is_none())
        .map(|(id, _)| id.as_str())
        .collect();

    let mut messages = Vec::new();
    let mut visited = HashSet::new();

    for root in &roots {
        let mut current = Some(*root);
        while let Some(id) = current {
            let Some(node) = raw.mapping.get(id) else {
                break;
            };
            if !visited.insert(id) {
                bail!("Message chain loops back to node {:?}", id);
            }
            if let Some(msg) = &node.message
                && let Some(message) = chatgpt_message(msg)
            {
                messages.push(message);
            }
            current = node.children.first().map(String::as_str);
        }
    }

    let id = raw
        .conversation_id
        .or(raw.id)
        .unwrap_or_else(|| format!("unknown_{}", index));

    Ok(Conversation {
        source: Format::ChatGpt,
        id,
        title: raw.title,
        created_at: format_timestamp(&raw.create_time),
        updated_at: format_timestamp(&raw.update_time),
        messages,
        chain_count: Some(roots.len()),
    })
}

fn chatgpt_message(msg: &ChatGptMessage) -> Option<Message> {
    let content = msg.content.as_ref()?;
    let role = Role::from_author(msg.author.role.as_deref().unwrap_or(""));

    let thinking = non_empty(
        content
            .thoughts
            .iter()
            .filter_map(|t| {
                t.content
                    .as_deref()
                    .filter(|c| !c.trim().is_empty())
                    .or(t.summary.as_deref())
            })
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
    );

    let mut text = content
        .parts
        .iter()
        .filter_map(|part| match part {
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            Value::Object(obj) => Some(format!(
                "[{}]",
                obj.get("content_type")
                    .and_then(Value::as_str)
                    .unwrap_or("attachment")
            )),
            other => Some(other.to_string()),
        })
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty()
        && let Some(t) = &content.text
    {
        text = t.clone();
    }

    if text.trim().is_empty() && thinking.is_none() {
        return None;
    }

    let mut message = Message::new(role, text);
    message.thinking = thinking;
    message.timestamp = non_empty(format_timestamp(&msg.create_time));
    if let Some(meta) = &msg.metadata {
        message.model = meta.model_slug.clone();
        message.attachments = meta.attachments.iter().map(attachment_name).collect();
    }
    Some(message)
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

const INSPECT_NODES: usize = 3;
const PREVIEW_CHARS: usize = 80;

fn preview(text: &str) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > PREVIEW_CHARS {
        let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}

fn describe_message(out: &mut String, message: &Value) {
    if let Some(role) = message.pointer("/author/role").and_then(Value::as_str) {
        let _ = writeln!(out, "Role: {}", role);
    }
    if let Some(model) = message.get("model").and_then(Value::as_str) {
        let _ = writeln!(out, "Model: {}", model);
    }
    if let Some(fragments) = message.get("fragments").and_then(Value::as_array) {
        for fragment in fragments {
            let kind = fragment.get("type").and_then(Value::as_str).unwrap_or("?");
            let text = fragment.get("content").and_then(Value::as_str).unwrap_or("");
            let _ = writeln!(out, "Fragment [{}]: {}", kind, preview(text));
        }
    }
    if let Some(content) = message.get("content").filter(|c| c.is_object()) {
        let kind = content
            .get("content_type")
            .and_then(Value::as_str)
            .unwrap_or("?");
        let parts = content.get("parts").and_then(Value::as_array);
        let _ = writeln!(
            out,
            "Content type: {} ({} part(s))",
            kind,
            parts.map_or(0, Vec::len)
        );
        if let Some(first) = parts.and_then(|p| p.first()).and_then(Value::as_str) {
            let _ = writeln!(out, "First part: {}", preview(first));
        }
    }
}

/// Describe the structure of the first record, for figuring out why an export
/// does not convert the way it should.
pub fn inspect_first(records: &[Value]) -> Result<String> {
    let first = records
        .first()
        .ok_or_else(|| eyre!("The export contains no conversations"))?;
    let text = |key: &str| first.get(key).map(format_timestamp).unwrap_or_default();

    let mut out = String::new();
    let _ = writeln!(out, "=== First conversation ===");
    let _ = writeln!(out, "Title: {}", peek_title(first).unwrap_or("(none)"));
    let id = first
        .get("id")
        .or_else(|| first.get("conversation_id"))
        .and_then(Value::as_str)
        .unwrap_or("(none)");
    let _ = writeln!(out, "ID: {}", id);
    for key in ["inserted_at", "create_time", "updated_at", "update_time"] {
        if first.get(key).is_some() {
            let _ = writeln!(out, "{}: {}", key, text(key));
        }
    }

    let mapping: IndexMap<String, Value> = match first.get("mapping") {
        Some(m) => IndexMap::<String, Value>::deserialize(m)
            .wrap_err("`mapping` is not an object")?,
        None => IndexMap::new(),
    };
    let _ = writeln!(out, "Nodes in mapping: {}", mapping.len());

    for (i, (id, node)) in mapping.iter().take(INSPECT_NODES).enumerate() {
        let _ = writeln!(out);
        let _ = writeln!(out, "--- Node {} ({}) ---", i + 1, id);
        let parent = node.get("parent").and_then(Value::as_str).unwrap_or("(none)");
        let _ = writeln!(out, "Parent: {}", parent);
        let children = node.get("children").cloned().unwrap_or(Value::Null);
        let _ = writeln!(out, "Children: {}", children);
        match node.get("message").filter(|m| !m.is_null()) {
            Some(message) => describe_message(&mut out, message),
            None => {
                let _ = writeln!(out, "Message: (none)");
            }
        }
    }

    Ok(out)
}
