//! Shared test utilities for integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::{Value, json};
use tempfile::TempDir;

/// A scratch working directory holding a `conversations.json`.
pub struct ExportDir {
    temp_dir: TempDir,
}

impl ExportDir {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, rel: &str) -> PathBuf {
        self.temp_dir.path().join(rel)
    }

    /// Write `conversations.json` with the given top-level records.
    pub fn with_records(self, records: Vec<Value>) -> Self {
        self.with_raw(&serde_json::to_string_pretty(&Value::Array(records)).unwrap())
    }

    pub fn with_raw(self, content: &str) -> Self {
        fs::write(self.join("conversations.json"), content)
            .expect("Failed to write conversations.json");
        self
    }

    /// The binary, run inside this directory with no user config in reach.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_deepseek-chat-export"));
        cmd.current_dir(self.path())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.join("config"))
            .env_remove("RUST_LOG");
        cmd
    }

    /// Sorted names of the markdown files in `dir` (relative to this directory).
    pub fn markdown_files(&self, dir: &str) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.join(dir))
            .expect("Failed to read output dir")
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".md"))
            .collect();
        names.sort();
        names
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.join(rel)).unwrap_or_else(|e| panic!("Failed to read {rel}: {e}"))
    }
}

/// Builder for DeepSeek conversation records.
pub struct DeepSeekBuilder {
    id: String,
    title: Value,
    turns: Vec<Value>,
}

impl DeepSeekBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: Value::Null,
            turns: Vec::new(),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = json!(title);
        self
    }

    pub fn user(mut self, text: &str) -> Self {
        self.turns.push(json!({
            "model": "deepseek-chat",
            "files": [],
            "inserted_at": "2025-05-01T09:00:00Z",
            "fragments": [{"type": "REQUEST", "content": text}]
        }));
        self
    }

    pub fn assistant(mut self, think: Option<&str>, response: &str) -> Self {
        let mut fragments = Vec::new();
        if let Some(think) = think {
            fragments.push(json!({"type": "THINK", "content": think}));
        }
        fragments.push(json!({"type": "RESPONSE", "content": response}));
        self.turns.push(json!({
            "model": "deepseek-reasoner",
            "files": [],
            "inserted_at": "2025-05-01T09:00:05Z",
            "fragments": fragments
        }));
        self
    }

    pub fn build(self) -> Value {
        let mut mapping = serde_json::Map::new();
        let first_child = if self.turns.is_empty() {
            vec![]
        } else {
            vec![json!("1")]
        };
        mapping.insert(
            "root".into(),
            json!({"id": "root", "parent": null, "children": first_child, "message": null}),
        );
        let count = self.turns.len();
        for (i, message) in self.turns.into_iter().enumerate() {
            let id = (i + 1).to_string();
            let parent = if i == 0 { "root".to_string() } else { i.to_string() };
            let children = if i + 1 < count {
                vec![json!((i + 2).to_string())]
            } else {
                vec![]
            };
            mapping.insert(
                id.clone(),
                json!({"id": id, "parent": parent, "children": children, "message": message}),
            );
        }
        json!({
            "id": self.id,
            "title": self.title,
            "inserted_at": "2025-05-01T09:00:00Z",
            "updated_at": "2025-05-01T09:10:00Z",
            "mapping": mapping
        })
    }
}

/// A small ChatGPT record with one user prompt and one answer.
pub fn chatgpt_record(title: &str, prompt: &str, answer: &str) -> Value {
    json!({
        "title": title,
        "conversation_id": format!("cg-{title}"),
        "create_time": 1714550400.0,
        "update_time": 1714550460.0,
        "mapping": {
            "n0": {"id": "n0", "parent": null, "children": ["n1"], "message": null},
            "n1": {"id": "n1", "parent": "n0", "children": ["n2"], "message": {
                "author": {"role": "user"},
                "content": {"content_type": "text", "parts": [prompt]}
            }},
            "n2": {"id": "n2", "parent": "n1", "children": [], "message": {
                "author": {"role": "assistant"},
                "content": {"content_type": "text", "parts": [answer]},
                "metadata": {"model_slug": "gpt-4o"}
            }}
        }
    })
}
