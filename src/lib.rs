//! # deepseek-chat-export
//!
//! A CLI tool that turns the `conversations.json` file from a DeepSeek (or
//! ChatGPT) data export into a folder of Markdown files, one per conversation.
//!
//! ## What it does
//!
//! Both services export every conversation as a tree of message nodes. This
//! tool follows the visible thread of each tree, renders it as Markdown with a
//! short metadata header, and keeps the model's reasoning ("thinking") in a
//! quoted block apart from the final answer.
//!
//! Every run appends to a conversion log and writes a plain-text report with
//! the number of conversations exported and the ones that failed. A malformed
//! conversation is logged and skipped; it never stops the rest of the batch.
//!
//! ## Usage
//!
//! ```sh
//! # Run next to conversations.json, writes ./DeepSeek_Conversations
//! deepseek-chat-export
//!
//! # A ChatGPT export, with YAML front matter for Obsidian
//! deepseek-chat-export ~/Downloads/conversations.json --format chatgpt --frontmatter --tags chatgpt,archive
//! ```
//!
//! Preferences can be persisted in `~/.config/deepseek-chat-export/config.toml`.
pub mod importer;
pub mod logging;
pub mod model;
pub mod renderer;
pub mod report;
pub mod sequential;
pub mod utils;

pub use importer::{import_conversation, load_export};
pub use model::{Conversation, Format, Message, Role};
pub use report::Report;
pub use sequential::execute;
pub use utils::ExportConfig;
