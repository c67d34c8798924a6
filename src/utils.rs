use chrono::{DateTime, Local, NaiveDateTime, Utc};
use clap::ValueEnum;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::model::Format;

/// Longest stem produced by [`sanitize_filename`], in characters.
pub const MAX_STEM_CHARS: usize = 50;
/// Longest stem produced by [`slug_filename`]. Slugs are ASCII, so bytes == chars.
pub const MAX_SLUG_CHARS: usize = 60;

const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Configuration required to run the export process.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub report_file: PathBuf,
    pub format: Format,
    pub filename_style: FilenameStyle,
    pub frontmatter: bool,
    pub tags: Option<Vec<String>>,
    pub force: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl ExportConfig {
    /// Defaults matching a bare invocation in the export's directory.
    pub fn for_format(format: Format) -> Self {
        Self {
            input: PathBuf::from("conversations.json"),
            output_dir: PathBuf::from(format.default_output_dir()),
            report_file: PathBuf::from(format.default_report_file()),
            format,
            filename_style: FilenameStyle::default(),
            frontmatter: false,
            tags: None,
            force: false,
            verbose: false,
            quiet: false,
        }
    }
}

/// How a conversation title becomes a file stem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FilenameStyle {
    /// Keep the title (including non-ASCII text), dropping only characters
    /// that are illegal in file names.
    #[default]
    Sanitize,
    /// ASCII kebab-case via `slug`.
    Slug,
}

impl FilenameStyle {
    pub fn stem(self, title: Option<&str>) -> String {
        match self {
            FilenameStyle::Sanitize => sanitize_filename(title),
            FilenameStyle::Slug => slug_filename(title),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    Created,
    Overwritten,
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control()
}

fn trim_stem(s: &str) -> &str {
    s.trim().trim_matches('.').trim()
}

fn timestamped_fallback() -> String {
    format!("conversation_{}", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Turn a conversation title into a file stem that is safe on every common
/// filesystem.
pub fn sanitize_filename(title: Option<&str>) -> String {
    let Some(title) = title else {
        return "untitled".to_string();
    };
    if title.is_empty() {
        return "untitled".to_string();
    }

    let cleaned: String = title.chars().filter(|c| !is_forbidden(*c)).collect();
    let truncated: String = trim_stem(&cleaned).chars().take(MAX_STEM_CHARS).collect();
    let stem = trim_stem(&truncated);

    if stem.is_empty() {
        timestamped_fallback()
    } else {
        stem.to_string()
    }
}

pub fn slug_filename(title: Option<&str>) -> String {
    let Some(title) = title.filter(|t| !t.is_empty()) else {
        return "untitled".to_string();
    };
    let raw_slug = slug::slugify(title);
    let slug = raw_slug[..raw_slug.len().min(MAX_SLUG_CHARS)].trim_end_matches('-');
    if slug.is_empty() {
        timestamped_fallback()
    } else {
        slug.to_string()
    }
}

/// Render an export timestamp for humans.
///
/// Accepts RFC 3339 strings, naive ISO strings and Unix seconds. Anything else
/// that is a string is returned as-is, so nothing is lost.
pub fn format_timestamp(value: &Value) -> String {
    match value {
        Value::String(s) => format_timestamp_str(s),
        Value::Number(n) => n
            .as_f64()
            .and_then(|secs| {
                let millis = (secs * 1000.0).round() as i64;
                DateTime::<Utc>::from_timestamp_millis(millis)
            })
            .map(|dt| dt.format(DISPLAY_TIME_FORMAT).to_string())
            .unwrap_or_else(|| n.to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn format_timestamp_str(s: &str) -> String {
    let trimmed = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt.format(DISPLAY_TIME_FORMAT).to_string();
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return dt.format(DISPLAY_TIME_FORMAT).to_string();
        }
    }
    s.to_string()
}

/// Current local time, formatted like every other timestamp we print.
pub fn now_display() -> String {
    Local::now().format(DISPLAY_TIME_FORMAT).to_string()
}
