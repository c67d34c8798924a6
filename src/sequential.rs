use crate::importer;
use crate::renderer::{self, RenderOptions};
use crate::report::Report;
use crate::utils::{ExportConfig, ProcessResult, now_display};
use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{error, info, warn};

const LOG_TITLE_CHARS: usize = 40;

/// The main entry point for the export logic.
/// Loads the export, converts every conversation in order and writes the report.
///
/// Per-conversation failures are recorded in the returned [`Report`]; only
/// problems with the input file, the output directory or the report file are
/// returned as errors.
pub fn execute(config: &ExportConfig) -> Result<Report> {
    fs::create_dir_all(&config.output_dir).wrap_err_with(|| {
        format!(
            "Failed to create output directory: {}",
            config.output_dir.display()
        )
    })?;

    info!("Reading export: {}", config.input.display());
    let records = match importer::load_export(&config.input) {
        Ok(records) => records,
        Err(e) => {
            error!("Could not load export: {:#}", e);
            return Err(e);
        }
    };
    info!("Loaded {} conversation(s)", records.len());

    let output_dir = std::path::absolute(&config.output_dir)
        .unwrap_or_else(|_| config.output_dir.clone());
    let mut report = Report::new(config.format, records.len(), output_dir);

    let pb = progress_bar(records.len() as u64, config.quiet || config.verbose)?;
    let exported_at = now_display();
    let mut registry: HashSet<String> = HashSet::new();

    for (i, record) in records.iter().enumerate() {
        let index = i + 1;
        let label: String = importer::peek_title(record)
            .map(|t| t.chars().take(LOG_TITLE_CHARS).collect())
            .unwrap_or_else(|| format!("Conversation {}", index));
        info!("Processing [{}/{}]: {}", index, report.total, label);

        match export_conversation(record, index, config, &mut registry, &exported_at) {
            Ok(exported) => {
                report.record_success();
                let verb = match exported.result {
                    ProcessResult::Created => "Saved",
                    ProcessResult::Overwritten => "Overwrote",
                };
                info!(
                    "{}: {} ({} message(s))",
                    verb, exported.file_name, exported.messages
                );
            }
            Err(e) => {
                report.record_failure(index, format!("{:#}", e));
                error!("Failed [{}]: {:#}", index, e);
                pb.println(format!("Error [{}]: {:#}", index, e));
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    report.finished_at = now_display();

    info!(
        "Finished: {} exported, {} failed, {} total",
        report.succeeded,
        report.failed(),
        report.total
    );
    if let Err(e) = report.write_to(&config.report_file) {
        error!("{:#}", e);
        return Err(e);
    }
    info!("Report written to {}", config.report_file.display());

    if !config.quiet {
        println!("{}", report);
    }

    Ok(report)
}

fn progress_bar(total: u64, hidden: bool) -> Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)",
        )
        .wrap_err("Invalid progress bar template")?
        .progress_chars("=>-"),
    );
    bar.println(format!("Found {} conversations.", total));
    Ok(bar)
}

struct Exported {
    file_name: String,
    result: ProcessResult,
    messages: usize,
}

/// Pick a file name for `stem` inside `dir` that no other conversation of this
/// run has taken. Unless `force` is set, files already on disk are also
/// avoided. Returns the name and whether a file of that name already exists.
///
/// The registry compares names case-insensitively so that exports stay
/// distinct on case-insensitive filesystems.
pub fn allocate_filename(
    stem: &str,
    dir: &Path,
    registry: &mut HashSet<String>,
    force: bool,
) -> (String, bool) {
    let mut candidate = format!("{}.md", stem);
    let mut counter = 1usize;
    loop {
        let key = candidate.to_lowercase();
        let on_disk = dir.join(&candidate).exists();
        if !registry.contains(&key) && (force || !on_disk) {
            registry.insert(key);
            return (candidate, on_disk);
        }
        candidate = format!("{}_{}.md", stem, counter);
        counter += 1;
    }
}

fn export_conversation(
    record: &Value,
    index: usize,
    config: &ExportConfig,
    registry: &mut HashSet<String>,
    exported_at: &str,
) -> Result<Exported> {
    let conv = importer::import_conversation(config.format, record, index)?;
    if conv.messages.is_empty() {
        warn!("Conversation {} has no message content", index);
    }

    let stem = config.filename_style.stem(conv.title.as_deref());
    let (file_name, existed) =
        allocate_filename(&stem, &config.output_dir, registry, config.force);
    let path = config.output_dir.join(&file_name);

    let md_file = File::create(&path)
        .wrap_err_with(|| format!("Failed to create: {}", path.display()))?;
    let mut writer = BufWriter::new(md_file);

    let opts = RenderOptions {
        frontmatter: config.frontmatter,
        tags: config.tags.as_deref(),
        exported_at,
    };
    let written = renderer::render_conversation(&mut writer, &conv, &opts)
        .and_then(|()| writer.flush());
    if let Err(e) = written {
        drop(writer);
        let _ = fs::remove_file(&path);
        return Err(e).wrap_err_with(|| format!("Failed to write: {}", path.display()));
    }

    Ok(Exported {
        file_name,
        result: if existed {
            ProcessResult::Overwritten
        } else {
            ProcessResult::Created
        },
        messages: conv.messages.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Format;
    use serde_json::json;
    use tempfile::TempDir;

    fn config_in(dir: &Path, records: &Value) -> ExportConfig {
        let input = dir.join("conversations.json");
        fs::write(&input, serde_json::to_string(records).unwrap()).unwrap();
        let mut config = ExportConfig::for_format(Format::DeepSeek);
        config.input = input;
        config.output_dir = dir.join("out");
        config.report_file = dir.join("export_report.txt");
        config.quiet = true;
        config
    }

    fn simple(title: &str, text: &str) -> Value {
        json!({
            "id": format!("id-{title}"),
            "title": title,
            "inserted_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z",
            "mapping": {
                "root": {"children": ["1"]},
                "1": {"children": [], "message": {
                    "fragments": [{"type": "REQUEST", "content": text}]
                }}
            }
        })
    }

    fn md_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".md"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_allocate_filename_suffixes_in_run_collisions() {
        let dir = TempDir::new().unwrap();
        let mut registry = HashSet::new();
        let a = allocate_filename("notes", dir.path(), &mut registry, false);
        let b = allocate_filename("notes", dir.path(), &mut registry, false);
        let c = allocate_filename("Notes", dir.path(), &mut registry, false);
        assert_eq!(a, ("notes.md".to_string(), false));
        assert_eq!(b, ("notes_1.md".to_string(), false));
        assert_eq!(c, ("Notes_2.md".to_string(), false));
    }

    #[test]
    fn test_allocate_filename_avoids_existing_files_unless_forced() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.md"), "old").unwrap();

        let mut registry = HashSet::new();
        let kept = allocate_filename("notes", dir.path(), &mut registry, false);
        assert_eq!(kept, ("notes_1.md".to_string(), false));

        let mut registry = HashSet::new();
        let forced = allocate_filename("notes", dir.path(), &mut registry, true);
        assert_eq!(forced, ("notes.md".to_string(), true));
    }

    #[test]
    fn test_execute_one_file_per_conversation() {
        let dir = TempDir::new().unwrap();
        let records = json!([
            simple("Alpha", "first"),
            simple("Beta", "second"),
            simple("Alpha", "third"),
        ]);
        let config = config_in(dir.path(), &records);

        let report = execute(&config).unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 3);
        assert!(report.is_complete());
        assert_eq!(
            md_files(&config.output_dir),
            vec!["Alpha.md", "Alpha_1.md", "Beta.md"]
        );

        let alpha_1 = fs::read_to_string(config.output_dir.join("Alpha_1.md")).unwrap();
        assert!(alpha_1.contains("third"));
    }

    #[test]
    fn test_execute_records_failures_and_continues() {
        let dir = TempDir::new().unwrap();
        let records = json!([
            simple("Good", "ok"),
            "not a conversation",
            {"title": "Empty root", "mapping": {"root": {"children": []}}},
            simple("Also good", "ok"),
        ]);
        let config = config_in(dir.path(), &records);

        let report = execute(&config).unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed_indices(), vec![2, 3]);
        assert_eq!(report.succeeded + report.failed(), report.total);
        assert_eq!(md_files(&config.output_dir).len(), 2);

        let written = fs::read_to_string(&config.report_file).unwrap();
        assert!(written.contains("Failed: 2"));
        assert!(written.contains("  - #3: Root node has no children"));
    }

    #[test]
    fn test_execute_second_run_does_not_clobber() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path(), &json!([simple("Alpha", "x")]));
        execute(&config).unwrap();
        execute(&config).unwrap();
        assert_eq!(md_files(&config.output_dir), vec!["Alpha.md", "Alpha_1.md"]);

        let mut forced = config.clone();
        forced.force = true;
        execute(&forced).unwrap();
        assert_eq!(md_files(&config.output_dir), vec!["Alpha.md", "Alpha_1.md"]);
    }

    #[test]
    fn test_execute_missing_input_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut config = ExportConfig::for_format(Format::DeepSeek);
        config.input = dir.path().join("missing.json");
        config.output_dir = dir.path().join("out");
        config.report_file = dir.path().join("export_report.txt");
        config.quiet = true;

        assert!(execute(&config).is_err());
        assert!(!config.report_file.exists());
    }

    #[test]
    fn test_execute_chatgpt_format() {
        let dir = TempDir::new().unwrap();
        let records = json!([{
            "title": "Recipe",
            "create_time": 1700000000.0,
            "mapping": {
                "a": {"parent": null, "children": ["b"], "message": null},
                "b": {"parent": "a", "children": [], "message": {
                    "author": {"role": "user"},
                    "content": {"content_type": "text", "parts": ["Pancakes?"]}
                }}
            }
        }]);
        let mut config = config_in(dir.path(), &records);
        config.format = Format::ChatGpt;

        let report = execute(&config).unwrap();
        assert_eq!(report.succeeded, 1);
        let md = fs::read_to_string(config.output_dir.join("Recipe.md")).unwrap();
        assert!(md.contains("## 1. User\n\nPancakes?"));
        assert!(md.contains("- **Chains**: 1"));
    }

    #[test]
    fn test_report_output_dir_is_absolute() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path(), &json!([]));
        let report = execute(&config).unwrap();
        assert_eq!(report.total, 0);
        assert!(report.output_dir.is_absolute());
    }
}
