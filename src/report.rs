use eyre::{Context, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::Format;

const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// 1-based position of the conversation in the export.
    pub index: usize,
    pub reason: String,
}

/// Outcome of one export run.
#[derive(Debug, Clone)]
pub struct Report {
    pub format: Format,
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<Failure>,
    pub output_dir: PathBuf,
    pub finished_at: String,
}

impl Report {
    pub fn new(format: Format, total: usize, output_dir: PathBuf) -> Self {
        Self {
            format,
            total,
            succeeded: 0,
            failures: Vec::new(),
            output_dir,
            finished_at: String::new(),
        }
    }

    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, index: usize, reason: impl Into<String>) {
        self.failures.push(Failure {
            index,
            reason: reason.into(),
        });
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }

    /// Every conversation was accounted for exactly once.
    pub fn is_complete(&self) -> bool {
        self.succeeded + self.failed() == self.total
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_string())
            .wrap_err_with(|| format!("Failed to write report: {}", path.display()))
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(RULE_WIDTH);
        writeln!(f, "{}", rule)?;
        writeln!(f, "{} Export Report", self.format.display_name())?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "Total conversations: {}", self.total)?;
        writeln!(f, "Exported: {}", self.succeeded)?;
        writeln!(f, "Failed: {}", self.failed())?;
        writeln!(f)?;
        writeln!(f, "Output directory:")?;
        writeln!(f, "  {}", self.output_dir.display())?;
        writeln!(f)?;
        writeln!(f, "Finished at:")?;
        writeln!(f, "  {}", self.finished_at)?;
        writeln!(f)?;

        if !self.failures.is_empty() {
            writeln!(f, "Failed conversations:")?;
            for failure in &self.failures {
                writeln!(f, "  - #{}: {}", failure.index, failure.reason)?;
            }
            writeln!(f)?;
            writeln!(
                f,
                "Tip: details for each failure are in the conversion log."
            )?;
        }
        write!(f, "{}", rule)
    }
}
