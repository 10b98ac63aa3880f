//! Report generation for analysis results
//!
//! Two output formats:
//!
//! - **JSON**: the full results, extras included, for programmatic consumption
//! - **CSV**: one row per file, for spreadsheets and bulk review
//!
//! # Usage
//!
//! ```ignore
//! use deepcheck::report;
//!
//! // Picks the format from the extension
//! report::generate("report.json", &results)?;  // JSON
//! report::generate("report.csv", &results)?;   // CSV
//! ```

pub mod csv;
pub mod json;

use crate::analyzer::{AnalysisResult, Label};
use serde::Serialize;
use std::io;
use std::path::Path;

/// Generate a report in the appropriate format based on file extension
pub fn generate<P: AsRef<Path>>(path: P, results: &[AnalysisResult]) -> io::Result<()> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let mut file = io::BufWriter::new(std::fs::File::create(path)?);

    match ext.as_str() {
        "json" => json::write(&mut file, results),
        _ => csv::write(&mut file, results),
    }
}

/// Summary statistics for a batch of results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub authentic: usize,
    pub manipulated: usize,
    pub error: usize,
}

impl Summary {
    pub fn from_results(results: &[AnalysisResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };

        for r in results {
            match r.label {
                Label::Authentic => summary.authentic += 1,
                Label::Manipulated => summary.manipulated += 1,
                Label::Error => summary.error += 1,
            }
        }

        summary
    }

    /// Process exit code for a batch: 2 if anything looks manipulated,
    /// 1 if anything failed, else 0.
    pub fn exit_code(&self) -> i32 {
        if self.manipulated > 0 {
            2
        } else if self.error > 0 {
            1
        } else {
            0
        }
    }
}
