use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::upload::UploadTotals;

/// Errors echoed to the console before pointing at the log file.
const ERRORS_SHOWN: usize = 10;
const RULE_WIDTH: usize = 80;

pub fn banner(title: &str) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    format!("\n{rule}\n{:^width$}\n{rule}\n", title, width = RULE_WIDTH)
}

/// Human-readable end-of-run summary.
pub fn summary(totals: &UploadTotals, total_records: usize) -> String {
    let mut out = banner("📊 IMPORT RESULTS");
    out.push_str(&format!("✅ Uploaded:   {} records\n", totals.uploaded));
    out.push_str(&format!(
        "⚠️  Duplicate:  {} records (skipped)\n",
        totals.duplicates
    ));
    out.push_str(&format!("❌ Failed:     {} records\n", totals.failed));
    out.push_str(&format!("📊 Total:      {} records\n", total_records));

    if totals.uploaded > 0 {
        out.push_str("\n✅ Records uploaded to the backend.\n");
        out.push_str("ℹ️  Dashboard: https://dashboard.convex.dev\n");
    }

    if !totals.errors.is_empty() {
        out.push_str(&format!(
            "\n⚠️  {} errors occurred. Details:\n",
            totals.errors.len()
        ));
        for e in totals.errors.iter().take(ERRORS_SHOWN) {
            out.push_str(&format!("  • {}\n", e));
        }
        if totals.errors.len() > ERRORS_SHOWN {
            out.push_str(&format!(
                "ℹ️    ... and {} more\n",
                totals.errors.len() - ERRORS_SHOWN
            ));
        }
    }
    out
}

/// Overwrite `path` with a timestamped list of every error.
pub fn write_error_log(path: &Path, errors: &[String], at: NaiveDateTime) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(file);
    writeln!(w, "Import Errors - {}", at.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(w, "{}", "=".repeat(RULE_WIDTH))?;
    writeln!(w)?;
    for e in errors {
        writeln!(w, "{}", e)?;
    }
    w.flush()
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
