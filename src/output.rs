use std::fs;
use std::io::{self, Write};
use std::path::Path;

use android_makefile_parser::ReportEntry;
use anyhow::{Context, Result};
use tracing::info;

pub fn to_json(entries: &[ReportEntry]) -> Result<String> {
    serde_json::to_string_pretty(entries).context("failed to serialize report entries")
}

/// 写到文件，未指定时输出到 stdout
pub fn write_report(entries: &[ReportEntry], output: Option<&Path>) -> Result<()> {
    let json = to_json(entries)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
            info!("Wrote {} entries to {}", entries.len(), path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}").context("failed to write to stdout")?;
        }
    }
    Ok(())
}
