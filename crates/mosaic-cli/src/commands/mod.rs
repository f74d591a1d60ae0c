pub mod check;
pub mod completions;
pub mod compose;
pub mod handoff;
pub mod modules;
pub mod order;

use mosaic_core::{ComposeError, CoreError, Engine, ModuleSource};
use mosaic_schema::LockError;
use std::path::PathBuf;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MODULE_ERROR: u8 = 2;
pub const EXIT_CONFLICT: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Module files first, then built-ins, in the order given.
pub fn module_sources(files: &[PathBuf], builtins: &[String]) -> Result<Vec<ModuleSource>, String> {
    if files.is_empty() && builtins.is_empty() {
        return Err("no modules given: pass module files or --builtin <NAME>".to_owned());
    }
    Ok(files
        .iter()
        .cloned()
        .map(ModuleSource::File)
        .chain(builtins.iter().cloned().map(ModuleSource::Builtin))
        .collect())
}

/// Compose, rendering a composition failure one id per line.
pub fn compose_or_report(
    engine: &Engine,
    sources: &[ModuleSource],
    options: &mosaic_core::ComposeOptions,
) -> Result<mosaic_core::ComposeResult, String> {
    engine
        .compose_with_options(sources, options)
        .map_err(|e| match e {
            CoreError::Compose(ComposeError::Conflicts(failures)) => {
                let lines: Vec<String> = failures
                    .iter()
                    .map(|f| format!("  {} {f}", colorize_status("conflict")))
                    .collect();
                format!(
                    "composition failed: {} id(s) failed\n{}",
                    failures.len(),
                    lines.join("\n")
                )
            }
            CoreError::Lock(LockError::Drift(drift)) => {
                let lines: Vec<String> = drift
                    .iter()
                    .map(|d| format!("  {} {d}", colorize_status("drift")))
                    .collect();
                format!(
                    "lock error: descriptor drifted from lock file\n{}",
                    lines.join("\n")
                )
            }
            other => other.to_string(),
        })
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "ok" => Style::new().green().apply_to(status).to_string(),
        "conflict" | "failed" => Style::new().red().bold().apply_to(status).to_string(),
        "drift" => Style::new().yellow().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}
