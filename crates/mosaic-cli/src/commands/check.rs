use super::{colorize_status, compose_or_report, json_pretty, module_sources, EXIT_SUCCESS};
use mosaic_core::{ComposeOptions, Engine};
use std::path::{Path, PathBuf};

/// Compose without printing the descriptor. With `locked`, the lock file
/// must also match.
pub fn run(
    engine: &Engine,
    files: &[PathBuf],
    builtins: &[String],
    lock_path: &Path,
    locked: bool,
    json: bool,
) -> Result<u8, String> {
    let sources = module_sources(files, builtins)?;
    let options = ComposeOptions {
        lock_path: Some(lock_path.to_path_buf()),
        locked,
        write_lock: false,
    };
    let result = compose_or_report(engine, &sources, &options)?;

    if json {
        let payload = serde_json::json!({
            "status": "ok",
            "short_digest": result.identity.short_digest,
            "entries": result.descriptor.len(),
            "lock_verified": locked,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "{} {} module(s), {} entries, descriptor {}",
            colorize_status("ok"),
            sources.len(),
            result.descriptor.len(),
            result.identity.short_digest
        );
        if locked {
            println!("lock file {} matches", lock_path.display());
        }
    }
    Ok(EXIT_SUCCESS)
}
