use super::{compose_or_report, json_pretty, module_sources, EXIT_SUCCESS};
use mosaic_core::{ComposeOptions, Engine};
use std::path::{Path, PathBuf};

#[allow(clippy::too_many_arguments)]
pub fn run(
    engine: &Engine,
    files: &[PathBuf],
    builtins: &[String],
    lock_path: &Path,
    write_lock: bool,
    locked: bool,
    json: bool,
) -> Result<u8, String> {
    let sources = module_sources(files, builtins)?;
    let options = ComposeOptions {
        lock_path: Some(lock_path.to_path_buf()),
        locked,
        write_lock,
    };
    let result = compose_or_report(engine, &sources, &options)?;

    if json {
        let payload = serde_json::json!({
            "digest": result.identity.digest,
            "short_digest": result.identity.short_digest,
            "entries": result.descriptor.to_plain_json(),
            "lock_written": write_lock,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "descriptor {} ({} entries)",
            result.identity.short_digest,
            result.descriptor.len()
        );
        for (id, value) in result.descriptor.iter() {
            println!("{id} = {value}");
        }
        if write_lock {
            println!("wrote {}", lock_path.display());
        }
    }
    Ok(EXIT_SUCCESS)
}
