use super::{json_pretty, module_sources, EXIT_SUCCESS};
use mosaic_core::Engine;
use mosaic_schema::FragmentId;
use std::path::PathBuf;

pub fn run(engine: &Engine, files: &[PathBuf], builtins: &[String], json: bool) -> Result<u8, String> {
    let sources = module_sources(files, builtins)?;
    let layers = engine
        .evaluation_order(&sources)
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&layers)?);
    } else if layers.is_empty() {
        println!("no ids to evaluate");
    } else {
        for (depth, layer) in layers.iter().enumerate() {
            let ids: Vec<&str> = layer.iter().map(FragmentId::as_str).collect();
            println!("{depth:>3}  {}", ids.join(" "));
        }
    }
    Ok(EXIT_SUCCESS)
}
