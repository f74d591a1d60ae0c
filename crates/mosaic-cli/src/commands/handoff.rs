use super::{
    colorize_status, compose_or_report, json_pretty, module_sources, EXIT_FAILURE, EXIT_SUCCESS,
};
use mosaic_core::{handoff, select_activator, select_resolver, ComposeOptions, Engine};
use std::path::PathBuf;

pub fn run(
    engine: &Engine,
    files: &[PathBuf],
    builtins: &[String],
    resolver: &str,
    activator: &str,
    json: bool,
) -> Result<u8, String> {
    let sources = module_sources(files, builtins)?;
    let resolver = select_resolver(resolver).map_err(|e| e.to_string())?;
    let activator = select_activator(activator).map_err(|e| e.to_string())?;
    let result = compose_or_report(engine, &sources, &ComposeOptions::default())?;

    let report = handoff(&result.descriptor, resolver.as_ref(), activator.as_ref());

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        for package in &report.packages {
            println!("package  {:<16} {}", package.name, package.locator);
        }
        for patch in &report.patches {
            println!("language {}", patch.language);
            for (key, value) in &patch.variables {
                println!("         {key}={value}");
            }
            for entry in &patch.path_entries {
                println!("         PATH+={entry}");
            }
        }
        for failure in &report.failures {
            println!(
                "{} {}: {}",
                colorize_status("failed"),
                failure.id,
                failure.error
            );
        }
    }

    if report.is_complete() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_FAILURE)
    }
}
