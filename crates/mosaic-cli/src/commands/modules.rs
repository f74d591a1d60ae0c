use super::{json_pretty, EXIT_SUCCESS};
use mosaic_schema::list_builtins;

pub fn run(json: bool) -> Result<u8, String> {
    let builtins = list_builtins();
    if json {
        let payload: Vec<_> = builtins
            .iter()
            .map(|m| serde_json::json!({"name": m.name, "description": m.description}))
            .collect();
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{:<10} DESCRIPTION", "NAME");
        for module in builtins {
            println!("{:<10} {}", module.name, module.description);
        }
    }
    Ok(EXIT_SUCCESS)
}
