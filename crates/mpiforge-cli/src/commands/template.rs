use super::{json_pretty, EXIT_SUCCESS};
use mpiforge_schema::parse_recipe_file;
use std::path::Path;

pub fn run(recipe_path: &Path, json: bool) -> Result<u8, String> {
    let recipe = parse_recipe_file(recipe_path).map_err(|e| format!("recipe error: {e}"))?;
    let base_dir = recipe_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let (desc, _app) = recipe.into_descriptors(base_dir);

    mpiforge_deffile::apply_template(&desc).map_err(|e| format!("manifest error: {e}"))?;

    if json {
        let payload = serde_json::json!({
            "manifest": desc.path,
            "status": "updated",
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("updated template {}", desc.path.display());
    }
    Ok(EXIT_SUCCESS)
}
