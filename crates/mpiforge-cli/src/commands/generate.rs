use super::{json_pretty, EXIT_SUCCESS};
use mpiforge_deffile::{DependencyInspector, NoDependencies};
use mpiforge_runtime::{default_image_name, detect_inspector};
use mpiforge_schema::{parse_recipe_file, DeploymentModel, DistroIdentity, SystemConfig};
use std::path::Path;

/// Command-line values that take precedence over the recipe.
#[derive(Debug, Default)]
pub struct Overrides<'a> {
    pub output: Option<&'a Path>,
    /// `name:version` descriptor of the target distribution.
    pub distro: Option<&'a str>,
    pub backup: bool,
}

pub fn run(
    config: &SystemConfig,
    recipe_path: &Path,
    overrides: &Overrides<'_>,
    json: bool,
) -> Result<u8, String> {
    let recipe = parse_recipe_file(recipe_path).map_err(|e| format!("recipe error: {e}"))?;
    let base_dir = recipe_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let (mut desc, app) = recipe.into_descriptors(base_dir);
    if let Some(out) = overrides.output {
        desc.path = out.to_path_buf();
    }
    if let Some(descriptor) = overrides.distro {
        desc.distro = parse_distro(descriptor)?;
    }

    // Only binaries copied from the host need their packages installed.
    let inspector: Box<dyn DependencyInspector> = match desc.model {
        DeploymentModel::Hybrid => Box::new(NoDependencies),
        DeploymentModel::Bind | DeploymentModel::Basic => detect_inspector(config.query_timeout()),
    };

    mpiforge_deffile::create(&desc, &app, config, config, inspector.as_ref())
        .map_err(|e| format!("manifest error: {e}"))?;

    let backup_path = if overrides.backup {
        mpiforge_deffile::backup(&desc, &desc.env).map_err(|e| format!("manifest error: {e}"))?
    } else {
        None
    };

    let image = format!(
        "{}.sif",
        default_image_name(
            &desc.distro.key(),
            desc.mpi.as_ref().map_or("nompi", |m| m.id.as_str()),
            desc.mpi.as_ref().map_or("none", |m| m.version.as_str()),
            &app.name,
            desc.model,
        )
    );

    if json {
        let payload = serde_json::json!({
            "manifest": desc.path,
            "model": desc.model,
            "distro": desc.distro.to_string(),
            "backup": backup_path,
            "suggested_image": image,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("wrote {} ({} model)", desc.path.display(), desc.model);
        if let Some(p) = &backup_path {
            println!("backup: {}", p.display());
        }
        println!(
            "next: mpiforge build {} --image {image}",
            desc.path.display()
        );
    }
    Ok(EXIT_SUCCESS)
}

fn parse_distro(descriptor: &str) -> Result<DistroIdentity, String> {
    DistroIdentity::parse(descriptor).ok_or_else(|| {
        format!("recipe error: invalid distro '{descriptor}', expected name:version")
    })
}
