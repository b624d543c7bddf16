use super::{
    absolute, builder_error, json_pretty, make_builder, spin_fail, spin_ok, spinner, EXIT_SUCCESS,
};
use mpiforge_runtime::ImageSpec;
use mpiforge_schema::SystemConfig;
use std::path::Path;

pub fn run(
    mut config: SystemConfig,
    image: &Path,
    registry: Option<String>,
    json: bool,
) -> Result<u8, String> {
    if registry.is_some() {
        config.registry = registry;
    }
    let Some(target) = config.registry.clone() else {
        return Err("no --registry and no registry in the configuration".to_owned());
    };
    let builder = make_builder(&config)?;
    let spec = ImageSpec {
        path: absolute(image)?,
        ..ImageSpec::default()
    };

    let pb = if json {
        None
    } else {
        Some(spinner(&format!("pushing to {target}...")))
    };
    match builder.upload(&spec) {
        Ok(()) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "image pushed");
            }
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "push failed");
            }
            return Err(builder_error(e));
        }
    }

    if json {
        let payload = serde_json::json!({
            "image": spec.path,
            "registry": target,
            "status": "pushed",
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("pushed {} to {target}", spec.path.display());
    }
    Ok(EXIT_SUCCESS)
}
