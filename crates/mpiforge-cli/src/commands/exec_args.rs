use super::{builder_error, json_pretty, make_builder, EXIT_SUCCESS};
use mpiforge_runtime::{exec_args, ImageSpec};
use mpiforge_schema::{DeploymentModel, SystemConfig};
use std::path::Path;

pub fn run(
    config: &SystemConfig,
    image: &Path,
    host_mpi_dir: Option<&Path>,
    binds: Vec<String>,
    json: bool,
) -> Result<u8, String> {
    let builder = make_builder(config)?;
    let meta = builder.metadata(image).map_err(builder_error)?;
    if meta.model == Some(DeploymentModel::Bind) && host_mpi_dir.is_none() {
        return Err(format!(
            "{} uses the bind model, --host-mpi-dir is required",
            image.display()
        ));
    }
    let mut spec = ImageSpec::default();
    spec.apply_metadata(&meta);
    spec.binds = binds;
    let args = exec_args(&spec, host_mpi_dir.unwrap_or(Path::new("")), config.nopriv);

    if json {
        let payload = serde_json::json!({
            "image": meta.path,
            "app_exe": meta.app_exe,
            "args": args,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{}", args.join(" "));
    }
    Ok(EXIT_SUCCESS)
}
