use super::{builder_error, colorize_model, json_pretty, make_builder, EXIT_SUCCESS};
use mpiforge_schema::SystemConfig;
use std::path::Path;

pub fn run(config: &SystemConfig, image: &Path, json: bool) -> Result<u8, String> {
    let builder = make_builder(config)?;
    let meta = builder.metadata(image).map_err(builder_error)?;
    if json {
        println!("{}", json_pretty(&meta)?);
    } else {
        let none = "(none)";
        println!("image:        {}", meta.path.display());
        println!("distro:       {}", meta.distro().as_deref().unwrap_or(none));
        println!(
            "mpi:          {} {}",
            meta.mpi_id.as_deref().unwrap_or(none),
            meta.mpi_version.as_deref().unwrap_or("")
        );
        println!("mpi_dir:      {}", meta.mpi_dir.as_deref().unwrap_or(none));
        println!("model:        {}", colorize_model(meta.model));
        println!("application:  {}", meta.application.as_deref().unwrap_or(none));
        println!("app_exe:      {}", meta.app_exe.as_deref().unwrap_or(none));
    }
    Ok(EXIT_SUCCESS)
}
