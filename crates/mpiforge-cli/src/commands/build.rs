use super::{
    absolute, builder_error, json_pretty, make_builder, spin_fail, spin_ok, spinner, EXIT_SUCCESS,
};
use mpiforge_runtime::{ImageSpec, DEFAULT_IMAGE_NAME};
use mpiforge_schema::SystemConfig;
use std::path::Path;

pub fn run(
    config: &SystemConfig,
    manifest: &Path,
    image: Option<&Path>,
    build_dir: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    if !manifest.is_file() {
        return Err(format!(
            "manifest error: {} does not exist",
            manifest.display()
        ));
    }
    let builder = make_builder(config)?;
    let image = absolute(image.unwrap_or(Path::new(DEFAULT_IMAGE_NAME)))?;
    let spec = ImageSpec {
        install_dir: image.parent().map(Path::to_path_buf).unwrap_or_default(),
        path: image,
        build_dir: absolute(build_dir.unwrap_or(Path::new(".")))?,
        def_file: absolute(manifest)?,
        ..ImageSpec::default()
    };

    let pb = if json {
        None
    } else {
        Some(spinner("building image..."))
    };
    let record = match builder.create(&spec) {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "image built");
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "build failed");
            }
            return Err(builder_error(e));
        }
    };

    if json {
        println!("{}", json_pretty(&record)?);
    } else {
        println!("built image {}", record.image.display());
        println!("builder:    {} {}", record.builder.display(), record.builder_version);
        println!("blake3:     {}", record.image_blake3);
    }
    Ok(EXIT_SUCCESS)
}
