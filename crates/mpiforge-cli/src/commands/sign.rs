use super::{absolute, builder_error, json_pretty, make_builder, EXIT_SUCCESS};
use mpiforge_runtime::ImageSpec;
use mpiforge_schema::SystemConfig;
use std::path::Path;

pub fn run(config: &SystemConfig, image: &Path, json: bool) -> Result<u8, String> {
    let builder = make_builder(config)?;
    let spec = ImageSpec {
        path: absolute(image)?,
        ..ImageSpec::default()
    };
    builder.sign(&spec).map_err(builder_error)?;
    if json {
        let payload = serde_json::json!({
            "image": spec.path,
            "status": "signed",
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("signed {}", spec.path.display());
    }
    Ok(EXIT_SUCCESS)
}
