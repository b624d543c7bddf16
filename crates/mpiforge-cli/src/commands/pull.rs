use super::{
    absolute, builder_error, json_pretty, make_builder, spin_fail, spin_ok, spinner, EXIT_SUCCESS,
};
use mpiforge_runtime::{ImageSpec, PullOutcome, DEFAULT_IMAGE_NAME};
use mpiforge_schema::SystemConfig;
use std::path::Path;

pub fn run(
    config: &SystemConfig,
    url: &str,
    image: Option<&Path>,
    build_dir: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    let builder = make_builder(config)?;
    let image = absolute(image.unwrap_or(Path::new(DEFAULT_IMAGE_NAME)))?;
    let spec = ImageSpec {
        install_dir: image.parent().map(Path::to_path_buf).unwrap_or_default(),
        path: image,
        build_dir: absolute(build_dir.unwrap_or(Path::new(".")))?,
        url: url.to_owned(),
        ..ImageSpec::default()
    };

    let pb = if json {
        None
    } else {
        Some(spinner(&format!("pulling {url}...")))
    };
    let outcome = match builder.pull(&spec) {
        Ok(o) => {
            if let Some(ref pb) = pb {
                match o {
                    PullOutcome::Pulled => spin_ok(pb, "image pulled"),
                    PullOutcome::Skipped => spin_ok(pb, "image already present"),
                }
            }
            o
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "pull failed");
            }
            return Err(builder_error(e));
        }
    };

    if json {
        let payload = serde_json::json!({
            "image": spec.path,
            "url": url,
            "status": match outcome {
                PullOutcome::Pulled => "pulled",
                PullOutcome::Skipped => "skipped",
            },
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("image: {}", spec.path.display());
    }
    Ok(EXIT_SUCCESS)
}
