pub mod build;
pub mod completions;
pub mod doctor;
pub mod exec_args;
pub mod generate;
pub mod inspect;
pub mod man_pages;
pub mod pull;
pub mod push;
pub mod sign;
pub mod template;

use indicatif::{ProgressBar, ProgressStyle};
use mpiforge_runtime::{Builder, RuntimeError};
use mpiforge_schema::{DeploymentModel, SystemConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_BUILDER_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        style("{spinner:.cyan} {msg}")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(style("{msg}"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(style("{msg}"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_model(model: Option<DeploymentModel>) -> String {
    use console::Style;
    match model {
        Some(DeploymentModel::Bind) => Style::new().cyan().apply_to("bind").to_string(),
        Some(DeploymentModel::Hybrid) => Style::new().green().apply_to("hybrid").to_string(),
        Some(DeploymentModel::Basic) => Style::new().yellow().apply_to("basic").to_string(),
        None => Style::new().dim().apply_to("(none)").to_string(),
    }
}

pub fn builder_error(e: RuntimeError) -> String {
    format!("builder error: {e}")
}

pub fn make_builder(config: &SystemConfig) -> Result<Builder, String> {
    Builder::from_config(config).map_err(builder_error)
}

/// `path` made absolute against the working directory. The builder runs in
/// the build directory, so relative paths would resolve against it instead.
pub fn absolute(path: &Path) -> Result<PathBuf, String> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| format!("cannot determine current directory: {e}"))?;
    Ok(cwd.join(path))
}
