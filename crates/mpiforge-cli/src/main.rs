mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_BUILDER_ERROR, EXIT_FAILURE, EXIT_MANIFEST_ERROR};
use mpiforge_schema::SystemConfig;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "mpiforge",
    version,
    about = "Generate definition files and build container images for MPI applications"
)]
struct Cli {
    /// Path to the configuration file (defaults to $MPIFORGE_CONFIG or
    /// ~/.config/mpiforge/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// Build without root privileges (fakeroot builds, docker bootstrap for RPM distros).
    #[arg(long, default_value_t = false, global = true)]
    nopriv: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate a definition file from a build recipe.
    Generate {
        /// Path to the recipe TOML file.
        #[arg(default_value = "mpiforge.toml")]
        recipe: PathBuf,
        /// Write the definition file here instead of the recipe's manifest path.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also copy the definition file into the recipe's install directory.
        #[arg(long, default_value_t = false)]
        backup: bool,
        /// Target distribution as name:version (e.g. "ubuntu:22.04"), overriding the recipe.
        #[arg(long)]
        distro: Option<String>,
    },
    /// Fill the placeholders of an existing definition file template.
    Template {
        /// Path to the recipe TOML file; its manifest is the template.
        #[arg(default_value = "mpiforge.toml")]
        recipe: PathBuf,
    },
    /// Build an image from a definition file.
    Build {
        /// Path to the definition file.
        manifest: PathBuf,
        /// Path of the image to create.
        #[arg(long)]
        image: Option<PathBuf>,
        /// Directory the builder runs in.
        #[arg(long)]
        build_dir: Option<PathBuf>,
    },
    /// Pull an image from a registry.
    Pull {
        /// Image URL (e.g. "library://user/collection/image:tag").
        url: String,
        /// Path of the pulled image.
        #[arg(long)]
        image: Option<PathBuf>,
        /// Directory the builder runs in.
        #[arg(long)]
        build_dir: Option<PathBuf>,
    },
    /// Sign an image with a key from the local keyring.
    Sign {
        /// Path to the image.
        image: PathBuf,
    },
    /// Push an image to the configured registry.
    Push {
        /// Path to the image.
        image: PathBuf,
        /// Registry URL (overrides config file).
        #[arg(long)]
        registry: Option<String>,
    },
    /// Show the metadata labels of an image.
    Inspect {
        /// Path to the image.
        image: PathBuf,
    },
    /// Print the builder arguments needed to run an application in an image.
    ExecArgs {
        /// Path to the image.
        image: PathBuf,
        /// MPI installation on the host, bound into bind-model images.
        #[arg(long)]
        host_mpi_dir: Option<PathBuf>,
        /// Extra bind specification (src[:dest[:opts]]), may be repeated.
        #[arg(long = "bind")]
        binds: Vec<String>,
    },
    /// Run diagnostic checks on the host and configuration.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("MPIFORGE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Template { recipe } => commands::template::run(&recipe, json_output),
        Commands::Doctor => commands::doctor::run(
            load_config(cli.config.as_deref(), cli.nopriv),
            cli.config.as_deref(),
            json_output,
        ),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
        command => load_config(cli.config.as_deref(), cli.nopriv)
            .and_then(|config| dispatch(command, config, json_output)),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("recipe error:") || msg.starts_with("manifest error:") {
                EXIT_MANIFEST_ERROR
            } else if msg.starts_with("builder error:") {
                EXIT_BUILDER_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn dispatch(command: Commands, config: SystemConfig, json_output: bool) -> Result<u8, String> {
    match command {
        Commands::Generate {
            recipe,
            output,
            backup,
            distro,
        } => commands::generate::run(
            &config,
            &recipe,
            &commands::generate::Overrides {
                output: output.as_deref(),
                distro: distro.as_deref(),
                backup,
            },
            json_output,
        ),
        Commands::Build {
            manifest,
            image,
            build_dir,
        } => commands::build::run(
            &config,
            &manifest,
            image.as_deref(),
            build_dir.as_deref(),
            json_output,
        ),
        Commands::Pull {
            url,
            image,
            build_dir,
        } => commands::pull::run(
            &config,
            &url,
            image.as_deref(),
            build_dir.as_deref(),
            json_output,
        ),
        Commands::Sign { image } => commands::sign::run(&config, &image, json_output),
        Commands::Push { image, registry } => {
            commands::push::run(config, &image, registry, json_output)
        }
        Commands::Inspect { image } => commands::inspect::run(&config, &image, json_output),
        Commands::ExecArgs {
            image,
            host_mpi_dir,
            binds,
        } => commands::exec_args::run(
            &config,
            &image,
            host_mpi_dir.as_deref(),
            binds,
            json_output,
        ),
        Commands::Template { .. }
        | Commands::Doctor
        | Commands::Completions { .. }
        | Commands::ManPages { .. } => Err("command does not take a configuration".to_owned()),
    }
}

fn load_config(path: Option<&Path>, nopriv: bool) -> Result<SystemConfig, String> {
    let mut config = match path {
        Some(p) => SystemConfig::load(p),
        None => SystemConfig::load_default(),
    }
    .map_err(|e| format!("config error: {e}"))?;
    if nopriv {
        config.nopriv = true;
    }
    Ok(config)
}
