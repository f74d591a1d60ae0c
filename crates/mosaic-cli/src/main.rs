mod commands;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFLICT, EXIT_FAILURE, EXIT_MODULE_ERROR};
use mosaic_core::{ComposeConfig, Engine, Parallelism};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "mosaic",
    version,
    about = "Compose declarative environment fragments into one descriptor"
)]
struct Cli {
    /// Path to a JSON config file (default: ~/.config/mosaic/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Evaluate independent ids on up to this many threads.
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct Inputs {
    /// Module TOML files to compose; their order does not affect the result.
    modules: Vec<PathBuf>,
    /// Include a built-in module (repeatable). See `mosaic modules`.
    #[arg(long = "builtin", value_name = "NAME")]
    builtins: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compose modules and print the environment descriptor.
    Compose {
        #[command(flatten)]
        inputs: Inputs,
        /// Lock file path.
        #[arg(long, default_value = "mosaic.lock")]
        lock: PathBuf,
        /// Write the lock file after a successful composition.
        #[arg(long, default_value_t = false)]
        write_lock: bool,
        /// Fail if the descriptor differs from the lock file.
        #[arg(long, default_value_t = false)]
        locked: bool,
    },
    /// Check that modules compose without conflicts.
    Check {
        #[command(flatten)]
        inputs: Inputs,
        /// Lock file path.
        #[arg(long, default_value = "mosaic.lock")]
        lock: PathBuf,
        /// Also require the lock file to match.
        #[arg(long, default_value_t = false)]
        locked: bool,
    },
    /// Show the layered evaluation order of ids.
    Order {
        #[command(flatten)]
        inputs: Inputs,
    },
    /// List built-in modules.
    Modules,
    /// Compose, then pass the descriptor to a package resolver and language activator.
    Handoff {
        #[command(flatten)]
        inputs: Inputs,
        /// Package resolver to use.
        #[arg(long, default_value = "mock")]
        resolver: String,
        /// Language activator to use.
        #[arg(long, default_value = "mock")]
        activator: String,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
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
            tracing_subscriber::EnvFilter::try_from_env("MOSAIC_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let config = match load_config(cli.config.as_deref(), cli.threads) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("error: {msg}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let engine = Engine::new(config);
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Compose {
            inputs,
            lock,
            write_lock,
            locked,
        } => commands::compose::run(
            &engine,
            &inputs.modules,
            &inputs.builtins,
            &lock,
            write_lock,
            locked,
            json_output,
        ),
        Commands::Check {
            inputs,
            lock,
            locked,
        } => commands::check::run(
            &engine,
            &inputs.modules,
            &inputs.builtins,
            &lock,
            locked,
            json_output,
        ),
        Commands::Order { inputs } => {
            commands::order::run(&engine, &inputs.modules, &inputs.builtins, json_output)
        }
        Commands::Modules => commands::modules::run(json_output),
        Commands::Handoff {
            inputs,
            resolver,
            activator,
        } => commands::handoff::run(
            &engine,
            &inputs.modules,
            &inputs.builtins,
            &resolver,
            &activator,
            json_output,
        ),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}

fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("module error:") || msg.starts_with("unknown module:") {
        EXIT_MODULE_ERROR
    } else if msg.starts_with("composition failed:") {
        EXIT_CONFLICT
    } else {
        EXIT_FAILURE
    }
}

/// Explicit `--config` must exist; the default location is optional.
/// `--threads` overrides the configured parallelism.
fn load_config(path: Option<&std::path::Path>, threads: Option<usize>) -> Result<ComposeConfig, String> {
    let mut config = match path {
        Some(path) => ComposeConfig::load(path),
        None => ComposeConfig::load_default(),
    }
    .map_err(|e| e.to_string())?;

    match threads {
        Some(0) => return Err("--threads must be at least 1".to_owned()),
        Some(1) => config.parallelism = Parallelism::Sequential,
        Some(n) => config.parallelism = Parallelism::Threads(n),
        None => {}
    }
    Ok(config)
}
