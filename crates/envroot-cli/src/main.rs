mod commands;

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_FAILURE, EXIT_SUCCESS, EXIT_USAGE};
use envroot_config::EnvrootConfig;
use envroot_core::BuildOptions;
use envroot_fs::{Level, ProgressLogger};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "envroot",
    version,
    about = "Build isolated, relocatable interpreter environments"
)]
struct Cli {
    /// Increase console verbosity (repeatable).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Decrease console verbosity (repeatable).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    quiet: u8,

    /// Enable trace-level internal diagnostics.
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Configuration file (defaults to $ENVROOT_CONFIG, then ~/.config/envroot/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create or update an environment in DEST_DIR.
    Build {
        dest_dir: PathBuf,
        /// Donor interpreter, by name on PATH or by path.
        #[arg(short, long)]
        python: Option<String>,
        /// Delete the environment's library directory before building.
        #[arg(long, default_value_t = false)]
        clear: bool,
        /// Do not give the environment access to the donor's site-packages.
        #[arg(long, default_value_t = false)]
        no_site_packages: bool,
        /// Install setuptools unzipped.
        #[arg(long, default_value_t = false)]
        unzip_setuptools: bool,
        /// Do not install setuptools into the environment.
        #[arg(long, default_value_t = false)]
        no_setuptools: bool,
        /// Copy bootstrap modules instead of symlinking them.
        #[arg(long, default_value_t = false)]
        copies: bool,
    },
    /// Make an existing environment relocatable.
    Relocate { dest_dir: PathBuf },
    /// Show the layout and state of an existing environment.
    Inspect { dest_dir: PathBuf },
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

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(if e.use_stderr() { EXIT_USAGE } else { EXIT_SUCCESS });
        }
    };

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose >= 3 {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("ENVROOT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let json_output = cli.json;
    let level = Level::for_verbosity(2 - (i32::from(cli.verbose) - i32::from(cli.quiet)));
    // Keep stdout clean for the JSON document.
    let log = if json_output {
        ProgressLogger::stderr(level)
    } else {
        ProgressLogger::stdout(level)
    };

    let needs_config = matches!(cli.command, Commands::Build { .. });
    let config = if needs_config {
        match EnvrootConfig::discover(cli.config.as_deref()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(EXIT_FAILURE);
            }
        }
    } else {
        EnvrootConfig::default()
    };

    let result = match cli.command {
        Commands::Build {
            dest_dir,
            python,
            clear,
            no_site_packages,
            unzip_setuptools,
            no_setuptools,
            copies,
        } => {
            let options = BuildOptions {
                clear,
                include_global_packages: config.build.include_global_packages && !no_site_packages,
                symlink: config.build.symlink && !copies,
                unzip_setuptools: config.build.unzip_setuptools || unzip_setuptools,
            };
            let install_setuptools = config.build.install_setuptools && !no_setuptools;
            commands::build::run(
                &config,
                &log,
                &dest_dir,
                python.as_deref(),
                options,
                install_setuptools,
                json_output,
            )
        }
        Commands::Relocate { dest_dir } => commands::relocate::run(&log, &dest_dir, json_output),
        Commands::Inspect { dest_dir } => commands::inspect::run(&dest_dir, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
