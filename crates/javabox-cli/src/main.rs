//! Javabox CLI
//!
//! A command-line tool for compiling and running Java source files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use javabox::{BatchRequest, ClientFrame, Config, EXAMPLE_CONFIG, RunLimits, Runner, ServerFrame};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "javabox")]
#[command(about = "A tool for compiling and running Java programs")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: javabox.toml)
        #[arg(short, long, default_value = "javabox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Compile and run a program once with all input up front
    Run {
        /// Java source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Input file fed to the program (default: no input)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Wall clock limit in seconds
        #[arg(short, long)]
        timeout: Option<f64>,
    },

    /// Run a program interactively, forwarding terminal lines as input
    Session {
        /// Java source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,
    },

    /// Show effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            input,
            timeout,
        } => run_batch(config, &source, input.as_deref(), timeout).await,
        Commands::Session { source } => run_session(config, &source).await,
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn run_batch(
    config: Config,
    source: &Path,
    input: Option<&Path>,
    timeout: Option<f64>,
) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let input = match input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .context("failed to read input file")?,
        None => String::new(),
    };

    // Only an explicit timeout overrides the configured limits
    let limits = timeout.map(|seconds| RunLimits::unset().with_batch_timeout(seconds));

    info!(source = %source.display(), "running program");

    let runner = Runner::new(config);
    let result = runner
        .execute_with_limits(&BatchRequest { code, input }, limits.as_ref())
        .await;

    // Program output goes to stdout, diagnostics to stderr
    if !result.output.is_empty() {
        print!("{}", result.output);
    }
    if let Some(error) = &result.error {
        if result.output.is_empty() || !error.starts_with(&result.output) {
            eprintln!("{error}");
        }
    }

    info!(success = result.success, "execution result");

    if result.is_success() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

async fn run_session(config: Config, source: &Path) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let runner = Runner::new(config);
    let (connection, mut frames) = runner.connect();
    debug!(session = connection.id(), "session opened");

    connection.handle(ClientFrame::Run(code)).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut stdout = tokio::io::stdout();

    let exit_code = loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    break 1;
                };
                match &frame {
                    ServerFrame::Output(text) => {
                        stdout.write_all(text.as_bytes()).await?;
                        stdout.flush().await?;
                    }
                    ServerFrame::Error(message) => eprintln!("{message}"),
                    ServerFrame::Exit(code) => info!(code, "program finished"),
                }
                if frame.is_terminal() {
                    break match frame {
                        ServerFrame::Exit(code) => code,
                        _ => 1,
                    };
                }
            }
            line = lines.next_line(), if stdin_open => match line.context("failed to read terminal input")? {
                Some(line) => connection.handle(ClientFrame::Input(line)).await,
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, stopping program");
                break 130;
            }
        }
    };

    // Nobody reads frames past this point
    drop(frames);
    connection.close().await;

    if exit_code == 0 {
        Ok(())
    } else {
        std::process::exit(exit_code);
    }
}

fn show_config(config: &Config) {
    println!("Toolchain:");
    println!("  javac: {}", config.toolchain.javac);
    println!("  java: {}", config.toolchain.java);
    println!("  Compile args: {:?}", config.toolchain.compile_args);
    println!("  Run args: {:?}", config.toolchain.run_args);
    println!();
    println!("Limits:");
    println!("  Batch timeout: {:?}", config.limits.batch_timeout());
    println!("  Compile timeout: {:?}", config.limits.compile_timeout());
    println!("  Output drain grace: {:?}", config.limits.drain_grace());
    println!(
        "  Output chunk size: {} bytes",
        config.limits.output_chunk_size()
    );
    println!();
    println!("Working root: {}", config.work_root().display());
    println!("Max concurrent runs: {}", config.max_concurrent_runs);
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
