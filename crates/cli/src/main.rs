//! Knot CLI
//!
//! Command-line interface for evaluating Knot programs and exporting them
//! as JSON, YAML or TOML.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use knot::{Context, ErrorFormat, ExportFormat, IoSink};
use knot_cli::{CliError, EvalOptions, Mode};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "knot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Knot - evaluate configuration programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a program and print the result
    Eval {
        /// Input file (reads stdin when absent)
        input: Option<PathBuf>,

        /// Only force the outermost value; unevaluated parts are shown as such
        #[arg(long, conflicts_with = "export")]
        shallow: bool,

        /// Omit fields marked `not_exported`
        #[arg(long)]
        export: bool,

        /// Output format: json, yaml or toml
        #[arg(long, default_value = "json")]
        format: ExportFormat,

        /// Error format: text, ansi, json, yaml or toml
        #[arg(long, default_value = "text")]
        error_format: ErrorFormat,

        /// Select a nested field lazily, e.g. `server.port`
        #[arg(long, value_name = "PATH", conflicts_with = "export")]
        field: Option<String>,

        /// Context configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print `std.trace` messages to stderr
        #[arg(long)]
        trace: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("KNOT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("knot=warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Eval {
            input,
            shallow,
            export,
            format,
            error_format,
            field,
            config,
            trace,
        } => {
            let mode = if shallow {
                Mode::Shallow
            } else if export {
                Mode::Export
            } else {
                Mode::Deep
            };
            let options = EvalOptions {
                mode,
                format: Some(format),
                field,
            };
            run_eval(
                input.as_deref(),
                &options,
                error_format,
                config.as_deref(),
                trace,
            );
        }
        Commands::Completions { shell } => {
            run_completions(shell);
        }
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "knot", &mut io::stdout());
}

fn read_source(input: Option<&Path>) -> Result<String, String> {
    match input {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e)),
        None => {
            let mut src = String::new();
            io::stdin()
                .read_to_string(&mut src)
                .map_err(|e| format!("Failed to read stdin: {}", e))?;
            Ok(src)
        }
    }
}

fn run_eval(
    input: Option<&Path>,
    options: &EvalOptions,
    error_format: ErrorFormat,
    config: Option<&Path>,
    trace: bool,
) {
    let mut config = match knot_cli::load_config(config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    if config.source_name.is_none() {
        config.source_name = Some(match input {
            Some(path) => path.display().to_string(),
            None => "<stdin>".to_string(),
        });
    }

    let src = match read_source(input) {
        Ok(src) => src,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let mut ctx = Context::with_config(config);
    if trace {
        ctx.set_trace_sink(IoSink::new(io::stderr()));
    }

    match knot_cli::evaluate(&mut ctx, &src, options) {
        Ok(text) => {
            let mut stdout = io::stdout().lock();
            let newline = if text.ends_with('\n') { "" } else { "\n" };
            if let Err(e) = write!(stdout, "{}{}", text, newline) {
                eprintln!("Error writing output: {}", e);
                process::exit(1);
            }
        }
        Err(CliError::Knot(e)) => {
            let mut sink = IoSink::new(io::stderr());
            if let Err(render_err) = e.display(error_format, &mut sink) {
                eprintln!("Error: {}", e);
                tracing::warn!(error = %render_err, "could not render diagnostic");
            }
            process::exit(1);
        }
        Err(e @ CliError::Field(_)) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
