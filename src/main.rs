use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use sieve_grammar::config::{EngineConfig, Loader};
use sieve_grammar::{json, parse, serialize_with, Capabilities, ParseError, Registry};

#[derive(Parser)]
#[command(name = "sieve-grammar", about = "Parse, check and reformat Sieve scripts")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Layer this TOML file over the built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log registry and parser activity to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct ScriptArgs {
    /// Script to read, or `-` for stdin.
    file: PathBuf,

    /// Enable an extension (repeatable).
    #[arg(short = 'c', long = "capability")]
    capabilities: Vec<String>,

    /// Enable every registered extension.
    #[arg(long)]
    all: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a script and report the first error.
    Check(ScriptArgs),
    /// Print a script in canonical form.
    Format(ScriptArgs),
    /// Print the parsed document as JSON.
    Dump(ScriptArgs),
    /// List the capabilities the registry knows about.
    Capabilities,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&Path>, all: bool) -> Result<EngineConfig> {
    let mut loader = Loader::new().with_optional_file("sieve-grammar.toml");
    if let Some(path) = path {
        loader = loader.with_file(path);
    }
    if all {
        loader = loader.set_override("capabilities.all", true)?;
    }
    loader.build().context("failed to load configuration")
}

fn read_script(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .context("failed to read stdin")?;
        return Ok(input);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Print the offending line with the error region underlined.
fn report(input: &str, err: &ParseError) {
    let lines: Vec<&str> = input.lines().collect();
    let line_text = lines.get(err.begin.line).copied().unwrap_or("");

    eprintln!("ERROR AT LINE {}:", err.begin.line + 1);
    eprintln!("{}", line_text);

    let start_col = err.begin.column;
    let width = line_text.chars().count();
    let end_col = if err.begin.line == err.end.line && err.end.column > err.begin.column {
        err.end.column
    } else if start_col < width {
        width
    } else {
        start_col + 1
    };

    let mut underline = " ".repeat(start_col);
    underline.push('^');
    if end_col > start_col + 1 {
        underline.push_str(&"_".repeat(end_col - start_col - 1));
    }
    eprintln!("{}", underline);
    eprintln!("{} ({})", err.kind, err.code());
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let registry = Registry::standard().context("failed to build the grammar registry")?;

    let args = match cli.command {
        Command::Capabilities => {
            for capability in registry.capabilities() {
                println!("{}", capability);
            }
            return Ok(());
        }
        Command::Check(ref args) | Command::Format(ref args) | Command::Dump(ref args) => args,
    };

    let config = load_config(cli.config.as_deref(), args.all)?;
    let mut capabilities: Capabilities = config.capabilities(&registry);
    for capability in &args.capabilities {
        capabilities.insert(capability);
    }
    debug!(
        capabilities = ?capabilities.iter().collect::<Vec<_>>(),
        "capabilities enabled"
    );

    let input = read_script(&args.file)?;
    let document = match parse(&input, &registry, &capabilities) {
        Ok(document) => document,
        Err(err) => {
            report(&input, &err);
            std::process::exit(1);
        }
    };

    match cli.command {
        Command::Check(_) => {
            let used = document.capabilities_used();
            let required = document.required_capabilities();
            for missing in used.difference(&required) {
                eprintln!("warning: '{}' is used but not required", missing);
            }
        }
        Command::Format(_) => print!("{}", serialize_with(&document, &config.format)?),
        Command::Dump(_) => println!("{}", json::to_json_pretty(&document)),
        Command::Capabilities => {}
    }
    Ok(())
}
