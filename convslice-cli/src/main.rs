//! convslice CLI - cut exported conversations into named JSON slices
//!
//! - `markers`: split at inline `[[SPLIT]]` / `[[SPLIT: name]]` directives
//! - `index`: split by `START:END[:NAME]` ranges or `--split-at` boundaries
//! - `ids`: same as `index`, message ids only
//! - `extract`: pull one conversation out of a multi-conversation export

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use convslice_core::error::{ErrorKind, SliceError};
use convslice_core::pipeline::SplitMode;

mod commands;
mod tracing_setup;
mod ui;

use tracing_setup::{init_tracing, TracingConfig};

#[derive(Parser, Debug)]
#[command(
    name = "convslice",
    author,
    version,
    about = "Split a conversation export into named JSON slices with a manifest",
    long_about = "Cut one exported conversation into smaller JSON slice files, either at inline \
                  [[SPLIT]] markers or at explicit index/id ranges, and write an index.json \
                  manifest with optional SHA-256 checksums."
)]
struct Cli {
    /// Enable debug logging (RUST_LOG still wins)
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress result listings and spinners
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split at inline [[SPLIT]] markers
    Markers(commands::split::CommonArgs),
    /// Split by index or id ranges (--range) or boundaries (--split-at)
    Index(commands::split::RangeArgs),
    /// Split by message-id ranges only (id:START:id:END[:NAME])
    Ids(commands::split::RangeArgs),
    /// Extract one conversation from a multi-conversation export
    Extract(commands::extract::ExtractArgs),
    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&TracingConfig { debug: cli.debug }).ok();
    ui::init_quiet_mode(cli.quiet);

    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Markers(args) => commands::run_markers(args),
        Commands::Index(args) => commands::run_ranges(args, SplitMode::Index),
        Commands::Ids(args) => commands::run_ranges(args, SplitMode::Ids),
        Commands::Extract(args) => commands::run_extract(args),
        Commands::Completions(args) => run_completions(args),
    }
}

/// 1 input, 2 filesystem, 3 validation or config
fn exit_code(err: &anyhow::Error) -> u8 {
    let kind = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<SliceError>())
        .map(SliceError::kind);
    match kind {
        Some(ErrorKind::Io) => 2,
        Some(ErrorKind::Validation) => 3,
        Some(ErrorKind::Input) | None => 1,
    }
}

fn run_completions(args: CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::{generate, Shell as CompletionShell};
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    let shell = match args.shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    };

    generate(shell, &mut cmd, bin_name, &mut io::stdout());
    Ok(())
}
