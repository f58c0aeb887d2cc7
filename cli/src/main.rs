use admiral_core::{Analysis, AnalyzerConfig};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod report;

#[derive(Parser)]
#[command(name = "admiral", version)]
#[command(about = "Analyze DayZ server admin logs")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Log files or directories to analyze; directories are scanned for .ADM files
    inputs: Vec<PathBuf>,

    /// Apply a named settings profile from the config file
    #[arg(short, long)]
    profile: Option<String>,

    /// Drop events before this instant (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)
    #[arg(long, value_parser = parse_instant)]
    from: Option<NaiveDateTime>,

    /// Drop events after this instant
    #[arg(long, value_parser = parse_instant)]
    to: Option<NaiveDateTime>,

    /// Emit the full report as JSON instead of the text summary
    #[arg(long)]
    json: bool,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Config,
    /// List saved settings profiles
    Profiles,
    /// Snapshot the current settings under a profile name
    SaveProfile { name: String },
    /// Remove a saved profile
    DeleteProfile { name: String },
}

fn main() -> ExitCode {
    // Logs go to stderr so stdout stays clean for the report
    let filter = EnvFilter::try_from_env("ADMIRAL_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AnalyzerConfig::load();

    if let Some(command) = cli.command {
        return run_command(command, config);
    }

    if let Some(name) = &cli.profile
        && let Err(err) = config.load_profile(name)
    {
        eprintln!("profile {name:?}: {err}");
        return ExitCode::FAILURE;
    }

    let mut inputs = cli.inputs;
    if inputs.is_empty()
        && let Some(dir) = &config.log_directory
    {
        inputs.push(dir.clone());
    }
    if inputs.is_empty() {
        eprintln!(
            "nothing to analyze: pass files or directories, or set log_directory in the config"
        );
        return ExitCode::FAILURE;
    }

    let analysis = Analysis::new(config).with_range(cli.from, cli.to);
    let report = analysis.run(&inputs);

    let rendered = if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => json,
            Err(err) => {
                eprintln!("cannot serialize report: {err}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        report::render(&report)
    };

    match cli.output {
        Some(path) => {
            if let Err(err) = std::fs::write(&path, rendered) {
                eprintln!("cannot write {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        }
        None => print!("{rendered}"),
    }
    ExitCode::SUCCESS
}

fn run_command(command: Commands, mut config: AnalyzerConfig) -> ExitCode {
    match command {
        Commands::Config => match serde_json::to_string_pretty(&config) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("cannot serialize configuration: {err}");
                return ExitCode::FAILURE;
            }
        },
        Commands::Profiles => {
            let names = config.profile_names();
            if names.is_empty() {
                println!("no saved profiles");
            }
            for name in names {
                let marker = if config.active_profile_name.as_deref() == Some(name) {
                    " (active)"
                } else {
                    ""
                };
                println!("{name}{marker}");
            }
        }
        Commands::SaveProfile { name } => match config.save_profile(name) {
            Ok(()) => config.save(),
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        },
        Commands::DeleteProfile { name } => match config.delete_profile(&name) {
            Ok(()) => config.save(),
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        },
    }
    ExitCode::SUCCESS
}

fn parse_instant(s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(|_| format!("not a date or datetime: {s:?}"))
}
