use subsync::config::PlayerConfig;
use subsync::parser::Parser;
use subsync::track::SubtitleTrack;
use subsync::{player, processor, serialiser};

use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    match run() {
        Ok(()) => (),
        Err(err) => {
            eprintln!("An error occurred: {}", err);
            for cause in err.chain().skip(1) {
                eprintln!("    {}", cause);
            }
            std::process::exit(1);
        }
    }
}

#[derive(ClapParser)]
#[command(about = "Parse SRT subtitles and keep them in sync with playback")]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "LEVEL",
        help = "Log level for messages on standard error. Overrides the configured level."
    )]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a subtitle file and report what was found in it.
    Check {
        #[arg(
            value_name = "FILE",
            help = "The file to read from. Use '-' for standard input.",
            default_value = "-"
        )]
        input: String,
    },
    /// Print the caption shown at a point in time.
    Lookup {
        #[arg(value_name = "FILE", help = "The file to read from. Use '-' for standard input.")]
        input: String,
        #[arg(short, long, value_name = "SECONDS", help = "Playback position in seconds.")]
        at: f64,
    },
    /// Rewrite a subtitle file sorted by start time and renumbered from 1.
    Normalize {
        #[arg(
            short,
            long,
            value_name = "FILE",
            help = "The file to read from. If not supplied, the subtitles will be read from standard input.",
            default_value = "-"
        )]
        input: String,
        #[arg(
            short,
            long,
            value_name = "FILE",
            help = "The file to write to. If not supplied, the subtitles will be written to standard output.",
            default_value = "-"
        )]
        output: String,
        #[arg(
            short,
            long,
            value_name = "FILE",
            help = "Write a backup of the original input to the specified file."
        )]
        backup: Option<String>,
    },
    /// Play a playlist, printing captions as they appear.
    Play {
        #[arg(
            value_name = "CONFIG",
            help = "Playlist configuration in TOML.",
            default_value = "playlist.toml"
        )]
        config: PathBuf,
    },
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Check { input } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"));
            check(&input)
        }
        Command::Lookup { input, at } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"));
            lookup(&input, at)
        }
        Command::Normalize {
            input,
            output,
            backup,
        } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"));
            normalize(&input, &output, backup)
        }
        Command::Play { config } => {
            let config = PlayerConfig::from_file(&config)
                .context(format!("Failed to load configuration: '{}'", config.display()))?;
            init_logging(cli.log_level.as_deref().unwrap_or(&config.logging.level));
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to start the async runtime")?;
            runtime.block_on(player::run(config))
        }
    }
}

fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("subsync={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn read_input(input: &str) -> Result<String> {
    let data = if input == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(input).context(format!("Failed to open input file: '{}'", input))?
    };
    if data.trim().is_empty() {
        return Err(anyhow!("You appear to have supplied an empty file."));
    }
    Ok(data)
}

fn load_track(input: &str) -> Result<(SubtitleTrack, Parser)> {
    let data = read_input(input)?;
    let mut parser = Parser::new();
    let entries = parser
        .parse(&data)
        .context(format!("Failed to parse SRT file: '{}'", input))?;
    Ok((SubtitleTrack::from_entries(entries)?, parser))
}

fn check(input: &str) -> Result<()> {
    let (track, parser) = load_track(input)?;
    for skipped in parser.skipped() {
        println!("line {}: skipped block ({})", skipped.line, skipped.reason);
    }
    let (first, last) = track.span();
    println!(
        "{} captions, {} skipped, from {} to {}",
        track.len(),
        parser.skipped().len(),
        clock(first),
        clock(last)
    );
    Ok(())
}

fn lookup(input: &str, at: f64) -> Result<()> {
    let (track, _) = load_track(input)?;
    match track.active_entry(at) {
        Some(entry) => {
            println!(
                "#{} {} --> {}",
                entry.index(),
                clock(entry.show_at()),
                clock(entry.hide_at())
            );
            println!("{}", entry.text());
        }
        None => println!("No caption at {:.3}s", at),
    }
    Ok(())
}

fn normalize(input: &str, output: &str, backup: Option<String>) -> Result<()> {
    let data = read_input(input)?;
    if let Some(backup_path) = backup {
        std::fs::write(&backup_path, &data)
            .context(format!("Failed to write backup: '{}'", backup_path))?;
    }

    let mut parser = Parser::new();
    let entries = parser
        .parse(&data)
        .context(format!("Failed to parse SRT file: '{}'", input))?;
    let entries = processor::renumber(&entries);

    if output == "-" {
        serialiser::serialise(&entries, io::stdout())?;
    } else {
        let dst = std::fs::File::create(output)
            .context(format!("Failed to create output file: '{}'", output))?;
        serialiser::serialise(&entries, dst)?;
    }
    Ok(())
}

fn clock(at: Duration) -> String {
    let secs = at.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60,
        at.subsec_millis()
    )
}
