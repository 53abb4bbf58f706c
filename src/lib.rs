// Circuit Breaker - guided nervous-system regulation with spoken guidance
// Module declarations
pub mod audio;
pub mod commands;
pub mod error;
pub mod protocol;
pub mod settings;
pub mod speech;
pub mod state;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use settings::{AppSettings, HOME_ENV};
use state::AppState;

pub use error::{AudioError, Result};

#[derive(Parser, Debug)]
#[command(name = "circuit-breaker", version, about, arg_required_else_help = true)]
pub struct Cli {
    /// Directory holding settings.json
    #[arg(long, global = true, env = HOME_ENV)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List the built-in protocols
    Protocols,
    /// Show one protocol as JSON
    Protocol { id: String },
    /// Play an audio file or .b64 payload
    Play {
        file: PathBuf,
        /// Linear gain, 0.0-1.0; defaults to the guidance volume
        volume: Option<f32>,
    },
    /// Run a protocol with spoken cues
    Session {
        id: String,
        /// Directory of pre-rendered cue clips
        #[arg(long)]
        clips: Option<PathBuf>,
        #[arg(long)]
        mute: bool,
    },
    /// Show current settings
    Settings,
    /// Set the guidance volume
    Volume {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        value: u8,
    },
    /// Enable or disable guidance audio
    Audio { state: OnOff },
    /// Add or remove a protocol from the favorites
    Favorite { id: String },
    /// Completed sessions, favorites and journal size
    Stats,
    /// Plain-text reflections
    Journal {
        #[command(subcommand)]
        action: JournalCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum JournalCommand {
    /// Save an entry
    Add {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Protocol the entry follows
        #[arg(long)]
        protocol: Option<String>,
    },
    /// Show entries, newest first
    List,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[clap(rename_all = "lowercase")]
pub enum OnOff {
    On,
    Off,
}

/// Entry point used by the binary
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let app_dir = cli.home.clone().unwrap_or_else(AppSettings::default_app_dir);
    let state = AppState::load(app_dir.clone())
        .with_context(|| format!("Failed to load settings from {:?}", app_dir))?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(dispatch(&state, cli.command))
}

async fn dispatch(state: &AppState, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Protocols => {
            for p in commands::list_protocols(state) {
                println!(
                    "{} {:<10} {:<18} {:>3}s {} {:>3}x  {}",
                    p.icon,
                    p.id,
                    p.title,
                    p.duration,
                    if p.favorite { "*" } else { " " },
                    p.completed,
                    p.description
                );
            }
        }
        Command::Protocol { id } => {
            let protocol = commands::show_protocol(&id)?;
            println!("{}", serde_json::to_string_pretty(&protocol)?);
        }
        Command::Play { file, volume } => {
            let started = commands::play_file(state, &file, volume).await?;
            println!(
                "Played {:?} ({:?}, {:.2}s)",
                file,
                started.path,
                started.duration.as_secs_f32()
            );
        }
        Command::Session { id, clips, mute } => {
            let summary = commands::run_protocol(state, &id, clips, mute).await?;
            println!(
                "{} after {}s ({} cues, {} step changes)",
                if summary.completed { "Completed" } else { "Stopped" },
                summary.elapsed,
                summary.cues_fired,
                summary.step_changes
            );
        }
        Command::Settings => {
            let settings = commands::show_settings(state);
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::Volume { value } => {
            commands::set_volume(state, value)?;
            println!("Guidance volume set to {}", value);
        }
        Command::Audio { state: switch } => {
            let enabled = switch == OnOff::On;
            commands::set_audio_enabled(state, enabled)?;
            println!("Guidance audio {}", if enabled { "enabled" } else { "disabled" });
        }
        Command::Favorite { id } => {
            let favorite = commands::toggle_favorite(state, &id)?;
            println!("{} {} favorites", if favorite { "Added to" } else { "Removed from" }, id);
        }
        Command::Stats => {
            let stats = commands::practice_stats(state);
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Journal { action } => match action {
            JournalCommand::Add { text, protocol } => {
                let entry = commands::add_journal_entry(state, &text.join(" "), protocol.as_deref())?;
                println!("Saved entry {} ({})", entry.id, entry.protocol);
            }
            JournalCommand::List => {
                for entry in commands::journal_entries(state) {
                    println!("{}  [{}]\n  {}\n", entry.date, entry.protocol, entry.text);
                }
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> std::result::Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("circuit-breaker").chain(line.split_whitespace()))
            .map(|cli| cli.command)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("protocols").unwrap(), Command::Protocols);
        assert_eq!(
            parse("play cue.wav 0.5").unwrap(),
            Command::Play {
                file: PathBuf::from("cue.wav"),
                volume: Some(0.5)
            }
        );
        assert_eq!(
            parse("session panic --mute --clips clips").unwrap(),
            Command::Session {
                id: "panic".to_string(),
                clips: Some(PathBuf::from("clips")),
                mute: true
            }
        );
        assert_eq!(parse("volume 65").unwrap(), Command::Volume { value: 65 });
        assert_eq!(parse("audio off").unwrap(), Command::Audio { state: OnOff::Off });
        assert_eq!(parse("favorite freeze").unwrap(), Command::Favorite { id: "freeze".to_string() });
        assert_eq!(
            parse("journal add felt the floor --protocol freeze").unwrap(),
            Command::Journal {
                action: JournalCommand::Add {
                    text: vec!["felt".to_string(), "the".to_string(), "floor".to_string()],
                    protocol: Some("freeze".to_string())
                }
            }
        );
    }

    #[test]
    fn test_home_flag() {
        let cli = Cli::try_parse_from(["circuit-breaker", "stats", "--home", "/tmp/cb"]).unwrap();
        assert_eq!(cli.home, Some(PathBuf::from("/tmp/cb")));
        assert_eq!(cli.command, Command::Stats);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("dance").is_err());
        assert!(parse("play").is_err());
        assert!(parse("play cue.wav loud").is_err());
        assert!(parse("volume 101").is_err());
        assert!(parse("volume 300").is_err());
        assert!(parse("session panic --fast").is_err());
        assert!(parse("audio maybe").is_err());
        assert!(parse("journal add").is_err());
    }
}
