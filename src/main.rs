// EchoDepict command-line entry point
// Compose from a file, inspect or play a saved composition, export MIDI, list recorded runs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use echodepict_lib::commands::{self, AppState, ExportMidiInput};
use echodepict_lib::composition::{Composition, InputKind, RawInput};
use echodepict_lib::config::Config;
use echodepict_lib::timeline::{format_time, PlaybackClock, TimelineIndex};

/// Command-line arguments for echodepict
#[derive(Parser, Debug)]
#[command(name = "echodepict")]
#[command(about = "Turn text or CSV data into music with a synchronized narration")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "ECHODEPICT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the Analyzer -> Composer -> Narrator pipeline over a file
    Compose {
        file: PathBuf,

        /// Input type; inferred from a .csv extension when omitted
        #[arg(short = 't', long = "type", value_parser = ["csv", "text"])]
        input_type: Option<String>,

        /// Write the composition JSON here instead of printing the response
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Also export the composition as a MIDI file
        #[arg(long)]
        midi: Option<PathBuf>,
    },

    /// Show the active note, narration line and inspector at one instant
    Inspect {
        composition: PathBuf,

        /// Playback time in seconds
        #[arg(long)]
        at: f64,
    },

    /// Play a composition against the wall clock, printing what becomes active
    Play {
        composition: PathBuf,

        /// Ticks per second
        #[arg(long, default_value = "30")]
        fps: u32,
    },

    /// Export a saved composition as a Standard MIDI File
    ExportMidi {
        composition: PathBuf,
        out: PathBuf,

        #[arg(long, default_value = "480")]
        ppq: u16,

        /// Leave narration markers out
        #[arg(long)]
        no_narration: bool,
    },

    /// List recorded runs, newest first
    Runs {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Compose {
            file,
            input_type,
            out,
            midi,
        } => compose(&config, &file, input_type, out, midi).await,
        Command::Inspect { composition, at } => inspect(&composition, at).await,
        Command::Play { composition, fps } => play(&composition, fps).await,
        Command::ExportMidi {
            composition,
            out,
            ppq,
            no_narration,
        } => export_midi(&composition, &out, ppq, no_narration).await,
        Command::Runs { limit } => runs(&config, limit),
    }
}

fn infer_input_type(file: &Path) -> InputKind {
    match file.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => InputKind::Csv,
        _ => InputKind::Text,
    }
}

async fn load_composition(path: &Path) -> Result<Composition> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Composition::from_json_bytes(&bytes)
        .with_context(|| format!("{} is not a composition", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn compose(
    config: &Config,
    file: &Path,
    input_type: Option<String>,
    out: Option<PathBuf>,
    midi: Option<PathBuf>,
) -> Result<()> {
    let data = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let input_type = input_type.unwrap_or_else(|| infer_input_type(file).as_str().to_string());

    let state = AppState::from_config(config)
        .map_err(|e| anyhow::anyhow!("{}", e.message()))?;

    let response = commands::compose(&state, RawInput { input_type, data }).await;

    let Some(composition) = response.data.as_ref() else {
        print_json(&response)?;
        std::process::exit(1);
    };

    match &out {
        Some(out) => {
            tokio::fs::write(out, composition.to_json_pretty()?)
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            log::info!("Wrote composition to {}", out.display());
        }
        None => print_json(&response)?,
    }

    if let Some(midi) = midi {
        let bytes = echodepict_lib::export::export_midi(composition, &Default::default())?;
        tokio::fs::write(&midi, bytes)
            .await
            .with_context(|| format!("Failed to write {}", midi.display()))?;
        log::info!("Wrote MIDI to {}", midi.display());
    }

    Ok(())
}

async fn inspect(path: &Path, at: f64) -> Result<()> {
    let composition = load_composition(path).await?;
    let response = commands::inspect_at(&composition, at);
    print_json(&response)?;

    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn play(path: &Path, fps: u32) -> Result<()> {
    if fps == 0 {
        bail!("--fps must be at least 1");
    }

    let composition = Arc::new(load_composition(path).await?);
    let mut clock = PlaybackClock::new(composition.duration());
    let mut position = clock.subscribe();

    println!(
        "{} at {} BPM, {}",
        composition.audio_mapping.key,
        composition.audio_mapping.tempo,
        format_time(clock.duration())
    );

    let consumer = {
        let composition = Arc::clone(&composition);
        tokio::spawn(async move {
            let index = TimelineIndex::new(&composition);
            let mut last_note = None;
            let mut last_line = None;

            while let Some(tick) = position.changed().await {
                let narration = index.active_narration_index(tick.time);
                if narration != last_line {
                    if let Some(line) = index.active_narration_line(tick.time) {
                        println!("[{}] {}", format_time(tick.time), line.text);
                    }
                    last_line = narration;
                }

                let note = index.active_note(tick.time).map(|n| n.time);
                if note != last_note {
                    if let Some(n) = index.active_note(tick.time) {
                        println!(
                            "[{}]   {} ({:.2}s) <- {}",
                            format_time(tick.time),
                            n.note,
                            n.duration,
                            n.data_point
                        );
                    }
                    last_note = note;
                }

                if tick.ended {
                    break;
                }
            }
        })
    };

    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / fps as f64));
    clock.play();
    loop {
        interval.tick().await;
        if clock.tick().ended {
            break;
        }
    }

    drop(clock);
    consumer.await?;
    println!("Ended at {}", format_time(composition.duration()));
    Ok(())
}

async fn export_midi(path: &Path, out: &Path, ppq: u16, no_narration: bool) -> Result<()> {
    let composition = load_composition(path).await?;
    let response = commands::export_midi_command(&ExportMidiInput {
        composition,
        ppq: Some(ppq),
        include_tempo: None,
        include_narration: Some(!no_narration),
        track_names: None,
    });

    match (response.data, response.error) {
        (Some(bytes), _) => {
            tokio::fs::write(out, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            log::info!("Wrote {} bytes of MIDI to {}", bytes.len(), out.display());
            Ok(())
        }
        (None, error) => bail!(error.unwrap_or_else(|| "MIDI export failed".to_string())),
    }
}

fn runs(config: &Config, limit: u32) -> Result<()> {
    let state = AppState::from_config(config)
        .map_err(|e| anyhow::anyhow!("{}", e.message()))?;
    let response = commands::list_runs(&state, limit);
    print_json(&response)?;

    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}
