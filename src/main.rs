//! Translive: live speech transcription and translation from a terminal
//!
//! Captures microphone audio, streams it to a real-time transcription
//! service over a peer connection, and prints transcript text as it
//! arrives. Completed segments can be translated and the finished
//! transcript saved under a name.

mod config;
mod controller;
mod error;
mod languages;
mod media;
mod peer;
mod signaling;
mod storage;
mod transcript;
mod translate;

use anyhow::Context;
use controller::{RecordingController, RecordingSettings};
use media::Microphone;
use signaling::SignalingClient;
use std::sync::Arc;
use storage::TranscriptStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use transcript::TranscriptAssembler;
use translate::TranslationClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "translive=info".into()),
        )
        .init();

    let config = config::load()?;
    info!("Starting Translive");

    let signaling = Arc::new(SignalingClient::new(&config.signaling)?);
    let translator = Arc::new(TranslationClient::new(&config.translation)?);
    let assembler = Arc::new(TranscriptAssembler::new(translator));

    let store_root = TranscriptStore::default_location()
        .context("Could not determine the application data directory")?;
    let store = TranscriptStore::open(store_root);

    let controller = Arc::new(RecordingController::new(
        Arc::new(Microphone::new()),
        signaling,
        assembler,
        store,
        RecordingSettings {
            language: config.recording.language.clone(),
            translate: config.translation.enabled,
        },
    ));

    spawn_display_task(&controller);

    println!("Translive ready. Type 'help' for commands.");
    run_command_loop(controller).await
}

/// Print state changes, transcript updates, and status messages as they
/// happen.
fn spawn_display_task(controller: &Arc<RecordingController>) {
    let mut state = controller.state();
    let mut transcript = controller.transcript();
    let mut message = controller.message();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    println!("-- {:?}", *state.borrow());
                }
                changed = transcript.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = transcript.borrow().clone();
                    if !view.finalized.is_empty() || !view.in_progress.is_empty() {
                        println!("{} {}", view.finalized, view.in_progress);
                    }
                }
                changed = message.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if let Some(text) = message.borrow().clone() {
                        eprintln!("!! {}", text);
                    }
                }
            }
        }
    });
}

async fn run_command_loop(controller: Arc<RecordingController>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let mut parts = line.trim().splitn(2, ' ');
        let command = parts.next().unwrap_or_default();
        let argument = parts.next().map(str::trim).unwrap_or_default();

        match command {
            "" => {}
            "start" => report(controller.start().await),
            "pause" => report(controller.pause().await),
            "resume" => report(controller.resume().await),
            "stop" => controller.stop().await,
            "save" => {
                if argument.is_empty() {
                    eprintln!("usage: save <name>");
                } else {
                    match controller.save(argument).await {
                        Ok(path) => println!("Saved to {}", path.display()),
                        Err(e) => eprintln!("{}", e),
                    }
                }
            }
            "history" => match controller.store().list() {
                Ok(names) if names.is_empty() => println!("No saved transcripts."),
                Ok(names) => {
                    for name in names {
                        println!("  {}", name);
                    }
                }
                Err(e) => eprintln!("{}", e),
            },
            "show" => {
                if argument.is_empty() {
                    eprintln!("usage: show <name>");
                } else {
                    match controller.store().load(argument) {
                        Ok(saved) => {
                            if let Some(saved_at) = saved.saved_at {
                                println!("# {} ({})", saved.name, saved_at.format("%Y-%m-%d %H:%M"));
                            } else {
                                println!("# {}", saved.name);
                            }
                            println!("{}", saved.text);
                        }
                        Err(e) => eprintln!("{}", e),
                    }
                }
            }
            "lang" => {
                if argument.is_empty() {
                    let settings = controller.current_settings();
                    let name = languages::find(&settings.language)
                        .map(|l| l.name)
                        .unwrap_or("unknown");
                    println!("Language: {} ({})", settings.language, name);
                } else {
                    report(controller.set_language(argument));
                }
            }
            "translate" => match argument {
                "on" => report(controller.set_translate(true)),
                "off" => report(controller.set_translate(false)),
                _ => eprintln!("usage: translate on|off"),
            },
            "status" => {
                let settings = controller.current_settings();
                println!(
                    "State: {:?}, language: {}, translate: {}",
                    controller.current_state(),
                    settings.language,
                    settings.translate
                );
            }
            "help" => print_help(),
            "quit" | "exit" => break,
            other => eprintln!("Unknown command '{}'. Type 'help' for commands.", other),
        }
    }

    controller.stop().await;
    info!("Shutting down");
    Ok(())
}

fn report<T>(result: Result<T, controller::ControllerError>) {
    if let Err(e) = result {
        eprintln!("{}", e);
    }
}

fn print_help() {
    println!("Commands:");
    println!("  start            begin a new recording");
    println!("  pause / resume   mute or unmute the microphone");
    println!("  stop             end the recording");
    println!("  save <name>      save the stopped recording's transcript");
    println!("  history          list saved transcripts");
    println!("  show <name>      print a saved transcript");
    println!("  lang [code]      show or set the transcription language");
    println!("  translate on|off toggle translation of completed segments");
    println!("  status           show current state and settings");
    println!("  quit             exit");
}
