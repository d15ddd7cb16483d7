// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use crossterm::{
    cursor,
    event::{
        read, Event, KeyCode, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    style::Print,
    terminal::{self, Clear, ClearType},
};
use tracing::{error, info};

use klavier::audio;
use klavier::config::{self, BackendKind, Playback};
use klavier::input::{Contact, Reconciler};
use klavier::keymap;
use klavier::registry::Registry;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A virtual piano."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plays the piano interactively using the computer keyboard.
    Play {
        /// The path to an optional playback configuration file.
        #[clap(long)]
        config: Option<PathBuf>,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Prints the key to note bindings.
    Keys {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Play { config } => play(config).await,
        Commands::Devices {} => {
            println!("Available audio output devices:");
            for name in audio::list_devices()? {
                println!("- {}", name);
            }
            Ok(())
        }
        Commands::Keys {} => {
            for (key, note) in keymap::bindings() {
                println!("{} -> {}", key, note);
            }
            Ok(())
        }
    }
}

/// Runs the interactive piano until the user quits.
async fn play(config_path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let config = match config_path {
        Some(path) => config::load(&path)?,
        None => Playback::default(),
    };

    let backend = audio::get_backend(&config)?;
    let registry = Arc::new(Registry::new(backend));

    // The crossterm event loop blocks, so keep it off the runtime workers.
    let result = {
        let registry = Arc::clone(&registry);
        tokio::task::spawn_blocking(move || keyboard_loop(registry, config)).await?
    };

    registry.silence();
    result.map_err(|err| err as Box<dyn Error>)
}

/// Reads terminal key events and feeds them through the reconciler.
fn keyboard_loop(
    registry: Arc<Registry>,
    config: Playback,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut reconciler = Reconciler::new(Arc::clone(&registry));

    terminal::enable_raw_mode()?;
    // Without keyboard enhancement the terminal reports no key releases, so
    // each press degrades to a tap: press and release in the same event,
    // kept audible by the registry's minimum note duration.
    let supports_release = terminal::supports_keyboard_enhancement().unwrap_or(false);
    if supports_release {
        execute!(
            io::stdout(),
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        )?;
    } else {
        info!("Terminal does not report key releases; running in tap mode");
    }

    println!("Play with the keyboard (see `klavier keys`).\r");
    println!("Tab toggles samples/synth, Esc quits.\r");

    let mut use_samples = config.backend == BackendKind::Samples;
    let result = run_events(
        &registry,
        &mut reconciler,
        &config,
        &mut use_samples,
        supports_release,
    );

    if supports_release {
        let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
    }
    terminal::disable_raw_mode()?;
    println!();
    result
}

fn run_events(
    registry: &Arc<Registry>,
    reconciler: &mut Reconciler<Arc<Registry>>,
    config: &Playback,
    use_samples: &mut bool,
    supports_release: bool,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    loop {
        let event = read()?;
        let Event::Key(key) = event else {
            continue;
        };

        match (key.code, key.kind) {
            (KeyCode::Esc, KeyEventKind::Press) => return Ok(()),
            (KeyCode::Char('c'), KeyEventKind::Press)
                if key.modifiers.contains(KeyModifiers::CONTROL) =>
            {
                return Ok(());
            }
            (KeyCode::Tab, KeyEventKind::Press) => {
                *use_samples = !*use_samples;
                let mut next = config.clone();
                next.backend = if *use_samples {
                    BackendKind::Samples
                } else {
                    BackendKind::Synth
                };
                match audio::get_backend(&next) {
                    Ok(backend) => registry.set_backend(backend),
                    Err(err) => error!(err = err.as_ref(), "Unable to switch backend"),
                }
            }
            (KeyCode::Char(c), KeyEventKind::Press) => {
                let contact = Contact::Key(c.to_ascii_lowercase());
                reconciler.contact_start(contact, keymap::note_for_key(c));
                if !supports_release {
                    reconciler.contact_end(contact);
                }
                show_active(registry)?;
            }
            (KeyCode::Char(c), KeyEventKind::Release) => {
                reconciler.contact_end(Contact::Key(c.to_ascii_lowercase()));
                show_active(registry)?;
            }
            // The reconciler swallows repeats of the claimed note anyway;
            // dropping them here just avoids the redraw.
            (_, KeyEventKind::Repeat) => {}
            _ => {}
        }
    }
}

/// Redraws the held-notes status line in place.
fn show_active(registry: &Arc<Registry>) -> Result<(), Box<dyn Error + Send + Sync>> {
    let notes: Vec<String> = registry
        .active()
        .iter()
        .map(|note| note.to_string())
        .collect();
    execute!(
        io::stdout(),
        cursor::MoveToColumn(0),
        Clear(ClearType::CurrentLine),
        Print(notes.join(" ")),
    )?;
    io::stdout().flush()?;
    Ok(())
}
