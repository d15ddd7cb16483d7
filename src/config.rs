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
use std::{error::Error, fs, path::Path, path::PathBuf};

use serde::Deserialize;

/// Which playback backend to construct.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Per-note WAV samples.
    Samples,
    /// The polyphonic synthesizer.
    #[default]
    Synth,
    /// The recording mock; plays nothing.
    Mock,
}

/// Playback configuration, parsed from a YAML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Playback {
    /// The backend to play notes through.
    pub backend: BackendKind,
    /// Directory holding one `<note>.wav` per playable note.
    pub samples: PathBuf,
    /// Preferred output device; the default device when unset.
    pub device: Option<String>,
}

impl Default for Playback {
    fn default() -> Playback {
        Playback {
            backend: BackendKind::default(),
            samples: PathBuf::from("assets/audio/piano"),
            device: None,
        }
    }
}

/// Parses playback configuration from a YAML file.
pub fn load(path: &Path) -> Result<Playback, Box<dyn Error>> {
    let config: Playback = serde_yml::from_str(&fs::read_to_string(path)?)
        .map_err(|e| format!("error parsing config file {}: {}", path.display(), e))?;
    Ok(config)
}
