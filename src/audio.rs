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
use std::{error::Error, fmt, sync::Arc};

use cpal::traits::{DeviceTrait, HostTrait};

use crate::config;
use crate::note::Note;

pub mod mock;
pub mod output;
pub mod samples;
pub mod synth;

/// A playback backend. Operations are side effects only: playback failures
/// degrade per note (logged by the backend) rather than surfacing errors,
/// so nothing here is fallible.
pub trait Backend: fmt::Display + Send + Sync {
    /// Begins audible playback of the note.
    fn start(&self, note: Note);

    /// Ends the most recent playback associated with the note. Safe to call
    /// when nothing is playing.
    fn stop(&self, note: Note);

    /// Readies the output for playback. Called opportunistically before
    /// every start; must be idempotent.
    fn resume(&self);
}

/// Builds the playback backend selected by the config.
pub fn get_backend(config: &config::Playback) -> Result<Arc<dyn Backend>, Box<dyn Error>> {
    Ok(match config.backend {
        config::BackendKind::Mock => Arc::new(mock::Backend::get("mock")),
        config::BackendKind::Synth => Arc::new(synth::Backend::new(config.device.as_deref())?),
        config::BackendKind::Samples => Arc::new(samples::Backend::new(
            &config.samples,
            config.device.as_deref(),
        )?),
    })
}

/// Lists the names of the output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for device in host.output_devices()? {
        names.push(device.name()?);
    }
    Ok(names)
}
