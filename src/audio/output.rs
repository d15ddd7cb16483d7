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

//! Shared cpal output plumbing for the audible backends.
//!
//! A `cpal::Stream` is not `Send`, so the stream lives on a dedicated
//! thread for its whole life. The owning thread builds the stream, reports
//! the result back, and then services a small command channel until the
//! handle is dropped.

use std::{error::Error, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

enum Command {
    Resume,
    Shutdown,
}

/// An output device that has been selected and probed but whose stream has
/// not been built yet. Backends use the probed format to size their mixers
/// before handing over a render callback.
pub struct OpenOutput {
    device: cpal::Device,
    name: String,
    channels: u16,
    sample_rate: u32,
}

/// Picks an output device (the default one unless a name is given) and
/// probes a playable f32 stream config for it.
pub fn open(preferred: Option<&str>) -> Result<OpenOutput, Box<dyn Error>> {
    let host = cpal::default_host();

    let device = match preferred {
        Some(name) => host
            .output_devices()?
            .find(|device| device.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| format!("no output device named {}", name))?,
        None => host
            .default_output_device()
            .ok_or("no default output device")?,
    };
    let name = device.name()?;

    let default = device.default_output_config()?;
    let config = if default.sample_format() == cpal::SampleFormat::F32 {
        default
    } else {
        device
            .supported_output_configs()?
            .filter(|config| config.sample_format() == cpal::SampleFormat::F32)
            .map(|config| config.with_max_sample_rate())
            .next()
            .ok_or_else(|| format!("device {} has no f32 output config", name))?
    };

    Ok(OpenOutput {
        name,
        channels: config.channels(),
        sample_rate: config.sample_rate().0,
        device,
    })
}

impl OpenOutput {
    /// The device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of interleaved output channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// The output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Builds the stream on its owning thread with the given render
    /// callback. The callback must fill the entire interleaved buffer on
    /// every invocation.
    pub fn start<F>(self, mut render: F) -> Result<OutputStream, Box<dyn Error>>
    where
        F: FnMut(&mut [f32]) + Send + 'static,
    {
        let (command_tx, command_rx) = crossbeam_channel::unbounded::<Command>();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

        let config = cpal::StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let device = self.device;
        let name = self.name.clone();

        let thread = thread::spawn(move || {
            let stream = device.build_output_stream(
                &config,
                move |data: &mut [f32], _| render(data),
                |err| error!(err = %err, "Output stream error"),
                None,
            );
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = ready_tx.send(Err(err.to_string()));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            // Service commands until the handle drops.
            while let Ok(command) = command_rx.recv() {
                match command {
                    Command::Resume => {
                        if let Err(err) = stream.play() {
                            error!(err = %err, "Unable to start output stream");
                        }
                    }
                    Command::Shutdown => break,
                }
            }
        });

        ready_rx
            .recv()
            .map_err(|_| "output thread exited before reporting readiness")??;

        info!(
            device = name,
            channels = self.channels,
            sample_rate = self.sample_rate,
            "Opened output stream"
        );

        Ok(OutputStream {
            name,
            commands: command_tx,
            thread: Some(thread),
        })
    }
}

/// A running output stream. Dropping it shuts the stream thread down.
pub struct OutputStream {
    name: String,
    commands: crossbeam_channel::Sender<Command>,
    thread: Option<thread::JoinHandle<()>>,
}

impl OutputStream {
    /// The device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts (or keeps) the stream playing. Idempotent; called before
    /// every note start to mirror how browser audio contexts must be
    /// resumed from a user gesture.
    pub fn resume(&self) {
        let _ = self.commands.send(Command::Resume);
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
