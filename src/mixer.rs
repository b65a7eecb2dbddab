//! Volume control abstraction over a native sound mixer
//!
//! A [`MixerBackend`] drives exactly one channel on one device at a time.
//! Two implementations exist: [`AlsaBackend`] which follows external
//! changes through the mixer's poll descriptor, and [`OssBackend`] which
//! talks to the OSS4 extended mixer API and polls for changes.
//!
//! Setters return the resulting [`MixerState`] directly.  The change
//! callback handed to [`MixerBackend::setup`] only ever fires for changes
//! made outside this process.

mod alsa_mixer;
mod channels;
pub mod mapping;
mod oss_mixer;

pub use alsa_mixer::{AlsaBackend, MixerDevice};
pub use channels::{ChannelRegistry, Subscription};
pub use mapping::VolumeScale;
pub use oss_mixer::{Control, DevMixer, OssBackend, OssDevice};

use crate::error::MixerError;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// A volume percentage, always within `0..=100` once it leaves a backend
pub type Volume = i32;

/// Volume and mute of the active channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MixerState {
    pub volume: Volume,
    pub mute: bool,
}

/// Invoked with the new state whenever another process changes the mixer
pub type ChangeCallback = Rc<dyn Fn(MixerState)>;

/// Which native mixer API to drive
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Alsa,
    Oss,
}

impl Default for BackendKind {
    fn default() -> Self {
        Self::Alsa
    }
}

/// Capability interface shared by every mixer implementation
pub trait MixerBackend {
    /// Open `device`, enumerate its playback channels and select
    /// `channel`, falling back to the first channel found.
    fn setup(
        &mut self,
        device: &str,
        channel: Option<&str>,
        on_change: ChangeCallback,
    ) -> Result<(), MixerError>;

    /// Switch to another channel of the open device
    fn set_channel(&mut self, channel: &str);

    /// Name of the active channel
    fn channel(&self) -> Option<String>;

    /// Name of the device given to `setup`
    fn device(&self) -> Option<String>;

    fn volume(&self) -> Volume;

    fn set_volume(&mut self, volume: Volume) -> MixerState;

    fn mute(&self) -> bool;

    /// Mute or unmute the active channel.
    ///
    /// Controls without a mute switch are muted by dropping their volume
    /// to zero, and unmuting them leaves the volume where it is.
    fn set_mute(&mut self, mute: bool) -> MixerState;

    fn channel_names(&self) -> Vec<String>;

    /// Devices which can be handed to `setup`, empty if the backend has
    /// no notion of multiple devices
    fn device_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn state(&self) -> MixerState {
        MixerState {
            volume: self.volume(),
            mute: self.mute(),
        }
    }
}

pub fn clamp_volume(volume: i32) -> Volume {
    volume.clamp(0, 100)
}

/// Create the backend selected at startup
pub fn create_backend(kind: BackendKind, scale: VolumeScale) -> Box<dyn MixerBackend> {
    match kind {
        BackendKind::Alsa => Box::new(AlsaBackend::new(scale)),
        BackendKind::Oss => Box::new(OssBackend::system()),
    }
}
