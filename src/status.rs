//! What the status icon shows for a given mixer state
//!
//! The front-end owns the actual icon and tooltip widgets.  This module
//! only decides which of the eight icon levels applies, which themed icon
//! name goes with it and what the tooltip says.

use crate::mixer::{MixerState, Volume};

/// Icon number from 1 (muted or silent) to 8 (full volume)
pub fn icon_level(volume: Volume, mute: bool) -> u8 {
    match volume {
        _ if mute => 1,
        v if v <= 0 => 1,
        v if v <= 16 => 2,
        v if v <= 33 => 3,
        v if v <= 50 => 4,
        v if v <= 67 => 5,
        v if v <= 84 => 6,
        v if v <= 99 => 7,
        _ => 8,
    }
}

/// Name of the themed icon for an icon level
pub fn icon_name(level: u8) -> &'static str {
    match level {
        0 | 1 => "audio-volume-muted",
        2..=3 => "audio-volume-low",
        4..=6 => "audio-volume-medium",
        _ => "audio-volume-high",
    }
}

pub fn tooltip(channel: &str, volume: Volume) -> String {
    format!("{}: {}%", channel, volume)
}

/// What needs redrawing after a state update
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusChange {
    /// The new icon, if the level changed
    pub icon: Option<&'static str>,
    /// The new tooltip, if the volume changed and a channel is active
    pub tooltip: Option<String>,
}

impl StatusChange {
    pub fn is_empty(&self) -> bool {
        self.icon.is_none() && self.tooltip.is_none()
    }
}

/// Last icon level and volume shown, so that only differences are drawn
#[derive(Debug, Default)]
pub struct StatusCache {
    level: Option<u8>,
    volume: Option<Volume>,
}

impl StatusCache {
    /// Record `state` and report what differs from the last update.
    /// `force` redraws everything, as after an icon theme change.
    pub fn update(&mut self, state: MixerState, channel: Option<&str>, force: bool) -> StatusChange {
        let mut change = StatusChange::default();

        let level = icon_level(state.volume, state.mute);
        if force || self.level != Some(level) {
            change.icon = Some(icon_name(level));
            self.level = Some(level);
        }

        if let Some(channel) = channel {
            if force || self.volume != Some(state.volume) {
                change.tooltip = Some(tooltip(channel, state.volume));
                self.volume = Some(state.volume);
            }
        }

        change
    }
}
