//! Mapping between native mixer values and volume percentages
//!
//! The decibel mapping follows alsamixer: ranges of up to 24 dB are linear
//! in dB, anything wider is mapped through `10^(dB/60)` so that equal steps
//! sound roughly equally loud.

use super::Volume;
use crate::error::MixerError;

/// Gain ALSA reports for a control whose minimum is silence, in millibels
pub const DB_GAIN_MUTE: i64 = -9_999_999;

/// dB ranges no wider than this many millibels are mapped linearly
const MAX_LINEAR_DB_SCALE: i64 = 24 * 100;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VolumeScale {
    /// The raw hardware range, mapped linearly
    #[default]
    Linear,
    /// Perceptual mapping through the control's dB range
    Decibel,
}

impl VolumeScale {
    pub fn from_decibel(decibel: bool) -> Self {
        if decibel {
            Self::Decibel
        } else {
            Self::Linear
        }
    }
}

/// The playback half of a simple mixer element
pub trait PlaybackControl {
    fn raw_range(&self) -> (i64, i64);
    fn raw_volume(&self) -> Result<i64, MixerError>;
    /// Set every sub-channel of the control at once
    fn set_raw_volume(&self, value: i64) -> Result<(), MixerError>;

    /// Range in millibels, `None` if the control carries no dB information
    fn db_range(&self) -> Option<(i64, i64)>;
    fn db_volume(&self) -> Result<i64, MixerError>;
    /// Raw value the card would use for `value` millibels, rounding down or up
    fn db_to_raw(&self, value: i64, up: bool) -> Result<i64, MixerError>;
    /// Gain in millibels of a raw value
    fn raw_to_db(&self, raw: i64) -> Result<i64, MixerError>;

    fn has_switch(&self) -> bool;
    /// `true` means sound is playing
    fn switch(&self) -> Result<bool, MixerError>;
    fn set_switch(&self, on: bool) -> Result<(), MixerError>;
}

fn exp10(x: f64) -> f64 {
    10f64.powf(x)
}

pub fn raw_to_fraction(value: i64, (min, max): (i64, i64)) -> f64 {
    if max <= min {
        return 0.0;
    }
    ((value - min) as f64 / (max - min) as f64).clamp(0.0, 1.0)
}

pub fn fraction_to_raw(fraction: f64, (min, max): (i64, i64)) -> i64 {
    if max <= min {
        return min;
    }
    (fraction.clamp(0.0, 1.0) * (max - min) as f64).round() as i64 + min
}

fn is_linear_db((min, max): (i64, i64)) -> bool {
    max - min <= MAX_LINEAR_DB_SCALE
}

fn min_norm((min, max): (i64, i64)) -> Option<f64> {
    (min != DB_GAIN_MUTE).then(|| exp10((min - max) as f64 / 6000.0))
}

pub fn db_to_fraction(value: i64, range: (i64, i64)) -> f64 {
    if is_linear_db(range) {
        return raw_to_fraction(value, range);
    }

    let mut normalized = exp10((value - range.1) as f64 / 6000.0);
    if let Some(min_norm) = min_norm(range) {
        normalized = (normalized - min_norm) / (1.0 - min_norm);
    }
    normalized.clamp(0.0, 1.0)
}

pub fn fraction_to_db(fraction: f64, range: (i64, i64)) -> i64 {
    if is_linear_db(range) {
        return fraction_to_raw(fraction, range);
    }

    let mut volume = fraction.clamp(0.0, 1.0);
    if let Some(min_norm) = min_norm(range) {
        volume = volume * (1.0 - min_norm) + min_norm;
    }
    if volume <= 0.0 {
        return range.0;
    }
    ((6000.0 * volume.log10()).round() as i64 + range.1).clamp(range.0, range.1)
}

/// Current volume of `control` as a fraction in `0.0..=1.0`
pub fn normalized_volume<C: PlaybackControl + ?Sized>(
    control: &C,
    scale: VolumeScale,
) -> Result<f64, MixerError> {
    match (scale, control.db_range()) {
        (VolumeScale::Decibel, Some(range)) => Ok(db_to_fraction(control.db_volume()?, range)),
        _ => Ok(raw_to_fraction(control.raw_volume()?, control.raw_range())),
    }
}

/// The reachable raw value whose gain lands closest to `fraction`
///
/// Cards only accept gains in fixed steps, so the steps on either side of the
/// exact target are compared in volume space.
fn nearest_db_raw<C: PlaybackControl + ?Sized>(
    control: &C,
    fraction: f64,
    range: (i64, i64),
) -> Result<i64, MixerError> {
    let target = fraction_to_db(fraction, range);
    let below = control.db_to_raw(target, false)?;
    let above = control.db_to_raw(target, true)?;
    if below == above {
        return Ok(below);
    }

    let distance = |raw| -> Result<f64, MixerError> {
        Ok((db_to_fraction(control.raw_to_db(raw)?, range) - fraction).abs())
    };
    if distance(above)? < distance(below)? {
        Ok(above)
    } else {
        Ok(below)
    }
}

pub fn set_normalized_volume<C: PlaybackControl + ?Sized>(
    control: &C,
    fraction: f64,
    scale: VolumeScale,
) -> Result<(), MixerError> {
    match (scale, control.db_range()) {
        (VolumeScale::Decibel, Some(range)) => {
            control.set_raw_volume(nearest_db_raw(control, fraction, range)?)
        }
        _ => control.set_raw_volume(fraction_to_raw(fraction, control.raw_range())),
    }
}

pub fn to_percent(fraction: f64) -> Volume {
    (fraction * 100.0).round() as Volume
}

pub fn from_percent(volume: Volume) -> f64 {
    f64::from(volume) / 100.0
}
