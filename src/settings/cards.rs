use crate::mixer::{BackendKind, VolumeScale};
use serde::{Deserialize, Serialize};

/// Remember the sound card and channel last used
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    pub backend: BackendKind,
    /// Card name as listed by the backend, `default` is the system default
    pub card: String,
    /// Channel to control, the first one found when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Map volume through the card's dB range instead of its raw range
    pub decibel_scale: bool,
}

impl MixerSettings {
    pub fn scale(&self) -> VolumeScale {
        VolumeScale::from_decibel(self.decibel_scale)
    }
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            card: "default".to_owned(),
            channel: None,
            decibel_scale: false,
        }
    }
}
