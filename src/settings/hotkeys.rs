use serde::{Deserialize, Serialize};

/// Global hotkeys, as accelerator strings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeySettings {
    pub up: String,
    pub down: String,
    pub mute: String,
    pub up_enabled: bool,
    pub down_enabled: bool,
    pub mute_enabled: bool,
}

impl Default for HotkeySettings {
    fn default() -> Self {
        Self {
            up: "XF86AudioRaiseVolume".to_owned(),
            down: "XF86AudioLowerVolume".to_owned(),
            mute: "XF86AudioMute".to_owned(),
            up_enabled: false,
            down_enabled: false,
            mute_enabled: false,
        }
    }
}
