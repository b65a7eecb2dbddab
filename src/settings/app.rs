use serde::{Deserialize, Serialize};

/// Status icon behaviour
///
/// Apart from `stepsize`, which also drives the hotkeys, these are only
/// read by the front-end that draws the icon and the slider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusIconSettings {
    /// Command started when the icon is activated
    pub onclick: String,
    /// Percent added or removed per scroll or hotkey press
    pub stepsize: i32,
    /// Icon theme, `Default` follows the desktop's icon theme
    pub theme: String,
    pub use_panel_specific_icons: bool,
    /// Left click opens the slider instead of running `onclick`
    pub lmb_slider: bool,
    /// Middle click toggles mute
    pub mmb_mute: bool,
    pub use_horizontal_slider: bool,
    pub show_sound_level: bool,
    pub use_transparent_background: bool,
}

impl Default for StatusIconSettings {
    fn default() -> Self {
        Self {
            onclick: "xterm -e 'alsamixer'".to_owned(),
            stepsize: 5,
            theme: "Default".to_owned(),
            use_panel_specific_icons: false,
            lmb_slider: false,
            mmb_mute: false,
            use_horizontal_slider: false,
            show_sound_level: false,
            use_transparent_background: false,
        }
    }
}

/// Volume change notifications
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub show_notification: bool,
    pub notification_type: NotificationType,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            show_notification: true,
            notification_type: NotificationType::Native,
        }
    }
}

/// How a volume change is announced
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    /// A popup window drawn by voltray itself
    Native,
    /// The desktop notification daemon
    Libnotify,
}
