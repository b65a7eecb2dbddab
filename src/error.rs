use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("settings io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no home directory to store settings in")]
    NoConfigDir,
}

/// Errors raised by the mixer backends
#[derive(Error, Debug)]
pub enum MixerError {
    #[error("alsa: {0}")]
    Alsa(#[from] alsa::Error),
    #[error("mixer io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to open sound device with name: {0}")]
    Unavailable(String),
    #[error("this mixer backend can only be set up once")]
    AlreadySetup,
    #[error("no mixer channel selected")]
    NoChannel,
}

impl From<nix::Error> for MixerError {
    fn from(e: nix::Error) -> Self {
        Self::Io(e.into())
    }
}

/// Errors raised while grabbing global hotkeys
#[derive(Error, Debug)]
pub enum HotkeyError {
    #[error("'{0}' is not a valid accelerator")]
    InvalidAccelerator(String),
    #[error("failed to map virtual modifiers of '{0}'")]
    UnmappedModifier(String),
    #[error("no key on the keyboard produces '{0}'")]
    NoKeycode(String),
    #[error("keycode {keycode} with modifiers {modifiers:#x} is already grabbed")]
    GrabConflict { keycode: u8, modifiers: u32 },
    #[error("X11 connection: {0}")]
    Connection(String),
}

impl From<x11rb::errors::ConnectError> for HotkeyError {
    fn from(e: x11rb::errors::ConnectError) -> Self {
        Self::Connection(e.to_string())
    }
}

impl From<x11rb::errors::ConnectionError> for HotkeyError {
    fn from(e: x11rb::errors::ConnectionError) -> Self {
        Self::Connection(e.to_string())
    }
}

impl From<x11rb::errors::ReplyError> for HotkeyError {
    fn from(e: x11rb::errors::ReplyError) -> Self {
        Self::Connection(e.to_string())
    }
}
