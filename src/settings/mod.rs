//! voltray settings handling
//!
//! ## Mixer
//!
//! - Which backend drives the volume (ALSA or OSS)
//! - Which card and channel were selected last
//! - Linear or perceptual (dB) volume scale
//!
//! ## Status icon and notifications
//!
//! - Step size for scrolling and hotkeys
//! - Icon theme and click behaviour, consumed by the front-end
//!
//! ## Hotkeys
//!
//! - Accelerator strings for volume up, down and mute
//! - Whether each of them is grabbed at all
//!
//! ## Usage
//!
//! First initialise the settings tree by calling
//! `Settings::init(...)`, giving it the directory and the name of the
//! configuration.  Afterwards you can access settings via
//! [`Settings::r()`](Settings::r()) and
//! [`Settings::w()`](Settings::w()).
//!
//! ```rust,no_run
//! # use voltray::settings::*;
//! # fn main() -> Result<(), voltray::error::SettingsError> {
//! let s = Settings::init(scaffold()?, "config");
//! println!("{}", s.r().status_icon().stepsize);
//! # Ok(())
//! # }
//! ```
//!
//! After applying changes to the settings, don't forget to call
//! [`sync()`](Settings::sync)!
//!
//! A file that exists is never written over on start-up.  One that can't
//! be parsed is moved aside to `<name>.toml.broken` before defaults take
//! its place, and one that can't be read leaves the settings in memory
//! only.

mod app;
pub use app::{NotificationSettings, NotificationType, StatusIconSettings};

mod cards;
pub use cards::MixerSettings;

mod hotkeys;
pub use hotkeys::HotkeySettings;

use crate::error::SettingsError;
use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tracing::{debug, warn};

/// Name of the configuration used when none is given
pub const DEFAULT_NAME: &str = "config";

/// Create the configuration directory, returning its path
pub fn scaffold() -> Result<PathBuf, SettingsError> {
    let dirs = ProjectDirs::from("", "", "voltray").ok_or(SettingsError::NoConfigDir)?;
    let dir = dirs.config_dir().to_path_buf();
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// On-disk layout, one table per section
#[derive(Default, Debug, Serialize, Deserialize)]
#[serde(default)]
struct SettingsFile {
    mixer: MixerSettings,
    status_icon: StatusIconSettings,
    hotkeys: HotkeySettings,
    notification: NotificationSettings,
}

/// Main settings tree
#[derive(Default, Debug)]
pub struct Settings {
    path: PathBuf,
    mixer: RwLock<MixerSettings>,
    status_icon: RwLock<StatusIconSettings>,
    hotkeys: RwLock<HotkeySettings>,
    notification: RwLock<NotificationSettings>,
}

impl Settings {
    /// Load `<dir>/<name>.toml`, creating it with defaults if it is missing
    pub fn init(dir: impl AsRef<Path>, name: &str) -> Arc<Settings> {
        let mut path = dir.as_ref().join(format!("{}.toml", name));

        let (file, create) = match load_path::<SettingsFile>(&path) {
            Ok(Some(file)) => (file, false),
            Ok(None) => (SettingsFile::default(), true),
            Err(e @ SettingsError::Parse(_)) => {
                warn!("{} is unusable: {}", path.display(), e);
                match set_aside(&path) {
                    Ok(backup) => {
                        warn!("moved it to {}, starting over", backup.display());
                        (SettingsFile::default(), true)
                    }
                    Err(e) => {
                        warn!("could not move it aside, settings will not be saved: {}", e);
                        path = PathBuf::new();
                        (SettingsFile::default(), false)
                    }
                }
            }
            Err(e) => {
                warn!(
                    "cannot read {}, settings will not be saved: {}",
                    path.display(),
                    e
                );
                path = PathBuf::new();
                (SettingsFile::default(), false)
            }
        };

        let this = Arc::new(Self {
            mixer: RwLock::new(file.mixer),
            status_icon: RwLock::new(file.status_icon),
            hotkeys: RwLock::new(file.hotkeys),
            notification: RwLock::new(file.notification),
            path,
        });
        if create {
            if let Err(e) = this.sync() {
                warn!("settings not saved: {}", e);
            }
        }
        this
    }

    /// Settings that live only in memory, for when there is nowhere to
    /// store them
    pub fn ephemeral() -> Arc<Settings> {
        Arc::new(Self::default())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync any changes back to disk
    pub fn sync(self: &Arc<Self>) -> Result<(), SettingsError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }

        let file = {
            let r = self.r();
            SettingsFile {
                mixer: r.mixer().clone(),
                status_icon: r.status_icon().clone(),
                hotkeys: r.hotkeys().clone(),
                notification: r.notification().clone(),
            }
        };
        let toml = toml::to_string_pretty(&file)?;

        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(toml.as_bytes()))?;
        debug!("wrote settings to {}", self.path.display());
        Ok(())
    }

    /// Get read access to any stored setting
    pub fn r<'this>(self: &'this Arc<Self>) -> ReadSettings<'this> {
        ReadSettings { inner: self }
    }

    /// Get exclusive write access to any settings
    pub fn w<'this>(self: &'this Arc<Self>) -> WriteSettings<'this> {
        WriteSettings { inner: self }
    }
}

/// `Ok(None)` if there is no file at `path`
fn load_path<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SettingsError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(toml::from_str(&text)?))
}

/// Rename an unusable settings file so that it is not written over
fn set_aside(path: &Path) -> Result<PathBuf, SettingsError> {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".broken");
    let backup = PathBuf::from(backup);
    fs::rename(path, &backup)?;
    Ok(backup)
}

pub struct ReadSettings<'settings> {
    inner: &'settings Arc<Settings>,
}

impl<'s> ReadSettings<'s> {
    /// Get read access to the `mixer` settings
    pub fn mixer(&self) -> RwLockReadGuard<'s, MixerSettings> {
        self.inner.mixer.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get read access to the `status_icon` settings
    pub fn status_icon(&self) -> RwLockReadGuard<'s, StatusIconSettings> {
        self.inner
            .status_icon
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Get read access to the `hotkeys` settings
    pub fn hotkeys(&self) -> RwLockReadGuard<'s, HotkeySettings> {
        self.inner.hotkeys.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get read access to the `notification` settings
    pub fn notification(&self) -> RwLockReadGuard<'s, NotificationSettings> {
        self.inner
            .notification
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct WriteSettings<'settings> {
    inner: &'settings Arc<Settings>,
}

impl<'s> WriteSettings<'s> {
    /// Get write access to the `mixer` settings
    pub fn mixer(self) -> RwLockWriteGuard<'s, MixerSettings> {
        self.inner.mixer.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get write access to the `status_icon` settings
    pub fn status_icon(self) -> RwLockWriteGuard<'s, StatusIconSettings> {
        self.inner
            .status_icon
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Get write access to the `hotkeys` settings
    pub fn hotkeys(self) -> RwLockWriteGuard<'s, HotkeySettings> {
        self.inner.hotkeys.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get write access to the `notification` settings
    pub fn notification(self) -> RwLockWriteGuard<'s, NotificationSettings> {
        self.inner
            .notification
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::BackendKind;

    #[test]
    fn missing_file_gives_defaults_and_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::init(dir.path(), "config");

        assert_eq!(s.r().mixer().card, "default");
        assert_eq!(s.r().mixer().backend, BackendKind::Alsa);
        assert_eq!(s.r().status_icon().stepsize, 5);
        assert_eq!(s.r().hotkeys().up, "XF86AudioRaiseVolume");
        assert!(!s.r().hotkeys().up_enabled);
        assert!(s.r().notification().show_notification);
        assert!(dir.path().join("config.toml").exists());
    }

    #[test]
    fn changes_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let s = Settings::init(dir.path(), "desk");
            s.w().mixer().channel = Some("PCM".into());
            s.w().hotkeys().mute = "<Control>m".into();
            s.w().hotkeys().mute_enabled = true;
            s.sync().unwrap();
        }

        let s = Settings::init(dir.path(), "desk");
        assert_eq!(s.r().mixer().channel.as_deref(), Some("PCM"));
        assert_eq!(s.r().hotkeys().mute, "<Control>m");
        assert!(s.r().hotkeys().mute_enabled);
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(&path, "[status_icon]\nstepsize = 10\n").unwrap();

        let partial = Settings::init(dir.path(), "partial");
        assert_eq!(partial.r().status_icon().stepsize, 10);
        assert_eq!(partial.r().status_icon().theme, "Default");
        // loading alone leaves the user's file as it was
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[status_icon]\nstepsize = 10\n"
        );
    }

    #[test]
    fn broken_file_is_kept_aside() {
        let dir = tempfile::tempdir().unwrap();
        let broken = "[mixer\ncard = ";
        fs::write(dir.path().join("broken.toml"), broken).unwrap();

        let s = Settings::init(dir.path(), "broken");
        assert_eq!(s.r().status_icon().stepsize, 5);
        assert_eq!(
            fs::read_to_string(dir.path().join("broken.toml.broken")).unwrap(),
            broken
        );

        s.w().mixer().card = "USB Audio".into();
        s.sync().unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("broken.toml.broken")).unwrap(),
            broken
        );
        let reloaded = Settings::init(dir.path(), "broken");
        assert_eq!(reloaded.r().mixer().card, "USB Audio");
    }

    #[test]
    fn unreadable_file_is_never_written() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be cannot be read as one
        fs::create_dir(dir.path().join("odd.toml")).unwrap();

        let s = Settings::init(dir.path(), "odd");
        assert_eq!(s.path(), Path::new(""));
        s.w().status_icon().stepsize = 3;
        s.sync().unwrap();
        assert!(dir.path().join("odd.toml").is_dir());
    }

    #[test]
    fn failed_first_write_keeps_the_settings() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-created");

        let s = Settings::init(&missing, "config");
        assert_eq!(s.r().mixer().card, "default");
        s.w().mixer().card = "USB Audio".into();
        assert_eq!(s.r().mixer().card, "USB Audio");
        assert!(s.sync().is_err());
        assert!(!missing.exists());
    }

    #[test]
    fn ephemeral_settings_never_touch_disk() {
        let s = Settings::ephemeral();
        s.w().status_icon().stepsize = 2;
        s.sync().unwrap();
        assert_eq!(s.r().status_icon().stepsize, 2);
    }
}
