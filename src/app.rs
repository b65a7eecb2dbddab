//! Application root
//!
//! [`VolumeControl`] turns user intents into backend calls and keeps the
//! cached state the status icon is drawn from.  [`HotkeyControl`] owns the
//! three global hotkeys and keeps the settings in step with them.

use crate::error::{HotkeyError, MixerError};
use crate::hotkey::{
    accelerator_name, parse_accelerator, Handler, HotkeyProvider, Keybinder, Keysym, Modifiers,
};
use crate::mixer::{clamp_volume, ChangeCallback, MixerBackend, MixerState, Volume};
use crate::settings::Settings;
use crate::status::{StatusCache, StatusChange};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a global hotkey does
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HotkeyAction {
    Up,
    Down,
    Mute,
}

impl HotkeyAction {
    pub const ALL: [HotkeyAction; 3] = [HotkeyAction::Up, HotkeyAction::Down, HotkeyAction::Mute];
}

/// Write the settings back, carrying on in memory if that fails
fn persist(settings: &Arc<Settings>) {
    if let Err(e) = settings.sync() {
        warn!("settings not saved: {}", e);
    }
}

pub struct VolumeControl {
    backend: Box<dyn MixerBackend>,
    settings: Arc<Settings>,
    /// Volume and mute as last requested or reported.  The volume survives
    /// a mute so that unmuting can restore it.
    state: MixerState,
    status: StatusCache,
    on_change: ChangeCallback,
}

impl VolumeControl {
    pub fn new(backend: Box<dyn MixerBackend>, settings: Arc<Settings>) -> Rc<RefCell<Self>> {
        Rc::new_cyclic(|this: &Weak<RefCell<Self>>| {
            let this = Weak::clone(this);
            let on_change: ChangeCallback = Rc::new(move |state: MixerState| {
                let this = match this.upgrade() {
                    Some(this) => this,
                    None => return,
                };
                match this.try_borrow_mut() {
                    Ok(mut control) => control.on_external_change(state),
                    Err(_) => debug!("mixer changed during an update, ignoring {:?}", state),
                };
            });

            RefCell::new(Self {
                backend,
                settings,
                state: MixerState::default(),
                status: StatusCache::default(),
                on_change,
            })
        })
    }

    /// Open `device` with `channel` selected and read back its state
    pub fn setup(&mut self, device: &str, channel: Option<&str>) -> Result<MixerState, MixerError> {
        self.backend
            .setup(device, channel, Rc::clone(&self.on_change))?;
        info!(
            "controlling '{}' on '{}'",
            self.backend.channel().unwrap_or_default(),
            device
        );
        Ok(self.reload())
    }

    pub fn state(&self) -> MixerState {
        self.state
    }

    pub fn channel(&self) -> Option<String> {
        self.backend.channel()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.backend.channel_names()
    }

    pub fn device(&self) -> Option<String> {
        self.backend.device()
    }

    pub fn device_names(&self) -> Vec<String> {
        self.backend.device_names()
    }

    /// Set up the backend on another device and remember the choice
    pub fn switch_device(&mut self, device: &str) -> Result<MixerState, MixerError> {
        self.backend
            .setup(device, None, Rc::clone(&self.on_change))?;

        {
            let mut mixer = self.settings.w().mixer();
            mixer.card = device.to_owned();
            mixer.channel = self.backend.channel();
        }
        persist(&self.settings);
        info!("switched to device '{}'", device);
        Ok(self.reload())
    }

    /// Control another channel of the current device and remember the
    /// choice
    pub fn switch_channel(&mut self, channel: &str) -> MixerState {
        self.backend.set_channel(channel);
        self.settings.w().mixer().channel = self.backend.channel();
        persist(&self.settings);
        self.reload()
    }

    /// Set an absolute volume, as from a slider.  Moving the slider unmutes.
    pub fn set_volume(&mut self, volume: Volume) -> MixerState {
        self.apply_volume(volume);
        if self.state.mute {
            self.backend.set_mute(false);
            self.state.mute = false;
        }
        self.changed(true);
        self.state
    }

    /// Move the volume by one step, up or down, leaving mute alone
    pub fn step(&mut self, up: bool) -> MixerState {
        let step = self.settings.r().status_icon().stepsize;
        let step = if up { step } else { -step };
        self.apply_volume(self.state.volume + step);
        self.changed(true);
        self.state
    }

    /// Keep the requested volume rather than what the card reads back, so
    /// steps smaller than the hardware resolution still add up
    fn apply_volume(&mut self, volume: Volume) {
        let volume = clamp_volume(volume);
        let applied = self.backend.set_volume(volume);
        if applied.volume != volume {
            debug!("asked for {}%, card settled on {}%", volume, applied.volume);
        }
        self.state.volume = volume;
    }

    pub fn toggle_mute(&mut self) -> MixerState {
        let mute = !self.state.mute;
        // controls without a switch lost their volume on mute
        self.backend.set_volume(self.state.volume);
        self.backend.set_mute(mute);
        self.state.mute = mute;
        self.changed(true);
        self.state
    }

    pub fn handle_hotkey(&mut self, action: HotkeyAction) -> MixerState {
        debug!("hotkey action {:?}", action);
        match action {
            HotkeyAction::Up => self.step(true),
            HotkeyAction::Down => self.step(false),
            HotkeyAction::Mute => self.toggle_mute(),
        }
    }

    /// Take on a state another process set
    pub fn on_external_change(&mut self, state: MixerState) {
        debug!("external mixer change: {:?}", state);
        self.state = MixerState {
            volume: clamp_volume(state.volume),
            mute: state.mute,
        };
        self.changed(false);
    }

    /// What the status icon has to redraw.  `force` redraws everything.
    pub fn redraw(&mut self, force: bool) -> StatusChange {
        let channel = self.backend.channel();
        let change = self.status.update(self.state, channel.as_deref(), force);

        if let Some(icon) = change.icon {
            debug!("status icon: {}", icon);
        }
        if let Some(tooltip) = &change.tooltip {
            debug!("tooltip: {}", tooltip);
        }
        change
    }

    fn reload(&mut self) -> MixerState {
        let state = self.backend.state();
        self.state = MixerState {
            volume: clamp_volume(state.volume),
            mute: state.mute,
        };
        self.redraw(true);
        self.state
    }

    fn changed(&mut self, local: bool) {
        self.redraw(false);
        if local && self.settings.r().notification().show_notification {
            let mute = if self.state.mute { " (muted)" } else { "" };
            info!("volume {}%{}", self.state.volume, mute);
        }
    }
}

/// The volume hotkeys, bound according to the settings
pub struct HotkeyControl<P: HotkeyProvider> {
    binder: Rc<RefCell<Keybinder<P, HotkeyAction>>>,
    handler: Handler<HotkeyAction>,
    settings: Arc<Settings>,
}

impl<P: HotkeyProvider> HotkeyControl<P> {
    pub fn new(
        binder: Rc<RefCell<Keybinder<P, HotkeyAction>>>,
        control: &Rc<RefCell<VolumeControl>>,
        settings: Arc<Settings>,
    ) -> Self {
        let control = Rc::downgrade(control);
        let handler: Handler<HotkeyAction> = Rc::new(move |key: &str, action: HotkeyAction| {
            debug!("'{}' pressed", key);
            if let Some(control) = control.upgrade() {
                control.borrow_mut().handle_hotkey(action);
            }
        });

        Self {
            binder,
            handler,
            settings,
        }
    }

    pub fn binder(&self) -> &Rc<RefCell<Keybinder<P, HotkeyAction>>> {
        &self.binder
    }

    /// Accelerator and enabled flag stored for `action`
    pub fn configured(&self, action: HotkeyAction) -> (String, bool) {
        let hotkeys = self.settings.r().hotkeys();
        match action {
            HotkeyAction::Up => (hotkeys.up.clone(), hotkeys.up_enabled),
            HotkeyAction::Down => (hotkeys.down.clone(), hotkeys.down_enabled),
            HotkeyAction::Mute => (hotkeys.mute.clone(), hotkeys.mute_enabled),
        }
    }

    /// Bind every enabled hotkey.  Failures are logged and skipped.
    pub fn bind_enabled(&self) -> usize {
        let mut bound = 0;
        for action in HotkeyAction::ALL {
            let (key, enabled) = self.configured(action);
            if !enabled {
                continue;
            }
            match self.bind(&key, action) {
                Ok(()) => bound += 1,
                Err(e) => warn!("failed to bind {}: {}", key, e),
            }
        }
        bound
    }

    /// Grab or release the hotkey for `action` and store the flag.  The
    /// flag stays unchanged when grabbing fails.
    pub fn set_enabled(&self, action: HotkeyAction, enabled: bool) -> Result<(), HotkeyError> {
        let (key, was_enabled) = self.configured(action);
        if enabled == was_enabled {
            return Ok(());
        }

        if enabled {
            self.bind(&key, action)?;
        } else {
            self.binder.borrow_mut().unbind(&key, &self.handler);
        }

        {
            let mut hotkeys = self.settings.w().hotkeys();
            match action {
                HotkeyAction::Up => hotkeys.up_enabled = enabled,
                HotkeyAction::Down => hotkeys.down_enabled = enabled,
                HotkeyAction::Mute => hotkeys.mute_enabled = enabled,
            }
        }
        persist(&self.settings);
        Ok(())
    }

    /// Move `action` to another accelerator.  An enabled hotkey is grabbed
    /// under the new key before the old one is released, so a failure
    /// leaves the old binding working.
    pub fn rebind(&self, action: HotkeyAction, key: &str) -> Result<(), HotkeyError> {
        let (old, enabled) = self.configured(action);
        if key == old {
            return Ok(());
        }

        if enabled {
            self.bind(key, action)?;
            self.binder.borrow_mut().unbind(&old, &self.handler);
        } else if parse_accelerator(key).is_none() {
            return Err(HotkeyError::InvalidAccelerator(key.to_owned()));
        }

        {
            let mut hotkeys = self.settings.w().hotkeys();
            match action {
                HotkeyAction::Up => hotkeys.up = key.to_owned(),
                HotkeyAction::Down => hotkeys.down = key.to_owned(),
                HotkeyAction::Mute => hotkeys.mute = key.to_owned(),
            }
        }
        persist(&self.settings);
        info!("{:?} is now on '{}'", action, key);
        Ok(())
    }

    /// Like [`rebind`](Self::rebind), from a key as captured by a key
    /// press
    pub fn rebind_key(
        &self,
        action: HotkeyAction,
        keysym: Keysym,
        modifiers: Modifiers,
    ) -> Result<(), HotkeyError> {
        self.rebind(action, &accelerator_name(keysym, modifiers))
    }

    fn bind(&self, key: &str, action: HotkeyAction) -> Result<(), HotkeyError> {
        self.binder
            .borrow_mut()
            .bind(key, Rc::clone(&self.handler), action)
    }
}
