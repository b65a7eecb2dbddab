use super::mapping::{
    from_percent, normalized_volume, set_normalized_volume, to_percent, PlaybackControl,
    VolumeScale,
};
use super::{clamp_volume, ChangeCallback, ChannelRegistry, MixerBackend, MixerState, Volume};
use crate::error::MixerError;
use alsa::card::Iter as CardIter;
use alsa::mixer::{MilliBel, Mixer, Selem, SelemChannelId, SelemId};
use alsa::{PollDescriptors, Round};
use glib::{ControlFlow, IOCondition, SourceId};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, error, info, warn};

/// The name of the system default device
const DEFAULT_DEVICE: &str = "default";

/// A sound card as presented to the user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MixerDevice {
    /// Human readable card name
    pub name: String,
    /// What gets handed to `snd_mixer_attach`, `hw:N` or `default`
    pub hw: String,
}

impl MixerDevice {
    fn system_default() -> Self {
        Self {
            name: DEFAULT_DEVICE.to_owned(),
            hw: DEFAULT_DEVICE.to_owned(),
        }
    }
}

impl PlaybackControl for Selem<'_> {
    fn raw_range(&self) -> (i64, i64) {
        self.get_playback_volume_range()
    }

    fn raw_volume(&self) -> Result<i64, MixerError> {
        Ok(self.get_playback_volume(SelemChannelId::FrontLeft)?)
    }

    fn set_raw_volume(&self, value: i64) -> Result<(), MixerError> {
        Ok(self.set_playback_volume_all(value)?)
    }

    fn db_range(&self) -> Option<(i64, i64)> {
        let (min, max) = self.get_playback_db_range();
        (min.0 < max.0).then_some((min.0, max.0))
    }

    fn db_volume(&self) -> Result<i64, MixerError> {
        Ok(self.get_playback_vol_db(SelemChannelId::FrontLeft)?.0)
    }

    fn db_to_raw(&self, value: i64, up: bool) -> Result<i64, MixerError> {
        let round = if up { Round::Ceil } else { Round::Floor };
        Ok(self.ask_playback_db_vol(MilliBel(value), round)?)
    }

    fn raw_to_db(&self, raw: i64) -> Result<i64, MixerError> {
        Ok(self.ask_playback_vol_db(raw)?.0)
    }

    fn has_switch(&self) -> bool {
        self.has_playback_switch()
    }

    fn switch(&self) -> Result<bool, MixerError> {
        Ok(self.get_playback_switch(SelemChannelId::FrontLeft)? != 0)
    }

    fn set_switch(&self, on: bool) -> Result<(), MixerError> {
        Ok(self.set_playback_switch_all(on as i32)?)
    }
}

fn control_volume<C: PlaybackControl + ?Sized>(control: &C, scale: VolumeScale) -> Volume {
    match normalized_volume(control, scale) {
        Ok(fraction) => to_percent(fraction),
        Err(e) => {
            warn!("failed to read volume: {}", e);
            0
        }
    }
}

fn control_mute<C: PlaybackControl + ?Sized>(control: &C) -> bool {
    if !control.has_switch() {
        return false;
    }
    match control.switch() {
        Ok(on) => !on,
        Err(e) => {
            warn!("failed to read mute switch: {}", e);
            false
        }
    }
}

/// Mute through the switch, or by zeroing the volume when there is none
fn apply_mute<C: PlaybackControl + ?Sized>(
    control: &C,
    mute: bool,
    scale: VolumeScale,
) -> Result<(), MixerError> {
    if control.has_switch() {
        control.set_switch(!mute)
    } else if mute {
        set_normalized_volume(control, 0.0, scale)
    } else {
        Ok(())
    }
}

/// Every card ALSA knows about, after the synthetic default device
fn scan_devices() -> Vec<MixerDevice> {
    let mut devices = vec![MixerDevice::system_default()];

    for card in CardIter::new() {
        let card = match card {
            Ok(card) => card,
            Err(e) => {
                warn!("skipping sound card: {}", e);
                continue;
            }
        };

        match card.get_name() {
            Ok(name) => devices.push(MixerDevice {
                name,
                hw: format!("hw:{}", card.get_index()),
            }),
            Err(e) => warn!("skipping card {}: {}", card.get_index(), e),
        }
    }

    devices
}

/// Map a display name to its `hw:N` token, passing unknown names through
fn resolve_device<'a>(devices: &'a [MixerDevice], name: &'a str) -> &'a str {
    devices
        .iter()
        .find(|d| d.name == name)
        .map(|d| d.hw.as_str())
        .unwrap_or(name)
}

fn playback_channels(mixer: &Mixer) -> Vec<String> {
    let mut names = Vec::new();
    for selem in mixer.iter().filter_map(Selem::new) {
        if !selem.has_playback_volume() {
            continue;
        }
        let id = selem.get_id();
        match id.get_name() {
            Ok(name) => names.push(name.to_owned()),
            Err(e) => warn!("skipping mixer element: {}", e),
        }
    }
    names
}

#[derive(Default)]
struct Inner {
    mixer: Option<Mixer>,
    device: Option<String>,
    devices: Vec<MixerDevice>,
    channels: ChannelRegistry,
    scale: VolumeScale,
    on_change: Option<ChangeCallback>,
    source: Option<SourceId>,
}

impl Inner {
    /// Look the active channel up by name, the id only lives for the lookup
    fn element(&self) -> Option<Selem<'_>> {
        let mixer = self.mixer.as_ref()?;
        let name = self.channels.active()?;
        mixer.find_selem(&SelemId::new(name, 0))
    }

    fn volume(&self) -> Volume {
        self.element()
            .map_or(0, |elem| control_volume(&elem, self.scale))
    }

    fn mute(&self) -> bool {
        self.element().map_or(true, |elem| control_mute(&elem))
    }

    fn state(&self) -> MixerState {
        MixerState {
            volume: self.volume(),
            mute: self.mute(),
        }
    }

    /// Pull pending mixer events, returning the callback to run if the
    /// active channel changed
    fn handle_events(&mut self) -> Option<(ChangeCallback, MixerState)> {
        let mixer = self.mixer.as_ref()?;
        if let Err(e) = mixer.handle_events() {
            warn!("failed to handle mixer events: {}", e);
            return None;
        }

        self.channels.active()?;
        let state = self.state();
        if self.channels.observe(state) {
            debug!("external mixer change: {:?}", state);
            Some((self.on_change.clone()?, state))
        } else {
            None
        }
    }

    /// Record a state produced by one of our own setters
    fn settle(&mut self) -> MixerState {
        let state = self.state();
        self.channels.observe(state);
        state
    }
}

/// ALSA simple mixer interface.
///
/// External changes are picked up through the mixer's poll descriptor,
/// which is watched by the glib main context.
pub struct AlsaBackend {
    inner: Rc<RefCell<Inner>>,
}

impl AlsaBackend {
    pub fn new(scale: VolumeScale) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                scale,
                ..Default::default()
            })),
        }
    }

    /// The cards found by the last setup, `default` first
    pub fn devices(&self) -> Vec<MixerDevice> {
        self.inner.borrow().devices.clone()
    }

    fn teardown(&mut self) {
        let mut inner = self.inner.borrow_mut();
        if let Some(source) = inner.source.take() {
            source.remove();
        }
        inner.channels = ChannelRegistry::default();
        inner.mixer = None;
        inner.devices.clear();
        inner.device = None;
        inner.on_change = None;
    }
}

/// Follow the mixer's poll descriptor from the main context
fn watch(mixer: &Mixer, inner: Weak<RefCell<Inner>>) -> Option<SourceId> {
    let fds = match PollDescriptors::get(mixer) {
        Ok(fds) => fds,
        Err(e) => {
            warn!("mixer has no poll descriptor, external changes are ignored: {}", e);
            return None;
        }
    };
    let fd = fds.first()?.fd;

    let condition = IOCondition::IN | IOCondition::ERR | IOCondition::HUP;
    Some(glib::unix_fd_add_local(fd, condition, move |_, condition| {
        let inner = match inner.upgrade() {
            Some(inner) => inner,
            None => return ControlFlow::Break,
        };

        if condition.intersects(IOCondition::ERR | IOCondition::HUP) {
            error!("mixer event source failed ({:?}), no longer following changes", condition);
            inner.borrow_mut().source = None;
            return ControlFlow::Break;
        }

        // the borrow must be gone before the callback runs
        let pending = inner.borrow_mut().handle_events();
        if let Some((callback, state)) = pending {
            callback(state);
        }
        ControlFlow::Continue
    }))
}

impl MixerBackend for AlsaBackend {
    fn setup(
        &mut self,
        device: &str,
        channel: Option<&str>,
        on_change: ChangeCallback,
    ) -> Result<(), MixerError> {
        self.teardown();

        let devices = scan_devices();
        let hw = resolve_device(&devices, device).to_owned();
        {
            let mut inner = self.inner.borrow_mut();
            inner.device = Some(device.to_owned());
            inner.devices = devices;
            inner.on_change = Some(on_change);
        }

        let mixer = Mixer::new(&hw, false).map_err(|e| {
            error!("failed to open mixer '{}': {}", hw, e);
            MixerError::Unavailable(device.to_owned())
        })?;
        info!("opened mixer '{}' ({})", device, hw);

        let names = playback_channels(&mixer);
        let source = watch(&mixer, Rc::downgrade(&self.inner));

        let initial = {
            let mut inner = self.inner.borrow_mut();
            inner.channels = ChannelRegistry::new(names);
            inner.mixer = Some(mixer);
            inner.source = source;
            inner.channels.initial(channel).map(str::to_owned)
        };

        match initial {
            Some(name) => self.set_channel(&name),
            None => warn!("'{}' has no playback channels", device),
        }
        Ok(())
    }

    fn set_channel(&mut self, channel: &str) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let mixer = match inner.mixer.as_ref() {
            Some(mixer) => mixer,
            None => return,
        };
        if inner.channels.active() == Some(channel) {
            return;
        }

        if mixer.find_selem(&SelemId::new(channel, 0)).is_none() {
            warn!("no mixer channel named '{}'", channel);
            return;
        }

        inner.channels.subscribe(channel);
        inner.settle();
        info!("following mixer channel '{}'", channel);
    }

    fn channel(&self) -> Option<String> {
        self.inner.borrow().channels.active().map(str::to_owned)
    }

    fn device(&self) -> Option<String> {
        self.inner.borrow().device.clone()
    }

    fn volume(&self) -> Volume {
        self.inner.borrow().volume()
    }

    fn set_volume(&mut self, volume: Volume) -> MixerState {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        if let Some(elem) = inner.element() {
            let fraction = from_percent(clamp_volume(volume));
            if let Err(e) = set_normalized_volume(&elem, fraction, inner.scale) {
                warn!("failed to set volume: {}", e);
            }
        }
        inner.settle()
    }

    fn mute(&self) -> bool {
        self.inner.borrow().mute()
    }

    fn set_mute(&mut self, mute: bool) -> MixerState {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        if let Some(elem) = inner.element() {
            if let Err(e) = apply_mute(&elem, mute, inner.scale) {
                warn!("failed to set mute: {}", e);
            }
        }
        inner.settle()
    }

    fn channel_names(&self) -> Vec<String> {
        self.inner.borrow().channels.names().to_vec()
    }

    fn device_names(&self) -> Vec<String> {
        self.inner
            .borrow()
            .devices
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }
}

impl Drop for AlsaBackend {
    fn drop(&mut self) {
        self.teardown();
    }
}
