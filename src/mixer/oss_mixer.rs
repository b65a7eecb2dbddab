//! OSS4 mixer backend
//!
//! Talks to the extended mixer API (`SNDCTL_MIX_*`) of the first mixer on
//! the device. OSS has no change notification, so the active control is
//! polled from the main context instead.

use super::{clamp_volume, ChangeCallback, ChannelRegistry, MixerBackend, MixerState, Volume};
use crate::error::MixerError;
use glib::{ControlFlow, SourceId};
use libc::{c_char, c_int, c_uchar, c_uint};
use std::cell::RefCell;
use std::ffi::CStr;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_MIXER_DEV: &str = "/dev/mixer";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

const MIXT_MONOSLIDER: i32 = 4;
const MIXT_STEREOSLIDER: i32 = 5;
const MIXT_MONOSLIDER16: i32 = 19;
const MIXT_STEREOSLIDER16: i32 = 20;
const MIXT_MUTE: i32 = 21;

/// `oss_mixext`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct MixExt {
    dev: c_int,
    ctrl: c_int,
    kind: c_int,
    maxvalue: c_int,
    minvalue: c_int,
    flags: c_int,
    id: [c_char; 16],
    parent: c_int,
    dummy: c_int,
    timestamp: c_int,
    data: [c_char; 64],
    enum_present: [c_uchar; 32],
    control_no: c_int,
    desc: c_uint,
    extname: [c_char; 32],
    update_counter: c_int,
    rgbcolor: c_int,
    filler: [c_int; 6],
}

impl MixExt {
    fn query(dev: i32, ctrl: i32) -> Self {
        Self {
            dev,
            ctrl,
            kind: 0,
            maxvalue: 0,
            minvalue: 0,
            flags: 0,
            id: [0; 16],
            parent: 0,
            dummy: 0,
            timestamp: 0,
            data: [0; 64],
            enum_present: [0; 32],
            control_no: 0,
            desc: 0,
            extname: [0; 32],
            update_counter: 0,
            rgbcolor: 0,
            filler: [0; 6],
        }
    }
}

/// `oss_mixer_value`
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct MixerValue {
    dev: c_int,
    ctrl: c_int,
    value: c_int,
    flags: c_int,
    timestamp: c_int,
    filler: [c_int; 8],
}

impl MixerValue {
    fn for_control(control: &Control) -> Self {
        Self {
            dev: control.dev,
            ctrl: control.ctrl,
            timestamp: control.timestamp,
            ..Default::default()
        }
    }
}

nix::ioctl_read!(mix_nrmix, b'X', 1, c_int);
nix::ioctl_readwrite!(mix_extinfo, b'X', 3, MixExt);
nix::ioctl_readwrite!(mix_read, b'X', 4, MixerValue);
nix::ioctl_readwrite!(mix_write, b'X', 5, MixerValue);

/// One extended mixer control
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Control {
    pub dev: i32,
    pub ctrl: i32,
    pub kind: i32,
    pub maxvalue: i32,
    pub parent: i32,
    pub timestamp: i32,
    pub name: String,
}

impl Control {
    fn is_slider(&self) -> bool {
        matches!(
            self.kind,
            MIXT_MONOSLIDER | MIXT_STEREOSLIDER | MIXT_MONOSLIDER16 | MIXT_STEREOSLIDER16
        )
    }

    /// Left channel level out of a raw control value
    fn level(&self, raw: i32) -> i32 {
        match self.kind {
            MIXT_MONOSLIDER16 | MIXT_STEREOSLIDER16 => raw & 0xffff,
            MIXT_MONOSLIDER | MIXT_STEREOSLIDER => raw & 0xff,
            _ => 0,
        }
    }

    /// Raw control value setting every channel to `level`
    fn pack(&self, level: i32) -> Option<i32> {
        match self.kind {
            MIXT_MONOSLIDER | MIXT_MONOSLIDER16 => Some(level),
            MIXT_STEREOSLIDER => Some((level & 0xff) | ((level & 0xff) << 8)),
            MIXT_STEREOSLIDER16 => Some((level & 0xffff) | ((level & 0xffff) << 16)),
            _ => None,
        }
    }
}

impl From<&MixExt> for Control {
    fn from(ext: &MixExt) -> Self {
        let bytes = ext.extname.map(|c| c as u8);
        let name = CStr::from_bytes_until_nul(&bytes)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());

        Self {
            dev: ext.dev,
            ctrl: ext.ctrl,
            kind: ext.kind,
            maxvalue: ext.maxvalue,
            parent: ext.parent,
            timestamp: ext.timestamp,
            name,
        }
    }
}

/// The calls made against an open OSS mixer device
pub trait OssDevice {
    fn mixer_count(&self) -> Result<i32, MixerError>;
    /// Control `ctrl` of mixer `dev`, `None` once past the last control
    fn control(&self, dev: i32, ctrl: i32) -> Option<Control>;
    fn read(&self, control: &Control) -> Result<i32, MixerError>;
    fn write(&self, control: &Control, value: i32) -> Result<(), MixerError>;
}

/// A real OSS mixer device node
pub struct DevMixer {
    file: File,
}

impl DevMixer {
    /// `$OSS_MIXERDEV`, or `/dev/mixer`
    pub fn default_path() -> PathBuf {
        std::env::var_os("OSS_MIXERDEV")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MIXER_DEV))
    }

    pub fn open(path: PathBuf) -> Result<Self, MixerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                warn!("cannot open {}: {}", path.display(), e);
                MixerError::Unavailable(path.display().to_string())
            })?;
        Ok(Self { file })
    }
}

impl OssDevice for DevMixer {
    fn mixer_count(&self) -> Result<i32, MixerError> {
        let mut count: c_int = 0;
        unsafe { mix_nrmix(self.file.as_raw_fd(), &mut count) }?;
        Ok(count)
    }

    fn control(&self, dev: i32, ctrl: i32) -> Option<Control> {
        let mut ext = MixExt::query(dev, ctrl);
        unsafe { mix_extinfo(self.file.as_raw_fd(), &mut ext) }.ok()?;
        Some(Control::from(&ext))
    }

    fn read(&self, control: &Control) -> Result<i32, MixerError> {
        let mut value = MixerValue::for_control(control);
        unsafe { mix_read(self.file.as_raw_fd(), &mut value) }?;
        Ok(value.value)
    }

    fn write(&self, control: &Control, raw: i32) -> Result<(), MixerError> {
        let mut value = MixerValue::for_control(control);
        value.value = raw;
        unsafe { mix_write(self.file.as_raw_fd(), &mut value) }?;
        Ok(())
    }
}

/// Controls of mixer `dev`, in device order
fn controls<D: OssDevice>(device: &D, dev: i32) -> impl Iterator<Item = Control> + '_ {
    (0..).map_while(move |ctrl| device.control(dev, ctrl))
}

struct Inner<D> {
    device: D,
    path: String,
    channels: ChannelRegistry,
    /// The control behind the active channel
    control: Option<Control>,
    /// Largest level the control really accepts
    max: i32,
    on_change: ChangeCallback,
}

impl<D: OssDevice> Inner<D> {
    fn level(&self) -> Option<i32> {
        let control = self.control.as_ref()?;
        match self.device.read(control) {
            Ok(raw) => Some(control.level(raw)),
            Err(e) => {
                warn!("failed to read '{}': {}", control.name, e);
                None
            }
        }
    }

    fn volume(&self) -> Volume {
        match self.level() {
            Some(level) if self.max > 0 => {
                clamp_volume((100.0 * f64::from(level) / f64::from(self.max)).round() as i32)
            }
            _ => 0,
        }
    }

    fn set_volume(&mut self, volume: Volume) {
        let control = match self.control.as_ref() {
            Some(control) => control,
            None => return,
        };
        let volume = clamp_volume(volume);
        let level = (f64::from(self.max) * f64::from(volume) / 100.0).round() as i32;
        let raw = match control.pack(level) {
            Some(raw) => raw,
            None => return,
        };

        if let Err(e) = self.device.write(control, raw) {
            warn!("failed to write '{}': {}", control.name, e);
            return;
        }

        // the control may clip above what it reported as its maximum
        if volume == 100 {
            if let Some(level) = self.level().filter(|l| *l > 0) {
                self.max = level;
            }
        }
    }

    /// The mute control in the same group as the active slider
    fn mute_control(&self) -> Option<Control> {
        let control = self.control.as_ref()?;
        controls(&self.device, control.dev)
            .find(|c| c.kind == MIXT_MUTE && c.parent == control.parent)
    }

    fn mute(&self) -> bool {
        if self.control.is_none() {
            return true;
        }
        match self.mute_control() {
            Some(mute) => self.device.read(&mute).map(|v| v != 0).unwrap_or_else(|e| {
                warn!("failed to read '{}': {}", mute.name, e);
                false
            }),
            None => false,
        }
    }

    fn set_mute(&mut self, mute: bool) {
        if self.control.is_none() {
            return;
        }
        match self.mute_control() {
            Some(control) => {
                if let Err(e) = self.device.write(&control, mute as i32) {
                    warn!("failed to write '{}': {}", control.name, e);
                }
            }
            None if mute => self.set_volume(0),
            None => (),
        }
    }

    fn state(&self) -> MixerState {
        MixerState {
            volume: self.volume(),
            mute: self.mute(),
        }
    }

    fn settle(&mut self) -> MixerState {
        let state = self.state();
        self.channels.observe(state);
        state
    }

    fn select(&mut self, name: &str) {
        if self.channels.active() == Some(name) {
            return;
        }
        let control = match controls(&self.device, 0).find(|c| c.is_slider() && c.name == name) {
            Some(control) => control,
            None => {
                warn!("no mixer channel named '{}'", name);
                return;
            }
        };

        self.max = control.maxvalue;
        self.control = Some(control);
        self.channels.subscribe(name);
        self.settle();
        info!("following mixer channel '{}'", name);
    }

    fn poll_change(&mut self) -> Option<(ChangeCallback, MixerState)> {
        self.channels.active()?;
        let state = self.state();
        if self.channels.observe(state) {
            debug!("external mixer change: {:?}", state);
            Some((Rc::clone(&self.on_change), state))
        } else {
            None
        }
    }
}

type Opener<D> = Box<dyn Fn() -> Result<D, MixerError>>;

/// OSS4 backend, set up at most once per instance
pub struct OssBackend<D: OssDevice> {
    path: String,
    open: Opener<D>,
    poll_interval: Option<Duration>,
    inner: Option<Rc<RefCell<Inner<D>>>>,
    source: Option<SourceId>,
}

impl OssBackend<DevMixer> {
    /// The backend for the system mixer device, polled twice a second
    pub fn system() -> Self {
        let path = DevMixer::default_path();
        Self::new(
            path.display().to_string(),
            Box::new(move || DevMixer::open(path.clone())),
            Some(POLL_INTERVAL),
        )
    }
}

impl<D: OssDevice + 'static> OssBackend<D> {
    /// `poll_interval` of `None` disables change detection from the main
    /// context, [`OssBackend::refresh`] still works
    pub fn new(path: String, open: Opener<D>, poll_interval: Option<Duration>) -> Self {
        Self {
            path,
            open,
            poll_interval,
            inner: None,
            source: None,
        }
    }

    /// Check the active control for changes made elsewhere, running the
    /// change callback if there were any
    pub fn refresh(&self) -> Option<MixerState> {
        let inner = self.inner.as_ref()?;
        refresh(inner)
    }

    fn watch(&mut self, interval: Duration) {
        let inner = match self.inner.as_ref() {
            Some(inner) => Rc::downgrade(inner),
            None => return,
        };

        self.source = Some(glib::timeout_add_local(interval, move || {
            match inner.upgrade() {
                Some(inner) => {
                    refresh(&inner);
                    ControlFlow::Continue
                }
                None => ControlFlow::Break,
            }
        }));
    }

    fn with<R: Default>(&self, f: impl FnOnce(&Inner<D>) -> R) -> R {
        self.inner.as_ref().map(|i| f(&i.borrow())).unwrap_or_default()
    }
}

fn refresh<D: OssDevice>(inner: &Rc<RefCell<Inner<D>>>) -> Option<MixerState> {
    let (callback, state) = inner.borrow_mut().poll_change()?;
    callback(state);
    Some(state)
}

impl<D: OssDevice + 'static> MixerBackend for OssBackend<D> {
    fn setup(
        &mut self,
        _device: &str,
        channel: Option<&str>,
        on_change: ChangeCallback,
    ) -> Result<(), MixerError> {
        if self.inner.is_some() {
            return Err(MixerError::AlreadySetup);
        }

        let device = (self.open)()?;
        if device.mixer_count()? < 1 {
            return Err(MixerError::Unavailable("no OSS mixers".to_owned()));
        }

        let names = controls(&device, 0)
            .filter(Control::is_slider)
            .map(|c| c.name)
            .collect();

        let mut inner = Inner {
            device,
            path: self.path.clone(),
            channels: ChannelRegistry::new(names),
            control: None,
            max: 0,
            on_change,
        };
        match inner.channels.initial(channel).map(str::to_owned) {
            Some(name) => inner.select(&name),
            None => warn!("OSS mixer has no volume controls"),
        }
        info!("opened OSS mixer '{}'", inner.path);

        self.inner = Some(Rc::new(RefCell::new(inner)));
        if let Some(interval) = self.poll_interval {
            self.watch(interval);
        }
        Ok(())
    }

    fn set_channel(&mut self, channel: &str) {
        if let Some(inner) = self.inner.as_ref() {
            inner.borrow_mut().select(channel);
        }
    }

    fn channel(&self) -> Option<String> {
        self.with(|i| i.channels.active().map(str::to_owned))
    }

    fn device(&self) -> Option<String> {
        self.with(|i| Some(i.path.clone()))
    }

    fn volume(&self) -> Volume {
        self.with(Inner::volume)
    }

    fn set_volume(&mut self, volume: Volume) -> MixerState {
        match self.inner.as_ref() {
            Some(inner) => {
                let mut inner = inner.borrow_mut();
                inner.set_volume(volume);
                inner.settle()
            }
            None => MixerState {
                volume: 0,
                mute: true,
            },
        }
    }

    fn mute(&self) -> bool {
        self.inner.as_ref().map_or(true, |i| i.borrow().mute())
    }

    fn set_mute(&mut self, mute: bool) -> MixerState {
        match self.inner.as_ref() {
            Some(inner) => {
                let mut inner = inner.borrow_mut();
                inner.set_mute(mute);
                inner.settle()
            }
            None => MixerState {
                volume: 0,
                mute: true,
            },
        }
    }

    fn channel_names(&self) -> Vec<String> {
        self.with(|i| i.channels.names().to_vec())
    }
}

impl<D: OssDevice> Drop for OssBackend<D> {
    fn drop(&mut self) {
        if let Some(source) = self.source.take() {
            source.remove();
        }
    }
}
