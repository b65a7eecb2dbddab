//! Global hotkeys
//!
//! Keys are grabbed on the root window, so they fire no matter which
//! window has focus.  Only the first keyboard group is ever grabbed: a
//! grabbed key is blocked for everybody else, so the physical key of the
//! default layout is what a binding refers to.

pub mod accelerator;
mod binder;
pub mod keysym;
pub mod x11;

pub use accelerator::{accelerator_name, parse_accelerator};
pub use binder::{Activation, Handler, Keybinder};
#[cfg(test)]
pub(crate) use binder::fake;
pub use keysym::Keysym;

use crate::error::HotkeyError;
use std::cell::Cell;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};
use std::rc::Rc;

/// A set of modifiers, using the GDK bit layout.
///
/// The low eight bits are the real X modifiers, `SUPER`, `HYPER` and
/// `META` are virtual ones that have to be mapped onto real modifiers
/// before grabbing.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers(u32);

impl Modifiers {
    pub const NONE: Self = Self(0);
    pub const SHIFT: Self = Self(1 << 0);
    pub const LOCK: Self = Self(1 << 1);
    pub const CONTROL: Self = Self(1 << 2);
    pub const MOD1: Self = Self(1 << 3);
    pub const MOD2: Self = Self(1 << 4);
    pub const MOD3: Self = Self(1 << 5);
    pub const MOD4: Self = Self(1 << 6);
    pub const MOD5: Self = Self(1 << 7);
    pub const SUPER: Self = Self(1 << 26);
    pub const HYPER: Self = Self(1 << 27);
    pub const META: Self = Self(1 << 28);

    /// The modifiers X knows about
    pub const REAL: Self = Self(0xff);
    pub const VIRTUAL: Self = Self(Self::SUPER.0 | Self::HYPER.0 | Self::META.0);

    /// Modifiers that take part in accelerators, lock keys excluded
    pub const DEFAULT_MOD_MASK: Self = Self(
        Self::CONTROL.0 | Self::SHIFT.0 | Self::MOD1.0 | Self::SUPER.0 | Self::HYPER.0 | Self::META.0,
    );

    /// NumLock and CapsLock, grabbed in every combination so that a
    /// binding works with either of them on
    pub const IGNORABLE: [Self; 4] = [
        Self::NONE,
        Self::MOD2,
        Self::LOCK,
        Self(Self::MOD2.0 | Self::LOCK.0),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Modifiers {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Modifiers {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Modifiers {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for Modifiers {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Debug for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modifiers({:#x})", self.0)
    }
}

/// Compare two modifier sets, accepting MOD1+META as MOD1 and SUPER+HYPER
/// as SUPER since many keymaps put both on the same key
pub fn modifiers_equal(a: Modifiers, b: Modifiers) -> bool {
    let both = a & b;
    let mut ignored = Modifiers::NONE;
    if both.contains(Modifiers::MOD1) {
        ignored |= Modifiers::META;
    }
    if both.contains(Modifiers::SUPER) {
        ignored |= Modifiers::HYPER;
    }
    a & !ignored == b & !ignored
}

/// Where a keysym sits on the keyboard
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyPosition {
    pub keycode: u8,
    pub group: u8,
    /// Shift level within the group
    pub level: u8,
}

/// The window system side of hotkey handling
pub trait HotkeyProvider {
    /// Every key that produces `keysym`, in any group or level
    fn key_positions(&self, keysym: Keysym) -> Vec<KeyPosition>;

    /// Real modifiers needed to reach `position`, `None` if the keycode is
    /// not in the keymap
    fn level_modifiers(&self, position: KeyPosition) -> Option<Modifiers>;

    /// Replace virtual modifiers by the real ones they live on, `None`
    /// when one of them is not mapped at all
    fn map_virtual_modifiers(&self, modifiers: Modifiers) -> Option<Modifiers>;

    /// Add the virtual modifiers that the real ones in `modifiers` carry
    fn add_virtual_modifiers(&self, modifiers: Modifiers) -> Modifiers;

    /// The keysym `keycode` produces in the first group under `state`,
    /// along with the modifiers used up to produce it
    fn translate(&self, keycode: u8, state: Modifiers) -> Option<(Keysym, Modifiers)>;

    fn grab(&self, keycode: u8, modifiers: Modifiers) -> Result<(), HotkeyError>;

    fn ungrab(&self, keycode: u8, modifiers: Modifiers);
}

/// X timestamp meaning "now"
pub const CURRENT_TIME: u32 = 0;

/// Timestamp of the key event being dispatched, shared with handlers that
/// need it to present windows without tripping focus stealing prevention
#[derive(Clone, Debug, Default)]
pub struct EventClock(Rc<Cell<Option<u32>>>);

impl EventClock {
    pub fn current_event_time(&self) -> u32 {
        self.0.get().unwrap_or(CURRENT_TIME)
    }

    fn enter(&self, time: u32) {
        self.0.set(Some(time));
    }

    fn leave(&self) {
        self.0.set(None);
    }
}
