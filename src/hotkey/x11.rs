//! X11 side of the hotkey layer, over the core protocol
//!
//! The keyboard mapping is cached and refreshed whenever the server sends
//! a `MappingNotify`, after which every binding is grabbed again.

use super::keysym::{self, Keysym, NO_SYMBOL};
use super::{HotkeyProvider, KeyPosition, Keybinder, Modifiers};
use crate::error::HotkeyError;
use glib::{ControlFlow, IOCondition, SourceId};
use std::cell::RefCell;
use std::os::unix::io::AsRawFd;
use std::rc::Rc;
use tracing::{debug, error, info, warn};
use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::xproto::{ConnectionExt, GrabMode, Mapping, ModMask, Window};
use x11rb::protocol::{ErrorKind, Event};
use x11rb::rust_connection::RustConnection;

const ISO_LEVEL3_SHIFT: Keysym = 0xfe03;
const META: [Keysym; 2] = [0xffe7, 0xffe8];
const SUPER: [Keysym; 2] = [0xffeb, 0xffec];
const HYPER: [Keysym; 2] = [0xffed, 0xffee];

/// Core keyboard and modifier mapping
#[derive(Clone, Debug, Default)]
pub struct Keymap {
    min_keycode: u8,
    per_keycode: usize,
    syms: Vec<Keysym>,
    /// Keycodes on each of the eight real modifiers
    modifiers: Vec<Vec<u8>>,
}

impl Keymap {
    pub fn new(min_keycode: u8, per_keycode: usize, syms: Vec<Keysym>, modifiers: Vec<Vec<u8>>) -> Self {
        Self {
            min_keycode,
            per_keycode,
            syms,
            modifiers,
        }
    }

    fn fetch(conn: &RustConnection) -> Result<Self, HotkeyError> {
        let setup = conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);

        let mapping = conn.get_keyboard_mapping(min, max - min + 1)?.reply()?;
        let modmap = conn.get_modifier_mapping()?.reply()?;
        let per_modifier = (modmap.keycodes.len() / 8).max(1);

        Ok(Self::new(
            min,
            usize::from(mapping.keysyms_per_keycode),
            mapping.keysyms,
            modmap.keycodes.chunks(per_modifier).map(<[u8]>::to_vec).collect(),
        ))
    }

    fn column(&self, keycode: u8, column: usize) -> Keysym {
        if keycode < self.min_keycode || column >= self.per_keycode {
            return NO_SYMBOL;
        }
        let index = usize::from(keycode - self.min_keycode) * self.per_keycode + column;
        self.syms.get(index).copied().unwrap_or(NO_SYMBOL)
    }

    fn has_keycode(&self, keycode: u8) -> bool {
        keycode >= self.min_keycode
            && usize::from(keycode - self.min_keycode) * self.per_keycode < self.syms.len()
    }

    /// Keysym at a group and level, applying the core protocol's rule that
    /// a missing shifted symbol is the uppercase of the unshifted one
    fn symbol(&self, keycode: u8, group: u8, level: u8) -> Keysym {
        let column = match (group, level) {
            (0, 0) => 0,
            (0, 1) => 1,
            (0, 2) => 4,
            (0, 3) => 5,
            (1, 0) => 2,
            (1, 1) => 3,
            _ => return NO_SYMBOL,
        };
        match self.column(keycode, column) {
            NO_SYMBOL if level % 2 == 1 => {
                let base = self.symbol(keycode, group, level - 1);
                match keysym::to_upper(base) {
                    upper if upper != base => upper,
                    _ => NO_SYMBOL,
                }
            }
            sym => sym,
        }
    }

    fn keycodes(&self) -> impl Iterator<Item = u8> + '_ {
        let count = self.syms.len() / self.per_keycode.max(1);
        (0..count).filter_map(move |i| u8::try_from(usize::from(self.min_keycode) + i).ok())
    }

    pub fn positions(&self, keysym: Keysym) -> Vec<KeyPosition> {
        let mut positions = Vec::new();
        for keycode in self.keycodes() {
            for (group, level) in [(0, 0), (0, 1), (0, 2), (0, 3), (1, 0), (1, 1)] {
                if self.symbol(keycode, group, level) == keysym {
                    positions.push(KeyPosition {
                        keycode,
                        group,
                        level,
                    });
                }
            }
        }
        positions
    }

    /// The real modifier bit any of `keysyms` sits on
    fn modifier_for(&self, keysyms: &[Keysym]) -> Option<Modifiers> {
        self.modifiers.iter().take(8).enumerate().find_map(|(bit, keycodes)| {
            keycodes
                .iter()
                .filter(|k| **k != 0)
                .any(|k| (0..self.per_keycode).any(|c| keysyms.contains(&self.column(*k, c))))
                .then(|| Modifiers::from_bits(1 << bit))
        })
    }

    fn level3(&self) -> Option<Modifiers> {
        self.modifier_for(&[ISO_LEVEL3_SHIFT])
    }

    fn virtual_modifiers(&self) -> [(Modifiers, Option<Modifiers>); 3] {
        [
            (Modifiers::META, self.modifier_for(&META)),
            (Modifiers::SUPER, self.modifier_for(&SUPER)),
            (Modifiers::HYPER, self.modifier_for(&HYPER)),
        ]
    }

    pub fn level_modifiers(&self, position: KeyPosition) -> Option<Modifiers> {
        if !self.has_keycode(position.keycode) {
            return None;
        }
        match position.level {
            0 => Some(Modifiers::NONE),
            1 => Some(Modifiers::SHIFT),
            2 => self.level3(),
            3 => self.level3().map(|l3| l3 | Modifiers::SHIFT),
            _ => None,
        }
    }

    pub fn map_virtual(&self, modifiers: Modifiers) -> Option<Modifiers> {
        let mut real = modifiers & Modifiers::REAL;
        for (virt, on) in self.virtual_modifiers() {
            if modifiers.contains(virt) {
                real |= on?;
            }
        }
        Some(real)
    }

    pub fn add_virtual(&self, modifiers: Modifiers) -> Modifiers {
        let mut all = modifiers;
        for (virt, on) in self.virtual_modifiers() {
            if on.map_or(false, |real| modifiers.contains(real)) {
                all |= virt;
            }
        }
        all
    }

    /// Keysym produced in the first group and the modifiers used for it
    pub fn translate(&self, keycode: u8, state: Modifiers) -> Option<(Keysym, Modifiers)> {
        if !self.has_keycode(keycode) {
            return None;
        }

        let base = self.symbol(keycode, 0, 0);
        let mut consumed = Modifiers::NONE;
        let mut level = 0;

        if let Some(l3) = self.level3().filter(|l3| state.contains(*l3)) {
            if self.symbol(keycode, 0, 2) != NO_SYMBOL {
                level = 2;
                consumed |= l3;
            }
        }
        if state.contains(Modifiers::SHIFT) {
            let shifted = self.symbol(keycode, 0, level + 1);
            if shifted != NO_SYMBOL {
                // Shift+a is still "a" with Shift held, Shift+1 is "exclam"
                if level > 0 || shifted != keysym::to_upper(base) {
                    consumed |= Modifiers::SHIFT;
                }
                level += 1;
            }
        }

        match self.symbol(keycode, 0, level) {
            NO_SYMBOL => None,
            sym => Some((sym, consumed)),
        }
    }
}

/// Hotkeys grabbed on the root window of the default screen
pub struct X11Provider {
    conn: RustConnection,
    root: Window,
    keymap: RefCell<Keymap>,
}

impl X11Provider {
    pub fn connect() -> Result<Self, HotkeyError> {
        let (conn, screen) = x11rb::connect(None)?;
        let root = conn
            .setup()
            .roots
            .get(screen)
            .map(|s| s.root)
            .ok_or_else(|| HotkeyError::Connection(format!("no screen {}", screen)))?;
        let keymap = Keymap::fetch(&conn)?;
        info!("connected to X11, grabbing hotkeys on root window {:#x}", root);

        Ok(Self {
            conn,
            root,
            keymap: RefCell::new(keymap),
        })
    }

    fn refresh_keymap(&self) {
        match Keymap::fetch(&self.conn) {
            Ok(keymap) => *self.keymap.borrow_mut() = keymap,
            Err(e) => warn!("failed to reload the keyboard mapping: {}", e),
        }
    }

    fn mask(modifiers: Modifiers) -> ModMask {
        ModMask::from((modifiers & Modifiers::REAL).bits() as u16)
    }
}

impl HotkeyProvider for X11Provider {
    fn key_positions(&self, keysym: Keysym) -> Vec<KeyPosition> {
        self.keymap.borrow().positions(keysym)
    }

    fn level_modifiers(&self, position: KeyPosition) -> Option<Modifiers> {
        self.keymap.borrow().level_modifiers(position)
    }

    fn map_virtual_modifiers(&self, modifiers: Modifiers) -> Option<Modifiers> {
        self.keymap.borrow().map_virtual(modifiers)
    }

    fn add_virtual_modifiers(&self, modifiers: Modifiers) -> Modifiers {
        self.keymap.borrow().add_virtual(modifiers)
    }

    fn translate(&self, keycode: u8, state: Modifiers) -> Option<(Keysym, Modifiers)> {
        self.keymap.borrow().translate(keycode, state)
    }

    fn grab(&self, keycode: u8, modifiers: Modifiers) -> Result<(), HotkeyError> {
        let cookie = self.conn.grab_key(
            false,
            self.root,
            Self::mask(modifiers),
            keycode,
            GrabMode::ASYNC,
            GrabMode::ASYNC,
        )?;

        match cookie.check() {
            Ok(()) => Ok(()),
            Err(ReplyError::X11Error(e)) if e.error_kind == ErrorKind::Access => {
                Err(HotkeyError::GrabConflict {
                    keycode,
                    modifiers: modifiers.bits(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn ungrab(&self, keycode: u8, modifiers: Modifiers) {
        let result = self
            .conn
            .ungrab_key(keycode, self.root, Self::mask(modifiers))
            .map_err(HotkeyError::from)
            .and_then(|cookie| cookie.check().map_err(HotkeyError::from));

        if let Err(e) = result {
            warn!("failed to release keycode {}: {}", keycode, e);
        }
    }
}

/// The part of the X event stream the hotkeys care about
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HotkeyEvent {
    KeyPress {
        keycode: u8,
        state: Modifiers,
        time: u32,
    },
    KeymapChanged,
    Ignored,
}

impl From<Event> for HotkeyEvent {
    fn from(event: Event) -> Self {
        match event {
            Event::KeyPress(press) => HotkeyEvent::KeyPress {
                keycode: press.detail,
                state: Modifiers::from_bits(u32::from(u16::from(press.state))),
                time: press.time,
            },
            Event::MappingNotify(notify) if notify.request != Mapping::POINTER => {
                HotkeyEvent::KeymapChanged
            }
            Event::Error(e) => {
                warn!("X11 error: {:?}", e);
                HotkeyEvent::Ignored
            }
            _ => HotkeyEvent::Ignored,
        }
    }
}

/// Handle queued events until `next` runs dry.  `remap` reloads the
/// provider's keymap before every binding is grabbed again.
fn drain<P, T, E>(
    binder: &Rc<RefCell<Keybinder<P, T>>>,
    mut next: impl FnMut() -> Result<Option<HotkeyEvent>, E>,
    remap: impl Fn(&P),
) -> ControlFlow
where
    P: HotkeyProvider,
    T: Clone,
    E: std::fmt::Display,
{
    loop {
        match next() {
            Ok(Some(HotkeyEvent::KeyPress {
                keycode,
                state,
                time,
            })) => {
                debug!("key press: keycode {} state {:?}", keycode, state);

                // handlers run without the registry borrowed
                let (activations, clock) = {
                    let binder = binder.borrow();
                    (binder.activations(keycode, state), binder.clock())
                };
                clock.dispatch(time, activations);
            }
            Ok(Some(HotkeyEvent::KeymapChanged)) => {
                info!("keyboard mapping changed, grabbing hotkeys again");
                let mut binder = binder.borrow_mut();
                remap(binder.provider());
                binder.regrab_all();
            }
            Ok(Some(HotkeyEvent::Ignored)) => (),
            Ok(None) => return ControlFlow::Continue,
            Err(e) => {
                error!("lost the X11 connection, hotkeys stop working: {}", e);
                return ControlFlow::Break;
            }
        }
    }
}

fn drain_connection<T: Clone>(binder: &Rc<RefCell<Keybinder<X11Provider, T>>>) -> ControlFlow {
    let flow = drain(
        binder,
        || {
            let event = binder.borrow().provider().conn.poll_for_event();
            event.map(|e| e.map(HotkeyEvent::from))
        },
        X11Provider::refresh_keymap,
    );

    if let Err(e) = binder.borrow().provider().conn.flush() {
        warn!("failed to flush the X11 connection: {}", e);
    }
    flow
}

/// Dispatch X events for `binder` from the glib main context.
///
/// Events x11rb already read off the socket while grabbing are handled
/// right away, since they would not wake the fd watch.  `None` if the
/// connection is already gone.
pub fn attach<T: Clone + 'static>(
    binder: &Rc<RefCell<Keybinder<X11Provider, T>>>,
) -> Option<SourceId> {
    if let ControlFlow::Break = drain_connection(binder) {
        return None;
    }

    let fd = binder.borrow().provider().conn.stream().as_raw_fd();
    let binder = Rc::downgrade(binder);

    Some(glib::unix_fd_add_local(fd, IOCondition::IN, move |_, _| {
        match binder.upgrade() {
            Some(binder) => drain_connection(&binder),
            None => ControlFlow::Break,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::fake::{FakeDisplay, MUTE};
    use crate::hotkey::{Handler, CURRENT_TIME};
    use std::cell::Cell;
    use std::collections::VecDeque;

    const A: Keysym = 'a' as Keysym;
    const ONE: Keysym = '1' as Keysym;
    const EXCLAM: Keysym = '!' as Keysym;
    const AE: Keysym = 0xe6;
    const EURO: Keysym = 0x20ac;

    /// Keycodes 8..=14 with six columns each
    fn keymap() -> Keymap {
        #[rustfmt::skip]
        let syms = vec![
            // 8: a A (group 2: q Q) æ Æ
            A, 'A' as Keysym, 'q' as Keysym, 'Q' as Keysym, AE, 0xc6,
            // 9: 1 ! with € on level 3
            ONE, EXCLAM, 0, 0, EURO, 0,
            // 10: XF86AudioMute
            0x1008_ff12, 0, 0, 0, 0, 0,
            // 11: Alt_L Meta_L
            0xffe9, 0xffe7, 0, 0, 0, 0,
            // 12: Super_L
            0xffeb, 0, 0, 0, 0, 0,
            // 13: ISO_Level3_Shift
            ISO_LEVEL3_SHIFT, 0, 0, 0, 0, 0,
            // 14: b with an implicit B
            'b' as Keysym, 0, 0, 0, 0, 0,
        ];
        let mut modifiers = vec![Vec::new(); 8];
        modifiers[3] = vec![11, 0]; // Mod1
        modifiers[6] = vec![12, 0]; // Mod4
        modifiers[7] = vec![13, 0]; // Mod5
        Keymap::new(8, 6, syms, modifiers)
    }

    #[test]
    fn positions_cover_groups_and_levels() {
        let map = keymap();
        assert_eq!(
            map.positions('q' as Keysym),
            vec![KeyPosition {
                keycode: 8,
                group: 1,
                level: 0
            }]
        );
        assert_eq!(
            map.positions('B' as Keysym),
            vec![KeyPosition {
                keycode: 14,
                group: 0,
                level: 1
            }]
        );
        assert_eq!(map.positions(EURO)[0].level, 2);
        assert!(map.positions(0x1008_ff13).is_empty());
    }

    #[test]
    fn level_modifiers_use_level3_shift() {
        let map = keymap();
        let at = |level| KeyPosition {
            keycode: 9,
            group: 0,
            level,
        };
        assert_eq!(map.level_modifiers(at(0)), Some(Modifiers::NONE));
        assert_eq!(map.level_modifiers(at(1)), Some(Modifiers::SHIFT));
        assert_eq!(map.level_modifiers(at(2)), Some(Modifiers::MOD5));
        assert_eq!(
            map.level_modifiers(KeyPosition {
                keycode: 200,
                group: 0,
                level: 0
            }),
            None
        );
    }

    #[test]
    fn virtual_modifiers() {
        let map = keymap();
        assert_eq!(
            map.map_virtual(Modifiers::META | Modifiers::CONTROL),
            Some(Modifiers::MOD1 | Modifiers::CONTROL)
        );
        assert_eq!(map.map_virtual(Modifiers::SUPER), Some(Modifiers::MOD4));
        assert_eq!(map.map_virtual(Modifiers::HYPER), None);
        assert_eq!(map.add_virtual(Modifiers::MOD1), Modifiers::MOD1 | Modifiers::META);
        assert_eq!(map.add_virtual(Modifiers::MOD4), Modifiers::MOD4 | Modifiers::SUPER);
    }

    #[test]
    fn translate_consumes_only_what_changed_the_symbol() {
        let map = keymap();
        assert_eq!(map.translate(8, Modifiers::NONE), Some((A, Modifiers::NONE)));
        assert_eq!(
            map.translate(8, Modifiers::SHIFT),
            Some(('A' as Keysym, Modifiers::NONE))
        );
        assert_eq!(map.translate(9, Modifiers::SHIFT), Some((EXCLAM, Modifiers::SHIFT)));
        assert_eq!(map.translate(9, Modifiers::MOD5), Some((EURO, Modifiers::MOD5)));
        // nothing on level 4 of that key, so shift is left alone
        assert_eq!(
            map.translate(9, Modifiers::MOD5 | Modifiers::SHIFT),
            Some((EURO, Modifiers::MOD5))
        );
        assert_eq!(map.translate(8, Modifiers::MOD5), Some((AE, Modifiers::MOD5)));
        assert_eq!(map.translate(3, Modifiers::NONE), None);
    }

    fn press(keycode: u8, time: u32) -> HotkeyEvent {
        HotkeyEvent::KeyPress {
            keycode,
            state: Modifiers::NONE,
            time,
        }
    }

    fn move_mute_key(display: &FakeDisplay) {
        display.keys.borrow_mut().retain(|(sym, _)| *sym != MUTE);
        display.map(MUTE, 130, 0, 0);
    }

    #[test]
    fn queued_events_are_handled_in_order() {
        let binder = Rc::new(RefCell::new(Keybinder::new(FakeDisplay::keyboard())));
        let times = Rc::new(RefCell::new(Vec::new()));
        let handler: Handler<()> = {
            let times = Rc::clone(&times);
            let clock = binder.borrow().clock();
            Rc::new(move |_: &str, _: ()| times.borrow_mut().push(clock.current_event_time()))
        };
        binder.borrow_mut().bind("XF86AudioMute", handler, ()).unwrap();

        let mut queue = VecDeque::from([
            press(121, 10),
            HotkeyEvent::Ignored,
            HotkeyEvent::KeymapChanged,
            press(121, 20),
            press(130, 30),
        ]);
        let flow = drain(
            &binder,
            || Ok::<_, String>(queue.pop_front()),
            move_mute_key,
        );

        assert!(matches!(flow, ControlFlow::Continue));
        assert!(queue.is_empty());
        assert_eq!(*times.borrow(), [10, 30]);
        assert!(binder.borrow().provider().grabs().iter().all(|g| g.0 == 130));
        assert_eq!(binder.borrow().current_event_time(), CURRENT_TIME);
    }

    #[test]
    fn connection_errors_stop_the_watch() {
        let binder: Rc<RefCell<Keybinder<FakeDisplay, ()>>> =
            Rc::new(RefCell::new(Keybinder::new(FakeDisplay::keyboard())));
        let polled = Cell::new(0);
        let flow = drain(
            &binder,
            || {
                polled.set(polled.get() + 1);
                Err("connection reset")
            },
            |_: &FakeDisplay| (),
        );

        assert!(matches!(flow, ControlFlow::Break));
        assert_eq!(polled.get(), 1);
    }
}
