use super::accelerator::parse_accelerator;
use super::keysym::{self, Keysym};
use super::{modifiers_equal, EventClock, HotkeyProvider, Modifiers};
use crate::error::HotkeyError;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Called with the accelerator string and the binding's data
pub type Handler<T> = Rc<dyn Fn(&str, T)>;

type Grab = (u8, Modifiers);

struct Binding<T> {
    keystring: String,
    keysym: Keysym,
    /// As parsed, virtual modifiers included
    modifiers: Modifiers,
    handler: Handler<T>,
    data: T,
    /// Exactly what is held on the server, empty while ungrabbed
    grabs: Vec<Grab>,
}

/// A handler that matched a key press, ready to be run
pub struct Activation<T> {
    keystring: String,
    handler: Handler<T>,
    data: T,
}

impl<T> Activation<T> {
    pub fn fire(self) {
        (self.handler)(&self.keystring, self.data);
    }
}

/// Registry of global hotkeys on top of a [`HotkeyProvider`]
pub struct Keybinder<P: HotkeyProvider, T> {
    provider: P,
    bindings: Vec<Binding<T>>,
    clock: EventClock,
}

impl<P: HotkeyProvider, T: Clone> Keybinder<P, T> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            bindings: Vec::new(),
            clock: EventClock::default(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn clock(&self) -> EventClock {
        self.clock.clone()
    }

    pub fn current_event_time(&self) -> u32 {
        self.clock.current_event_time()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Whether `key` is registered and currently grabbed
    pub fn is_grabbed(&self, key: &str) -> bool {
        self.bindings
            .iter()
            .any(|b| b.keystring == key && !b.grabs.is_empty())
    }

    fn held(&self, grab: Grab) -> bool {
        self.bindings.iter().any(|b| b.grabs.contains(&grab))
    }

    /// Grab one keycode with every ignorable modifier combination, all or
    /// nothing
    fn grab_keycode(&self, keycode: u8, modifiers: Modifiers) -> Result<Vec<Grab>, HotkeyError> {
        let mut taken = Vec::with_capacity(Modifiers::IGNORABLE.len());

        for ignorable in Modifiers::IGNORABLE {
            let combo = modifiers | ignorable;
            let result = if self.held((keycode, combo)) {
                Err(HotkeyError::GrabConflict {
                    keycode,
                    modifiers: combo.bits(),
                })
            } else {
                self.provider.grab(keycode, combo)
            };

            if let Err(e) = result {
                warn!("{}", e);
                for (keycode, modifiers) in taken {
                    self.provider.ungrab(keycode, modifiers);
                }
                return Err(e);
            }
            taken.push((keycode, combo));
        }

        Ok(taken)
    }

    /// Grab every key of the first group producing `keysym`.  A key that
    /// fails is released again and the next one is tried.
    fn grab_keysym(
        &self,
        key: &str,
        keysym: Keysym,
        modifiers: Modifiers,
    ) -> Result<Vec<Grab>, HotkeyError> {
        let real = self
            .provider
            .map_virtual_modifiers(modifiers)
            .ok_or_else(|| HotkeyError::UnmappedModifier(key.to_owned()))?;

        let mut grabs = Vec::new();
        let mut failure = None;

        for position in self.provider.key_positions(keysym) {
            if position.group != 0 {
                continue;
            }
            let level = match self.provider.level_modifiers(position) {
                Some(level) => level,
                None => continue,
            };

            debug!(
                "grabbing keycode {} level {} with {:?}",
                position.keycode,
                position.level,
                real | level
            );
            match self.grab_keycode(position.keycode, real | level) {
                Ok(taken) => grabs.extend(taken),
                Err(e) => failure = Some(e),
            }
        }

        if grabs.is_empty() {
            Err(failure.unwrap_or_else(|| HotkeyError::NoKeycode(key.to_owned())))
        } else {
            Ok(grabs)
        }
    }

    /// Grab `key` and register `handler` for it.
    ///
    /// Nothing is registered when no key at all could be grabbed.
    pub fn bind(&mut self, key: &str, handler: Handler<T>, data: T) -> Result<(), HotkeyError> {
        let (keysym, modifiers) = parse_accelerator(key)
            .ok_or_else(|| HotkeyError::InvalidAccelerator(key.to_owned()))?;

        let grabs = self.grab_keysym(key, keysym, modifiers).map_err(|e| {
            warn!("binding '{}' failed: {}", key, e);
            e
        })?;

        info!("bound '{}' on {} key combinations", key, grabs.len());
        self.bindings.push(Binding {
            keystring: key.to_owned(),
            keysym,
            modifiers,
            handler,
            data,
            grabs,
        });
        Ok(())
    }

    /// Release the binding registered with exactly this key string and
    /// handler, if there is one
    pub fn unbind(&mut self, key: &str, handler: &Handler<T>) {
        let index = self
            .bindings
            .iter()
            .position(|b| b.keystring == key && Rc::ptr_eq(&b.handler, handler));

        if let Some(index) = index {
            let binding = self.bindings.remove(index);
            for (keycode, modifiers) in binding.grabs {
                self.provider.ungrab(keycode, modifiers);
            }
            info!("unbound '{}'", key);
        }
    }

    /// Drop every grab and take them again against the current keymap
    pub fn regrab_all(&mut self) {
        let bindings = std::mem::take(&mut self.bindings);
        for (keycode, modifiers) in bindings.iter().flat_map(|b| b.grabs.iter()) {
            self.provider.ungrab(*keycode, *modifiers);
        }

        for mut binding in bindings {
            binding.grabs = self
                .grab_keysym(&binding.keystring, binding.keysym, binding.modifiers)
                .unwrap_or_else(|e| {
                    warn!("'{}' lost its grab after the keymap changed: {}", binding.keystring, e);
                    Vec::new()
                });
            self.bindings.push(binding);
        }
    }

    /// The handlers a key press triggers, to be fired once the registry is
    /// no longer borrowed
    pub fn activations(&self, keycode: u8, state: Modifiers) -> Vec<Activation<T>> {
        let (sym, consumed) = match self.provider.translate(keycode, state) {
            Some(translated) => translated,
            None => return Vec::new(),
        };
        let sym = keysym::to_lower(sym);
        let modifiers = self.provider.add_virtual_modifiers(state & !consumed)
            & Modifiers::DEFAULT_MOD_MASK;

        self.bindings
            .iter()
            .filter(|b| b.keysym == sym && modifiers_equal(b.modifiers, modifiers))
            .map(|b| Activation {
                keystring: b.keystring.clone(),
                handler: Rc::clone(&b.handler),
                data: b.data.clone(),
            })
            .collect()
    }

    /// Run every handler bound to this key press.  Returns how many ran.
    pub fn handle_key_press(&self, keycode: u8, state: Modifiers, time: u32) -> usize {
        let activations = self.activations(keycode, state);
        self.clock.dispatch(time, activations)
    }
}

impl EventClock {
    /// Fire `activations` with `time` as the current event time
    pub fn dispatch<T>(&self, time: u32, activations: Vec<Activation<T>>) -> usize {
        let count = activations.len();
        self.enter(time);
        for activation in activations {
            activation.fire();
        }
        self.leave();
        count
    }
}

impl<P: HotkeyProvider, T> Drop for Keybinder<P, T> {
    fn drop(&mut self) {
        for (keycode, modifiers) in self.bindings.iter().flat_map(|b| b.grabs.iter()) {
            self.provider.ungrab(*keycode, *modifiers);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::super::CURRENT_TIME;
    use super::fake::*;
    use super::*;
    use std::cell::{Cell, RefCell};

    type Log = Rc<RefCell<Vec<(String, u32)>>>;

    fn recorder(log: &Log) -> Handler<u32> {
        let log = Rc::clone(log);
        Rc::new(move |key: &str, data: u32| log.borrow_mut().push((key.to_owned(), data)))
    }

    #[test]
    fn bind_then_unbind_releases_everything() {
        let mut binder = Keybinder::new(FakeDisplay::keyboard());
        let log = Log::default();
        let handler = recorder(&log);

        binder.bind("XF86AudioMute", Rc::clone(&handler), 1).unwrap();
        assert_eq!(binder.len(), 1);
        assert_eq!(
            binder.provider().grabs(),
            Modifiers::IGNORABLE
                .iter()
                .map(|m| (121, *m))
                .collect::<Vec<_>>()
        );

        binder.unbind("XF86AudioMute", &handler);
        assert!(binder.is_empty());
        assert!(binder.provider().grabs().is_empty());

        binder.bind("XF86AudioMute", handler, 1).unwrap();
        assert!(binder.is_grabbed("XF86AudioMute"));
    }

    #[test]
    fn second_bind_of_same_key_conflicts() {
        let mut binder = Keybinder::new(FakeDisplay::keyboard());
        let log = Log::default();

        binder.bind("XF86AudioRaiseVolume", recorder(&log), 1).unwrap();
        let err = binder
            .bind("XF86AudioRaiseVolume", recorder(&log), 2)
            .unwrap_err();
        assert!(matches!(err, HotkeyError::GrabConflict { keycode: 123, .. }));
        assert_eq!(binder.len(), 1);
        assert_eq!(binder.provider().grabs().len(), 4);
    }

    #[test]
    fn unbind_needs_the_same_handler() {
        let mut binder = Keybinder::new(FakeDisplay::keyboard());
        let log = Log::default();
        binder.bind("F5", recorder(&log), 1).unwrap();

        binder.unbind("F5", &recorder(&log));
        binder.unbind("<Control>F5", &recorder(&log));
        assert_eq!(binder.len(), 1);
    }

    #[test]
    fn alt_binding_matches_alt_meta_only() {
        let mut binder = Keybinder::new(FakeDisplay::keyboard());
        let log = Log::default();
        binder.bind("<Alt>F5", recorder(&log), 7).unwrap();
        assert!(binder
            .provider()
            .grabs()
            .contains(&(71, Modifiers::MOD1 | Modifiers::MOD2)));

        // the provider adds Meta on top of Mod1
        assert_eq!(binder.handle_key_press(71, Modifiers::MOD1, 10), 1);
        assert_eq!(binder.handle_key_press(71, Modifiers::CONTROL, 11), 0);
        // NumLock does not matter
        assert_eq!(binder.handle_key_press(71, Modifiers::MOD1 | Modifiers::MOD2, 12), 1);
        assert_eq!(*log.borrow(), vec![("<Alt>F5".to_owned(), 7), ("<Alt>F5".to_owned(), 7)]);
    }

    #[test]
    fn consumed_shift_is_not_a_modifier() {
        let mut binder = Keybinder::new(FakeDisplay::keyboard());
        let log = Log::default();
        binder.bind("<Control>a", recorder(&log), 1).unwrap();

        assert_eq!(binder.handle_key_press(38, Modifiers::CONTROL, 0), 1);
        assert_eq!(
            binder.handle_key_press(38, Modifiers::CONTROL | Modifiers::SHIFT, 0),
            1
        );
        assert_eq!(binder.handle_key_press(38, Modifiers::NONE, 0), 0);
    }

    #[test]
    fn only_the_first_group_is_grabbed() {
        let display = FakeDisplay::keyboard();
        display.map('q' as Keysym, 24, 1, 0);
        let mut binder = Keybinder::new(display);
        let log = Log::default();

        assert!(matches!(
            binder.bind("q", recorder(&log), 1),
            Err(HotkeyError::NoKeycode(_))
        ));
        assert!(binder.is_empty());
    }

    #[test]
    fn failing_keycode_is_released_and_next_tried() {
        let display = FakeDisplay::keyboard();
        display.map(MUTE, 160, 0, 0);
        display.foreign.borrow_mut().insert((121, Modifiers::LOCK));
        let mut binder = Keybinder::new(display);
        let log = Log::default();

        binder.bind("XF86AudioMute", recorder(&log), 1).unwrap();
        let grabs = binder.provider().grabs();
        assert_eq!(grabs.len(), 4);
        assert!(grabs.iter().all(|(keycode, _)| *keycode == 160));
    }

    #[test]
    fn total_failure_registers_nothing() {
        let display = FakeDisplay::keyboard();
        display.foreign.borrow_mut().insert((121, Modifiers::MOD2));
        let mut binder = Keybinder::new(display);
        let log = Log::default();

        assert!(binder.bind("XF86AudioMute", recorder(&log), 1).is_err());
        assert!(binder.is_empty());
        assert!(binder.provider().grabs().is_empty());
    }

    #[test]
    fn bad_strings_and_modifiers() {
        let mut binder = Keybinder::new(FakeDisplay::keyboard());
        let log = Log::default();
        assert!(matches!(
            binder.bind("<Bogus>a", recorder(&log), 1),
            Err(HotkeyError::InvalidAccelerator(_))
        ));
        assert!(matches!(
            binder.bind("<Hyper>a", recorder(&log), 1),
            Err(HotkeyError::UnmappedModifier(_))
        ));
        assert!(binder.provider().grabs().is_empty());
    }

    #[test]
    fn regrab_follows_the_keymap() {
        let mut binder = Keybinder::new(FakeDisplay::keyboard());
        let log = Log::default();
        binder.bind("XF86AudioMute", recorder(&log), 1).unwrap();
        binder.bind("F5", recorder(&log), 2).unwrap();

        // mute moves to another key, F5 disappears
        binder
            .provider()
            .keys
            .borrow_mut()
            .retain(|(k, _)| *k != MUTE && *k != F5);
        binder.provider().map(MUTE, 200, 0, 0);
        binder.regrab_all();

        assert_eq!(binder.len(), 2);
        assert!(binder.is_grabbed("XF86AudioMute"));
        assert!(!binder.is_grabbed("F5"));
        assert!(binder.provider().grabs().iter().all(|(k, _)| *k == 200));

        // and comes back with the next change
        binder.provider().map(F5, 71, 0, 0);
        binder.regrab_all();
        assert!(binder.is_grabbed("F5"));
    }

    #[test]
    fn handlers_see_the_event_time() {
        let mut binder = Keybinder::new(FakeDisplay::keyboard());
        let clock = binder.clock();
        let seen = Rc::new(Cell::new(None));
        {
            let seen = Rc::clone(&seen);
            binder
                .bind(
                    "F5",
                    Rc::new(move |_: &str, _: u32| seen.set(Some(clock.current_event_time()))),
                    0,
                )
                .unwrap();
        }

        binder.handle_key_press(71, Modifiers::NONE, 4242);
        assert_eq!(seen.get(), Some(4242));
        assert_eq!(binder.current_event_time(), CURRENT_TIME);
    }
}
