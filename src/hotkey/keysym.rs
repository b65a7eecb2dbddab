//! X keysym names
//!
//! The names hotkeys are usually bound to are known: ASCII, function keys,
//! editing and navigation, the whole keypad, modifiers and the common XF86
//! multimedia keys. Anything else can still be given as a `0x...` value.

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub type Keysym = u32;

/// Keysym of "no key"
pub const NO_SYMBOL: Keysym = 0;

const NAMED: &[(&str, Keysym)] = &[
    ("space", 0x0020),
    ("exclam", 0x0021),
    ("quotedbl", 0x0022),
    ("numbersign", 0x0023),
    ("dollar", 0x0024),
    ("percent", 0x0025),
    ("ampersand", 0x0026),
    ("apostrophe", 0x0027),
    ("parenleft", 0x0028),
    ("parenright", 0x0029),
    ("asterisk", 0x002a),
    ("plus", 0x002b),
    ("comma", 0x002c),
    ("minus", 0x002d),
    ("period", 0x002e),
    ("slash", 0x002f),
    ("colon", 0x003a),
    ("semicolon", 0x003b),
    ("less", 0x003c),
    ("equal", 0x003d),
    ("greater", 0x003e),
    ("question", 0x003f),
    ("at", 0x0040),
    ("bracketleft", 0x005b),
    ("backslash", 0x005c),
    ("bracketright", 0x005d),
    ("asciicircum", 0x005e),
    ("underscore", 0x005f),
    ("grave", 0x0060),
    ("braceleft", 0x007b),
    ("bar", 0x007c),
    ("braceright", 0x007d),
    ("asciitilde", 0x007e),
    ("BackSpace", 0xff08),
    ("Tab", 0xff09),
    ("Linefeed", 0xff0a),
    ("Clear", 0xff0b),
    ("Return", 0xff0d),
    ("Pause", 0xff13),
    ("Scroll_Lock", 0xff14),
    ("Sys_Req", 0xff15),
    ("Escape", 0xff1b),
    ("Home", 0xff50),
    ("Left", 0xff51),
    ("Up", 0xff52),
    ("Right", 0xff53),
    ("Down", 0xff54),
    ("Page_Up", 0xff55),
    ("Page_Down", 0xff56),
    ("End", 0xff57),
    ("Begin", 0xff58),
    ("Select", 0xff60),
    ("Print", 0xff61),
    ("Execute", 0xff62),
    ("Insert", 0xff63),
    ("Undo", 0xff65),
    ("Redo", 0xff66),
    ("Menu", 0xff67),
    ("Find", 0xff68),
    ("Cancel", 0xff69),
    ("Help", 0xff6a),
    ("Break", 0xff6b),
    ("Mode_switch", 0xff7e),
    ("Num_Lock", 0xff7f),
    ("KP_Space", 0xff80),
    ("KP_Tab", 0xff89),
    ("KP_Enter", 0xff8d),
    ("KP_F1", 0xff91),
    ("KP_F2", 0xff92),
    ("KP_F3", 0xff93),
    ("KP_F4", 0xff94),
    ("KP_Home", 0xff95),
    ("KP_Left", 0xff96),
    ("KP_Up", 0xff97),
    ("KP_Right", 0xff98),
    ("KP_Down", 0xff99),
    ("KP_Page_Up", 0xff9a),
    ("KP_Page_Down", 0xff9b),
    ("KP_End", 0xff9c),
    ("KP_Begin", 0xff9d),
    ("KP_Insert", 0xff9e),
    ("KP_Delete", 0xff9f),
    ("KP_Multiply", 0xffaa),
    ("KP_Add", 0xffab),
    ("KP_Separator", 0xffac),
    ("KP_Subtract", 0xffad),
    ("KP_Decimal", 0xffae),
    ("KP_Divide", 0xffaf),
    ("KP_Equal", 0xffbd),
    ("ISO_Level3_Shift", 0xfe03),
    ("Shift_L", 0xffe1),
    ("Shift_R", 0xffe2),
    ("Control_L", 0xffe3),
    ("Control_R", 0xffe4),
    ("Caps_Lock", 0xffe5),
    ("Shift_Lock", 0xffe6),
    ("Meta_L", 0xffe7),
    ("Meta_R", 0xffe8),
    ("Alt_L", 0xffe9),
    ("Alt_R", 0xffea),
    ("Super_L", 0xffeb),
    ("Super_R", 0xffec),
    ("Hyper_L", 0xffed),
    ("Hyper_R", 0xffee),
    ("Delete", 0xffff),
    ("XF86MonBrightnessUp", 0x1008_ff02),
    ("XF86MonBrightnessDown", 0x1008_ff03),
    ("XF86KbdLightOnOff", 0x1008_ff04),
    ("XF86KbdBrightnessUp", 0x1008_ff05),
    ("XF86KbdBrightnessDown", 0x1008_ff06),
    ("XF86AudioLowerVolume", 0x1008_ff11),
    ("XF86AudioMute", 0x1008_ff12),
    ("XF86AudioRaiseVolume", 0x1008_ff13),
    ("XF86AudioPlay", 0x1008_ff14),
    ("XF86AudioStop", 0x1008_ff15),
    ("XF86AudioPrev", 0x1008_ff16),
    ("XF86AudioNext", 0x1008_ff17),
    ("XF86HomePage", 0x1008_ff18),
    ("XF86Mail", 0x1008_ff19),
    ("XF86Search", 0x1008_ff1b),
    ("XF86AudioRecord", 0x1008_ff1c),
    ("XF86Calculator", 0x1008_ff1d),
    ("XF86Calendar", 0x1008_ff20),
    ("XF86Back", 0x1008_ff26),
    ("XF86Forward", 0x1008_ff27),
    ("XF86Stop", 0x1008_ff28),
    ("XF86Refresh", 0x1008_ff29),
    ("XF86PowerOff", 0x1008_ff2a),
    ("XF86WakeUp", 0x1008_ff2b),
    ("XF86Eject", 0x1008_ff2c),
    ("XF86ScreenSaver", 0x1008_ff2d),
    ("XF86WWW", 0x1008_ff2e),
    ("XF86Sleep", 0x1008_ff2f),
    ("XF86Favorites", 0x1008_ff30),
    ("XF86AudioPause", 0x1008_ff31),
    ("XF86AudioMedia", 0x1008_ff32),
    ("XF86MyComputer", 0x1008_ff33),
    ("XF86AudioRewind", 0x1008_ff3e),
    ("XF86Copy", 0x1008_ff57),
    ("XF86Cut", 0x1008_ff58),
    ("XF86Display", 0x1008_ff59),
    ("XF86Explorer", 0x1008_ff5d),
    ("XF86Paste", 0x1008_ff6d),
    ("XF86Reload", 0x1008_ff73),
    ("XF86Tools", 0x1008_ff81),
    ("XF86WLAN", 0x1008_ff95),
    ("XF86AudioForward", 0x1008_ff97),
    ("XF86TouchpadToggle", 0x1008_ffa9),
    ("XF86AudioMicMute", 0x1008_ffb2),
];

/// Second names for keys in `NAMED`, accepted but never printed
const ALIASES: &[(&str, Keysym)] = &[
    ("Prior", 0xff55),
    ("Next", 0xff56),
    ("script_switch", 0xff7e),
    ("KP_Prior", 0xff9a),
    ("KP_Next", 0xff9b),
];

/// Every keysym with its preferred name
static CANONICAL: Lazy<Vec<(String, Keysym)>> = Lazy::new(|| {
    let mut names: Vec<(String, Keysym)> = NAMED.iter().map(|(n, k)| (n.to_string(), *k)).collect();
    for c in ('0'..='9').chain('a'..='z').chain('A'..='Z') {
        names.push((c.to_string(), c as Keysym));
    }
    for n in 0..=9u32 {
        names.push((format!("KP_{}", n), 0xffb0 + n));
    }
    for n in 1..=35u32 {
        names.push((format!("F{}", n), 0xffbe + n - 1));
    }
    for n in 0..=9u32 {
        names.push((format!("XF86Launch{}", n), 0x1008_ff40 + n));
    }
    for (i, c) in ('A'..='F').enumerate() {
        names.push((format!("XF86Launch{}", c), 0x1008_ff4a + i as Keysym));
    }
    names
});

static BY_NAME: Lazy<HashMap<String, Keysym>> = Lazy::new(|| {
    CANONICAL
        .iter()
        .cloned()
        .chain(ALIASES.iter().map(|(n, k)| (n.to_string(), *k)))
        .collect()
});

static BY_KEYSYM: Lazy<HashMap<Keysym, String>> =
    Lazy::new(|| CANONICAL.iter().map(|(n, k)| (*k, n.clone())).collect());

/// Resolve a keysym name, `NO_SYMBOL` if it is unknown
pub fn from_name(name: &str) -> Keysym {
    if let Some(keysym) = BY_NAME.get(name) {
        return *keysym;
    }
    name.strip_prefix("0x")
        .and_then(|hex| Keysym::from_str_radix(hex, 16).ok())
        .unwrap_or(NO_SYMBOL)
}

pub fn name(keysym: Keysym) -> Option<String> {
    match BY_KEYSYM.get(&keysym) {
        Some(name) => Some(name.clone()),
        None if keysym != NO_SYMBOL => Some(format!("{:#x}", keysym)),
        None => None,
    }
}

/// Lowercase form of a Latin-1 keysym
pub fn to_lower(keysym: Keysym) -> Keysym {
    match keysym {
        0x41..=0x5a | 0xc0..=0xd6 | 0xd8..=0xde => keysym + 0x20,
        _ => keysym,
    }
}

/// Uppercase form of a Latin-1 keysym
pub fn to_upper(keysym: Keysym) -> Keysym {
    match keysym {
        0x61..=0x7a | 0xe0..=0xf6 | 0xf8..=0xfe => keysym - 0x20,
        _ => keysym,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_keys() {
        assert_eq!(from_name("XF86AudioMute"), 0x1008ff12);
        assert_eq!(from_name("XF86AudioRaiseVolume"), 0x1008ff13);
        assert_eq!(name(0x1008ff11).as_deref(), Some("XF86AudioLowerVolume"));
    }

    #[test]
    fn ascii_and_function_keys() {
        assert_eq!(from_name("v"), 'v' as Keysym);
        assert_eq!(from_name("V"), 'V' as Keysym);
        assert_eq!(from_name("F1"), 0xffbe);
        assert_eq!(from_name("F12"), 0xffc9);
        assert_eq!(name(0xffc9).as_deref(), Some("F12"));
    }

    #[test]
    fn keypad_and_multimedia_keys() {
        assert_eq!(from_name("KP_0"), 0xffb0);
        assert_eq!(from_name("KP_5"), 0xffb5);
        assert_eq!(from_name("KP_Decimal"), 0xffae);
        assert_eq!(name(0xffab).as_deref(), Some("KP_Add"));
        assert_eq!(from_name("XF86MonBrightnessUp"), 0x1008ff02);
        assert_eq!(from_name("XF86Sleep"), 0x1008ff2f);
        assert_eq!(from_name("XF86LaunchB"), 0x1008ff4b);
    }

    #[test]
    fn aliases_print_as_the_usual_name() {
        assert_eq!(from_name("Next"), from_name("Page_Down"));
        assert_eq!(from_name("Prior"), 0xff55);
        assert_eq!(name(0xff56).as_deref(), Some("Page_Down"));
        assert_eq!(name(0xff7e).as_deref(), Some("Mode_switch"));
        assert_eq!(name(0xff9b).as_deref(), Some("KP_Page_Down"));
    }

    #[test]
    fn canonical_names_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for (name, keysym) in CANONICAL.iter() {
            assert!(seen.insert(*keysym), "{} reuses {:#x}", name, keysym);
        }
    }

    #[test]
    fn unknown_names() {
        assert_eq!(from_name("NotAKey"), NO_SYMBOL);
        assert_eq!(from_name("0x1008fe01"), 0x1008fe01);
        assert_eq!(name(0x1008fe01).as_deref(), Some("0x1008fe01"));
        assert_eq!(name(NO_SYMBOL), None);
    }

    #[test]
    fn case_mapping() {
        assert_eq!(to_lower('Q' as Keysym), 'q' as Keysym);
        assert_eq!(to_upper('q' as Keysym), 'Q' as Keysym);
        assert_eq!(to_lower(0xc9), 0xe9);
        assert_eq!(to_upper(0xd7), 0xd7);
        assert_eq!(to_lower(0x1008ff12), 0x1008ff12);
    }
}
