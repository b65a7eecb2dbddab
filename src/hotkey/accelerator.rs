//! GTK style accelerator strings, `<Control><Alt>v` or `XF86AudioMute`

use super::keysym::{self, Keysym, NO_SYMBOL};
use super::Modifiers;
use once_cell::sync::Lazy;
use regex::Regex;

static ACCELERATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^((?:<[A-Za-z0-9_]+>)*)([^<>]+)$").unwrap());
static MODIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([A-Za-z0-9_]+)>").unwrap());

fn modifier(token: &str) -> Option<Modifiers> {
    let modifier = match token.to_ascii_lowercase().as_str() {
        "control" | "ctrl" | "ctl" | "primary" => Modifiers::CONTROL,
        "shift" | "shft" => Modifiers::SHIFT,
        "alt" | "mod1" => Modifiers::MOD1,
        "mod2" => Modifiers::MOD2,
        "mod3" => Modifiers::MOD3,
        "mod4" => Modifiers::MOD4,
        "mod5" => Modifiers::MOD5,
        "super" => Modifiers::SUPER,
        "hyper" => Modifiers::HYPER,
        "meta" => Modifiers::META,
        "release" => Modifiers::NONE,
        _ => return None,
    };
    Some(modifier)
}

/// Parse an accelerator into its lowercased keysym and modifiers.
///
/// Returns `None` for anything malformed, an unknown modifier or key name
/// included.
pub fn parse_accelerator(accelerator: &str) -> Option<(Keysym, Modifiers)> {
    let captures = ACCELERATOR.captures(accelerator.trim())?;

    let mut modifiers = Modifiers::NONE;
    for token in MODIFIER.captures_iter(&captures[1]) {
        modifiers |= modifier(&token[1])?;
    }

    match keysym::to_lower(keysym::from_name(&captures[2])) {
        NO_SYMBOL => None,
        sym => Some((sym, modifiers)),
    }
}

/// Render an accelerator that [`parse_accelerator`] reads back
pub fn accelerator_name(keysym: Keysym, modifiers: Modifiers) -> String {
    const NAMES: [(Modifiers, &str); 10] = [
        (Modifiers::SHIFT, "<Shift>"),
        (Modifiers::CONTROL, "<Control>"),
        (Modifiers::MOD1, "<Alt>"),
        (Modifiers::MOD2, "<Mod2>"),
        (Modifiers::MOD3, "<Mod3>"),
        (Modifiers::MOD4, "<Mod4>"),
        (Modifiers::MOD5, "<Mod5>"),
        (Modifiers::SUPER, "<Super>"),
        (Modifiers::HYPER, "<Hyper>"),
        (Modifiers::META, "<Meta>"),
    ];

    let mut name: String = NAMES
        .iter()
        .filter(|(m, _)| modifiers.contains(*m))
        .map(|(_, n)| *n)
        .collect();
    name.push_str(&keysym::name(keysym::to_lower(keysym)).unwrap_or_default());
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_keys() {
        assert_eq!(parse_accelerator("XF86AudioMute"), Some((0x1008ff12, Modifiers::NONE)));
        assert_eq!(parse_accelerator("F5"), Some((0xffc2, Modifiers::NONE)));
    }

    #[test]
    fn modifiers_and_case() {
        assert_eq!(
            parse_accelerator("<Control><Alt>v"),
            Some(('v' as Keysym, Modifiers::CONTROL | Modifiers::MOD1))
        );
        assert_eq!(
            parse_accelerator("<ctrl><SHIFT>V"),
            Some(('v' as Keysym, Modifiers::CONTROL | Modifiers::SHIFT))
        );
        assert_eq!(
            parse_accelerator("<Super><Release>Up"),
            Some((0xff52, Modifiers::SUPER))
        );
    }

    #[test]
    fn keypad_aliases_and_launcher_keys() {
        assert_eq!(parse_accelerator("KP_5"), Some((0xffb5, Modifiers::NONE)));
        assert_eq!(
            parse_accelerator("<Control>KP_Add"),
            Some((0xffab, Modifiers::CONTROL))
        );
        assert_eq!(parse_accelerator("<Alt>Next"), parse_accelerator("<Alt>Page_Down"));
        assert_eq!(
            parse_accelerator("XF86MonBrightnessUp"),
            Some((0x1008ff02, Modifiers::NONE))
        );
        assert_eq!(accelerator_name(0xff55, Modifiers::SHIFT), "<Shift>Page_Up");
    }

    #[test]
    fn malformed_is_no_key() {
        for bad in ["", "<Control>", "<Control", "<Bogus>v", "NotAKey", "<Alt>v<Shift>"] {
            assert_eq!(parse_accelerator(bad), None, "{:?}", bad);
        }
    }

    #[test]
    fn names_parse_back() {
        for accel in ["<Control><Alt>v", "XF86AudioRaiseVolume", "<Shift><Super>F12"] {
            let (keysym, modifiers) = parse_accelerator(accel).unwrap();
            let name = accelerator_name(keysym, modifiers);
            assert_eq!(parse_accelerator(&name), Some((keysym, modifiers)), "{}", name);
        }
        assert_eq!(
            accelerator_name('v' as Keysym, Modifiers::CONTROL | Modifiers::MOD1),
            "<Control><Alt>v"
        );
    }
}
