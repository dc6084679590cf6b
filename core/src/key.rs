//! Key descriptions sent to the engine.
//!
//! A key is a symbol plus modifier states. Callers can build one from a
//! description string (`"Control+Shift+a"`, `"BackSpace"`), a single
//! character, or a numeric key-symbol code.

use crate::error::KeyParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Key symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeySym {
    /// Printable character
    Char(char),
    BackSpace,
    Tab,
    Return,
    Escape,
    Delete,
    Home,
    End,
    Left,
    Up,
    Right,
    Down,
    PageUp,
    PageDown,
    /// No symbol (used for synthetic triggers)
    None,
}

const NAMED: &[(&str, KeySym, u32)] = &[
    ("BackSpace", KeySym::BackSpace, 0xff08),
    ("Tab", KeySym::Tab, 0xff09),
    ("Return", KeySym::Return, 0xff0d),
    ("Escape", KeySym::Escape, 0xff1b),
    ("Home", KeySym::Home, 0xff50),
    ("Left", KeySym::Left, 0xff51),
    ("Up", KeySym::Up, 0xff52),
    ("Right", KeySym::Right, 0xff53),
    ("Down", KeySym::Down, 0xff54),
    ("Prior", KeySym::PageUp, 0xff55),
    ("Next", KeySym::PageDown, 0xff56),
    ("End", KeySym::End, 0xff57),
    ("Delete", KeySym::Delete, 0xffff),
    ("None", KeySym::None, 0),
];

impl KeySym {
    /// Numeric key-symbol code (X11 keysym values).
    pub fn code(self) -> u32 {
        match self {
            KeySym::Char(' ') => 0x20,
            KeySym::Char(c) if (c as u32) < 0x100 => c as u32,
            KeySym::Char(c) => 0x0100_0000 | c as u32,
            named => NAMED
                .iter()
                .find(|(_, sym, _)| *sym == named)
                .map(|(_, _, code)| *code)
                .unwrap_or(0),
        }
    }

    /// Symbol for a numeric key-symbol code.
    pub fn from_code(code: u32) -> Option<KeySym> {
        if let Some((_, sym, _)) = NAMED.iter().find(|(_, _, c)| *c == code) {
            return Some(*sym);
        }
        let ch = if code & 0xff00_0000 == 0x0100_0000 {
            char::from_u32(code & 0x00ff_ffff)
        } else if (0x20..0x100).contains(&code) {
            char::from_u32(code)
        } else {
            None
        };
        ch.map(KeySym::Char)
    }

    /// Canonical symbol name.
    pub fn name(self) -> String {
        match self {
            KeySym::Char(' ') => "space".to_string(),
            KeySym::Char(c) => c.to_string(),
            named => NAMED
                .iter()
                .find(|(_, sym, _)| *sym == named)
                .map(|(name, _, _)| name.to_string())
                .unwrap_or_default(),
        }
    }

    fn parse(s: &str) -> Result<KeySym, KeyParseError> {
        if s.eq_ignore_ascii_case("space") {
            return Ok(KeySym::Char(' '));
        }
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Ok(KeySym::Char(c));
        }
        NAMED
            .iter()
            .find(|(name, _, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, sym, _)| *sym)
            .or(match s {
                "Enter" => Some(KeySym::Return),
                "PageUp" => Some(KeySym::PageUp),
                "PageDown" => Some(KeySym::PageDown),
                _ => None,
            })
            .ok_or_else(|| KeyParseError::UnknownSymbol(s.to_string()))
    }
}

/// Modifier states held with a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyStates {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub super_: bool,
}

impl KeyStates {
    pub fn is_empty(&self) -> bool {
        !(self.ctrl || self.alt || self.shift || self.super_)
    }
}

/// A key event: symbol plus modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    pub sym: KeySym,
    pub states: KeyStates,
}

impl Key {
    pub fn new(sym: KeySym) -> Self {
        Self {
            sym,
            states: KeyStates::default(),
        }
    }

    pub fn from_char(c: char) -> Self {
        Self::new(KeySym::Char(c))
    }

    /// Key for a numeric key-symbol code; unknown codes map to `KeySym::None`.
    pub fn from_code(code: u32) -> Self {
        Self::new(KeySym::from_code(code).unwrap_or(KeySym::None))
    }

    /// Printable character with no modifiers other than shift.
    pub fn printable(&self) -> Option<char> {
        match self.sym {
            KeySym::Char(c) if !(self.states.ctrl || self.states.alt || self.states.super_) => {
                Some(c)
            }
            _ => None,
        }
    }
}

impl FromStr for Key {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(KeyParseError::Empty);
        }
        // A trailing '+' is the plus key itself ("Control++").
        let (mods, sym) = match s.strip_suffix("++") {
            Some(rest) => (rest, "+"),
            None if s == "+" => ("", "+"),
            None => match s.rfind('+') {
                Some(i) => (&s[..i], &s[i + 1..]),
                None => ("", s),
            },
        };
        let mut states = KeyStates::default();
        for m in mods.split('+').filter(|m| !m.is_empty()) {
            match m {
                "Control" | "Ctrl" => states.ctrl = true,
                "Alt" => states.alt = true,
                "Shift" => states.shift = true,
                "Super" => states.super_ = true,
                other => return Err(KeyParseError::UnknownModifier(other.to_string())),
            }
        }
        Ok(Key {
            sym: KeySym::parse(sym)?,
            states,
        })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.states.ctrl {
            f.write_str("Control+")?;
        }
        if self.states.alt {
            f.write_str("Alt+")?;
        }
        if self.states.shift {
            f.write_str("Shift+")?;
        }
        if self.states.super_ {
            f.write_str("Super+")?;
        }
        f.write_str(&self.sym.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modifiers() {
        let key: Key = "Control+Shift+a".parse().unwrap();
        assert_eq!(key.sym, KeySym::Char('a'));
        assert!(key.states.ctrl && key.states.shift);
        assert!(!key.states.alt);
        assert_eq!(key.to_string(), "Control+Shift+a");
    }

    #[test]
    fn test_parse_named_and_plus() {
        assert_eq!("BackSpace".parse::<Key>().unwrap().sym, KeySym::BackSpace);
        assert_eq!("space".parse::<Key>().unwrap().sym, KeySym::Char(' '));
        assert_eq!("Enter".parse::<Key>().unwrap().sym, KeySym::Return);
        let plus: Key = "Control++".parse().unwrap();
        assert_eq!(plus.sym, KeySym::Char('+'));
        assert!(plus.states.ctrl);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Key>(), Err(KeyParseError::Empty));
        assert_eq!(
            "Hyper+a".parse::<Key>(),
            Err(KeyParseError::UnknownModifier("Hyper".into()))
        );
        assert_eq!(
            "Frobnicate".parse::<Key>(),
            Err(KeyParseError::UnknownSymbol("Frobnicate".into()))
        );
    }

    #[test]
    fn test_codes() {
        assert_eq!(Key::from_code(0xff08).sym, KeySym::BackSpace);
        assert_eq!(Key::from_code(0x61).sym, KeySym::Char('a'));
        assert_eq!(KeySym::Char('你').code(), 0x0100_4f60);
        assert_eq!(KeySym::from_code(0x0100_4f60), Some(KeySym::Char('你')));
        assert_eq!(Key::from_code(0x7).sym, KeySym::None);
    }

    #[test]
    fn test_printable() {
        assert_eq!(Key::from_char('x').printable(), Some('x'));
        let ctrl: Key = "Control+x".parse().unwrap();
        assert_eq!(ctrl.printable(), None);
    }
}
