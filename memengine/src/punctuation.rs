//! Punctuation companion: full-width forms for ASCII punctuation.
//!
//! Each entry maps an ASCII key to an `(open, close)` pair. Keys typed in
//! pairs (quotes) carry both halves; everything else has an empty closing
//! half.

use imebridge_core::PunctuationLookup;
use std::collections::HashMap;

/// Per-language punctuation table.
#[derive(Debug, Clone)]
pub struct PunctuationTable {
    languages: HashMap<String, HashMap<char, (&'static str, &'static str)>>,
}

fn chinese() -> HashMap<char, (&'static str, &'static str)> {
    let mut m = HashMap::new();

    m.insert(',', ("，", ""));
    m.insert('.', ("。", ""));
    m.insert(';', ("；", ""));
    m.insert(':', ("：", ""));
    m.insert('?', ("？", ""));
    m.insert('!', ("！", ""));
    m.insert('\\', ("、", ""));

    // Paired quotes
    m.insert('"', ("\u{201C}", "\u{201D}"));
    m.insert('\'', ("\u{2018}", "\u{2019}"));

    m.insert('(', ("（", ""));
    m.insert(')', ("）", ""));
    m.insert('[', ("【", ""));
    m.insert(']', ("】", ""));
    m.insert('{', ("｛", ""));
    m.insert('}', ("｝", ""));
    m.insert('<', ("《", ""));
    m.insert('>', ("》", ""));

    m.insert('-', ("－", ""));
    m.insert('_', ("——", ""));
    m.insert('~', ("～", ""));
    m.insert('^', ("……", ""));
    m.insert('$', ("￥", ""));
    m
}

impl PunctuationTable {
    pub fn new() -> Self {
        let mut languages = HashMap::new();
        languages.insert("zh_CN".to_string(), chinese());
        let mut tw = chinese();
        tw.insert('[', ("「", ""));
        tw.insert(']', ("」", ""));
        tw.insert('{', ("『", ""));
        tw.insert('}', ("』", ""));
        languages.insert("zh_TW".to_string(), tw);
        Self { languages }
    }

    pub fn has_entry(&self, language: &str, ch: char) -> bool {
        self.languages
            .get(language)
            .is_some_and(|table| table.contains_key(&ch))
    }

    /// Full-width text to commit for `ch`, if the language maps it.
    pub fn commit_text(&self, language: &str, ch: char) -> Option<String> {
        self.lookup(language, ch).map(|(open, close)| {
            // A paired key commits both halves.
            format!("{open}{close}")
        })
    }
}

impl Default for PunctuationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PunctuationLookup for PunctuationTable {
    fn lookup(&self, language: &str, ch: char) -> Option<(String, String)> {
        self.languages
            .get(language)?
            .get(&ch)
            .map(|(open, close)| (open.to_string(), close.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chinese_lookup() {
        let table = PunctuationTable::new();
        assert_eq!(table.lookup("zh_CN", ','), Some(("，".into(), "".into())));
        assert_eq!(
            table.lookup("zh_CN", '"'),
            Some(("\u{201C}".into(), "\u{201D}".into()))
        );
        assert_eq!(table.lookup("zh_TW", '['), Some(("「".into(), "".into())));
    }

    #[test]
    fn test_unknown_language_or_char_has_no_entry() {
        let table = PunctuationTable::new();
        assert_eq!(table.lookup("en", '.'), None);
        assert_eq!(table.lookup("zh_CN", 'a'), None);
        assert!(!table.has_entry("zh_CN", '@'));
    }

    #[test]
    fn test_commit_text_joins_pairs() {
        let table = PunctuationTable::new();
        assert_eq!(table.commit_text("zh_CN", '\'').as_deref(), Some("\u{2018}\u{2019}"));
        assert_eq!(table.commit_text("zh_CN", '.').as_deref(), Some("。"));
    }
}
