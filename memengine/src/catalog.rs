//! Built-in addon and input-method catalog, option schemas, and the small
//! syllable table used by the phonetic input methods.

use imebridge_core::{AddonCategory, AddonInfo, InputMethodEntry, OptionSet};
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const FRONTEND: &str = "frontend";
pub const KEYBOARD: &str = "keyboard";
pub const PINYIN: &str = "pinyin";
pub const QUICK_PHRASE: &str = "quickphrase";
pub const PUNCTUATION: &str = "punctuation";
pub const UNICODE: &str = "unicode";
pub const CLIPBOARD: &str = "clipboard";

pub const DEFAULT_GROUP: &str = "Default";

fn addon(
    name: &str,
    display: &str,
    comment: &str,
    category: AddonCategory,
    configurable: bool,
    default_enabled: bool,
    on_demand: bool,
) -> AddonInfo {
    AddonInfo {
        unique_name: name.to_string(),
        display_name: display.to_string(),
        comment: comment.to_string(),
        category,
        configurable,
        default_enabled,
        on_demand,
    }
}

/// Every addon, in registration order.
pub static ADDONS: Lazy<Vec<AddonInfo>> = Lazy::new(|| {
    use AddonCategory::*;
    vec![
        addon(FRONTEND, "Frontend", "Primary in-process frontend", Frontend, false, true, false),
        addon(KEYBOARD, "Keyboard", "Direct keyboard input", InputMethod, false, true, false),
        addon(PINYIN, "Pinyin", "Phonetic Chinese input", InputMethod, true, true, false),
        addon("sharedlibrary", "Shared Library", "Native addon loader", Loader, false, true, false),
        addon(QUICK_PHRASE, "Quick Phrase", "Type short phrases by keyword", Module, true, true, false),
        addon(PUNCTUATION, "Punctuation", "Full-width punctuation", Module, true, true, false),
        addon(UNICODE, "Unicode", "Input characters by code point", Module, false, true, false),
        addon(CLIPBOARD, "Clipboard", "Clipboard history", Module, true, false, true),
        addon("virtualkeyboard", "Virtual Keyboard", "On-screen keyboard", UI, false, true, false),
    ]
});

pub fn addon_info(name: &str) -> Option<&'static AddonInfo> {
    ADDONS.iter().find(|a| a.unique_name == name)
}

fn input_method(
    name: &str,
    display: &str,
    label: &str,
    language: &str,
    addon: &str,
    configurable: bool,
) -> InputMethodEntry {
    InputMethodEntry {
        unique_name: name.to_string(),
        display_name: display.to_string(),
        icon: format!("{name}-icon"),
        native_name: display.to_string(),
        label: label.to_string(),
        language_code: language.to_string(),
        addon: addon.to_string(),
        configurable,
    }
}

/// Every input method, in registration order.
pub static INPUT_METHODS: Lazy<Vec<InputMethodEntry>> = Lazy::new(|| {
    vec![
        input_method("keyboard-us", "English (US)", "us", "en", KEYBOARD, false),
        input_method("pinyin", "拼音", "拼", "zh_CN", PINYIN, true),
        input_method("shuangpin", "双拼", "双", "zh_CN", PINYIN, true),
    ]
});

pub fn input_method_entry(name: &str) -> Option<&'static InputMethodEntry> {
    INPUT_METHODS.iter().find(|im| im.unique_name == name)
}

pub fn default_group_methods() -> Vec<String> {
    vec!["keyboard-us".to_string(), "pinyin".to_string()]
}

// ========== Option schemas ==========

pub fn global_options() -> OptionSet {
    OptionSet::builder()
        .group("Hotkey", "Hotkey")
        .string("Hotkey/TriggerKeys", "Trigger Input Method", "Control+space")
        .boolean(
            "Hotkey/EnumerateWithTriggerKeys",
            "Enumerate when press trigger key repeatedly",
            true,
        )
        .group("Behavior", "Behavior")
        .boolean("Behavior/ActiveByDefault", "Active By Default", false)
        .enumeration(
            "Behavior/ShareInputState",
            "Share Input State",
            &["No", "All", "Program"],
            "No",
        )
        .boolean("Behavior/PreeditEnabledByDefault", "Show preedit in application", true)
        .integer("Behavior/DefaultPageSize", "Default page size", 5, Some(1), Some(10))
        .build()
}

pub fn addon_options(name: &str) -> Option<OptionSet> {
    let set = match name {
        PUNCTUATION => OptionSet::builder()
            .boolean("HalfWidthPuncAfterLetterOrNumber", "Half width punctuation after latin letter or number", true)
            .boolean("TypePairedPunctuationsTogether", "Type paired punctuations together", false)
            .string("Hotkey", "Toggle key", "Control+period")
            .build(),
        QUICK_PHRASE => OptionSet::builder()
            .string("TriggerKey", "Trigger Key", "Super+grave")
            .enumeration("Choose Modifier", "Choose key modifier", &["None", "Alt", "Control", "Super"], "None")
            .boolean("Spell", "Enable Spell check", true)
            .build(),
        CLIPBOARD => OptionSet::builder()
            .string("TriggerKey", "Trigger Key", "Control+semicolon")
            .integer("Number of entries", "Number of entries", 5, Some(3), Some(30))
            .build(),
        PINYIN => pinyin_options(),
        _ => return None,
    };
    Some(set)
}

fn pinyin_options() -> OptionSet {
    OptionSet::builder()
        .integer("PageSize", "Page size", 5, Some(3), Some(10))
        .boolean("FullWidth", "Full width characters", false)
        .boolean("Incomplete", "Allow incomplete syllables", true)
        .group("Correction", "Spelling correction")
        .boolean("Correction/UeVe", "nue and nve", true)
        .boolean("Correction/VU", "nv and nu", true)
        .boolean("Correction/UenUn", "juen and jun", true)
        .boolean("Correction/GnNg", "bagn and bang", true)
        .boolean("Correction/MgNg", "bamg and bang", true)
        .boolean("Correction/IouIu", "liou and liu", true)
        .group("Fuzzy", "Fuzzy pinyin")
        .boolean("Fuzzy/ZZh", "z and zh", false)
        .boolean("Fuzzy/CCh", "c and ch", false)
        .boolean("Fuzzy/SSh", "s and sh", false)
        .boolean("Fuzzy/AnAng", "an and ang", false)
        .build()
}

/// Schema of an input method with a configuration of its own. An input
/// method named after its addon (`pinyin`) shares the addon's configuration
/// instead.
pub fn input_method_options(name: &str) -> Option<OptionSet> {
    match name {
        "shuangpin" => Some(
            OptionSet::builder()
                .enumeration(
                    "Profile",
                    "Shuangpin profile",
                    &["Microsoft", "ZiRanMa", "XiaoHe", "ZiGuang", "ABC", "PinYinJiaJia"],
                    "Microsoft",
                )
                .boolean("ShowProfileHint", "Show shuangpin profile hint", true)
                .build(),
        ),
        _ => None,
    }
}

// ========== Syllable table ==========

static PHRASES: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("ni", vec!["你", "尼", "泥"]);
    m.insert("hao", vec!["好", "号", "豪"]);
    m.insert("nihao", vec!["你好"]);
    m.insert("zhong", vec!["中", "种", "重"]);
    m.insert("guo", vec!["国", "过", "果"]);
    m.insert("zhongguo", vec!["中国"]);
    m.insert("wo", vec!["我", "握"]);
    m.insert("ai", vec!["爱", "哎"]);
    m.insert("shi", vec!["是", "时", "事"]);
    m.insert("jie", vec!["界", "接", "姐"]);
    m.insert("shijie", vec!["世界"]);
    m.insert("de", vec!["的", "得", "地"]);
    m
});

/// Candidates for a composed syllable string. Falls back to the raw input.
pub fn lookup_phrases(input: &str) -> Vec<String> {
    match PHRASES.get(input) {
        Some(words) => words.iter().map(|w| w.to_string()).collect(),
        None if input.is_empty() => Vec::new(),
        None => vec![input.to_string()],
    }
}

/// Quick-phrase table.
pub static QUICK_PHRASES: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("smile", vec!["🙂", "😀"]);
    m.insert("heart", vec!["❤"]);
    m.insert("arrow", vec!["→", "←", "↑", "↓"]);
    m
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_covers_every_category() {
        for category in AddonCategory::ALL {
            assert!(ADDONS.iter().any(|a| a.category == category), "{category:?}");
        }
        assert!(!addon_info(CLIPBOARD).unwrap().default_enabled);
    }

    #[test]
    fn test_configurable_entries_have_schemas() {
        for info in ADDONS.iter().filter(|a| a.configurable) {
            assert!(addon_options(&info.unique_name).is_some(), "{}", info.unique_name);
        }
        for im in INPUT_METHODS.iter().filter(|im| im.configurable) {
            let own = input_method_options(&im.unique_name).is_some();
            let shared = im.unique_name == im.addon && addon_options(&im.addon).is_some();
            assert!(own || shared, "{}", im.unique_name);
        }
    }

    #[test]
    fn test_lookup_phrases() {
        assert_eq!(lookup_phrases("nihao"), vec!["你好".to_string()]);
        assert_eq!(lookup_phrases("xyz"), vec!["xyz".to_string()]);
        assert!(lookup_phrases("").is_empty());
    }
}
