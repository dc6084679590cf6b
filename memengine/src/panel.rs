//! Input panel state of one input context.
//!
//! A plain data container: the engine mutates fields directly and then
//! publishes them as events. Nothing here talks to the bridge.

/// Which entry mode the panel is in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PanelMode {
    /// Regular input through the current input method
    #[default]
    Normal,
    /// Quick-phrase keyword entry
    QuickPhrase,
    /// Hexadecimal code point entry
    Unicode,
}

/// Panel of one input context.
///
/// # Fields
///
/// - `preedit`: Text being composed
/// - `cursor`: Cursor position within the preedit (in characters)
/// - `candidates`: Candidates for the current preedit
/// - `aux_up` / `aux_down`: Hint lines shown above and below
#[derive(Debug, Clone, Default)]
pub struct Panel {
    pub preedit: String,
    pub cursor: usize,
    pub candidates: Vec<String>,
    pub aux_up: String,
    pub aux_down: String,
    pub mode: PanelMode,
    pub focused: bool,
}

impl Panel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear preedit, candidates and hints, and leave any special mode.
    pub fn clear(&mut self) {
        self.preedit.clear();
        self.cursor = 0;
        self.candidates.clear();
        self.aux_up.clear();
        self.aux_down.clear();
        self.mode = PanelMode::Normal;
    }

    pub fn is_empty(&self) -> bool {
        self.preedit.is_empty()
            && self.candidates.is_empty()
            && self.aux_up.is_empty()
            && self.aux_down.is_empty()
    }

    pub fn preedit_len(&self) -> usize {
        self.preedit.chars().count()
    }

    /// Insert at the cursor.
    pub fn insert(&mut self, ch: char) {
        let at = self.byte_offset(self.cursor);
        self.preedit.insert(at, ch);
        self.cursor += 1;
    }

    /// Remove the character before the cursor. Returns whether one was removed.
    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let at = self.byte_offset(self.cursor - 1);
        self.preedit.remove(at);
        self.cursor -= 1;
        true
    }

    /// Move the cursor. Out-of-range positions are rejected.
    pub fn set_cursor(&mut self, position: i32) -> bool {
        match usize::try_from(position) {
            Ok(pos) if pos <= self.preedit_len() => {
                self.cursor = pos;
                true
            }
            _ => false,
        }
    }

    /// Cursor as a byte offset into the preedit, as reported to callers.
    pub fn cursor_bytes(&self) -> i32 {
        i32::try_from(self.byte_offset(self.cursor)).unwrap_or(i32::MAX)
    }

    fn byte_offset(&self, chars: usize) -> usize {
        self.preedit
            .char_indices()
            .nth(chars)
            .map(|(i, _)| i)
            .unwrap_or(self.preedit.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_backspace_at_cursor() {
        let mut panel = Panel::new();
        for ch in "nhao".chars() {
            panel.insert(ch);
        }
        assert!(panel.set_cursor(1));
        panel.insert('i');
        assert_eq!(panel.preedit, "nihao");
        assert_eq!(panel.cursor, 2);
        assert!(panel.backspace());
        assert_eq!(panel.preedit, "nhao");
    }

    #[test]
    fn test_cursor_bounds_and_byte_offset() {
        let mut panel = Panel::new();
        panel.preedit = "你好".into();
        assert!(!panel.set_cursor(3));
        assert!(!panel.set_cursor(-1));
        assert!(panel.set_cursor(1));
        assert_eq!(panel.cursor_bytes(), 3);
    }

    #[test]
    fn test_clear_resets_mode() {
        let mut panel = Panel::new();
        panel.mode = PanelMode::Unicode;
        panel.aux_up = "Unicode:".into();
        assert!(!panel.is_empty());
        panel.clear();
        assert!(panel.is_empty());
        assert_eq!(panel.mode, PanelMode::Normal);
    }
}
