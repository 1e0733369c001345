//! Line-edit buffer shared by the demo shell and the live-mode command
//! instrumentation.

/// Accumulates raw keystrokes between submissions.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a printable chunk.
    pub fn push(&mut self, data: &str) {
        self.buffer.push_str(data);
    }

    /// Remove the last character. Returns whether anything was removed, so
    /// the caller knows whether to erase a display cell.
    pub fn backspace(&mut self) -> bool {
        self.buffer.pop().is_some()
    }

    /// Take the trimmed line and reset the buffer. `None` for whitespace-only
    /// input.
    pub fn take(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Replace the whole buffer (history recall).
    pub fn replace(&mut self, line: &str) {
        self.buffer.clear();
        self.buffer.push_str(line);
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Character count of the current line, used to compute how many display
    /// cells to erase when redrawing.
    pub fn len(&self) -> usize {
        self.buffer.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_backspace_take() {
        let mut line = LineBuffer::new();
        line.push("pwdd");
        assert!(line.backspace());
        assert_eq!(line.take().as_deref(), Some("pwd"));
        assert!(line.is_empty());
    }

    #[test]
    fn take_trims_and_skips_blank_lines() {
        let mut line = LineBuffer::new();
        line.push("   ");
        assert_eq!(line.take(), None);

        line.push("  ls -l  ");
        assert_eq!(line.take().as_deref(), Some("ls -l"));
    }

    #[test]
    fn backspace_on_empty_is_a_noop() {
        let mut line = LineBuffer::new();
        assert!(!line.backspace());
    }

    #[test]
    fn len_counts_chars_not_bytes() {
        let mut line = LineBuffer::new();
        line.push("héllo");
        assert_eq!(line.len(), 5);
    }
}
