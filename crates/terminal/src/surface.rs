//! Seam between terminal logic and whatever renders it.

/// A terminal display surface. Implemented by the embedding UI (an xterm-like
/// widget, a TUI pane, a test recorder); consumed by the demo shell and the
/// adapter, which never know how cells actually get drawn.
pub trait Surface {
    /// Write raw text (may contain ANSI escapes) at the cursor.
    fn write(&mut self, data: &str);

    /// Clear the whole display.
    fn clear(&mut self);

    /// Write text followed by a CRLF newline.
    fn writeln(&mut self, data: &str) {
        self.write(data);
        self.write("\r\n");
    }
}
