//! Bounded tail of build output lines.

use std::collections::VecDeque;

/// Lines of build output kept for the failure message.
pub const DEFAULT_TAIL_LINES: usize = 20;

/// Bytes buffered for an unterminated line before it is cut into a line of
/// its own.
pub const MAX_LINE_BYTES: usize = 4096;

/// Keeps the last `capacity` complete lines fed through it. Chunks may split
/// lines anywhere.
#[derive(Debug)]
pub struct LogTail {
    lines: VecDeque<String>,
    partial: Vec<u8>,
    capacity: usize,
}

impl Default for LogTail {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_LINES)
    }
}

impl LogTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            partial: Vec::new(),
            capacity,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        for &b in chunk {
            if b == b'\n' {
                let line = std::mem::take(&mut self.partial);
                self.push(line);
            } else {
                self.partial.push(b);
                if self.partial.len() == MAX_LINE_BYTES {
                    let line = std::mem::take(&mut self.partial);
                    self.push(line);
                }
            }
        }
    }

    /// The retained lines, including an unterminated last line.
    pub fn finish(mut self) -> Vec<String> {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.push(line);
        }
        self.lines.into()
    }

    fn push(&mut self, raw: Vec<u8>) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        let line = String::from_utf8_lossy(&raw);
        self.lines.push_back(line.trim_end_matches('\r').to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_last_lines() {
        let mut tail = LogTail::new(2);
        tail.feed(b"one\ntwo\nthree\n");
        assert_eq!(tail.finish(), vec!["two", "three"]);
    }

    #[test]
    fn joins_lines_split_across_chunks() {
        let mut tail = LogTail::default();
        tail.feed(b"-----> Comp");
        tail.feed(b"iling\r\nerror: ");
        tail.feed(b"exit 1");
        assert_eq!(tail.finish(), vec!["-----> Compiling", "error: exit 1"]);
    }

    #[test]
    fn long_unterminated_output_is_cut() {
        let mut tail = LogTail::new(3);
        let progress_bar = "#\r".repeat(MAX_LINE_BYTES);
        tail.feed(progress_bar.as_bytes());
        assert!(tail.partial.len() < MAX_LINE_BYTES);
        tail.feed(b"\ndone\n");
        let lines = tail.finish();
        assert_eq!(lines.last().map(String::as_str), Some("done"));
        assert!(lines.iter().all(|l| l.len() <= MAX_LINE_BYTES));
    }

    #[test]
    fn empty_output() {
        assert!(LogTail::default().finish().is_empty());
    }
}
