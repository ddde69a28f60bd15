// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge

/// Reassembles newline-terminated lines from arbitrary read chunks.
///
/// Partial data is held until its terminator arrives. Lines are yielded in
/// arrival order with the `\n` (and any trailing `\r`) removed.
#[derive(Debug, Default)]
pub struct LineFramer {
    leftover: Vec<u8>,
    /// Prefix of `leftover` already known to hold no terminator.
    scanned: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.leftover.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        for (i, b) in self.leftover.iter().enumerate().skip(self.scanned) {
            if *b == b'\n' {
                let mut line = &self.leftover[start..i];
                if let [head @ .., b'\r'] = line {
                    line = head;
                }
                lines.push(String::from_utf8_lossy(line).into_owned());
                start = i + 1;
            }
        }
        self.leftover.drain(..start);
        self.scanned = self.leftover.len();
        lines
    }

    /// Bytes received after the last terminator.
    pub fn pending(&self) -> &[u8] {
        &self.leftover
    }

    /// Drop partial data, e.g. after the link went down.
    pub fn clear(&mut self) {
        self.leftover.clear();
        self.scanned = 0;
    }
}
