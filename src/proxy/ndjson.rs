//! Preview extraction from newline-delimited JSON streams.
//!
//! Chunk boundaries from the network do not line up with record boundaries,
//! so partial lines are carried over to the next chunk. Lines that are not
//! JSON, or carry no text field, contribute nothing.

use serde_json::Value;

use crate::tracker::PreviewAccumulator;

/// Pulls the incremental text field out of one decoded record.
pub type FragmentFn = fn(&Value) -> Option<&str>;

#[derive(Debug)]
pub struct NdjsonPreview {
    partial: Vec<u8>,
    preview: PreviewAccumulator,
    extract: FragmentFn,
}

impl NdjsonPreview {
    pub fn new(extract: FragmentFn) -> Self {
        Self {
            partial: Vec::new(),
            preview: PreviewAccumulator::new(),
            extract,
        }
    }

    /// Feed one network chunk.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.preview.is_full() {
            return;
        }

        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            if self.partial.is_empty() {
                self.consume(head);
            } else {
                let mut line = std::mem::take(&mut self.partial);
                line.extend_from_slice(head);
                self.consume(&line);
            }
            rest = &tail[1..];
        }
        self.partial.extend_from_slice(rest);
    }

    /// Flush a trailing record that had no newline and return the preview.
    pub fn finish(mut self) -> String {
        let tail = std::mem::take(&mut self.partial);
        self.consume(&tail);
        self.preview.into_string()
    }

    fn consume(&mut self, line: &[u8]) {
        if self.preview.is_full() {
            return;
        }
        let line = line.trim_ascii();
        if line.is_empty() {
            return;
        }
        if let Ok(record) = serde_json::from_slice::<Value>(line) {
            if let Some(fragment) = (self.extract)(&record) {
                self.preview.push(fragment);
            }
        }
    }
}
