//! Ordered reassembly of chunked content.
//!
//! Chunks arrive by index but not necessarily in index order (a later
//! poll can surface an earlier chunk once the remote marks it done).
//! [`ChunkAssembly`] stages out-of-order arrivals and consumes them the
//! moment the sequence becomes contiguous, so accumulated content is
//! always a prefix of the true content in index terms.
//!
//! Text content is plain concatenation. Structured content is
//! newline-delimited records; a chunk boundary may fall mid-record, so the
//! trailing partial line of each consumed chunk is carried forward and
//! prefixed onto the next. Lines that fail to parse are counted and
//! skipped; one bad record never poisons a reconstruction.

use crate::canvas::BlockKind;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Incremental builder for one resource's content.
#[derive(Debug)]
pub struct ChunkAssembly {
    mode: BlockKind,
    staged: BTreeMap<u32, String>,
    next_index: u32,
    text: String,
    records: Vec<Value>,
    partial: String,
    parse_errors: usize,
}

impl ChunkAssembly {
    #[must_use]
    pub fn new(mode: BlockKind) -> Self {
        Self {
            mode,
            staged: BTreeMap::new(),
            next_index: 0,
            text: String::new(),
            records: Vec::new(),
            partial: String::new(),
            parse_errors: 0,
        }
    }

    /// Stage one fetched chunk and consume as far as the sequence is
    /// contiguous. Duplicate and already-consumed indices are ignored.
    pub fn accept(&mut self, index: u32, body: String) {
        if index < self.next_index {
            warn!(index, "ignoring chunk behind the consumed prefix");
            return;
        }
        if self.staged.insert(index, body).is_some() {
            warn!(index, "replacing duplicate staged chunk");
        }
        while let Some(body) = self.staged.remove(&self.next_index) {
            self.consume(&body);
            self.next_index += 1;
        }
    }

    /// Drain whatever is still staged (gaps included) and flush the
    /// trailing partial line as a best-effort final record.
    ///
    /// Called exactly once, when the reconstruction stops. A gap at this
    /// point means the remote never finished a chunk; the data after it is
    /// kept rather than dropped.
    pub fn finalize(&mut self) {
        let staged = std::mem::take(&mut self.staged);
        for (index, body) in staged {
            warn!(index, "consuming staged chunk past a gap at finalize");
            self.consume(&body);
        }
        if !self.partial.trim().is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.parse_record(&line);
        } else {
            self.partial.clear();
        }
    }

    /// Current content in its display form.
    ///
    /// Text mode returns the concatenation so far; structured mode returns
    /// the accumulated records re-serialized as one JSON array.
    #[must_use]
    pub fn render(&self) -> String {
        match self.mode {
            BlockKind::Text => self.text.clone(),
            BlockKind::Structured => {
                serde_json::to_string(&Value::Array(self.records.clone())).unwrap_or_default()
            }
        }
    }

    /// Lines that failed structured parsing so far.
    #[must_use]
    pub fn parse_errors(&self) -> usize {
        self.parse_errors
    }

    /// Records accumulated so far (structured mode).
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    fn consume(&mut self, body: &str) {
        match self.mode {
            BlockKind::Text => self.text.push_str(body),
            BlockKind::Structured => self.consume_structured(body),
        }
    }

    fn consume_structured(&mut self, body: &str) {
        let combined = format!("{}{}", std::mem::take(&mut self.partial), body);
        let mut lines: Vec<&str> = combined.split('\n').collect();
        // The final segment is complete only if the chunk ended in '\n',
        // in which case it is empty anyway.
        self.partial = lines.pop().unwrap_or_default().to_string();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            self.parse_record(line);
        }
    }

    fn parse_record(&mut self, line: &str) {
        match serde_json::from_str::<Value>(line) {
            Ok(record) => self.records.push(record),
            Err(err) => {
                self.parse_errors += 1;
                warn!(error = %err, "skipping malformed structured record");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_chunks_concatenate_in_index_order() {
        let mut assembly = ChunkAssembly::new(BlockKind::Text);
        assembly.accept(1, " world".into());
        assert_eq!(assembly.render(), "", "gap holds consumption back");
        assembly.accept(0, "hello".into());
        assert_eq!(assembly.render(), "hello world");
    }

    #[test]
    fn records_split_across_chunks_reassemble() {
        let mut assembly = ChunkAssembly::new(BlockKind::Structured);
        assembly.accept(0, "{\"a\":1}\n{\"b\":".into());
        assembly.accept(1, "2}\n".into());
        assembly.finalize();
        assert_eq!(assembly.record_count(), 2);
        assert_eq!(assembly.parse_errors(), 0);
        let rendered: Value = serde_json::from_str(&assembly.render()).unwrap();
        assert_eq!(rendered, json!([{"a": 1}, {"b": 2}]));
    }

    #[test]
    fn malformed_lines_count_but_do_not_abort() {
        let mut assembly = ChunkAssembly::new(BlockKind::Structured);
        assembly.accept(0, "{\"ok\":1}\nnot json\n{\"ok\":2}\n".into());
        assert_eq!(assembly.record_count(), 2);
        assert_eq!(assembly.parse_errors(), 1);
    }

    #[test]
    fn finalize_flushes_trailing_partial_record() {
        let mut assembly = ChunkAssembly::new(BlockKind::Structured);
        assembly.accept(0, "{\"tail\":true}".into());
        assert_eq!(assembly.record_count(), 0, "no newline, still partial");
        assembly.finalize();
        assert_eq!(assembly.record_count(), 1);
    }

    #[test]
    fn duplicate_and_stale_chunks_are_ignored() {
        let mut assembly = ChunkAssembly::new(BlockKind::Text);
        assembly.accept(0, "a".into());
        assembly.accept(0, "A".into());
        assert_eq!(assembly.render(), "a");
    }

    #[test]
    fn finalize_keeps_data_past_a_gap() {
        let mut assembly = ChunkAssembly::new(BlockKind::Text);
        assembly.accept(0, "start ".into());
        assembly.accept(2, "end".into());
        assembly.finalize();
        assert_eq!(assembly.render(), "start end");
    }
}
