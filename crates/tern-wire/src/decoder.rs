//! Record framing for the response stream
//!
//! The backend writes JSON objects back to back. Network reads can split an
//! object anywhere, or deliver several objects in one read, so records are
//! reconstructed from a rolling buffer. The framing rule lives behind
//! [`RecordDecoder`] so the session layer does not depend on it.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::error::Category;

use crate::types::Record;

/// Boundary between two adjacent objects, optionally separated by whitespace.
static OBJECT_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\}\s*\{").expect("static regex"));

/// Incremental record decoder.
///
/// Implementations emit every record exactly once, in arrival order.
/// Malformed input is never an error: it is dropped.
pub trait RecordDecoder: Send {
    /// Append a fragment and return the records it completed.
    fn push(&mut self, fragment: &str) -> Vec<Record>;

    /// Flush at end of stream. Whatever cannot be parsed is discarded.
    fn finish(&mut self) -> Vec<Record>;

    /// Text retained for the next fragment
    fn buffered(&self) -> &str;
}

/// How records are delimited on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// Objects written back to back (`}{`)
    #[default]
    ObjectAdjacency,
    /// One object per line
    NewlineDelimited,
}

impl Framing {
    /// Build a fresh decoder for one stream
    pub fn decoder(self) -> Box<dyn RecordDecoder> {
        match self {
            Framing::ObjectAdjacency => Box::new(ObjectAdjacencyDecoder::new()),
            Framing::NewlineDelimited => Box::new(NewlineDelimitedDecoder::new()),
        }
    }
}

/// Outcome of trying to parse one candidate piece
enum Candidate {
    Record(Record),
    /// Ran out of input: may complete with more text
    Incomplete,
    /// Can never become a record, whatever follows
    Malformed,
}

fn parse_candidate(text: &str) -> Candidate {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value @ serde_json::Value::Object(_)) => match serde_json::from_value::<Record>(value) {
            Ok(record) => Candidate::Record(record),
            Err(e) => {
                tracing::trace!("Skipping record with unexpected shape: {}", e);
                Candidate::Malformed
            }
        },
        Ok(_) => Candidate::Malformed,
        Err(e) if e.classify() == Category::Eof => Candidate::Incomplete,
        Err(_) => Candidate::Malformed,
    }
}

/// Decoder for objects written back to back with no delimiter.
///
/// On every push the buffer is cut at each `}{` boundary. Starting from the
/// head, the shortest run of pieces that parses as one object is emitted;
/// an incomplete run is extended with the next piece (the boundary may sit
/// inside a string). JSON values are prefix-free, so a run can only parse
/// when it is exactly one whole object. A run that is malformed before the
/// boundary is dropped. The unparsed tail stays buffered.
#[derive(Debug, Default)]
pub struct ObjectAdjacencyDecoder {
    buffer: String,
}

impl ObjectAdjacencyDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordDecoder for ObjectAdjacencyDecoder {
    fn push(&mut self, fragment: &str) -> Vec<Record> {
        self.buffer.push_str(fragment);

        // (end of left piece, start of right piece) for every boundary
        let cuts: Vec<(usize, usize)> = OBJECT_BOUNDARY
            .find_iter(&self.buffer)
            .map(|m| (m.start() + 1, m.end() - 1))
            .collect();

        let mut records = Vec::new();
        let mut start = 0;
        for (left_end, right_start) in cuts {
            if left_end <= start {
                continue;
            }
            match parse_candidate(&self.buffer[start..left_end]) {
                Candidate::Record(record) => {
                    records.push(record);
                    start = right_start;
                }
                Candidate::Incomplete => {}
                Candidate::Malformed => {
                    tracing::trace!(
                        "Dropping malformed stream fragment ({} bytes)",
                        left_end - start
                    );
                    start = right_start;
                }
            }
        }

        let tail = &self.buffer[start..];
        if tail.trim().is_empty() {
            start = self.buffer.len();
        } else if let Candidate::Record(record) = parse_candidate(tail) {
            records.push(record);
            start = self.buffer.len();
        }

        self.buffer.drain(..start);
        records
    }

    fn finish(&mut self) -> Vec<Record> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            return vec![];
        }
        match parse_candidate(&rest) {
            Candidate::Record(record) => vec![record],
            _ => {
                tracing::debug!(
                    "Discarding {} bytes of incomplete data at end of stream",
                    rest.len()
                );
                vec![]
            }
        }
    }

    fn buffered(&self) -> &str {
        &self.buffer
    }
}

/// Decoder for newline-delimited JSON
#[derive(Debug, Default)]
pub struct NewlineDelimitedDecoder {
    buffer: String,
}

impl NewlineDelimitedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_line(line: &str, records: &mut Vec<Record>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match parse_candidate(line) {
            Candidate::Record(record) => records.push(record),
            _ => tracing::trace!("Dropping unparseable line ({} bytes)", line.len()),
        }
    }
}

impl RecordDecoder for NewlineDelimitedDecoder {
    fn push(&mut self, fragment: &str) -> Vec<Record> {
        self.buffer.push_str(fragment);
        let mut records = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            Self::parse_line(&line, &mut records);
        }
        records
    }

    fn finish(&mut self) -> Vec<Record> {
        let rest = std::mem::take(&mut self.buffer);
        let mut records = Vec::new();
        Self::parse_line(&rest, &mut records);
        records
    }

    fn buffered(&self) -> &str {
        &self.buffer
    }
}
