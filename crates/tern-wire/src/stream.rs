//! Byte and record stream types

use std::pin::Pin;

use async_stream::stream;
use futures::StreamExt;
use tokio_stream::Stream;

use crate::{decoder::RecordDecoder, error::Result, types::Record};

/// Raw body chunks as they come off the network
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Decoded records, ending when the body ends or after the first error
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<Record>> + Send>>;

/// Carries an incomplete UTF-8 sequence over to the next chunk.
#[derive(Debug, Default)]
pub struct Utf8Buffer {
    pending: Vec<u8>,
}

impl Utf8Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return all text that is complete so far.
    ///
    /// Invalid sequences are replaced with U+FFFD; a truncated sequence at
    /// the end is held back until more bytes arrive.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let keep = incomplete_suffix_len(&self.pending);
        let tail = self.pending.split_off(self.pending.len() - keep);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        text
    }

    /// Flush whatever is left, lossily
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(_) => return 0,
            Err(e) => match e.error_len() {
                None => return rest.len() - e.valid_up_to(),
                Some(len) => rest = &rest[e.valid_up_to() + len..],
            },
        }
    }
}

/// Turn a body stream into a record stream using the given decoder.
///
/// A transport error is forwarded once and ends the stream. Leftovers
/// that never form a record are dropped when the body ends.
pub fn decode_records(mut source: ByteStream, mut decoder: Box<dyn RecordDecoder>) -> RecordStream {
    Box::pin(stream! {
        let mut text = Utf8Buffer::new();
        while let Some(chunk) = source.next().await {
            match chunk {
                Ok(bytes) => {
                    let fragment = text.push(&bytes);
                    for record in decoder.push(&fragment) {
                        yield Ok(record);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        let rest = text.finish();
        if !rest.is_empty() {
            for record in decoder.push(&rest) {
                yield Ok(record);
            }
        }
        for record in decoder.finish() {
            yield Ok(record);
        }
    })
}
