//! Streaming raw-deflate contexts for permessage-deflate (RFC 7692 Section 7.2).
//!
//! Each message is sync-flushed; the trailing `00 00 ff ff` of the last
//! frame is dropped on send and restored on receive.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use super::MAX_WINDOW_BITS;
use crate::error::{Error, Result};

pub(crate) const DEFLATE_TRAILER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Smallest window zlib accepts for raw deflate streams.
pub(crate) const CODEC_MIN_WINDOW_BITS: u8 = 9;

const CHUNK: usize = 1024;

/// Outbound compression context.
pub(crate) struct Compressor {
    inner: Compress,
    no_context_takeover: bool,
}

impl Compressor {
    /// # Errors
    ///
    /// [`Error::Resource`] if the codec cannot compress with `window_bits`.
    pub(crate) fn new(level: u32, window_bits: u8, no_context_takeover: bool) -> Result<Self> {
        if !(CODEC_MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&window_bits) {
            return Err(Error::Resource(format!(
                "deflate codec cannot compress with a {}-bit window",
                window_bits
            )));
        }
        Ok(Self {
            inner: Compress::new_with_window_bits(Compression::new(level), false, window_bits),
            no_context_takeover,
        })
    }

    /// Compress one frame's payload.
    ///
    /// `end_of_message` strips the sync trailer and applies no-context-takeover.
    pub(crate) fn compress(&mut self, input: &[u8], end_of_message: bool) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() / 2 + CHUNK);
        let start = self.inner.total_in();

        loop {
            if output.len() == output.capacity() {
                output.reserve(CHUNK);
            }
            let consumed = (self.inner.total_in() - start) as usize;
            self.inner
                .compress_vec(&input[consumed..], &mut output, FlushCompress::Sync)
                .map_err(|e| Error::Extension(format!("Compression failed: {}", e)))?;

            // Sync flush is complete once zlib stops short of filling the buffer.
            let consumed = (self.inner.total_in() - start) as usize;
            if consumed == input.len() && output.len() < output.capacity() {
                break;
            }
        }

        if end_of_message {
            if output.ends_with(&DEFLATE_TRAILER) {
                output.truncate(output.len() - DEFLATE_TRAILER.len());
            }
            if output.is_empty() {
                // An empty stored block; a bare trailer would not decode.
                output.push(0x00);
            }
            if self.no_context_takeover {
                self.inner.reset();
            }
        }

        Ok(output)
    }
}

/// Inbound decompression context.
pub(crate) struct Decompressor {
    inner: Decompress,
    no_context_takeover: bool,
    max_output: usize,
}

impl Decompressor {
    /// Windows below the codec minimum are widened: a larger window always
    /// decodes a stream produced with a smaller one.
    ///
    /// # Errors
    ///
    /// [`Error::Resource`] if `window_bits` is above the deflate maximum.
    pub(crate) fn new(window_bits: u8, no_context_takeover: bool, max_output: usize) -> Result<Self> {
        if window_bits > MAX_WINDOW_BITS {
            return Err(Error::Resource(format!(
                "deflate codec cannot decompress with a {}-bit window",
                window_bits
            )));
        }
        let window_bits = window_bits.max(CODEC_MIN_WINDOW_BITS);
        Ok(Self {
            inner: Decompress::new_with_window_bits(false, window_bits),
            no_context_takeover,
            max_output,
        })
    }

    /// Decompress one frame's payload.
    ///
    /// # Errors
    ///
    /// [`Error::ProtocolViolation`] for a corrupt stream and
    /// [`Error::FrameTooLarge`] when the output exceeds the limit.
    pub(crate) fn decompress(&mut self, input: &[u8], end_of_message: bool) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len().saturating_mul(2).clamp(CHUNK, self.max_output.max(CHUNK)));

        let stream_ended = self.inflate(input, &mut output)?;
        if end_of_message {
            if !stream_ended {
                self.inflate(&DEFLATE_TRAILER, &mut output)?;
            }
            if self.no_context_takeover {
                self.inner.reset(false);
            }
        }

        Ok(output)
    }

    /// Returns true if the peer closed the deflate stream with a final block.
    fn inflate(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<bool> {
        let start = self.inner.total_in();

        loop {
            if output.len() == output.capacity() {
                output.reserve(CHUNK);
            }
            let consumed_before = (self.inner.total_in() - start) as usize;
            let produced_before = output.len();

            let status = self
                .inner
                .decompress_vec(&input[consumed_before..], output, FlushDecompress::Sync)
                .map_err(|e| Error::ProtocolViolation(format!("Decompression failed: {}", e)))?;

            if output.len() > self.max_output {
                return Err(Error::FrameTooLarge {
                    size: output.len(),
                    max: self.max_output,
                });
            }

            let consumed = (self.inner.total_in() - start) as usize;
            match status {
                Status::StreamEnd => {
                    // BFINAL block: the next message starts a new stream.
                    self.inner.reset(false);
                    return Ok(true);
                }
                Status::Ok | Status::BufError => {
                    if consumed == input.len() && output.len() < output.capacity() {
                        return Ok(false);
                    }
                    let stalled = consumed == consumed_before && output.len() == produced_before;
                    if stalled && output.len() < output.capacity() {
                        return Err(Error::ProtocolViolation(
                            "Decompression made no progress".to_string(),
                        ));
                    }
                }
            }
        }
    }
}
