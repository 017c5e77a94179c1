//! Per-connection permessage-deflate state.

use async_trait::async_trait;
use tracing::{debug, trace};

use super::codec::{Compressor, Decompressor};
use super::{DeflateConfig, PERMESSAGE_DEFLATE};
use crate::error::{Error, Result};
use crate::extensions::{Extension, RsvBits};
use crate::protocol::Frame;
use crate::role::Role;

/// Parameters agreed for one connection, seen from the local endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeflateParameters {
    /// Window used to compress outgoing messages.
    pub send_max_window_bits: u8,
    /// Reset the compression context after every outgoing message.
    pub send_no_context_takeover: bool,
    /// Window the peer compresses with.
    pub receive_max_window_bits: u8,
    /// Reset the decompression context after every incoming message.
    pub receive_no_context_takeover: bool,
}

/// Runtime permessage-deflate extension (RFC 7692).
///
/// Owns one compression and one decompression context. The first frame of a
/// compressed message carries RSV1; continuation frames of that message are
/// part of the same deflate stream.
pub struct DeflateExtension {
    role: Role,
    parameters: DeflateParameters,
    min_compress_size: usize,
    compressor: Option<Compressor>,
    decompressor: Option<Decompressor>,
    compressing_message: bool,
    decompressing_message: bool,
}

impl DeflateExtension {
    /// Allocate both codec contexts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resource`] if a context cannot be created for the
    /// requested window sizes.
    pub fn new(role: Role, parameters: DeflateParameters, config: &DeflateConfig) -> Result<Self> {
        let compressor = Compressor::new(
            config.compression_level,
            parameters.send_max_window_bits,
            parameters.send_no_context_takeover,
        )?;
        let decompressor = Decompressor::new(
            parameters.receive_max_window_bits,
            parameters.receive_no_context_takeover,
            config.max_decompressed_size,
        )?;
        debug!(%role, ?parameters, "permessage-deflate contexts allocated");

        Ok(Self {
            role,
            parameters,
            min_compress_size: config.min_compress_size,
            compressor: Some(compressor),
            decompressor: Some(decompressor),
            compressing_message: false,
            decompressing_message: false,
        })
    }

    /// Which side of the connection this extension runs on.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The negotiated parameters.
    pub fn parameters(&self) -> &DeflateParameters {
        &self.parameters
    }

    /// Whether [`shutdown`](Extension::shutdown) has released the contexts.
    pub fn is_shut_down(&self) -> bool {
        self.compressor.is_none() && self.decompressor.is_none()
    }

    fn should_compress(&mut self, frame: &Frame) -> bool {
        if frame.opcode.starts_message() {
            let single_frame_worth_it = !frame.payload().is_empty()
                && frame.payload().len() >= self.min_compress_size;
            let compress = !frame.rsv1 && (!frame.fin || single_frame_worth_it);
            self.compressing_message = compress && !frame.fin;
            compress
        } else {
            let compress = self.compressing_message;
            if frame.fin {
                self.compressing_message = false;
            }
            compress
        }
    }

    fn should_decompress(&mut self, frame: &Frame) -> Result<bool> {
        if frame.opcode.starts_message() {
            self.decompressing_message = frame.rsv1 && !frame.fin;
            return Ok(frame.rsv1);
        }
        if frame.rsv1 {
            return Err(Error::ProtocolViolation(
                "RSV1 set on continuation frame".to_string(),
            ));
        }
        let decompress = self.decompressing_message;
        if frame.fin {
            self.decompressing_message = false;
        }
        Ok(decompress)
    }
}

fn shut_down() -> Error {
    Error::Extension("permessage-deflate used after shutdown".to_string())
}

#[async_trait]
impl Extension for DeflateExtension {
    fn name(&self) -> &str {
        PERMESSAGE_DEFLATE
    }

    fn rsv_bits(&self) -> RsvBits {
        RsvBits::RSV1
    }

    async fn process_received_frame(&mut self, frame: Frame) -> Result<Frame> {
        if self.decompressor.is_none() {
            return Err(shut_down());
        }
        if frame.opcode.is_control() {
            if frame.rsv1 {
                return Err(Error::ProtocolViolation(
                    "RSV1 set on control frame".to_string(),
                ));
            }
            return Ok(frame);
        }
        if !self.should_decompress(&frame)? {
            return Ok(frame);
        }

        let decompressor = self.decompressor.as_mut().ok_or_else(shut_down)?;
        let inflated = decompressor.decompress(frame.payload(), frame.fin)?;
        trace!(
            opcode = %frame.opcode,
            compressed = frame.payload().len(),
            inflated = inflated.len(),
            "frame decompressed"
        );

        let mut frame = frame.with_payload(inflated);
        frame.rsv1 = false;
        Ok(frame)
    }

    async fn process_frame_to_send(&mut self, frame: Frame) -> Result<Frame> {
        if self.compressor.is_none() {
            return Err(shut_down());
        }
        if frame.opcode.is_control() || !self.should_compress(&frame) {
            return Ok(frame);
        }

        let compressor = self.compressor.as_mut().ok_or_else(shut_down)?;
        let compressed = compressor.compress(frame.payload(), frame.fin)?;
        trace!(
            opcode = %frame.opcode,
            original = frame.payload().len(),
            compressed = compressed.len(),
            "frame compressed"
        );

        let mut frame = frame.with_payload(compressed);
        frame.rsv1 = frame.opcode.starts_message();
        Ok(frame)
    }

    async fn shutdown(&mut self) {
        self.compressor = None;
        self.decompressor = None;
        debug!(role = %self.role, "permessage-deflate contexts released");
    }
}

impl std::fmt::Debug for DeflateExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeflateExtension")
            .field("role", &self.role)
            .field("parameters", &self.parameters)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
