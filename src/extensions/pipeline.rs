//! Per-connection chain of negotiated extensions.

use tracing::warn;

use crate::error::{Error, Result};
use crate::extensions::{Extension, RsvBits};
use crate::protocol::Frame;

/// Order in which received frames pass through the extensions.
///
/// Outbound frames always go through the extensions in negotiated order.
/// RFC 6455 leaves the inbound order to the transport; it is an explicit
/// choice here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InboundOrder {
    /// Undo the outbound transforms: last extension first.
    #[default]
    Reverse,
    /// Same order as outbound.
    Forward,
}

/// The active extensions of one connection.
///
/// Frames must be fed in strict arrival order per direction. Call
/// [`shutdown`](Self::shutdown) on every teardown path, including errors.
pub struct ExtensionPipeline {
    extensions: Vec<Box<dyn Extension>>,
    inbound_order: InboundOrder,
    rsv_bits: RsvBits,
}

impl ExtensionPipeline {
    /// Build a pipeline from negotiated extensions, in negotiated order.
    pub fn new(extensions: Vec<Box<dyn Extension>>, inbound_order: InboundOrder) -> Self {
        let rsv_bits = extensions
            .iter()
            .fold(RsvBits::NONE, |bits, ext| bits.union(ext.rsv_bits()));
        Self {
            extensions,
            inbound_order,
            rsv_bits,
        }
    }

    /// Number of active extensions.
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Whether no extension is active.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Names of the active extensions, in negotiated order.
    pub fn names(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }

    /// RSV bits claimed by the active extensions.
    pub fn rsv_bits(&self) -> RsvBits {
        self.rsv_bits
    }

    /// Pass an outgoing frame through every extension, in negotiated order.
    ///
    /// # Errors
    ///
    /// Returns the first extension error.
    pub async fn process_frame_to_send(&mut self, mut frame: Frame) -> Result<Frame> {
        for ext in &mut self.extensions {
            frame = ext.process_frame_to_send(frame).await?;
        }
        Ok(frame)
    }

    /// Pass a received frame through every extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReservedBitsSet`] if the frame carries an RSV bit no
    /// active extension claims, or the first extension error. Both are
    /// connection-fatal.
    pub async fn process_received_frame(&mut self, mut frame: Frame) -> Result<Frame> {
        if !self.rsv_bits.covers(&frame) {
            return Err(Error::ReservedBitsSet);
        }
        match self.inbound_order {
            InboundOrder::Reverse => {
                for ext in self.extensions.iter_mut().rev() {
                    frame = ext.process_received_frame(frame).await?;
                }
            }
            InboundOrder::Forward => {
                for ext in &mut self.extensions {
                    frame = ext.process_received_frame(frame).await?;
                }
            }
        }
        Ok(frame)
    }

    /// Shut every extension down once and empty the pipeline.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&mut self) {
        for mut ext in self.extensions.drain(..) {
            ext.shutdown().await;
        }
        self.rsv_bits = RsvBits::NONE;
    }
}

impl Drop for ExtensionPipeline {
    fn drop(&mut self) {
        if !self.extensions.is_empty() {
            warn!(extensions = ?self.names(), "extension pipeline dropped without shutdown");
        }
    }
}

impl std::fmt::Debug for ExtensionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionPipeline")
            .field("extensions", &self.names())
            .field("inbound_order", &self.inbound_order)
            .field("rsv_bits", &self.rsv_bits)
            .finish()
    }
}
