//! WebSocket Extension Framework (RFC 6455 Section 9).
//!
//! Negotiation is split between two capabilities:
//!
//! - [`ExtensionBuilder`]: immutable configuration shared by every connection.
//!   It matches offers (server) or responses (client) and builds a fresh
//!   runtime extension for each successful negotiation.
//! - [`Extension`]: per-connection state that transforms frames in both
//!   directions until it is shut down.
//!
//! # Example
//!
//! ```rust,ignore
//! use rsws_ext::extensions::{server_negotiate, ExtensionBuilder, ExtensionPipeline, InboundOrder};
//! use rsws_ext::extensions::deflate::{DeflateConfig, DeflateExtensionBuilder};
//!
//! let builders: Vec<Box<dyn ExtensionBuilder>> =
//!     vec![Box::new(DeflateExtensionBuilder::new(DeflateConfig::default())?)];
//!
//! let result = server_negotiate(&builders, request.extension_headers())?;
//! if !result.response_header.is_empty() {
//!     response.insert("Sec-WebSocket-Extensions", &result.response_header);
//! }
//! let mut pipeline = ExtensionPipeline::new(result.extensions, InboundOrder::Reverse);
//! ```

#[cfg(feature = "compression")]
pub mod deflate;
pub mod negotiation;
pub mod non_negotiated;
pub mod params;
pub mod pipeline;

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::Frame;

pub use negotiation::{NegotiationResult, client_extensions, client_request_header, server_negotiate};
pub use non_negotiated::{NonNegotiatedExtensionBuilder, non_negotiated};
pub use params::{ExtensionOffer, ParameterValue, SEC_WEBSOCKET_EXTENSIONS, parse_headers};
pub use pipeline::{ExtensionPipeline, InboundOrder};

/// RSV bit usage declaration for extensions.
///
/// Extensions must declare which RSV bits they use to prevent conflicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RsvBits {
    /// Extension uses RSV1 bit (e.g., permessage-deflate).
    pub rsv1: bool,
    /// Extension uses RSV2 bit.
    pub rsv2: bool,
    /// Extension uses RSV3 bit.
    pub rsv3: bool,
}

impl RsvBits {
    /// No RSV bits used.
    pub const NONE: Self = Self {
        rsv1: false,
        rsv2: false,
        rsv3: false,
    };

    /// RSV1 only (used by permessage-deflate).
    pub const RSV1: Self = Self {
        rsv1: true,
        rsv2: false,
        rsv3: false,
    };

    /// Check if any bits conflict with another RsvBits declaration.
    #[must_use]
    pub const fn conflicts_with(&self, other: &RsvBits) -> bool {
        (self.rsv1 && other.rsv1) || (self.rsv2 && other.rsv2) || (self.rsv3 && other.rsv3)
    }

    /// Union of both declarations.
    #[must_use]
    pub const fn union(self, other: RsvBits) -> Self {
        Self {
            rsv1: self.rsv1 || other.rsv1,
            rsv2: self.rsv2 || other.rsv2,
            rsv3: self.rsv3 || other.rsv3,
        }
    }

    /// Whether every RSV bit set on `frame` is covered by this declaration.
    #[must_use]
    pub const fn covers(&self, frame: &Frame) -> bool {
        (!frame.rsv1 || self.rsv1) && (!frame.rsv2 || self.rsv2) && (!frame.rsv3 || self.rsv3)
    }
}

/// Runtime WebSocket extension, one instance per connection.
///
/// The frame hooks are suspension points: a connection drives its own
/// extensions from its own task, frames in strict arrival order per
/// direction. Compression contexts are order dependent, so frames must never
/// be processed concurrently or out of order.
///
/// # Example Implementation
///
/// ```rust,ignore
/// struct NoOpExtension;
///
/// #[async_trait]
/// impl Extension for NoOpExtension {
///     fn name(&self) -> &str { "x-noop" }
///
///     async fn process_received_frame(&mut self, frame: Frame) -> Result<Frame> {
///         Ok(frame)
///     }
///
///     async fn process_frame_to_send(&mut self, frame: Frame) -> Result<Frame> {
///         Ok(frame)
///     }
///
///     async fn shutdown(&mut self) {}
/// }
/// ```
#[async_trait]
pub trait Extension: Send {
    /// Extension token, as used in `Sec-WebSocket-Extensions`.
    fn name(&self) -> &str;

    /// Returns which RSV bits this extension uses.
    fn rsv_bits(&self) -> RsvBits {
        RsvBits::NONE
    }

    /// Transform a frame after receiving it.
    ///
    /// Should clear the RSV bits it handles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolViolation`](crate::Error::ProtocolViolation)
    /// when the frame is inconsistent with the negotiated parameters. The
    /// connection must then be closed.
    async fn process_received_frame(&mut self, frame: Frame) -> Result<Frame>;

    /// Transform a frame before sending it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extension`](crate::Error::Extension) if the
    /// transformation fails.
    async fn process_frame_to_send(&mut self, frame: Frame) -> Result<Frame>;

    /// Release per-connection resources. Called exactly once at teardown;
    /// the extension must not be used afterwards.
    async fn shutdown(&mut self);
}

/// A successful server-side match produced by an [`ExtensionBuilder`].
pub struct ServerMatch {
    /// Index of the satisfied offer within the candidates passed to
    /// [`ExtensionBuilder::server_response`].
    pub offer_index: usize,
    /// Response fragment (`name;param;...`), or `None` to emit nothing.
    pub response: Option<String>,
    /// Runtime extension for this connection.
    pub extension: Box<dyn Extension>,
}

impl std::fmt::Debug for ServerMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerMatch")
            .field("offer_index", &self.offer_index)
            .field("response", &self.response)
            .field("extension", &self.extension.name())
            .finish()
    }
}

/// Negotiation-time capability of an extension.
///
/// Builders carry configuration only and are shared read-only between
/// connections. Two builders with different configuration may share a name,
/// but a registry may not contain both.
pub trait ExtensionBuilder: Send + Sync {
    /// Extension token used to match header entries.
    fn name(&self) -> &str;

    /// Whether this builder takes part in header negotiation.
    ///
    /// Non-negotiated builders are never matched against header content.
    fn is_negotiated(&self) -> bool {
        true
    }

    /// This builder's entry in the client's `Sec-WebSocket-Extensions`
    /// request, or `None` to offer nothing.
    fn client_request_header(&self) -> Option<String>;

    /// Server side: pick the first satisfiable offer among `offers` (all
    /// carrying this builder's name, in header order), build its response
    /// fragment and runtime extension.
    ///
    /// # Errors
    ///
    /// [`Error::Resource`](crate::Error::Resource) when the runtime extension
    /// cannot be allocated; the engine then negotiates nothing for this
    /// builder.
    fn server_response(&self, offers: &[&ExtensionOffer]) -> Result<Option<ServerMatch>>;

    /// Client side: accept the server's chosen parameters for this name
    /// (`None` if the server left it out) and build the runtime extension,
    /// or reject by returning `Ok(None)`.
    ///
    /// # Errors
    ///
    /// [`Error::Resource`](crate::Error::Resource) when the runtime extension
    /// cannot be allocated.
    fn client_extension(&self, response: Option<&ExtensionOffer>)
    -> Result<Option<Box<dyn Extension>>>;
}

impl std::fmt::Debug for dyn ExtensionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionBuilder")
            .field("name", &self.name())
            .field("negotiated", &self.is_negotiated())
            .finish()
    }
}

impl std::fmt::Debug for dyn Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extension")
            .field("name", &self.name())
            .field("rsv_bits", &self.rsv_bits())
            .finish()
    }
}
