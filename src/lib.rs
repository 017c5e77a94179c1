//! # rsws-ext - WebSocket extension negotiation and permessage-deflate
//!
//! `rsws-ext` implements the extension layer of a WebSocket stack:
//!
//! - **Header parsing** of `Sec-WebSocket-Extensions` (RFC 6455 Section 9.1)
//! - **Negotiation engines** for both the server and the client side
//! - **Per-connection pipelines** that run negotiated extensions over frames
//! - **permessage-deflate** compression (RFC 7692), behind the
//!   `compression` feature
//!
//! Transport, handshake and frame wire encoding are left to the host stack.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rsws_ext::extensions::deflate::{DeflateConfig, DeflateExtensionBuilder};
//! use rsws_ext::{ExtensionBuilder, ExtensionPipeline, InboundOrder, server_negotiate};
//!
//! let builders: Vec<Box<dyn ExtensionBuilder>> =
//!     vec![Box::new(DeflateExtensionBuilder::new(DeflateConfig::default())?)];
//!
//! let negotiated = server_negotiate(&builders, ["permessage-deflate; client_max_window_bits"])?;
//! let mut pipeline = ExtensionPipeline::new(negotiated.extensions, InboundOrder::default());
//! let frame = pipeline.process_frame_to_send(Frame::text("hello")).await?;
//! pipeline.shutdown().await;
//! ```

pub mod error;
pub mod extensions;
pub mod protocol;
pub mod role;

pub use error::{Error, Result};
pub use extensions::{
    Extension, ExtensionBuilder, ExtensionOffer, ExtensionPipeline, InboundOrder,
    NegotiationResult, NonNegotiatedExtensionBuilder, ParameterValue, RsvBits,
    SEC_WEBSOCKET_EXTENSIONS, ServerMatch, client_extensions, client_request_header,
    non_negotiated, parse_headers, server_negotiate,
};
#[cfg(feature = "compression")]
pub use extensions::deflate::{DeflateConfig, DeflateExtension, DeflateExtensionBuilder};
pub use protocol::{Frame, OpCode};
pub use role::Role;
