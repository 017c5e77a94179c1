//! Permessage-deflate WebSocket compression extension (RFC 7692).

mod codec;
mod extension;

pub use extension::{DeflateExtension, DeflateParameters};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::extensions::{
    Extension, ExtensionBuilder, ExtensionOffer, ParameterValue, ServerMatch,
};
use crate::role::Role;

/// Extension token.
pub const PERMESSAGE_DEFLATE: &str = "permessage-deflate";

/// Smallest window size allowed by RFC 7692.
pub const MIN_WINDOW_BITS: u8 = 8;
/// Largest window size allowed by RFC 7692.
pub const MAX_WINDOW_BITS: u8 = 15;
/// Window used when none was negotiated.
pub const DEFAULT_WINDOW_BITS: u8 = 15;
/// Smallest window a [`DeflateConfig`] accepts.
///
/// zlib cannot produce a raw deflate stream with an 8-bit window, so a
/// configured 8 could be negotiated but never used.
pub const MIN_CONFIG_WINDOW_BITS: u8 = codec::CODEC_MIN_WINDOW_BITS;

const CLIENT_MAX_WINDOW_BITS: &str = "client_max_window_bits";
const SERVER_MAX_WINDOW_BITS: &str = "server_max_window_bits";
const CLIENT_NO_CONTEXT_TAKEOVER: &str = "client_no_context_takeover";
const SERVER_NO_CONTEXT_TAKEOVER: &str = "server_no_context_takeover";

/// Configuration of a permessage-deflate builder.
///
/// The same configuration serves both roles: on a server it shapes the
/// response to client offers, on a client it shapes the offer and bounds
/// what the server may choose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeflateConfig {
    /// Ask (client) or require (server) the client to reset its context
    /// after every message.
    pub client_no_context_takeover: bool,
    /// Ask (client) or promise (server) that the server resets its context
    /// after every message.
    pub server_no_context_takeover: bool,
    /// Largest client window, 9-15. Offered by clients; servers only echo
    /// values the client itself proposed.
    pub client_max_window_bits: Option<u8>,
    /// Largest server window, 9-15. Servers announce it unilaterally;
    /// clients offer it and reject larger responses.
    pub server_max_window_bits: Option<u8>,
    /// zlib compression level, 0-9.
    pub compression_level: u32,
    /// Single-frame messages shorter than this are sent uncompressed.
    pub min_compress_size: usize,
    /// Largest payload a single frame may inflate to.
    pub max_decompressed_size: usize,
}

impl Default for DeflateConfig {
    fn default() -> Self {
        Self {
            client_no_context_takeover: false,
            server_no_context_takeover: false,
            client_max_window_bits: None,
            server_max_window_bits: None,
            compression_level: 6,
            min_compress_size: 0,
            max_decompressed_size: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl DeflateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_no_context_takeover(mut self, value: bool) -> Self {
        self.client_no_context_takeover = value;
        self
    }

    pub fn server_no_context_takeover(mut self, value: bool) -> Self {
        self.server_no_context_takeover = value;
        self
    }

    pub fn client_max_window_bits(mut self, bits: u8) -> Result<Self> {
        check_window_bits(CLIENT_MAX_WINDOW_BITS, bits)?;
        self.client_max_window_bits = Some(bits);
        Ok(self)
    }

    pub fn server_max_window_bits(mut self, bits: u8) -> Result<Self> {
        check_window_bits(SERVER_MAX_WINDOW_BITS, bits)?;
        self.server_max_window_bits = Some(bits);
        Ok(self)
    }

    pub fn compression_level(mut self, level: u32) -> Result<Self> {
        if level > 9 {
            return Err(Error::InvalidExtension(format!(
                "compression_level must be 0-9, got {}",
                level
            )));
        }
        self.compression_level = level;
        Ok(self)
    }

    pub fn min_compress_size(mut self, size: usize) -> Self {
        self.min_compress_size = size;
        self
    }

    pub fn max_decompressed_size(mut self, size: usize) -> Self {
        self.max_decompressed_size = size;
        self
    }

    /// Check fields that may have been set directly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExtension`] for out-of-range window bits or
    /// compression level, or a zero decompression limit.
    pub fn validate(&self) -> Result<()> {
        if let Some(bits) = self.client_max_window_bits {
            check_window_bits(CLIENT_MAX_WINDOW_BITS, bits)?;
        }
        if let Some(bits) = self.server_max_window_bits {
            check_window_bits(SERVER_MAX_WINDOW_BITS, bits)?;
        }
        if self.compression_level > 9 {
            return Err(Error::InvalidExtension(format!(
                "compression_level must be 0-9, got {}",
                self.compression_level
            )));
        }
        if self.max_decompressed_size == 0 {
            return Err(Error::InvalidExtension(
                "max_decompressed_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_window_bits(name: &str, bits: u8) -> Result<()> {
    if bits == MIN_WINDOW_BITS {
        return Err(Error::InvalidExtension(format!(
            "{} of {} is not supported: zlib raw deflate needs at least {} bits",
            name, bits, MIN_CONFIG_WINDOW_BITS
        )));
    }
    if !(MIN_CONFIG_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&bits) {
        return Err(Error::InvalidExtension(format!(
            "{} must be {}-{}, got {}",
            name, MIN_CONFIG_WINDOW_BITS, MAX_WINDOW_BITS, bits
        )));
    }
    Ok(())
}

/// Window size carried by a parameter, if it is a number in range.
fn window_bits(value: &ParameterValue) -> Option<u8> {
    value
        .as_str()?
        .parse::<u8>()
        .ok()
        .filter(|bits| (MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(bits))
}

fn requested_window_bits(offer: &ExtensionOffer, key: &str) -> Option<u8> {
    offer.get(key).and_then(window_bits)
}

/// Negotiates permessage-deflate and builds [`DeflateExtension`]s.
#[derive(Debug, Clone, Default)]
pub struct DeflateExtensionBuilder {
    config: DeflateConfig,
}

impl DeflateExtensionBuilder {
    /// # Errors
    ///
    /// Returns [`Error::InvalidExtension`] if the configuration is invalid.
    pub fn new(config: DeflateConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DeflateConfig {
        &self.config
    }

    /// Server response fragment for one client offer.
    ///
    /// Fields always appear in the order `client_max_window_bits`,
    /// `client_no_context_takeover`, `server_no_context_takeover`,
    /// `server_max_window_bits`. A configured server window is lowered to
    /// the client's `server_max_window_bits` when that is smaller.
    pub fn server_response_header(&self, offer: &ExtensionOffer) -> String {
        let mut fields = vec![PERMESSAGE_DEFLATE.to_string()];
        if let Some(bits) = requested_window_bits(offer, CLIENT_MAX_WINDOW_BITS) {
            fields.push(format!("{CLIENT_MAX_WINDOW_BITS}={bits}"));
        }
        if self.config.client_no_context_takeover {
            fields.push(CLIENT_NO_CONTEXT_TAKEOVER.to_string());
        }
        if self.config.server_no_context_takeover {
            fields.push(SERVER_NO_CONTEXT_TAKEOVER.to_string());
        }
        if let Some(configured) = self.config.server_max_window_bits {
            let bits = requested_window_bits(offer, SERVER_MAX_WINDOW_BITS)
                .map_or(configured, |requested| configured.min(requested));
            fields.push(format!("{SERVER_MAX_WINDOW_BITS}={bits}"));
        }
        fields.join(";")
    }

    fn server_parameters(&self, offer: &ExtensionOffer) -> DeflateParameters {
        let configured = self.config.server_max_window_bits.unwrap_or(DEFAULT_WINDOW_BITS);
        let requested = requested_window_bits(offer, SERVER_MAX_WINDOW_BITS).unwrap_or(DEFAULT_WINDOW_BITS);
        DeflateParameters {
            send_max_window_bits: configured.min(requested),
            send_no_context_takeover: self.config.server_no_context_takeover
                || offer.contains(SERVER_NO_CONTEXT_TAKEOVER),
            receive_max_window_bits: requested_window_bits(offer, CLIENT_MAX_WINDOW_BITS)
                .unwrap_or(DEFAULT_WINDOW_BITS),
            receive_no_context_takeover: self.config.client_no_context_takeover
                || offer.contains(CLIENT_NO_CONTEXT_TAKEOVER),
        }
    }

    /// Client view of the server's response, or `None` if unacceptable.
    fn client_parameters(&self, response: &ExtensionOffer) -> Option<DeflateParameters> {
        let mut parameters = DeflateParameters {
            send_max_window_bits: self.config.client_max_window_bits.unwrap_or(DEFAULT_WINDOW_BITS),
            send_no_context_takeover: self.config.client_no_context_takeover,
            receive_max_window_bits: DEFAULT_WINDOW_BITS,
            receive_no_context_takeover: false,
        };

        for (key, value) in response.params() {
            match key {
                CLIENT_NO_CONTEXT_TAKEOVER => parameters.send_no_context_takeover = true,
                SERVER_NO_CONTEXT_TAKEOVER => parameters.receive_no_context_takeover = true,
                CLIENT_MAX_WINDOW_BITS => {
                    let bits = window_bits(value)?;
                    if self.config.client_max_window_bits.is_some_and(|max| bits > max) {
                        return None;
                    }
                    parameters.send_max_window_bits = bits;
                }
                SERVER_MAX_WINDOW_BITS => {
                    let bits = window_bits(value)?;
                    if self.config.server_max_window_bits.is_some_and(|max| bits > max) {
                        return None;
                    }
                    parameters.receive_max_window_bits = bits;
                }
                _ => return None,
            }
        }

        Some(parameters)
    }
}

impl ExtensionBuilder for DeflateExtensionBuilder {
    fn name(&self) -> &str {
        PERMESSAGE_DEFLATE
    }

    fn client_request_header(&self) -> Option<String> {
        let mut fields = vec![PERMESSAGE_DEFLATE.to_string()];
        match self.config.client_max_window_bits {
            Some(bits) => fields.push(format!("{CLIENT_MAX_WINDOW_BITS}={bits}")),
            None => fields.push(CLIENT_MAX_WINDOW_BITS.to_string()),
        }
        if self.config.client_no_context_takeover {
            fields.push(CLIENT_NO_CONTEXT_TAKEOVER.to_string());
        }
        if self.config.server_no_context_takeover {
            fields.push(SERVER_NO_CONTEXT_TAKEOVER.to_string());
        }
        if let Some(bits) = self.config.server_max_window_bits {
            fields.push(format!("{SERVER_MAX_WINDOW_BITS}={bits}"));
        }
        Some(fields.join(";"))
    }

    fn server_response(&self, offers: &[&ExtensionOffer]) -> Result<Option<ServerMatch>> {
        for (offer_index, offer) in offers.iter().enumerate() {
            let parameters = self.server_parameters(offer);
            match DeflateExtension::new(Role::Server, parameters, &self.config) {
                Ok(extension) => {
                    return Ok(Some(ServerMatch {
                        offer_index,
                        response: Some(self.server_response_header(offer)),
                        extension: Box::new(extension),
                    }));
                }
                Err(Error::Resource(reason)) => {
                    warn!(offer = %offer, %reason, "cannot serve permessage-deflate offer");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    fn client_extension(
        &self,
        response: Option<&ExtensionOffer>,
    ) -> Result<Option<Box<dyn Extension>>> {
        let Some(response) = response else {
            return Ok(None);
        };
        let Some(parameters) = self.client_parameters(response) else {
            debug!(response = %response, "rejecting permessage-deflate response");
            return Ok(None);
        };
        let extension = DeflateExtension::new(Role::Client, parameters, &self.config)?;
        Ok(Some(Box::new(extension)))
    }
}
