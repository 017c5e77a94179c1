//! Extensions enabled by prior agreement instead of header negotiation.

use crate::error::Result;
use crate::extensions::{Extension, ExtensionBuilder, ExtensionOffer, ServerMatch};

type Factory = dyn Fn() -> Box<dyn Extension> + Send + Sync;

/// Builder that always enables its extension and never touches the header.
///
/// Both ends must agree on the extension out of band. The name is kept for
/// bookkeeping and is never matched against header content.
pub struct NonNegotiatedExtensionBuilder {
    name: String,
    factory: Box<Factory>,
}

impl NonNegotiatedExtensionBuilder {
    /// Wrap a factory producing a fresh extension per connection.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Extension> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Box::new(factory),
        }
    }
}

/// Shorthand for [`NonNegotiatedExtensionBuilder::new`] with a factory
/// returning a concrete extension type.
pub fn non_negotiated<E, F>(name: impl Into<String>, factory: F) -> NonNegotiatedExtensionBuilder
where
    E: Extension + 'static,
    F: Fn() -> E + Send + Sync + 'static,
{
    NonNegotiatedExtensionBuilder::new(name, move || Box::new(factory()) as Box<dyn Extension>)
}

impl ExtensionBuilder for NonNegotiatedExtensionBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_negotiated(&self) -> bool {
        false
    }

    fn client_request_header(&self) -> Option<String> {
        None
    }

    fn server_response(&self, _offers: &[&ExtensionOffer]) -> Result<Option<ServerMatch>> {
        Ok(Some(ServerMatch {
            offer_index: 0,
            response: None,
            extension: (self.factory)(),
        }))
    }

    fn client_extension(
        &self,
        _response: Option<&ExtensionOffer>,
    ) -> Result<Option<Box<dyn Extension>>> {
        Ok(Some((self.factory)()))
    }
}

impl std::fmt::Debug for NonNegotiatedExtensionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonNegotiatedExtensionBuilder")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
