//! Server-side and client-side extension negotiation drivers.
//!
//! Both sides dispatch purely through [`ExtensionBuilder`]; the engine never
//! looks at concrete extension types.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::extensions::params::{ExtensionOffer, parse_headers};
use crate::extensions::{Extension, ExtensionBuilder, RsvBits};

/// Outcome of server-side negotiation.
#[derive(Debug, Default)]
pub struct NegotiationResult {
    /// Value for the response `Sec-WebSocket-Extensions` header. Empty when
    /// nothing was negotiated, in which case the header is omitted.
    pub response_header: String,
    /// Active extensions in server preference order, which is also the
    /// outbound application order.
    pub extensions: Vec<Box<dyn Extension>>,
}

/// Run server-side negotiation against the client's request headers.
///
/// Builders are consulted in order; that order is the server's preference
/// and the order of the returned extensions. Offers naming no configured
/// builder are dropped silently.
///
/// # Errors
///
/// Returns [`Error::Negotiation`] if two builders share a name or two
/// negotiated extensions claim the same RSV bit, and passes on any builder
/// error other than [`Error::Resource`]. Extensions built before the error
/// are dropped without [`Extension::shutdown`]; a warning names them.
pub fn server_negotiate<I, S>(
    builders: &[Box<dyn ExtensionBuilder>],
    request_headers: I,
) -> Result<NegotiationResult>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    check_unique_names(builders)?;

    let mut pool = parse_headers(request_headers);
    let mut fragments: Vec<String> = Vec::new();
    let mut extensions: Vec<Box<dyn Extension>> = Vec::new();
    let mut claimed = RsvBits::NONE;

    for builder in builders {
        let positions: Vec<usize> = if builder.is_negotiated() {
            pool.iter()
                .enumerate()
                .filter(|(_, offer)| offer.name == builder.name())
                .map(|(idx, _)| idx)
                .collect()
        } else {
            Vec::new()
        };
        let candidates: Vec<&ExtensionOffer> = positions.iter().map(|&idx| &pool[idx]).collect();

        let matched = match builder.server_response(&candidates) {
            Ok(Some(matched)) => matched,
            Ok(None) => {
                debug!(extension = builder.name(), offers = candidates.len(), "no acceptable offer");
                continue;
            }
            Err(Error::Resource(reason)) => {
                warn!(extension = builder.name(), %reason, "extension unavailable, not negotiated");
                continue;
            }
            Err(e) => return Err(abandon(extensions, e)),
        };

        if builder.is_negotiated() {
            let Some(&pool_idx) = positions.get(matched.offer_index) else {
                let error = Error::Negotiation(format!(
                    "Extension '{}' matched offer {} of {}",
                    builder.name(),
                    matched.offer_index,
                    positions.len()
                ));
                extensions.push(matched.extension);
                return Err(abandon(extensions, error));
            };
            pool.remove(pool_idx);
        }

        if let Err(e) = claim(&mut claimed, matched.extension.as_ref()) {
            extensions.push(matched.extension);
            return Err(abandon(extensions, e));
        }
        debug!(extension = builder.name(), response = ?matched.response, "extension enabled");
        fragments.extend(matched.response);
        extensions.push(matched.extension);
    }

    for ignored in &pool {
        debug!(extension = %ignored.name, "ignoring unsupported extension offer");
    }

    Ok(NegotiationResult {
        response_header: fragments.join(","),
        extensions,
    })
}

/// Build the client's runtime extensions from the server's response headers.
///
/// Each builder sees the first response entry carrying its name, or `None`
/// if the server did not accept it. Builders that reject produce nothing.
///
/// # Errors
///
/// Returns [`Error::Negotiation`] if two builders share a name or two
/// accepted extensions claim the same RSV bit, and passes on any builder
/// error other than [`Error::Resource`]. Extensions built before the error
/// are dropped without [`Extension::shutdown`]; a warning names them.
pub fn client_extensions<I, S>(
    builders: &[Box<dyn ExtensionBuilder>],
    response_headers: I,
) -> Result<Vec<Box<dyn Extension>>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    check_unique_names(builders)?;

    let responses = parse_headers(response_headers);
    let mut extensions: Vec<Box<dyn Extension>> = Vec::new();
    let mut claimed = RsvBits::NONE;

    for builder in builders {
        let response = if builder.is_negotiated() {
            responses.iter().find(|r| r.name == builder.name())
        } else {
            None
        };

        match builder.client_extension(response) {
            Ok(Some(extension)) => {
                if let Err(e) = claim(&mut claimed, extension.as_ref()) {
                    extensions.push(extension);
                    return Err(abandon(extensions, e));
                }
                debug!(extension = builder.name(), "client extension enabled");
                extensions.push(extension);
            }
            Ok(None) => {
                debug!(extension = builder.name(), accepted = response.is_some(), "client extension not enabled");
            }
            Err(Error::Resource(reason)) => {
                warn!(extension = builder.name(), %reason, "extension unavailable, rejected");
            }
            Err(e) => return Err(abandon(extensions, e)),
        }
    }

    for unknown in responses
        .iter()
        .filter(|r| !builders.iter().any(|b| b.is_negotiated() && b.name() == r.name))
    {
        debug!(extension = %unknown.name, "ignoring response for extension that was not offered");
    }

    Ok(extensions)
}

/// Value of the client's `Sec-WebSocket-Extensions` request header.
///
/// Empty when no builder offers anything.
pub fn client_request_header(builders: &[Box<dyn ExtensionBuilder>]) -> String {
    builders
        .iter()
        .filter_map(|b| b.client_request_header())
        .collect::<Vec<_>>()
        .join(",")
}

fn check_unique_names(builders: &[Box<dyn ExtensionBuilder>]) -> Result<()> {
    let mut seen = HashSet::new();
    for builder in builders {
        if !seen.insert(builder.name()) {
            return Err(Error::Negotiation(format!(
                "Duplicate extension builder '{}'",
                builder.name()
            )));
        }
    }
    Ok(())
}

/// Log extensions discarded by a failed negotiation and hand back the error.
///
/// Negotiation is synchronous, so their async `shutdown` cannot run here.
fn abandon(extensions: Vec<Box<dyn Extension>>, error: Error) -> Error {
    if !extensions.is_empty() {
        let names: Vec<&str> = extensions.iter().map(|e| e.name()).collect();
        warn!(extensions = ?names, %error, "negotiation failed, built extensions dropped without shutdown");
    }
    error
}

fn claim(claimed: &mut RsvBits, extension: &dyn Extension) -> Result<()> {
    let rsv = extension.rsv_bits();
    if claimed.conflicts_with(&rsv) {
        return Err(Error::Negotiation(format!(
            "Extension '{}' RSV bits conflict with existing extensions",
            extension.name()
        )));
    }
    *claimed = claimed.union(rsv);
    Ok(())
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::extensions::ServerMatch;
    use crate::extensions::testing::{EchoBuilder, RecordingExtension};

    /// Accepts only offers carrying `level=<n>` with `n <= max_level`.
    struct LevelBuilder {
        max_level: u32,
    }

    impl ExtensionBuilder for LevelBuilder {
        fn name(&self) -> &str {
            "x-level"
        }

        fn client_request_header(&self) -> Option<String> {
            Some(format!("x-level;level={}", self.max_level))
        }

        fn server_response(&self, offers: &[&ExtensionOffer]) -> Result<Option<ServerMatch>> {
            let accepted = offers.iter().position(|offer| {
                offer
                    .get("level")
                    .and_then(|v| v.as_str())
                    .and_then(|v| v.parse::<u32>().ok())
                    .is_some_and(|level| level <= self.max_level)
            });
            Ok(accepted.map(|offer_index| ServerMatch {
                offer_index,
                response: Some(offers[offer_index].to_string()),
                extension: Box::new(RecordingExtension::new("x-level")),
            }))
        }

        fn client_extension(
            &self,
            response: Option<&ExtensionOffer>,
        ) -> Result<Option<Box<dyn Extension>>> {
            Ok(response.map(|_| Box::new(RecordingExtension::new("x-level")) as Box<dyn Extension>))
        }
    }

    /// Always fails to allocate its runtime state.
    struct ExhaustedBuilder;

    impl ExtensionBuilder for ExhaustedBuilder {
        fn name(&self) -> &str {
            "x-exhausted"
        }

        fn client_request_header(&self) -> Option<String> {
            Some("x-exhausted".into())
        }

        fn server_response(&self, _offers: &[&ExtensionOffer]) -> Result<Option<ServerMatch>> {
            Err(Error::Resource("no codec memory".into()))
        }

        fn client_extension(
            &self,
            _response: Option<&ExtensionOffer>,
        ) -> Result<Option<Box<dyn Extension>>> {
            Err(Error::Resource("no codec memory".into()))
        }
    }

    fn registry(builders: Vec<Box<dyn ExtensionBuilder>>) -> Vec<Box<dyn ExtensionBuilder>> {
        builders
    }

    fn names(extensions: &[Box<dyn Extension>]) -> Vec<&str> {
        extensions.iter().map(|e| e.name()).collect()
    }

    #[test]
    fn test_server_negotiate_in_builder_order() {
        let builders = registry(vec![
            Box::new(EchoBuilder::new("ext2")),
            Box::new(EchoBuilder::new("ext1")),
        ]);

        let result = server_negotiate(&builders, ["ext1;a=1, unknown", "ext2;b"]).unwrap();
        assert_eq!(result.response_header, "ext2;b,ext1;a=1");
        assert_eq!(names(&result.extensions), vec!["ext2", "ext1"]);
    }

    #[test]
    fn test_server_negotiate_unknown_only() {
        let builders = registry(vec![Box::new(EchoBuilder::new("known"))]);

        let result = server_negotiate(&builders, ["unknown;x=1"]).unwrap();
        assert!(result.response_header.is_empty());
        assert!(result.extensions.is_empty());
    }

    #[test]
    fn test_server_negotiate_no_headers() {
        let builders = registry(vec![Box::new(EchoBuilder::new("known"))]);
        let result = server_negotiate(&builders, Vec::<String>::new()).unwrap();
        assert!(result.response_header.is_empty());
        assert!(result.extensions.is_empty());
    }

    #[test]
    fn test_server_negotiate_skips_unsatisfiable_offer() {
        let builders = registry(vec![Box::new(LevelBuilder { max_level: 5 })]);

        let result = server_negotiate(&builders, ["x-level;level=9, x-level;level=3"]).unwrap();
        assert_eq!(result.response_header, "x-level;level=3");
        assert_eq!(result.extensions.len(), 1);

        let rejected = server_negotiate(&builders, ["x-level;level=9"]).unwrap();
        assert!(rejected.response_header.is_empty());
        assert!(rejected.extensions.is_empty());
    }

    #[test]
    fn test_duplicate_builder_names_rejected() {
        let builders = registry(vec![
            Box::new(EchoBuilder::new("dup")),
            Box::new(EchoBuilder::new("dup")),
        ]);

        assert!(matches!(
            server_negotiate(&builders, ["dup"]),
            Err(Error::Negotiation(_))
        ));
        assert!(matches!(
            client_extensions(&builders, ["dup"]),
            Err(Error::Negotiation(_))
        ));
    }

    #[test]
    #[traced_test]
    fn test_failed_negotiation_reports_dropped_extensions() {
        let mut first = EchoBuilder::new("ext1");
        first.rsv_bits = RsvBits::RSV1;
        let first_shutdowns = first.shutdowns.clone();
        let mut second = EchoBuilder::new("ext2");
        second.rsv_bits = RsvBits::RSV1;
        let builders = registry(vec![Box::new(first), Box::new(second)]);

        assert!(server_negotiate(&builders, ["ext1, ext2"]).is_err());
        assert!(client_extensions(&builders, ["ext1, ext2"]).is_err());

        assert_eq!(first_shutdowns.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(logs_contain("built extensions dropped without shutdown"));
        assert!(logs_contain("ext1"));
    }

    #[test]
    fn test_rsv_conflict_rejected() {
        let mut first = EchoBuilder::new("ext1");
        first.rsv_bits = RsvBits::RSV1;
        let mut second = EchoBuilder::new("ext2");
        second.rsv_bits = RsvBits::RSV1;
        let builders = registry(vec![Box::new(first), Box::new(second)]);

        let result = server_negotiate(&builders, ["ext1, ext2"]);
        assert!(matches!(result, Err(Error::Negotiation(_))));

        // Only one of them negotiated: no conflict.
        let result = server_negotiate(&builders, ["ext2"]).unwrap();
        assert_eq!(result.extensions.len(), 1);
    }

    #[test]
    #[traced_test]
    fn test_resource_error_degrades_to_no_match() {
        let builders = registry(vec![
            Box::new(ExhaustedBuilder),
            Box::new(EchoBuilder::new("ext1")),
        ]);

        let result = server_negotiate(&builders, ["x-exhausted, ext1"]).unwrap();
        assert_eq!(result.response_header, "ext1");
        assert_eq!(names(&result.extensions), vec!["ext1"]);
        assert!(logs_contain("extension unavailable"));

        let client = client_extensions(&builders, ["x-exhausted, ext1"]).unwrap();
        assert_eq!(names(&client), vec!["ext1"]);
    }

    #[test]
    fn test_client_extensions_match_by_name() {
        let builders = registry(vec![
            Box::new(EchoBuilder::new("ext1")),
            Box::new(EchoBuilder::new("ext2")),
        ]);

        let extensions = client_extensions(&builders, ["ext2;x", "other"]).unwrap();
        assert_eq!(names(&extensions), vec!["ext2"]);

        let none = client_extensions(&builders, Vec::<&str>::new()).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_client_request_header() {
        let builders = registry(vec![
            Box::new(EchoBuilder::new("ext1")),
            Box::new(LevelBuilder { max_level: 4 }),
        ]);
        assert_eq!(client_request_header(&builders), "ext1,x-level;level=4");
        assert_eq!(client_request_header(&[]), "");
    }

    #[test]
    fn test_full_negotiation_flow() {
        let client_builders = registry(vec![Box::new(LevelBuilder { max_level: 2 })]);
        let server_builders = registry(vec![Box::new(LevelBuilder { max_level: 7 })]);

        let offer = client_request_header(&client_builders);
        let result = server_negotiate(&server_builders, [offer.as_str()]).unwrap();
        assert_eq!(result.response_header, "x-level;level=2");

        let client = client_extensions(&client_builders, [result.response_header.as_str()]).unwrap();
        assert_eq!(names(&client), vec!["x-level"]);
    }
}
