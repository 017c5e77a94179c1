//! `Sec-WebSocket-Extensions` header grammar (RFC 6455 Section 9.1).
//!
//! ```text
//! Sec-WebSocket-Extensions = extension-list
//! extension-list = 1#extension
//! extension = extension-token *( ";" extension-param )
//! extension-param = token [ "=" (token | quoted-string) ]
//! ```
//!
//! The parser here is permissive: it never fails. Tokens that do not fit the
//! grammar are kept as flags so builders can decide what to do with them.

use std::fmt;

/// Name of the header carrying extension offers and responses.
pub const SEC_WEBSOCKET_EXTENSIONS: &str = "Sec-WebSocket-Extensions";

/// Value of a single extension parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParameterValue {
    /// Bare directive with no value, e.g. `client_max_window_bits`.
    Flag,
    /// Keyed value, e.g. `server_max_window_bits=10`.
    Value(String),
}

impl ParameterValue {
    /// Create a keyed value.
    pub fn value(value: impl Into<String>) -> Self {
        ParameterValue::Value(value.into())
    }

    /// The string value, if this is not a bare flag.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::Flag => None,
            ParameterValue::Value(v) => Some(v),
        }
    }

    /// Whether this is a bare flag.
    #[must_use]
    pub const fn is_flag(&self) -> bool {
        matches!(self, ParameterValue::Flag)
    }
}

/// One extension entry from a `Sec-WebSocket-Extensions` header.
///
/// Used both for client offers and for the server's chosen parameters.
/// Parameter order follows the header; a repeated key keeps its first
/// position and takes the last value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtensionOffer {
    /// Extension token, e.g. `permessage-deflate`.
    pub name: String,
    params: Vec<(String, ParameterValue)>,
}

impl ExtensionOffer {
    /// Create an offer with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: ParameterValue) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or overwrite a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: ParameterValue) {
        let key = key.into();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.params.push((key, value)),
        }
    }

    /// Look up a parameter by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParameterValue> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whether a parameter is present, flag or keyed.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Parameters in header order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of parameters.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Parse a single extension entry (`name; key=value; flag`).
    ///
    /// Returns `None` when the name token is empty.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let mut tokens = s.split(';');
        let name = tokens.next()?.trim();
        if name.is_empty() {
            return None;
        }

        let mut offer = Self::new(name);
        for token in tokens.map(str::trim).filter(|t| !t.is_empty()) {
            let (key, value) = parse_param(token);
            offer.insert(key, value);
        }
        Some(offer)
    }

    /// Parse one header value: a comma-separated list of entries.
    #[must_use]
    pub fn parse_header(header: &str) -> Vec<Self> {
        header.split(',').filter_map(Self::parse).collect()
    }
}

/// Parse every value of a multi-valued `Sec-WebSocket-Extensions` field.
///
/// Offers keep the order of the values supplied, then left-to-right order
/// within each value.
pub fn parse_headers<I, S>(values: I) -> Vec<ExtensionOffer>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .flat_map(|value| ExtensionOffer::parse_header(value.as_ref()))
        .collect()
}

fn parse_param(token: &str) -> (&str, ParameterValue) {
    let Some((key, value)) = token.split_once('=') else {
        return (token, ParameterValue::Flag);
    };
    let key = key.trim();
    let value = unquote(value.trim());
    match (key.is_empty(), value.is_empty()) {
        (true, _) => (token, ParameterValue::Flag),
        (false, true) => (key, ParameterValue::Flag),
        (false, false) => (key, ParameterValue::value(value)),
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Flag => Ok(()),
            ParameterValue::Value(v) => write!(f, "={v}"),
        }
    }
}

impl fmt::Display for ExtensionOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (key, value) in &self.params {
            write!(f, ";{key}{value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers_across_values() {
        let offers = parse_headers([
            "permessage-deflate; client_max_window_bits; server_max_window_bits=10",
            "permessage-deflate;client_max_window_bits",
        ]);
        assert_eq!(
            offers,
            vec![
                ExtensionOffer::new("permessage-deflate")
                    .with_param("client_max_window_bits", ParameterValue::Flag)
                    .with_param("server_max_window_bits", ParameterValue::value("10")),
                ExtensionOffer::new("permessage-deflate")
                    .with_param("client_max_window_bits", ParameterValue::Flag),
            ]
        );
    }

    #[test]
    fn test_parse_header_comma_separated() {
        let offers =
            ExtensionOffer::parse_header("permessage-deflate; client_max_window_bits, x-webkit-deflate-frame");
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].name, "permessage-deflate");
        assert_eq!(offers[1].name, "x-webkit-deflate-frame");
        assert_eq!(offers[1].param_count(), 0);
    }

    #[test]
    fn test_whitespace_around_equals_is_stripped() {
        let offer = ExtensionOffer::parse("ext ;  key = value ;flag ").unwrap();
        assert_eq!(offer.name, "ext");
        assert_eq!(offer.get("key"), Some(&ParameterValue::value("value")));
        assert_eq!(offer.get("flag"), Some(&ParameterValue::Flag));
    }

    #[test]
    fn test_quoted_value_unwrapped_once() {
        let offer = ExtensionOffer::parse(r#"ext; a="10"; b="half; c=""x"""#).unwrap();
        assert_eq!(offer.get("a").and_then(ParameterValue::as_str), Some("10"));
        assert_eq!(offer.get("b").and_then(ParameterValue::as_str), Some("\"half"));
        assert_eq!(offer.get("c").and_then(ParameterValue::as_str), Some("\"x\""));
    }

    #[test]
    fn test_malformed_tokens_degrade_to_flags() {
        let offer = ExtensionOffer::parse("ext; =10; key=; ;ok").unwrap();
        let params: Vec<_> = offer.params().collect();
        assert_eq!(
            params,
            vec![
                ("=10", &ParameterValue::Flag),
                ("key", &ParameterValue::Flag),
                ("ok", &ParameterValue::Flag),
            ]
        );
    }

    #[test]
    fn test_repeated_key_last_write_wins() {
        let offer = ExtensionOffer::parse("ext; a=1; b; a=2").unwrap();
        let params: Vec<_> = offer.params().map(|(k, v)| (k, v.as_str())).collect();
        assert_eq!(params, vec![("a", Some("2")), ("b", None)]);
    }

    #[test]
    fn test_empty_entries_skipped() {
        assert!(ExtensionOffer::parse("").is_none());
        assert!(ExtensionOffer::parse(" ; a=1").is_none());
        let offers = parse_headers(["", "a,, b ,", " "]);
        let names: Vec<_> = offers.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_display_wire_form() {
        let offer = ExtensionOffer::new("permessage-deflate")
            .with_param("client_max_window_bits", ParameterValue::value("15"))
            .with_param("server_no_context_takeover", ParameterValue::Flag);
        assert_eq!(
            offer.to_string(),
            "permessage-deflate;client_max_window_bits=15;server_no_context_takeover"
        );
        assert_eq!(ExtensionOffer::parse(&offer.to_string()), Some(offer));
    }

    #[test]
    fn test_parameter_value_accessors() {
        assert!(ParameterValue::Flag.is_flag());
        assert_eq!(ParameterValue::Flag.as_str(), None);
        assert_eq!(ParameterValue::value("9").as_str(), Some("9"));
    }
}
