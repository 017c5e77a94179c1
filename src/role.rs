//! Endpoint role (client or server).

/// Which side of the opening handshake this endpoint plays.
///
/// Negotiation is asymmetric: the client offers, the server selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sends the extension offer.
    Client,
    /// Answers the offer with its selection.
    Server,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "Client"),
            Role::Server => write!(f, "Server"),
        }
    }
}
