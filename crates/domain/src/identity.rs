//! Caller identity used to group requests for quota accounting.

use std::fmt::{Display, Formatter};
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Shared identity for requests whose origin cannot be determined.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Network origin facts observed for one inbound request.
///
/// Header values are kept raw; resolution decides which one wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOrigin {
    /// Raw forwarded-for chain, e.g. `"203.0.113.7, 10.0.0.2"`.
    pub forwarded_for: Option<String>,
    /// Raw single real-origin header value.
    pub real_ip: Option<String>,
    /// Transport-level peer address.
    pub peer_address: Option<IpAddr>,
}

impl ClientOrigin {
    /// Returns the origin with client-supplied forwarding headers removed.
    #[must_use]
    pub fn without_forwarding_headers(self) -> Self {
        Self {
            forwarded_for: None,
            real_ip: None,
            peer_address: self.peer_address,
        }
    }

    fn first_forwarded(&self) -> Option<&str> {
        self.forwarded_for
            .as_deref()
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn real_ip(&self) -> Option<&str> {
        self.real_ip
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// The string a caller is grouped by for quota purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Resolves the identity key for one request.
    ///
    /// A non-blank override key is used verbatim. Otherwise the first
    /// forwarded-for address wins, then the real-origin header, then the
    /// peer address, then [`UNKNOWN_IDENTITY`].
    #[must_use]
    pub fn resolve(origin: &ClientOrigin, override_key: Option<&str>) -> Self {
        if let Some(override_key) = override_key.filter(|value| !value.trim().is_empty()) {
            return Self(override_key.to_owned());
        }

        origin
            .first_forwarded()
            .or_else(|| origin.real_ip())
            .map(|value| Self(value.to_owned()))
            .or_else(|| origin.peer_address.map(|address| Self(address.to_string())))
            .unwrap_or_else(Self::unknown)
    }

    /// Returns the shared bucket used when no origin is available.
    #[must_use]
    pub fn unknown() -> Self {
        Self(UNKNOWN_IDENTITY.to_owned())
    }

    /// Returns the underlying key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns whether this is the shared unknown bucket.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_IDENTITY
    }
}

impl Display for IdentityKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}
