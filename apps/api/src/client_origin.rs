use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{Extensions, HeaderMap};
use ipnet::IpNet;
use storefront_domain::ClientOrigin;

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Peers allowed to supply forwarding headers.
///
/// An empty list trusts every peer.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    networks: Vec<IpNet>,
}

impl TrustedProxies {
    pub fn new(networks: Vec<IpNet>) -> Self {
        Self { networks }
    }

    pub fn trusts(&self, peer_address: Option<IpAddr>) -> bool {
        if self.networks.is_empty() {
            return true;
        }

        peer_address.is_some_and(|address| {
            self.networks
                .iter()
                .any(|network| network.contains(&address))
        })
    }
}

/// Collects the origin facts for one request.
pub fn client_origin(
    headers: &HeaderMap,
    extensions: &Extensions,
    trusted_proxies: &TrustedProxies,
) -> ClientOrigin {
    let peer_address = peer_address(extensions);

    let origin = ClientOrigin {
        forwarded_for: header_value(headers, FORWARDED_FOR_HEADER),
        real_ip: header_value(headers, REAL_IP_HEADER),
        peer_address,
    };

    if trusted_proxies.trusts(peer_address) {
        origin
    } else {
        origin.without_forwarding_headers()
    }
}

/// Transport peer recorded by `into_make_service_with_connect_info`.
pub fn peer_address(extensions: &Extensions) -> Option<IpAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(address)| address.ip())
}

pub fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
}
