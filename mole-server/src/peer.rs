//! Observed caller address, the value tickets are bound to.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error};

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Reverse proxies allowed to report the original client via `X-Forwarded-For`.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    nets: Vec<IpNet>,
}

impl TrustedProxies {
    pub fn new(nets: Vec<IpNet>) -> Self {
        Self { nets }
    }

    pub fn is_trusted(&self, ip: IpAddr) -> bool {
        self.nets.iter().any(|net| net.contains(&ip))
    }
}

/// Determine the caller's address.
///
/// Uses the direct peer unless that peer is a trusted proxy. In that case the
/// `X-Forwarded-For` chain is walked from the right, each hop replacing the
/// current address while the current one is trusted, so entries a client
/// prepends itself are never reached. An unparsable hop ends the walk.
/// Returns `None` when no peer address is attached to the request.
pub fn observed_ip(parts: &Parts, trusted: &TrustedProxies) -> Option<IpAddr> {
    let direct_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())?;

    let hops = parts
        .headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .rev()
        .flat_map(|v| v.to_str().unwrap_or_default().rsplit(','));

    let mut client = direct_ip;
    for hop in hops {
        if !trusted.is_trusted(client) {
            break;
        }
        match hop.trim().parse::<IpAddr>() {
            Ok(ip) => client = ip,
            Err(_) => {
                debug!("Unparsable X-Forwarded-For hop {:?} behind {}", hop, client);
                break;
            }
        }
    }

    if client != direct_ip {
        debug!("Using client IP {} from X-Forwarded-For (trusted proxy: {})", client, direct_ip);
    }
    Some(client)
}

/// Extractor for the observed caller address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedAddr(pub IpAddr);

#[async_trait]
impl<S> FromRequestParts<S> for ObservedAddr
where
    Arc<TrustedProxies>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let trusted = Arc::<TrustedProxies>::from_ref(state);
        observed_ip(parts, &trusted).map(ObservedAddr).ok_or_else(|| {
            error!("No peer address on request; is the server using connect info?");
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn request(peer: [u8; 4], forwarded: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = forwarded {
            builder = builder.header(X_FORWARDED_FOR, value);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
        req.into_parts().0
    }

    #[test]
    fn test_direct_peer() {
        let trusted = TrustedProxies::default();
        let req = request([10, 2, 3, 4], Some("192.0.2.1"));

        assert_eq!(observed_ip(&req, &trusted), Some("10.2.3.4".parse().unwrap()));
    }

    #[test]
    fn test_trusted_proxy_forwards() {
        let trusted = TrustedProxies::new(vec!["127.0.0.0/8".parse().unwrap()]);

        let req = request([127, 0, 0, 1], Some("192.0.2.1"));
        assert_eq!(observed_ip(&req, &trusted), Some("192.0.2.1".parse().unwrap()));

        let garbage = request([127, 0, 0, 1], Some("not-an-ip"));
        assert_eq!(observed_ip(&garbage, &trusted), Some("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_client_supplied_forwarded_prefix_ignored() {
        let trusted = TrustedProxies::new(vec!["127.0.0.0/8".parse().unwrap()]);

        // The client sent "192.0.2.7" itself; the proxy appended the real peer.
        let req = request([127, 0, 0, 1], Some("192.0.2.7, 198.51.100.9"));
        assert_eq!(observed_ip(&req, &trusted), Some("198.51.100.9".parse().unwrap()));

        let req = request([127, 0, 0, 1], Some("garbage, 198.51.100.9"));
        assert_eq!(observed_ip(&req, &trusted), Some("198.51.100.9".parse().unwrap()));
    }

    #[test]
    fn test_forwarded_chain_of_trusted_proxies() {
        let trusted = TrustedProxies::new(vec![
            "127.0.0.0/8".parse().unwrap(),
            "10.0.0.0/8".parse().unwrap(),
        ]);

        let req = request([127, 0, 0, 1], Some("192.0.2.9, 192.0.2.7, 10.0.0.5"));
        assert_eq!(observed_ip(&req, &trusted), Some("192.0.2.7".parse().unwrap()));

        // Every hop trusted: the leftmost one is all that is known.
        let req = request([127, 0, 0, 1], Some("10.0.0.9, 10.0.0.5"));
        assert_eq!(observed_ip(&req, &trusted), Some("10.0.0.9".parse().unwrap()));

        // A broken hop stops the walk at the last trusted address.
        let req = request([127, 0, 0, 1], Some("192.0.2.7, bogus, 10.0.0.5"));
        assert_eq!(observed_ip(&req, &trusted), Some("10.0.0.5".parse().unwrap()));
    }

    #[test]
    fn test_forwarded_header_lines_read_last_first() {
        let trusted = TrustedProxies::new(vec!["127.0.0.0/8".parse().unwrap()]);
        let mut req = request([127, 0, 0, 1], Some("192.0.2.7"));
        req.headers
            .append(X_FORWARDED_FOR, "198.51.100.9".parse().unwrap());

        assert_eq!(observed_ip(&req, &trusted), Some("198.51.100.9".parse().unwrap()));
    }

    #[test]
    fn test_missing_peer() {
        let (req, _) = Request::builder().uri("/").body(Body::empty()).unwrap().into_parts();
        assert_eq!(observed_ip(&req, &TrustedProxies::default()), None);
    }
}
