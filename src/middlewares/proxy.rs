use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use ipnet::IpNet;
use once_cell::sync::Lazy;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Client address resolved from the peer or, behind a trusted proxy, from forwarding headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

static TRUSTED_PROXIES: Lazy<Vec<IpNet>> = Lazy::new(|| {
    let raw = std::env::var("TRUSTED_PROXIES").unwrap_or_default();
    parse_trusted_proxies(&raw)
});

/// Parses a comma separated list of CIDRs or single addresses. Invalid entries are skipped.
pub fn parse_trusted_proxies(raw: &str) -> Vec<IpNet> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            IpNet::from_str(s)
                .or_else(|_| IpAddr::from_str(s).map(IpNet::from))
                .map_err(|_| tracing::warn!(entry = s, "ignoring invalid TRUSTED_PROXIES entry"))
                .ok()
        })
        .collect()
}

fn peer_addr(req: &Request) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .or_else(|| req.extensions().get::<SocketAddr>().copied())
}

/// Picks the forwarded client address: `cf-connecting-ip`, then the first
/// `x-forwarded-for` hop, then `x-real-ip`.
pub fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);
    get("cf-connecting-ip")
        .and_then(|v| IpAddr::from_str(v).ok())
        .or_else(|| {
            get("x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .and_then(|v| IpAddr::from_str(v.trim()).ok())
        })
        .or_else(|| get("x-real-ip").and_then(|v| IpAddr::from_str(v).ok()))
}

pub fn resolve_client_ip(peer: Option<SocketAddr>, headers: &HeaderMap, trusted: &[IpNet]) -> Option<IpAddr> {
    let peer_trusted = peer.is_some_and(|sa| trusted.iter().any(|net| net.contains(&sa.ip())));
    let forwarded = if peer_trusted { forwarded_ip(headers) } else { None };
    forwarded.or_else(|| peer.map(|sa| sa.ip()))
}

/// Inserts a `ClientIp` extension. Forwarding headers are honoured only when the
/// immediate peer is listed in `TRUSTED_PROXIES`.
pub async fn proxy_middleware(mut req: Request, next: Next) -> Response {
    let peer = peer_addr(&req);
    if let Some(ip) = resolve_client_ip(peer, req.headers(), &TRUSTED_PROXIES) {
        req.extensions_mut().insert(ClientIp(ip));
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn parses_cidrs_and_plain_addresses() {
        let nets = parse_trusted_proxies("10.0.0.0/8, 127.0.0.1, garbage,");
        assert_eq!(nets.len(), 2);
        assert!(nets[1].contains(&IpAddr::from([127, 0, 0, 1])));
    }

    #[test]
    fn untrusted_peer_ignores_headers() {
        let peer: SocketAddr = "203.0.113.9:4000".parse().unwrap();
        let h = headers(&[("x-forwarded-for", "1.2.3.4")]);
        assert_eq!(resolve_client_ip(Some(peer), &h, &[]), Some(peer.ip()));
    }

    #[test]
    fn trusted_peer_uses_forwarded_chain() {
        let peer: SocketAddr = "10.1.2.3:4000".parse().unwrap();
        let trusted = parse_trusted_proxies("10.0.0.0/8");
        let h = headers(&[("x-forwarded-for", "1.2.3.4, 10.1.2.3"), ("x-real-ip", "9.9.9.9")]);
        assert_eq!(resolve_client_ip(Some(peer), &h, &trusted), Some(IpAddr::from([1, 2, 3, 4])));

        let h = headers(&[("cf-connecting-ip", "5.6.7.8"), ("x-forwarded-for", "1.2.3.4")]);
        assert_eq!(resolve_client_ip(Some(peer), &h, &trusted), Some(IpAddr::from([5, 6, 7, 8])));
    }
}
