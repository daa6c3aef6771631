use axum::http::HeaderMap;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty())
}

/// True when the request reached us over TLS, directly or via a proxy.
pub fn is_secure(headers: &HeaderMap) -> bool {
    header(headers, "x-forwarded-proto")
        .and_then(|v| v.split(',').next())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

/// `<proto>://<host>` of the current request, for links in emails and redirects.
pub fn base_url(headers: &HeaderMap) -> String {
    let proto = if is_secure(headers) { "https" } else { "http" };
    let host = header(headers, "x-forwarded-host")
        .or_else(|| header(headers, "host"))
        .unwrap_or("localhost");
    format!("{}://{}", proto, host)
}
