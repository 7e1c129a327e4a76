//! Endpoint URLs for the data and heartbeat channels.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use shock_core::TransportError;
use shock_core::constants::{DEVICE_ID_QUERY_KEY, TOKEN_QUERY_KEY};

/// Characters escaped in query values (everything but RFC 3986 unreserved).
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn base(host: &str, tls: bool) -> Result<String, TransportError> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return Err(TransportError::InvalidUrl("host is empty".into()));
    }
    if host.contains("://") || host.contains('/') || host.contains('?') {
        return Err(TransportError::InvalidUrl(format!(
            "host must be host[:port], got {host}"
        )));
    }
    let scheme = if tls { "wss" } else { "ws" };
    Ok(format!("{scheme}://{host}"))
}

/// Data channel: `ws(s)://<host>/?x-shockwallet-device-id=<id>`.
pub fn data_channel_url(host: &str, tls: bool, device_id: &str) -> Result<String, TransportError> {
    Ok(format!(
        "{}/?{DEVICE_ID_QUERY_KEY}={}",
        base(host, tls)?,
        utf8_percent_encode(device_id, QUERY_VALUE)
    ))
}

/// Heartbeat channel: `ws(s)://<host>/<path>?token=<token>`.
pub fn heartbeat_url(
    host: &str,
    tls: bool,
    path: &str,
    token: &str,
) -> Result<String, TransportError> {
    let path = path.trim_matches('/');
    Ok(format!(
        "{}/{path}?{TOKEN_QUERY_KEY}={}",
        base(host, tls)?,
        utf8_percent_encode(token, QUERY_VALUE)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn data_channel_carries_device_id() {
        let url = data_channel_url("10.0.0.5:9835", false, "dev-1").unwrap();
        assert_eq!(url, "ws://10.0.0.5:9835/?x-shockwallet-device-id=dev-1");
    }

    #[test]
    fn tls_switches_scheme() {
        let url = data_channel_url("node.example", true, "d").unwrap();
        assert!(url.starts_with("wss://node.example/"));
    }

    #[test]
    fn heartbeat_carries_token() {
        let url = heartbeat_url("127.0.0.1:9835", false, "shockping", "tok_1").unwrap();
        assert_eq!(url, "ws://127.0.0.1:9835/shockping?token=tok_1");
    }

    #[test]
    fn query_values_are_escaped() {
        let url = heartbeat_url("h:1", false, "/shockping/", "a b&c=d").unwrap();
        assert_eq!(url, "ws://h:1/shockping?token=a%20b%26c%3Dd");
    }

    #[test]
    fn trailing_slash_on_host_is_tolerated() {
        let url = data_channel_url("h:1/", false, "d").unwrap();
        assert_eq!(url, "ws://h:1/?x-shockwallet-device-id=d");
    }

    #[test]
    fn host_with_scheme_is_rejected() {
        assert_matches!(
            data_channel_url("http://h:1", false, "d"),
            Err(TransportError::InvalidUrl(_))
        );
        assert_matches!(
            heartbeat_url("", false, "shockping", "t"),
            Err(TransportError::InvalidUrl(_))
        );
    }
}
