//! `vless://uuid@host:port?params#remarks`

use super::{parse_query, split_host_port, ParsedFields};
use crate::types::Protocol;
use std::collections::HashMap;

pub fn parse(line: &str) -> Option<ParsedFields> {
    let rest = line.strip_prefix("vless://")?;
    let (without_fragment, remarks) = match rest.split_once('#') {
        Some((body, frag)) => (body, Some(super::parse_query(&format!("r={frag}")).remove("r").unwrap_or_default())),
        None => (rest, None),
    };
    let (body, query) = match without_fragment.split_once('?') {
        Some((b, q)) => (b, parse_query(q)),
        None => (without_fragment, HashMap::new()),
    };

    let (uuid, authority) = body.split_once('@')?;
    if uuid.len() < 8 {
        return None;
    }
    let (host, port) = split_host_port(authority)?;

    let mut transport_params = HashMap::new();
    if let Some(t) = query.get("type") {
        transport_params.insert("network".into(), t.clone());
    }
    if let Some(p) = query.get("path") {
        transport_params.insert("path".into(), p.clone());
    }
    if let Some(h) = query.get("host") {
        transport_params.insert("host".into(), h.clone());
    }
    if let Some(flow) = query.get("flow") {
        transport_params.insert("flow".into(), flow.clone());
    }

    let mut tls_params = HashMap::new();
    if let Some(security) = query.get("security") {
        tls_params.insert("security".into(), security.clone());
    }
    if let Some(sni) = query.get("sni") {
        tls_params.insert("sni".into(), sni.clone());
    }
    if let Some(fp) = query.get("fp") {
        tls_params.insert("fingerprint".into(), fp.clone());
    }

    Some(ParsedFields {
        protocol: Protocol::Vless,
        host,
        port,
        auth: uuid.as_bytes().to_vec(),
        transport_params,
        tls_params,
        remarks,
        details: HashMap::from([("uuid".to_string(), uuid.to_string())]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vless_with_query_and_fragment() {
        let line = "vless://b831381d-6324-4d53-ad4f-8cda48b30811@198.51.100.10:443?type=ws&security=tls&sni=example.com#My%20Node";
        let fields = parse(line).expect("parses");
        assert_eq!(fields.host, "198.51.100.10");
        assert_eq!(fields.port, 443);
        assert_eq!(fields.tls_params.get("sni").unwrap(), "example.com");
    }

    #[test]
    fn missing_uuid_separator_fails() {
        assert!(parse("vless://198.51.100.10:443").is_none());
    }

    #[test]
    fn invalid_port_fails() {
        assert!(parse("vless://uuid12345@example.com:0").is_none());
    }
}
