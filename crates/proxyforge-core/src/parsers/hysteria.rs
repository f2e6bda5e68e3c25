//! Hysteria family: `hysteria://` (v1, QUIC+obfs) and `hysteria2://`/`hy2://`
//! (v2, simplified auth).

use super::{parse_query, split_host_port, ParsedFields};
use crate::types::Protocol;
use std::collections::HashMap;

/// `hysteria://host:port?auth=...&protocol=udp&upmbps=...&obfs=...#remarks`
pub fn parse_hysteria(line: &str) -> Option<ParsedFields> {
    let rest = line.strip_prefix("hysteria://")?;
    let (without_fragment, remarks) = split_fragment(rest);
    let (authority, query) = match without_fragment.split_once('?') {
        Some((a, q)) => (a, parse_query(q)),
        None => (without_fragment, HashMap::new()),
    };
    let (host, port) = split_host_port(authority)?;

    let auth = query.get("auth").cloned().unwrap_or_default();

    let mut transport_params = HashMap::new();
    if let Some(p) = query.get("protocol") {
        transport_params.insert("protocol".into(), p.clone());
    }
    if let Some(obfs) = query.get("obfs") {
        transport_params.insert("obfs".into(), obfs.clone());
    }
    if let Some(up) = query.get("upmbps") {
        transport_params.insert("up_mbps".into(), up.clone());
    }
    if let Some(down) = query.get("downmbps") {
        transport_params.insert("down_mbps".into(), down.clone());
    }

    let mut tls_params = HashMap::new();
    tls_params.insert("sni".into(), query.get("peer").cloned().unwrap_or_else(|| host.clone()));
    if let Some(insecure) = query.get("insecure") {
        tls_params.insert("insecure".into(), insecure.clone());
    }

    Some(ParsedFields {
        protocol: Protocol::Hysteria,
        host,
        port,
        auth: auth.into_bytes(),
        transport_params,
        tls_params,
        remarks,
        details: HashMap::new(),
    })
}

/// `hysteria2://auth@host:port?obfs=...&sni=...#remarks`
pub fn parse_hysteria2(line: &str) -> Option<ParsedFields> {
    let rest = line
        .strip_prefix("hysteria2://")
        .or_else(|| line.strip_prefix("hy2://"))?;
    let (without_fragment, remarks) = split_fragment(rest);
    let (body, query) = match without_fragment.split_once('?') {
        Some((b, q)) => (b, parse_query(q)),
        None => (without_fragment, HashMap::new()),
    };

    let (auth, authority) = body.split_once('@')?;
    let (host, port) = split_host_port(authority)?;

    let mut transport_params = HashMap::new();
    if let Some(obfs) = query.get("obfs") {
        transport_params.insert("obfs".into(), obfs.clone());
    }
    if let Some(obfs_password) = query.get("obfs-password") {
        transport_params.insert("obfs_password".into(), obfs_password.clone());
    }

    let mut tls_params = HashMap::new();
    tls_params.insert("sni".into(), query.get("sni").cloned().unwrap_or_else(|| host.clone()));
    if let Some(insecure) = query.get("insecure") {
        tls_params.insert("insecure".into(), insecure.clone());
    }

    Some(ParsedFields {
        protocol: Protocol::Hysteria2,
        host,
        port,
        auth: auth.as_bytes().to_vec(),
        transport_params,
        tls_params,
        remarks,
        details: HashMap::new(),
    })
}

fn split_fragment(s: &str) -> (&str, Option<String>) {
    match s.split_once('#') {
        Some((body, frag)) => (body, Some(super::parse_query(&format!("r={frag}")).remove("r").unwrap_or_default())),
        None => (s, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hysteria_v1() {
        let line = "hysteria://198.51.100.30:443?auth=secret&protocol=udp&obfs=xplus#node";
        let fields = parse_hysteria(line).expect("parses");
        assert_eq!(fields.port, 443);
        assert_eq!(fields.auth, b"secret");
        assert_eq!(fields.transport_params.get("obfs").unwrap(), "xplus");
    }

    #[test]
    fn parses_hysteria2_with_hy2_alias() {
        let line = "hy2://secretpass@198.51.100.30:443?sni=example.com";
        let fields = parse_hysteria2(line).expect("parses");
        assert_eq!(fields.auth, b"secretpass");
        assert_eq!(fields.tls_params.get("sni").unwrap(), "example.com");
    }

    #[test]
    fn hysteria2_requires_authority() {
        assert!(parse_hysteria2("hysteria2://198.51.100.30:443").is_none());
    }
}
