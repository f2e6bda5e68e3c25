//! Trojan family: `trojan://` and `trojan-go://`.
//!
//! Both share the `password@host:port?params#remarks` shape; trojan-go
//! adds websocket/grpc transport params that plain trojan lacks.

use super::{parse_query, split_host_port, ParsedFields};
use crate::types::Protocol;
use std::collections::HashMap;

pub fn parse_trojan(line: &str) -> Option<ParsedFields> {
    parse_common(line, "trojan://", Protocol::Trojan)
}

pub fn parse_trojan_go(line: &str) -> Option<ParsedFields> {
    parse_common(line, "trojan-go://", Protocol::TrojanGo)
}

fn parse_common(line: &str, prefix: &str, protocol: Protocol) -> Option<ParsedFields> {
    let rest = line.strip_prefix(prefix)?;
    let (without_fragment, remarks) = match rest.split_once('#') {
        Some((body, frag)) => (body, Some(super::parse_query(&format!("r={frag}")).remove("r").unwrap_or_default())),
        None => (rest, None),
    };
    let (body, query) = match without_fragment.split_once('?') {
        Some((b, q)) => (b, parse_query(q)),
        None => (without_fragment, HashMap::new()),
    };

    let (password, authority) = body.split_once('@')?;
    if password.is_empty() {
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
    if let Some(sm) = query.get("serviceName") {
        transport_params.insert("service_name".into(), sm.clone());
    }

    let mut tls_params = HashMap::new();
    tls_params.insert("sni".into(), query.get("sni").cloned().unwrap_or_else(|| host.clone()));
    if let Some(allow_insecure) = query.get("allowInsecure") {
        tls_params.insert("allow_insecure".into(), allow_insecure.clone());
    }

    Some(ParsedFields {
        protocol,
        host,
        port,
        auth: password.as_bytes().to_vec(),
        transport_params,
        tls_params,
        remarks,
        details: HashMap::new(),
    })
}
