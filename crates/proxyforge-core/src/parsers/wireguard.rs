//! WireGuard: `wireguard://private_key@host:port?publickey=...&presharedkey=...&address=...#remarks`
//!
//! Unlike the relay protocols above, WireGuard's "auth" is an asymmetric
//! keypair rather than a shared secret; the private key goes in `auth` and
//! the peer's public key is carried as a transport param.

use super::{parse_query, split_host_port, ParsedFields};
use crate::types::Protocol;
use std::collections::HashMap;

pub fn parse(line: &str) -> Option<ParsedFields> {
    let rest = line
        .strip_prefix("wireguard://")
        .or_else(|| line.strip_prefix("wg://"))?;
    let (without_fragment, remarks) = match rest.split_once('#') {
        Some((body, frag)) => (body, Some(super::parse_query(&format!("r={frag}")).remove("r").unwrap_or_default())),
        None => (rest, None),
    };
    let (body, query) = match without_fragment.split_once('?') {
        Some((b, q)) => (b, parse_query(q)),
        None => (without_fragment, HashMap::new()),
    };

    let (private_key, authority) = body.split_once('@')?;
    if private_key.is_empty() {
        return None;
    }
    let (host, port) = split_host_port(authority)?;

    let public_key = query.get("publickey").cloned()?;

    let mut transport_params = HashMap::new();
    transport_params.insert("public_key".into(), public_key);
    if let Some(psk) = query.get("presharedkey") {
        transport_params.insert("preshared_key".into(), psk.clone());
    }
    if let Some(addr) = query.get("address") {
        transport_params.insert("address".into(), addr.clone());
    }
    if let Some(mtu) = query.get("mtu") {
        transport_params.insert("mtu".into(), mtu.clone());
    }
    if let Some(reserved) = query.get("reserved") {
        transport_params.insert("reserved".into(), reserved.clone());
    }

    Some(ParsedFields {
        protocol: Protocol::WireGuard,
        host,
        port,
        auth: private_key.as_bytes().to_vec(),
        transport_params,
        tls_params: HashMap::new(),
        remarks,
        details: HashMap::new(),
    })
}
