//! sing-box (`singbox.json`): the `outbounds` array shape sing-box expects,
//! plus a `selector` outbound tying them together.

use crate::error::Result;
use crate::types::{EnrichedProxy, Protocol};
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

fn to_outbound(proxy: &EnrichedProxy, index: usize) -> Option<Value> {
    let tag = proxy
        .candidate
        .remarks
        .clone()
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| format!("{}-{index}", proxy.candidate.protocol.as_str()));

    let auth = decode_auth(&proxy.candidate.auth_b64);

    let outbound = match proxy.candidate.protocol {
        Protocol::Shadowsocks | Protocol::Shadowsocks2022 => json!({
            "type": "shadowsocks",
            "tag": tag,
            "server": proxy.candidate.host,
            "server_port": proxy.candidate.port,
            "method": proxy.candidate.transport_params.get("method"),
            "password": auth,
        }),
        Protocol::Vmess => json!({
            "type": "vmess",
            "tag": tag,
            "server": proxy.candidate.host,
            "server_port": proxy.candidate.port,
            "uuid": auth,
            "security": proxy.candidate.transport_params.get("security"),
        }),
        Protocol::Vless => json!({
            "type": "vless",
            "tag": tag,
            "server": proxy.candidate.host,
            "server_port": proxy.candidate.port,
            "uuid": auth,
        }),
        Protocol::Trojan | Protocol::TrojanGo => json!({
            "type": "trojan",
            "tag": tag,
            "server": proxy.candidate.host,
            "server_port": proxy.candidate.port,
            "password": auth,
        }),
        Protocol::Hysteria2 => json!({
            "type": "hysteria2",
            "tag": tag,
            "server": proxy.candidate.host,
            "server_port": proxy.candidate.port,
            "password": auth,
        }),
        Protocol::WireGuard => json!({
            "type": "wireguard",
            "tag": tag,
            "server": proxy.candidate.host,
            "server_port": proxy.candidate.port,
            "private_key": auth,
            "peer_public_key": proxy.candidate.transport_params.get("public_key"),
        }),
        _ => return None,
    };
    Some(outbound)
}

fn decode_auth(auth_b64: &str) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(auth_b64)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_default()
}

#[derive(Serialize)]
struct SingBoxConfig {
    outbounds: Vec<Value>,
}

pub fn write(output_dir: &Path, chosen: &[EnrichedProxy]) -> Result<()> {
    let mut outbounds: Vec<Value> = chosen
        .iter()
        .enumerate()
        .filter_map(|(i, p)| to_outbound(p, i))
        .collect();

    let tags: Vec<Value> = outbounds
        .iter()
        .filter_map(|o| o.get("tag").cloned())
        .collect();
    outbounds.push(json!({
        "type": "selector",
        "tag": "proxyforge",
        "outbounds": tags,
    }));

    let config = SingBoxConfig { outbounds };
    let json_text = serde_json::to_string_pretty(&config)?;
    fs::write(output_dir.join("singbox.json"), json_text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateView, Fingerprint};
    use std::collections::HashMap;

    fn proxy(protocol: Protocol) -> EnrichedProxy {
        EnrichedProxy {
            candidate: CandidateView {
                fingerprint: Fingerprint([3; 16]).to_hex(),
                protocol,
                host: "203.0.113.9".into(),
                port: 443,
                auth_b64: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, "secret"),
                transport_params: HashMap::new(),
                tls_params: HashMap::new(),
                remarks: None,
                raw_uri: String::new(),
                source_url: "src".into(),
                security_issues: HashMap::new(),
            },
            country_code: None,
            country: None,
            city: None,
            asn: None,
            is_working: true,
            latency_ms: Some(30),
            health_score: 0.7,
        }
    }

    #[test]
    fn unsupported_protocol_yields_no_outbound() {
        assert!(to_outbound(&proxy(Protocol::Naive), 0).is_none());
    }

    #[test]
    fn trojan_outbound_decodes_password() {
        let outbound = to_outbound(&proxy(Protocol::Trojan), 0).unwrap();
        assert_eq!(outbound["password"], "secret");
        assert_eq!(outbound["type"], "trojan");
    }

    #[test]
    fn write_appends_a_selector_grouping_all_tags() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), &[proxy(Protocol::Trojan), proxy(Protocol::Vless)]).unwrap();
        let content = fs::read_to_string(dir.path().join("singbox.json")).unwrap();
        let value: Value = serde_json::from_str(&content).unwrap();
        let last = value["outbounds"].as_array().unwrap().last().unwrap();
        assert_eq!(last["type"], "selector");
    }
}
