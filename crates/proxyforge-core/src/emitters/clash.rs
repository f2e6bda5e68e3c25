//! Clash (`clash.yaml`): a YAML proxy list plus a minimal select-group, the
//! shape Clash/Clash.Meta clients expect to import directly.

use crate::error::Result;
use crate::types::{EnrichedProxy, Protocol};
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Serialize)]
struct ClashProxy {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    server: String,
    port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cipher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sni: Option<String>,
    udp: bool,
}

#[derive(Serialize)]
struct ClashConfig {
    proxies: Vec<ClashProxy>,
    #[serde(rename = "proxy-groups")]
    proxy_groups: Vec<ProxyGroup>,
}

#[derive(Serialize)]
struct ProxyGroup {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    proxies: Vec<String>,
}

/// Only protocols Clash natively understands are rendered; anything else
/// (naive, brook, juicity, ssh...) is silently skipped, matching a real
/// client's own behaviour of ignoring proxy types it can't parse.
fn to_clash_proxy(proxy: &EnrichedProxy, index: usize) -> Option<ClashProxy> {
    let name = proxy
        .candidate
        .remarks
        .clone()
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| format!("{}-{index}", proxy.candidate.protocol.as_str()));

    let kind = match proxy.candidate.protocol {
        Protocol::Shadowsocks | Protocol::Shadowsocks2022 => "ss",
        Protocol::Vmess => "vmess",
        Protocol::Vless => "vless",
        Protocol::Trojan => "trojan",
        Protocol::Socks5 => "socks5",
        Protocol::Http => "http",
        _ => return None,
    };

    Some(ClashProxy {
        name,
        kind: kind.to_string(),
        server: proxy.candidate.host.clone(),
        port: proxy.candidate.port,
        password: matches!(proxy.candidate.protocol, Protocol::Shadowsocks | Protocol::Shadowsocks2022 | Protocol::Trojan)
            .then(|| base64_decode_auth(&proxy.candidate.auth_b64)),
        uuid: matches!(proxy.candidate.protocol, Protocol::Vmess | Protocol::Vless)
            .then(|| base64_decode_auth(&proxy.candidate.auth_b64)),
        cipher: proxy.candidate.transport_params.get("method").cloned(),
        sni: proxy.candidate.tls_params.get("sni").cloned(),
        udp: true,
    })
}

fn base64_decode_auth(auth_b64: &str) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(auth_b64)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_default()
}

pub fn write(output_dir: &Path, chosen: &[EnrichedProxy]) -> Result<()> {
    let proxies: Vec<ClashProxy> = chosen
        .iter()
        .enumerate()
        .filter_map(|(i, p)| to_clash_proxy(p, i))
        .collect();
    let names: Vec<String> = proxies.iter().map(|p| p.name.clone()).collect();

    let config = ClashConfig {
        proxies,
        proxy_groups: vec![ProxyGroup {
            name: "proxyforge".to_string(),
            kind: "select".to_string(),
            proxies: names,
        }],
    };

    let yaml = serde_yaml::to_string(&config)?;
    fs::write(output_dir.join("clash.yaml"), yaml)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateView, Fingerprint};
    use std::collections::HashMap;

    fn proxy() -> EnrichedProxy {
        EnrichedProxy {
            candidate: CandidateView {
                fingerprint: Fingerprint([1; 16]).to_hex(),
                protocol: Protocol::Trojan,
                host: "203.0.113.1".into(),
                port: 443,
                auth_b64: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, "pw"),
                transport_params: HashMap::new(),
                tls_params: HashMap::from([("sni".to_string(), "example.com".to_string())]),
                remarks: Some("Home".into()),
                raw_uri: String::new(),
                source_url: "src".into(),
                security_issues: HashMap::new(),
            },
            country_code: None,
            country: None,
            city: None,
            asn: None,
            is_working: true,
            latency_ms: Some(40),
            health_score: 0.8,
        }
    }

    #[test]
    fn unsupported_protocol_is_skipped_not_erroring() {
        let mut p = proxy();
        p.candidate.protocol = Protocol::Juicity;
        assert!(to_clash_proxy(&p, 0).is_none());
    }

    #[test]
    fn write_produces_valid_yaml_with_password_decoded() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), &[proxy()]).unwrap();
        let content = fs::read_to_string(dir.path().join("clash.yaml")).unwrap();
        assert!(content.contains("password: pw"));
        assert!(content.contains("sni: example.com"));
    }
}
