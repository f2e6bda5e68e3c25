//! V2Ray `vmess://` — a base64-encoded JSON blob (the "vmess standard"
//! link format used by v2rayN-style subscriptions).

use super::ParsedFields;
use crate::types::Protocol;
use base64::Engine;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Deserialize)]
struct VmessJson {
    #[serde(default)]
    ps: Option<String>,
    add: String,
    port: PortValue,
    id: String,
    #[serde(default)]
    aid: Option<serde_json::Value>,
    #[serde(default)]
    net: Option<String>,
    #[serde(default)]
    #[serde(rename = "type")]
    header_type: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    tls: Option<String>,
    #[serde(default)]
    sni: Option<String>,
    #[serde(default)]
    scy: Option<String>,
}

/// `port` appears as either a JSON number or a numeric string in the wild.
#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

impl PortValue {
    fn as_u16(&self) -> Option<u16> {
        match self {
            PortValue::Number(n) => Some(*n),
            PortValue::Text(s) => s.parse().ok(),
        }
    }
}

pub fn parse(line: &str) -> Option<ParsedFields> {
    let payload = line.strip_prefix("vmess://")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(payload))
        .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(payload))
        .ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let parsed: VmessJson = serde_json::from_str(&text).ok()?;

    let port = parsed.port.as_u16()?;
    if parsed.id.len() < 8 || !looks_like_uuid(&parsed.id) {
        return None;
    }

    let mut transport_params = HashMap::new();
    transport_params.insert("network".into(), parsed.net.clone().unwrap_or_else(|| "tcp".into()));
    if let Some(t) = parsed.header_type {
        transport_params.insert("header_type".into(), t);
    }
    if let Some(h) = parsed.host {
        transport_params.insert("host".into(), h);
    }
    if let Some(p) = parsed.path {
        transport_params.insert("path".into(), p);
    }
    transport_params.insert(
        "alter_id".into(),
        parsed
            .aid
            .map(|v| v.to_string())
            .unwrap_or_else(|| "0".into()),
    );
    transport_params.insert("security".into(), parsed.scy.unwrap_or_else(|| "auto".into()));

    let mut tls_params = HashMap::new();
    if let Some(tls) = parsed.tls {
        if !tls.is_empty() && tls != "none" {
            tls_params.insert("tls".into(), tls);
        }
    }
    if let Some(sni) = parsed.sni {
        tls_params.insert("sni".into(), sni);
    }

    Some(ParsedFields {
        protocol: Protocol::Vmess,
        host: parsed.add.to_ascii_lowercase(),
        port,
        auth: parsed.id.clone().into_bytes(),
        transport_params,
        tls_params,
        remarks: parsed.ps,
        details: HashMap::from([("uuid".to_string(), parsed.id)]),
    })
}

fn looks_like_uuid(s: &str) -> bool {
    let bytes = s.as_bytes();
    s.len() == 36
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| match i {
                8 | 13 | 18 | 23 => *b == b'-',
                _ => b.is_ascii_hexdigit(),
            })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn encode(json: &str) -> String {
        format!(
            "vmess://{}",
            base64::engine::general_purpose::STANDARD.encode(json)
        )
    }

    #[test]
    fn parses_minimal_vmess_link() {
        let json = r#"{"ps":"test","add":"198.51.100.10","port":443,"id":"b831381d-6324-4d53-ad4f-8cda48b30811","net":"ws","path":"/ray"}"#;
        let line = encode(json);
        let fields = parse(&line).expect("should parse");
        assert_eq!(fields.host, "198.51.100.10");
        assert_eq!(fields.port, 443);
        assert_eq!(fields.transport_params.get("network").unwrap(), "ws");
    }

    #[test]
    fn rejects_invalid_uuid() {
        let json = r#"{"add":"example.com","port":443,"id":"not-a-uuid"}"#;
        let line = encode(json);
        assert!(parse(&line).is_none());
    }

    #[test]
    fn rejects_bad_base64() {
        assert!(parse("vmess://not-base64-!!!").is_none());
    }

    #[test]
    fn port_as_string_is_accepted() {
        let json = r#"{"add":"example.com","port":"8443","id":"b831381d-6324-4d53-ad4f-8cda48b30811"}"#;
        let line = encode(json);
        assert_eq!(parse(&line).unwrap().port, 8443);
    }
}
