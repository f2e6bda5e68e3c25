//! The line-oriented client formats: a base64-wrapped subscription blob,
//! and Surge/Quantumult/Shadowrocket config snippets.

use crate::error::Result;
use crate::types::{EnrichedProxy, Protocol};
use base64::Engine;
use std::fs;
use std::path::Path;

/// `base64.txt`: newline-joined raw URIs of every working proxy, the whole
/// blob base64-encoded — the universal "subscription link" format every
/// client's import-from-URL feature understands.
pub fn write_base64(output_dir: &Path, working: &[EnrichedProxy]) -> Result<()> {
    let joined = working
        .iter()
        .map(|p| p.candidate.raw_uri.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let encoded = base64::engine::general_purpose::STANDARD.encode(joined);
    fs::write(output_dir.join("base64.txt"), encoded)?;
    Ok(())
}

fn decode_auth(auth_b64: &str) -> String {
    base64::engine::general_purpose::STANDARD
        .decode(auth_b64)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_default()
}

fn proxy_name(proxy: &EnrichedProxy, index: usize) -> String {
    proxy
        .candidate
        .remarks
        .clone()
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| format!("{}-{index}", proxy.candidate.protocol.as_str()))
}

/// `surge.conf`: a `[Proxy]` section in Surge's `name = type, host, port, key=value` format.
pub fn write_surge(output_dir: &Path, chosen: &[EnrichedProxy]) -> Result<()> {
    let mut lines = vec!["[Proxy]".to_string()];
    for (i, proxy) in chosen.iter().enumerate() {
        let name = proxy_name(proxy, i);
        let auth = decode_auth(&proxy.candidate.auth_b64);
        let line = match proxy.candidate.protocol {
            Protocol::Shadowsocks | Protocol::Shadowsocks2022 => {
                let method = proxy.candidate.transport_params.get("method").cloned().unwrap_or_default();
                format!(
                    "{name} = ss, {}, {}, encrypt-method={method}, password={auth}",
                    proxy.candidate.host, proxy.candidate.port
                )
            }
            Protocol::Trojan => format!(
                "{name} = trojan, {}, {}, password={auth}",
                proxy.candidate.host, proxy.candidate.port
            ),
            Protocol::Http | Protocol::Https => format!(
                "{name} = http, {}, {}",
                proxy.candidate.host, proxy.candidate.port
            ),
            Protocol::Socks5 => format!(
                "{name} = socks5, {}, {}",
                proxy.candidate.host, proxy.candidate.port
            ),
            _ => continue,
        };
        lines.push(line);
    }
    fs::write(output_dir.join("surge.conf"), lines.join("\n"))?;
    Ok(())
}

/// `quantumult.conf`: Quantumult X's `[SERVER]` list, `type=..., key=value` form.
pub fn write_quantumult(output_dir: &Path, chosen: &[EnrichedProxy]) -> Result<()> {
    let mut lines = vec!["[SERVER]".to_string()];
    for (i, proxy) in chosen.iter().enumerate() {
        let name = proxy_name(proxy, i);
        let auth = decode_auth(&proxy.candidate.auth_b64);
        let line = match proxy.candidate.protocol {
            Protocol::Shadowsocks | Protocol::Shadowsocks2022 => {
                let method = proxy.candidate.transport_params.get("method").cloned().unwrap_or_default();
                format!(
                    "shadowsocks={}:{}, method={method}, password={auth}, tag={name}",
                    proxy.candidate.host, proxy.candidate.port
                )
            }
            Protocol::Vmess => format!(
                "vmess={}:{}, method=auto, password={auth}, tag={name}",
                proxy.candidate.host, proxy.candidate.port
            ),
            Protocol::Trojan => format!(
                "trojan={}:{}, password={auth}, tag={name}",
                proxy.candidate.host, proxy.candidate.port
            ),
            _ => continue,
        };
        lines.push(line);
    }
    fs::write(output_dir.join("quantumult.conf"), lines.join("\n"))?;
    Ok(())
}

/// `shadowrocket.txt`: one `ss://`/`vmess://`/`trojan://`-style URI per line
/// with a `#`-encoded display name, the format Shadowrocket's manual
/// "paste link" import expects.
pub fn write_shadowrocket(output_dir: &Path, chosen: &[EnrichedProxy]) -> Result<()> {
    let lines: Vec<String> = chosen
        .iter()
        .enumerate()
        .map(|(i, proxy)| {
            let name = proxy_name(proxy, i);
            format!("{}#{}", proxy.candidate.raw_uri, urlencode(&name))
        })
        .collect();
    fs::write(output_dir.join("shadowrocket.txt"), lines.join("\n"))?;
    Ok(())
}

fn urlencode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}
