//! Parser set: one parser per protocol, dispatched by URI-scheme prefix. A
//! parser never throws — it returns `Some(Candidate)` or a silent, counted
//! `None` on failure. No inheritance hierarchy: dispatch is a plain
//! `prefix → fn` registry, one function per format.

mod hysteria;
mod misc;
mod plain;
mod shadowsocks;
mod trojan;
mod tuic;
mod vless;
mod vmess;
mod wireguard;

use crate::types::{Candidate, Protocol};
use std::collections::HashMap;

pub const MAX_LINE_BYTES: usize = 8 * 1024;
pub const MAX_LINES: usize = 50_000;

/// Half-built candidate a protocol parser fills in before the
/// canonicaliser computes its fingerprint.
pub struct ParsedFields {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub auth: Vec<u8>,
    pub transport_params: HashMap<String, String>,
    pub tls_params: HashMap<String, String>,
    pub remarks: Option<String>,
    pub details: HashMap<String, String>,
}

impl ParsedFields {
    pub fn into_candidate(self, raw_uri: String, source_url: String) -> Candidate {
        Candidate {
            fingerprint: crate::canonical::fingerprint(&self),
            protocol: self.protocol,
            host: self.host,
            port: self.port,
            auth: self.auth,
            transport_params: self.transport_params,
            tls_params: self.tls_params,
            remarks: self.remarks,
            raw_uri,
            source_url,
            security_issues: HashMap::new(),
            details: self.details,
        }
    }
}

type ParseFn = fn(&str) -> Option<ParsedFields>;

/// Scheme prefix (without `://`) to parser function, in dispatch order.
const REGISTRY: &[(&str, ParseFn)] = &[
    ("vmess", vmess::parse),
    ("vless", vless::parse),
    ("ss2022", shadowsocks::parse_ss2022),
    ("ssr", shadowsocks::parse_ssr),
    ("ss", shadowsocks::parse_ss),
    ("trojan-go", trojan::parse_trojan_go),
    ("trojan", trojan::parse_trojan),
    ("hysteria2", hysteria::parse_hysteria2),
    ("hy2", hysteria::parse_hysteria2),
    ("hysteria", hysteria::parse_hysteria),
    ("tuic", tuic::parse),
    ("wireguard", wireguard::parse),
    ("wg", wireguard::parse),
    ("naive", misc::parse_naive),
    ("snell", misc::parse_snell),
    ("brook", misc::parse_brook),
    ("juicity", misc::parse_juicity),
    ("ssh", misc::parse_ssh),
    ("https", plain::parse_https),
    ("http", plain::parse_http),
    ("socks5", plain::parse_socks5),
    ("socks4", plain::parse_socks4),
];

/// Parse one line (or one base64-decoded blob) from a source body into a
/// [`Candidate`]. Silent failure on anything malformed, oversized, or
/// unrecognised — parsing never throws to the caller.
pub fn parse_line(line: &str, source_url: &str) -> Option<Candidate> {
    let line = line.trim();
    if line.is_empty() || line.len() > MAX_LINE_BYTES {
        return None;
    }

    let scheme = line.split("://").next()?;
    let parser = REGISTRY
        .iter()
        .find(|(prefix, _)| prefix.eq_ignore_ascii_case(scheme))
        .map(|(_, f)| *f)?;

    let fields = parser(line)?;
    if !is_valid_port(fields.port) || fields.host.is_empty() {
        return None;
    }

    Some(fields.into_candidate(line.to_string(), source_url.to_string()))
}

/// Parse an entire source body: one candidate per non-empty, non-comment
/// line, honouring the 50k-line cap. Lines are parsed in the order
/// encountered; a source that looks like one giant base64 blob is
/// decoded first and re-split into lines.
pub fn parse_body(body: &str, source_url: &str) -> Vec<Candidate> {
    let text = maybe_decode_base64_blob(body);

    text.lines()
        .take(MAX_LINES)
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| parse_line(line, source_url))
        .collect()
}

/// Heuristic: if the whole body looks like a single base64 blob (no
/// `://` anywhere, decodes to valid UTF-8), treat it as a base64-wrapped
/// subscription and decode it before line-splitting.
fn maybe_decode_base64_blob(body: &str) -> String {
    use base64::Engine;
    let trimmed = body.trim();
    if trimmed.contains("://") || trimmed.is_empty() {
        return body.to_string();
    }
    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    for engine in [
        base64::engine::general_purpose::STANDARD,
        base64::engine::general_purpose::URL_SAFE,
        base64::engine::general_purpose::STANDARD_NO_PAD,
        base64::engine::general_purpose::URL_SAFE_NO_PAD,
    ] {
        if let Ok(decoded) = engine.decode(&compact) {
            if let Ok(s) = String::from_utf8(decoded) {
                if s.contains("://") {
                    return s;
                }
            }
        }
    }
    body.to_string()
}

pub(crate) fn is_valid_port(port: u16) -> bool {
    port != 0
}

/// Split a `host:port` userinfo-less authority, rejecting malformed ports.
pub(crate) fn split_host_port(authority: &str) -> Option<(String, u16)> {
    let (host, port) = authority.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    let port: u16 = port.parse().ok()?;
    if !is_valid_port(port) {
        return None;
    }
    Some((host.to_ascii_lowercase(), port))
}

/// Parse query-string params (`?a=b&c=d`) into a map, ignoring malformed
/// pairs rather than failing the whole candidate.
pub(crate) fn parse_query(query: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        if let Some((k, v)) = pair.split_once('=') {
            let k = urlencoding_decode(k);
            let v = urlencoding_decode(v);
            map.insert(k, v);
        } else {
            map.insert(urlencoding_decode(pair), String::new());
        }
    }
    map
}

fn urlencoding_decode(s: &str) -> String {
    percent_decode(s)
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or(""), 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(bytes[i]);
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognised_scheme_returns_none() {
        assert!(parse_line("carrier-pigeon://example.com:80", "src").is_none());
    }

    #[test]
    fn overlong_line_is_rejected() {
        let long = format!("http://{}:80", "a".repeat(MAX_LINE_BYTES));
        assert!(parse_line(&long, "src").is_none());
    }

    #[test]
    fn blank_and_comment_lines_are_skipped_in_body() {
        let body = "\n# not a proxy\nhttp://example.com:8080\n";
        let candidates = parse_body(body, "src");
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn query_parsing_handles_percent_and_plus() {
        let q = parse_query("sni=example.com&path=%2Fws&name=a+b");
        assert_eq!(q.get("sni").map(String::as_str), Some("example.com"));
        assert_eq!(q.get("path").map(String::as_str), Some("/ws"));
        assert_eq!(q.get("name").map(String::as_str), Some("a b"));
    }

    #[test]
    fn split_host_port_rejects_bad_port() {
        assert!(split_host_port("example.com:0").is_none());
        assert!(split_host_port("example.com:99999").is_none());
        assert_eq!(
            split_host_port("example.com:443"),
            Some(("example.com".to_string(), 443))
        );
    }
}
