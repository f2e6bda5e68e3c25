//! Security Validator: a pure function that categorises issues on a
//! canonical [`Candidate`]. Never mutates network state, never performs I/O
//! — just inspects the fields the parser set already extracted.
//!
//! Discarded-vs-tagged behaviour is the caller's (the orchestrator's)
//! decision, driven by [`SecurityPolicy`](crate::config::SecurityPolicy);
//! this module only classifies.

use crate::types::{Candidate, Protocol, SecurityCategory};
use std::collections::HashMap;

/// Ports that are either reserved, commonly blocked, or associated with
/// unrelated (non-proxy) services a Candidate should never claim to run on.
const DANGEROUS_PORTS: &[u16] = &[20, 21, 23, 25, 53, 135, 137, 138, 139, 445, 3389];

/// Legacy/broken ciphers and obfuscation methods that no longer provide
/// meaningful confidentiality.
const WEAK_METHODS: &[&str] = &["rc4", "rc4-md5", "table", "des-cfb", "bf-cfb", "none"];

/// Hostnames that are almost never a real proxy operator's domain — raw
/// metadata/link-local endpoints, or placeholders left in from templates.
const SUSPICIOUS_DOMAIN_MARKERS: &[&str] = &["example.com", "test.local", "localhost", "invalid"];

/// Classify every security issue present on `candidate`. An empty map means
/// the candidate is clean. Categories map to the
/// human-readable reasons found (there may be more than one reason per
/// category, e.g. two separate weak ciphers).
pub fn classify(candidate: &Candidate) -> HashMap<SecurityCategory, Vec<String>> {
    let mut issues: HashMap<SecurityCategory, Vec<String>> = HashMap::new();

    check_weak_encryption(candidate, &mut issues);
    check_insecure_transport(candidate, &mut issues);
    check_dangerous_port(candidate, &mut issues);
    check_suspicious_domain(candidate, &mut issues);
    check_invalid_certificate(candidate, &mut issues);
    check_missing_auth(candidate, &mut issues);
    check_configuration_error(candidate, &mut issues);
    check_deprecated_protocol(candidate, &mut issues);

    issues
}

fn push(issues: &mut HashMap<SecurityCategory, Vec<String>>, category: SecurityCategory, reason: impl Into<String>) {
    issues.entry(category).or_default().push(reason.into());
}

fn check_weak_encryption(candidate: &Candidate, issues: &mut HashMap<SecurityCategory, Vec<String>>) {
    if let Some(method) = candidate
        .transport_params
        .get("method")
        .or_else(|| candidate.details.get("method"))
    {
        let lower = method.to_ascii_lowercase();
        if WEAK_METHODS.iter().any(|w| lower == *w) {
            push(issues, SecurityCategory::WeakEncryption, format!("cipher '{method}' is considered broken"));
        }
    }
}

fn check_insecure_transport(candidate: &Candidate, issues: &mut HashMap<SecurityCategory, Vec<String>>) {
    let expects_tls = matches!(
        candidate.protocol,
        Protocol::Trojan | Protocol::TrojanGo | Protocol::Vless
    );
    if expects_tls && candidate.tls_params.is_empty() {
        push(issues, SecurityCategory::InsecureTransport, "TLS-oriented protocol advertised with no TLS parameters");
    }
    if candidate
        .tls_params
        .get("insecure")
        .or_else(|| candidate.tls_params.get("allow_insecure"))
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        push(issues, SecurityCategory::InsecureTransport, "certificate validation explicitly disabled");
    }
}

fn check_dangerous_port(candidate: &Candidate, issues: &mut HashMap<SecurityCategory, Vec<String>>) {
    if DANGEROUS_PORTS.contains(&candidate.port) {
        push(issues, SecurityCategory::DangerousPort, format!("port {} is reserved for an unrelated service", candidate.port));
    }
}

fn check_suspicious_domain(candidate: &Candidate, issues: &mut HashMap<SecurityCategory, Vec<String>>) {
    let lower = candidate.host.to_ascii_lowercase();
    if SUSPICIOUS_DOMAIN_MARKERS.iter().any(|m| lower == *m || lower.ends_with(&format!(".{m}"))) {
        push(issues, SecurityCategory::SuspiciousDomain, format!("host '{}' looks like a placeholder, not a real endpoint", candidate.host));
    }
}

fn check_invalid_certificate(candidate: &Candidate, issues: &mut HashMap<SecurityCategory, Vec<String>>) {
    if let Some(sni) = candidate.tls_params.get("sni") {
        if sni.trim().is_empty() {
            push(issues, SecurityCategory::InvalidCertificate, "empty SNI cannot be validated against any certificate");
        }
    }
}

fn check_missing_auth(candidate: &Candidate, issues: &mut HashMap<SecurityCategory, Vec<String>>) {
    let requires_auth = !matches!(candidate.protocol, Protocol::Http | Protocol::Https | Protocol::Socks4 | Protocol::Socks5);
    if requires_auth && candidate.auth.is_empty() {
        push(issues, SecurityCategory::MissingAuth, "protocol requires credentials but none were supplied");
    }
}

fn check_configuration_error(candidate: &Candidate, issues: &mut HashMap<SecurityCategory, Vec<String>>) {
    if candidate.host.is_empty() || candidate.port == 0 {
        push(issues, SecurityCategory::ConfigurationError, "missing host or port");
    }
    if candidate.protocol == Protocol::WireGuard && !candidate.transport_params.contains_key("public_key") {
        push(issues, SecurityCategory::ConfigurationError, "WireGuard peer missing public key");
    }
}

fn check_deprecated_protocol(candidate: &Candidate, issues: &mut HashMap<SecurityCategory, Vec<String>>) {
    if matches!(candidate.protocol, Protocol::ShadowsocksR) {
        push(issues, SecurityCategory::DeprecatedProtocol, "ShadowsocksR is unmaintained upstream");
    }
    if candidate.protocol == Protocol::Socks4 {
        push(issues, SecurityCategory::DeprecatedProtocol, "SOCKS4 has no built-in authentication or encryption");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Fingerprint;
    use std::collections::HashMap as Map;

    fn base_candidate() -> Candidate {
        Candidate {
            fingerprint: Fingerprint([0u8; 16]),
            protocol: Protocol::Trojan,
            host: "proxy.example.net".to_string(),
            port: 443,
            auth: b"pw".to_vec(),
            transport_params: Map::new(),
            tls_params: Map::from([("sni".to_string(), "proxy.example.net".to_string())]),
            remarks: None,
            raw_uri: String::new(),
            source_url: "src".to_string(),
            security_issues: Map::new(),
            details: Map::new(),
        }
    }

    #[test]
    fn clean_candidate_has_no_issues() {
        let candidate = base_candidate();
        assert!(classify(&candidate).is_empty());
    }

    #[test]
    fn weak_cipher_is_flagged() {
        let mut candidate = base_candidate();
        candidate.protocol = Protocol::Shadowsocks;
        candidate.transport_params.insert("method".into(), "rc4-md5".into());
        let issues = classify(&candidate);
        assert!(issues.contains_key(&SecurityCategory::WeakEncryption));
    }

    #[test]
    fn dangerous_port_is_flagged() {
        let mut candidate = base_candidate();
        candidate.port = 23;
        let issues = classify(&candidate);
        assert!(issues.contains_key(&SecurityCategory::DangerousPort));
    }

    #[test]
    fn trojan_without_tls_is_insecure_transport() {
        let mut candidate = base_candidate();
        candidate.tls_params.clear();
        let issues = classify(&candidate);
        assert!(issues.contains_key(&SecurityCategory::InsecureTransport));
    }

    #[test]
    fn allow_insecure_flag_is_flagged() {
        let mut candidate = base_candidate();
        candidate.tls_params.insert("allow_insecure".into(), "true".into());
        let issues = classify(&candidate);
        assert!(issues.contains_key(&SecurityCategory::InsecureTransport));
    }

    #[test]
    fn placeholder_domain_is_flagged() {
        let mut candidate = base_candidate();
        candidate.host = "test.local".into();
        let issues = classify(&candidate);
        assert!(issues.contains_key(&SecurityCategory::SuspiciousDomain));
    }

    #[test]
    fn ssr_is_deprecated() {
        let mut candidate = base_candidate();
        candidate.protocol = Protocol::ShadowsocksR;
        let issues = classify(&candidate);
        assert!(issues.contains_key(&SecurityCategory::DeprecatedProtocol));
    }

    #[test]
    fn http_proxy_without_auth_is_not_flagged_missing_auth() {
        let mut candidate = base_candidate();
        candidate.protocol = Protocol::Http;
        candidate.auth.clear();
        let issues = classify(&candidate);
        assert!(!issues.contains_key(&SecurityCategory::MissingAuth));
    }

    #[test]
    fn trojan_without_auth_is_missing_auth() {
        let mut candidate = base_candidate();
        candidate.auth.clear();
        let issues = classify(&candidate);
        assert!(issues.contains_key(&SecurityCategory::MissingAuth));
    }
}
