//! Media URL checks.
//!
//! The gateway fetches media by URL, so a campaign could otherwise point it
//! at internal services. Only public http(s) URLs with known file types pass.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use herald_core::HeraldError;
use herald_core::error::Result;
use reqwest::Url;

const BLOCKED_HOSTS: &[&str] = &[
    "localhost",
    "127.0.0.1",
    "0.0.0.0",
    "metadata",
    "metadata.google.internal",
    "metadata.azure.com",
    "169.254.169.254",
];

const ALLOWED_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".pdf", ".doc", ".docx", ".xls", ".xlsx",
];

fn blocked_v4(ip: &Ipv4Addr) -> bool {
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.octets()[0] >= 240
}

fn blocked_v6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return blocked_v4(&v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00 // unique local
        || (first & 0xffc0) == 0xfe80 // link local
}

/// Reject anything but public http(s) media URLs.
pub fn validate_media_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(HeraldError::Security("media URL missing".into()));
    }
    if raw.contains('@') || raw.contains('#') {
        return Err(HeraldError::Security("media URL contains suspicious characters".into()));
    }

    let url = Url::parse(raw)
        .map_err(|e| HeraldError::Security(format!("invalid media URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(HeraldError::Security("only http/https media URLs are allowed".into()));
    }

    let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
        return Err(HeraldError::Security("media URL has no host".into()));
    };
    if BLOCKED_HOSTS.contains(&host.as_str()) {
        return Err(HeraldError::Security(format!("host {host} is blocked")));
    }
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    let blocked_ip = match literal.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => blocked_v4(&ip),
        Ok(IpAddr::V6(ip)) => blocked_v6(&ip),
        Err(_) => false,
    };
    if blocked_ip {
        return Err(HeraldError::Security("private or reserved IPs are not allowed".into()));
    }

    let path = url.path().to_ascii_lowercase();
    let file = path.rsplit('/').next().unwrap_or_default();
    if file.contains('.') && !ALLOWED_EXTENSIONS.iter().any(|ext| file.ends_with(ext)) {
        return Err(HeraldError::Security(format!(
            "file type not allowed, use one of: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    Ok(url)
}

/// Image mimetype from the URL's extension; PNG when unknown.
pub fn mimetype_for(url: &str) -> &'static str {
    let lower = url.to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or_default();
    if path.ends_with(".jpg") || path.ends_with(".jpeg") {
        "image/jpeg"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else {
        "image/png"
    }
}
