//! Caller-side input checks for host and port strings.
//!
//! These run before a request is built and are never called by the client
//! itself. The patterns accept exactly what the mobile front end accepted:
//! an IPv4 dotted quad, or a single label plus a 2-6 letter TLD, either one
//! optionally followed by `:port`.

use once_cell::sync::Lazy;
use regex::Regex;

static IPV4_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^((25[0-5]|2[0-4][0-9]|[0-1]?[0-9][0-9]?)\.){3}(25[0-5]|2[0-4][0-9]|[0-1]?[0-9][0-9]?)(:[0-9]{1,5})?$",
    )
    .expect("IPv4 pattern is valid")
});

// Label of 1-63 chars that neither starts nor ends with '-'
static DOMAIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.[A-Za-z]{2,6}(:[0-9]{1,5})?$")
        .expect("domain pattern is valid")
});

static PORT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{1,5}$").expect("port pattern is valid"));

pub fn is_valid_ip_address_domain(input: &str) -> bool {
    IPV4_PATTERN.is_match(input) || DOMAIN_PATTERN.is_match(input)
}

/// True for 1-5 ASCII digits. Range is not checked, see [`parse_port`].
pub fn is_valid_port(input: &str) -> bool {
    PORT_PATTERN.is_match(input)
}

/// Host part of an accepted `host[:port]` string
pub fn strip_port_suffix(input: &str) -> &str {
    match input.rsplit_once(':') {
        Some((host, port)) if is_valid_port(port) => host,
        _ => input,
    }
}

pub fn parse_port(input: &str) -> Option<u16> {
    if !is_valid_port(input) {
        return None;
    }
    match input.parse::<u32>() {
        Ok(port) if (1..=u16::MAX as u32).contains(&port) => Some(port as u16),
        _ => None,
    }
}
