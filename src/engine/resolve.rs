use anyhow::{Context, Result, bail};
use regex::Regex;
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::LazyLock;

use crate::config::AddressFamily;

/// `scheme://host:port/path` with every part but the host optional
static URL_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:/]+://)?([^:/]+)(.+)?$").expect("host pattern is valid"));

/// Reduce a URL to its host part; anything else is returned unchanged
///
/// IPv6 literals contain colons and are never treated as URLs.
pub fn extract_host(input: &str) -> &str {
    if input.parse::<IpAddr>().is_ok() {
        return input;
    }

    URL_HOST
        .captures(input)
        .and_then(|caps| caps.get(2))
        .map_or(input, |m| m.as_str())
}

/// Resolve a host to a single address honoring the address family
pub fn resolve_target(host: &str, family: AddressFamily) -> Result<IpAddr> {
    let host = extract_host(host);

    // Try parsing as IP address first
    if let Ok(ip) = host.parse::<IpAddr>() {
        return match (family, ip) {
            (AddressFamily::V4, IpAddr::V6(_)) => bail!("{} is not an IPv4 address", ip),
            (AddressFamily::V6, IpAddr::V4(_)) => bail!("{} is not an IPv6 address", ip),
            _ => Ok(ip),
        };
    }

    let addrs: Vec<IpAddr> = (host, 0)
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve {}", host))?
        .map(|s| s.ip())
        .collect();

    pick_address(host, &addrs, family)
}

/// Choose among resolved addresses; IPv4 wins when the family is unforced
fn pick_address(host: &str, addrs: &[IpAddr], family: AddressFamily) -> Result<IpAddr> {
    if addrs.is_empty() {
        bail!("No addresses found for {}", host);
    }

    let found = match family {
        AddressFamily::V4 => addrs.iter().find(|ip| ip.is_ipv4()),
        AddressFamily::V6 => addrs.iter().find(|ip| ip.is_ipv6()),
        AddressFamily::Any => addrs.iter().find(|ip| ip.is_ipv4()).or(addrs.first()),
    };

    match found {
        Some(ip) => Ok(*ip),
        None => bail!(
            "No {} addresses found for {}",
            if family == AddressFamily::V4 { "IPv4" } else { "IPv6" },
            host
        ),
    }
}
