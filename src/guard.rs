/*
 * Copyright (C) 2025 Jakub Žitník
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 */

use std::net::{Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

/// String-level safety check for an origin URL, run immediately before
/// every origin fetch.
///
/// Blocks non-HTTP schemes and literal loopback, unspecified, private and
/// link-local hosts. No DNS resolution happens here; a hostname that merely
/// resolves to a private address is out of scope for this check.
pub fn is_safe_origin_url(url: &str) -> Result<(), String> {
    let parsed = Url::parse(url).map_err(|_| format!("unparseable origin url: {url}"))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(format!("scheme '{other}' is not allowed")),
    }

    match parsed.host() {
        None => Err("origin url has no host".to_string()),
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                Err("loopback host is not allowed".to_string())
            } else {
                Ok(())
            }
        }
        Some(Host::Ipv4(ip)) => check_ipv4(ip),
        Some(Host::Ipv6(ip)) => check_ipv6(ip),
    }
}

fn check_ipv4(ip: Ipv4Addr) -> Result<(), String> {
    if ip.is_loopback() || ip.is_unspecified() {
        Err(format!("loopback address {ip} is not allowed"))
    } else if ip.is_private() {
        Err(format!("private address {ip} is not allowed"))
    } else if ip.is_link_local() {
        Err(format!("link-local address {ip} is not allowed"))
    } else {
        Ok(())
    }
}

fn check_ipv6(ip: Ipv6Addr) -> Result<(), String> {
    if ip.is_loopback() || ip.is_unspecified() {
        return Err(format!("loopback address {ip} is not allowed"));
    }
    // fe80::/10
    if ip.segments()[0] & 0xffc0 == 0xfe80 {
        return Err(format!("link-local address {ip} is not allowed"));
    }
    // IPv4-mapped addresses get the IPv4 treatment.
    if let Some(v4) = ip.to_ipv4_mapped() {
        return check_ipv4(v4);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_public_origins() {
        assert!(is_safe_origin_url("https://example.com/x").is_ok());
        assert!(is_safe_origin_url("http://93.184.216.34/").is_ok());
    }

    #[test]
    fn blocks_bad_schemes() {
        assert!(is_safe_origin_url("ftp://example.com/").is_err());
        assert!(is_safe_origin_url("file:///etc/passwd").is_err());
        assert!(is_safe_origin_url("gopher://example.com/").is_err());
    }

    #[test]
    fn blocks_loopback() {
        assert!(is_safe_origin_url("http://localhost/").is_err());
        assert!(is_safe_origin_url("http://LOCALHOST:8080/").is_err());
        assert!(is_safe_origin_url("http://app.localhost/").is_err());
        assert!(is_safe_origin_url("http://127.0.0.1/").is_err());
        assert!(is_safe_origin_url("http://127.8.9.10/").is_err());
        assert!(is_safe_origin_url("http://[::1]/").is_err());
        assert!(is_safe_origin_url("http://0.0.0.0/").is_err());
    }

    #[test]
    fn blocks_private_ranges() {
        assert!(is_safe_origin_url("http://10.0.0.5/").is_err());
        assert!(is_safe_origin_url("http://172.16.0.1/").is_err());
        assert!(is_safe_origin_url("http://172.31.255.1/").is_err());
        assert!(is_safe_origin_url("http://192.168.1.1/").is_err());
    }

    #[test]
    fn blocks_link_local() {
        assert!(is_safe_origin_url("http://169.254.169.254/").is_err());
        assert!(is_safe_origin_url("http://[fe80::1]/").is_err());
    }

    #[test]
    fn allows_public_but_blocks_mapped_private() {
        assert!(is_safe_origin_url("http://172.32.0.1/").is_ok());
        assert!(is_safe_origin_url("http://[::ffff:192.168.0.1]/").is_err());
    }
}
