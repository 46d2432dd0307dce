//! Per-operator source-address allowlist.
//!
//! An empty allowlist admits every address. That is the provisioning
//! default, so a freshly created operator is not locked out; provisioning
//! logs a warning whenever an account is created or left in that state.
//! Matching is exact (no CIDR ranges).

use std::net::IpAddr;

use crate::error::AuthError;

/// Parse and canonicalize allowlist entries. Any entry that is not an
/// IP address rejects the whole list.
pub fn normalize_allowlist(entries: &[String]) -> Result<Vec<String>, AuthError> {
    let mut normalized = Vec::with_capacity(entries.len());
    for entry in entries {
        let ip: IpAddr = entry
            .trim()
            .parse()
            .map_err(|_| AuthError::Malformed(format!("not an IP address: {entry}")))?;
        let canonical = ip.to_string();
        if !normalized.contains(&canonical) {
            normalized.push(canonical);
        }
    }
    Ok(normalized)
}

/// Whether `client` may log in under `allowlist`.
///
/// `client` is `None` when the transport could not supply an address;
/// that only passes an empty allowlist.
pub fn is_allowed(allowlist: &[String], client: Option<&str>) -> bool {
    if allowlist.is_empty() {
        return true;
    }
    let Some(client) = client.map(str::trim) else {
        return false;
    };
    let parsed = client.parse::<IpAddr>().ok().map(canonical);

    allowlist.iter().any(|entry| match (&parsed, entry.parse::<IpAddr>()) {
        (Some(client_ip), Ok(entry_ip)) => *client_ip == canonical(entry_ip),
        _ => entry == client,
    })
}

/// IPv4-mapped IPv6 addresses (`::ffff:10.0.0.1`) compare as IPv4.
fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

/// Enforce the allowlist, failing with [`AuthError::IpNotAllowed`].
pub fn enforce(allowlist: &[String], client: Option<&str>) -> Result<(), AuthError> {
    if is_allowed(allowlist, client) {
        Ok(())
    } else {
        Err(AuthError::IpNotAllowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_list_admits_everyone() {
        assert!(is_allowed(&[], Some("203.0.113.9")));
        assert!(is_allowed(&[], None));
    }

    #[test]
    fn exact_match_required() {
        let allow = list(&["10.0.0.1"]);
        assert!(is_allowed(&allow, Some("10.0.0.1")));
        assert!(!is_allowed(&allow, Some("10.0.0.2")));
        assert!(!is_allowed(&allow, None));
        assert!(matches!(
            enforce(&allow, Some("10.0.0.2")),
            Err(AuthError::IpNotAllowed)
        ));
    }

    #[test]
    fn mapped_ipv6_matches_ipv4_entry() {
        let allow = list(&["10.0.0.1"]);
        assert!(is_allowed(&allow, Some("::ffff:10.0.0.1")));
    }

    #[test]
    fn ipv6_spelling_is_canonicalized() {
        let allow = normalize_allowlist(&list(&["2001:0db8:0000:0000:0000:0000:0000:0001"])).unwrap();
        assert_eq!(allow, list(&["2001:db8::1"]));
        assert!(is_allowed(&allow, Some("2001:db8:0:0::1")));
    }

    #[test]
    fn normalize_rejects_garbage_and_dedups() {
        assert!(matches!(
            normalize_allowlist(&list(&["10.0.0.0/24"])),
            Err(AuthError::Malformed(_))
        ));
        let allow = normalize_allowlist(&list(&[" 10.0.0.1 ", "10.0.0.1"])).unwrap();
        assert_eq!(allow, list(&["10.0.0.1"]));
    }
}
