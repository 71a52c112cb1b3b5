//! Input Validation
//!
//! Every check here runs before any external command, so a rejected
//! request leaves no trace on the system.

use crate::error::{Error, Result};
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;

/// Maximum length of SVM, volume and snapshot names
pub const MAX_NAME_LEN: usize = 64;

/// Security flavors accepted on exports
pub const SEC_FLAVORS: &[&str] = &["sys", "krb5", "krb5i", "krb5p", "none"];

/// Validate an SVM, volume or snapshot name
///
/// Names start with an ASCII alphanumeric and continue with alphanumerics,
/// dots, underscores or hyphens.
pub fn validate_name(field: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation(field, "cannot be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::validation(
            field,
            format!("must be between 1 and {} characters", MAX_NAME_LEN),
        ));
    }

    let mut chars = name.chars();
    let first_ok = chars.next().map(|c| c.is_ascii_alphanumeric()).unwrap_or(false);
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !first_ok || !rest_ok {
        return Err(Error::validation(
            field,
            "must start with an alphanumeric and contain only alphanumerics, dots, underscores, or hyphens",
        ));
    }
    Ok(())
}

/// Validate a VLAN id (1-4094)
pub fn validate_vlan(vlan_id: u16) -> Result<()> {
    if !(1..=4094).contains(&vlan_id) {
        return Err(Error::validation("vlan_id", "must be between 1 and 4094"));
    }
    Ok(())
}

/// Validate an interface MTU (68-9000)
pub fn validate_mtu(mtu: u32) -> Result<()> {
    if !(68..=9000).contains(&mtu) {
        return Err(Error::validation("mtu", "must be between 68 and 9000"));
    }
    Ok(())
}

/// Validate a size in GiB
pub fn validate_size(field: &str, size_gib: u64) -> Result<()> {
    if size_gib == 0 {
        return Err(Error::validation(field, "must be greater than 0"));
    }
    Ok(())
}

/// Parse `A.B.C.D/P` into its address and prefix length
pub fn validate_ip_cidr(field: &str, cidr: &str) -> Result<(Ipv4Addr, u8)> {
    let (addr, prefix) = cidr.split_once('/').ok_or_else(|| {
        Error::validation(field, "must be in format IP/PREFIX (e.g., 192.168.10.5/24)")
    })?;

    let ip: Ipv4Addr = addr
        .parse()
        .map_err(|_| Error::validation(field, format!("invalid IPv4 address '{}'", addr)))?;
    let prefix: u8 = prefix
        .parse()
        .ok()
        .filter(|p| *p <= 32)
        .ok_or_else(|| Error::validation(field, "prefix length must be between 0 and 32"))?;

    Ok((ip, prefix))
}

/// Validate a plain IPv4 address
pub fn validate_ipv4(field: &str, ip: &str) -> Result<Ipv4Addr> {
    ip.parse()
        .map_err(|_| Error::validation(field, format!("invalid IPv4 address '{}'", ip)))
}

/// Infer a default gateway from an interface CIDR
///
/// Picks the first usable host of the subnet that differs from the
/// interface address (`192.168.10.5/24` -> `192.168.10.1`,
/// `192.168.10.1/24` -> `192.168.10.2`). /31 and /32 have no usable
/// convention, so the caller must supply a gateway.
pub fn infer_gateway(cidr: &str) -> Result<Ipv4Addr> {
    let (ip, prefix) = validate_ip_cidr("ip_cidr", cidr)?;
    if prefix >= 31 {
        return Err(Error::validation(
            "gateway",
            "cannot be inferred for /31 or /32; please specify it explicitly",
        ));
    }

    let network = Ipv4Network::new(ip, prefix)
        .map_err(|e| Error::validation("ip_cidr", e.to_string()))?;
    let first = u32::from(network.network()) + 1;
    let last = u32::from(network.broadcast()) - 1;

    (first..=last)
        .map(Ipv4Addr::from)
        .find(|host| *host != ip)
        .ok_or_else(|| Error::validation("gateway", "could not be inferred; please specify it explicitly"))
}

/// Validate an export access mode (`rw` or `ro`)
pub fn validate_access(access: &str) -> Result<()> {
    match access.trim().to_ascii_lowercase().as_str() {
        "rw" | "ro" => Ok(()),
        _ => Err(Error::validation("access", "must be 'rw' or 'ro'")),
    }
}

/// Validate export security flavors
pub fn validate_sec(sec: &[String]) -> Result<()> {
    if sec.is_empty() {
        return Err(Error::validation("sec", "at least one security flavor is required"));
    }
    for flavor in sec {
        if !SEC_FLAVORS.contains(&flavor.trim()) {
            return Err(Error::validation(
                "sec",
                format!("unsupported flavor '{}' (expected one of {})", flavor, SEC_FLAVORS.join(", ")),
            ));
        }
    }
    Ok(())
}

/// Validate the requested filesystem type
pub fn validate_fs_type(fs_type: &str) -> Result<()> {
    if fs_type != "xfs" {
        return Err(Error::validation("fs_type", "only 'xfs' is supported"));
    }
    Ok(())
}
