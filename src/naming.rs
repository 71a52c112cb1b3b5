//! Interface Name Allocation
//!
//! Linux interface names are limited to 15 characters. A per-SVM VLAN
//! interface name is built as `v<vlan>-<short name><2 base62 chars>` so two
//! tenants on the same VLAN id never fight over `<parent>.<vlan>`, while the
//! checksum suffix separates tenants whose shortened names collide.

use crate::domain::ports::NetworkManager;
use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Interface name budget (IFNAMSIZ - 1)
pub const MAX_IFNAME_LEN: usize = 15;

/// Allocation attempts before giving up
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 256;

const BASE62: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Two base62 digits of `sha256(data)` read as a big-endian integer
fn hash2_base62(data: &[u8]) -> String {
    let mut value: Vec<u8> = Sha256::digest(data).to_vec();
    let first = divmod_in_place(&mut value, 62);
    let second = divmod_in_place(&mut value, 62);
    [BASE62[first as usize] as char, BASE62[second as usize] as char]
        .iter()
        .collect()
}

/// Divide a big-endian integer by `divisor` in place, returning the remainder
fn divmod_in_place(value: &mut [u8], divisor: u32) -> u32 {
    let mut remainder = 0u32;
    for byte in value.iter_mut() {
        let acc = (remainder << 8) | u32::from(*byte);
        *byte = (acc / divisor) as u8;
        remainder = acc % divisor;
    }
    remainder
}

/// Deterministic VLAN interface name for an SVM
///
/// Stable for a given `(svm_name, vlan_id, attempt)`; different attempts
/// vary only the checksum suffix.
pub fn make_vlan_ifname(svm_name: &str, vlan_id: u16, attempt: u32) -> String {
    let digest = hash2_base62(format!("{}:{}", svm_name, attempt).as_bytes());

    let mut prefix = format!("v{}-", vlan_id);
    prefix.truncate(MAX_IFNAME_LEN - digest.len());

    let mut safe: String = svm_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if safe.is_empty() {
        safe = "svm".to_string();
    }
    let core_len = MAX_IFNAME_LEN - prefix.len() - digest.len();
    safe.truncate(core_len);

    let mut name = format!("{}{}{}", prefix, safe, digest);
    name.truncate(MAX_IFNAME_LEN);
    name
}

/// Pick the first candidate name not present in the root namespace
///
/// Interfaces are created in the root namespace before moving, so that is
/// where concurrent creations can collide.
pub async fn allocate_vlan_ifname(
    network: &dyn NetworkManager,
    svm_name: &str,
    vlan_id: u16,
) -> Result<String> {
    for attempt in 0..MAX_ALLOCATION_ATTEMPTS {
        let candidate = make_vlan_ifname(svm_name, vlan_id, attempt);
        if !network.link_exists(&candidate).await? {
            debug!("Allocated interface {} for {} (attempt {})", candidate, svm_name, attempt);
            return Ok(candidate);
        }
        debug!("Interface name {} taken, retrying", candidate);
    }

    Err(Error::IfnameExhausted {
        svm: svm_name.to_string(),
        vlan_id,
        attempts: MAX_ALLOCATION_ATTEMPTS,
    })
}
