// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Shared validation utilities for configuration and scenario files.
//!
//! Policy rules themselves are never validated here: malformed matches are
//! the switch's call. These checks cover harness inputs only.

use std::net::Ipv4Addr;

/// Maximum interface name length (Linux IFNAMSIZ - 1)
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Result type for validation functions
pub type ValidationResult = Result<(), String>;

/// Check if an IPv4 address is a valid unicast address.
///
/// Returns `false` for multicast, broadcast, and unspecified (0.0.0.0) addresses.
#[inline]
pub fn is_valid_unicast(addr: Ipv4Addr) -> bool {
    !addr.is_multicast() && !addr.is_broadcast() && !addr.is_unspecified()
}

/// Validate that a subscriber's assigned address is unicast.
pub fn validate_subscriber_ip(addr: Ipv4Addr, imsi: &str) -> ValidationResult {
    if is_valid_unicast(addr) {
        Ok(())
    } else {
        Err(format!(
            "subscriber {} must be assigned a unicast address, got {}",
            imsi, addr
        ))
    }
}

/// Validate a bridge/interface name according to Linux kernel rules.
///
/// # Rules
/// - Must not be empty
/// - Must not exceed 15 characters (IFNAMSIZ - 1)
/// - Must contain only alphanumeric characters, dash, underscore, or dot
/// - Must not start with a digit, dash, or dot
pub fn validate_interface_name(name: &str) -> ValidationResult {
    if name.is_empty() {
        return Err("interface name cannot be empty".to_string());
    }

    if name.len() > MAX_INTERFACE_NAME_LEN {
        return Err(format!(
            "interface name '{}' exceeds maximum length of {} characters",
            name, MAX_INTERFACE_NAME_LEN
        ));
    }

    for (i, c) in name.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.' {
            return Err(format!(
                "interface name '{}' contains invalid character '{}' at position {}; \
                only alphanumeric, dash, underscore, and dot are allowed",
                name, c, i
            ));
        }
    }

    if let Some(first) = name.chars().next() {
        if first.is_ascii_digit() {
            return Err(format!(
                "interface name '{}' cannot start with a digit",
                name
            ));
        }
        if first == '-' || first == '.' {
            return Err(format!(
                "interface name '{}' cannot start with '{}'; must start with alphanumeric or underscore",
                name, first
            ));
        }
    }

    Ok(())
}

/// Validate a subscriber identity of the form `IMSI` + 5..=15 digits.
pub fn validate_imsi(imsi: &str) -> ValidationResult {
    let digits = imsi
        .strip_prefix("IMSI")
        .ok_or_else(|| format!("subscriber id '{}' must start with 'IMSI'", imsi))?;

    if !(5..=15).contains(&digits.len()) {
        return Err(format!(
            "subscriber id '{}' must carry 5 to 15 digits, got {}",
            imsi,
            digits.len()
        ));
    }
    if let Some(c) = digits.chars().find(|c| !c.is_ascii_digit()) {
        return Err(format!(
            "subscriber id '{}' contains non-digit '{}'",
            imsi, c
        ));
    }
    Ok(())
}
