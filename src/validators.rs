//! Input validation for rule requests
//!
//! Every value that reaches the enforcement backend passes through this
//! module first. Validation failure is an ordinary `Err`, never a panic:
//! callers hand raw user text straight in.
//!
//! All validators trim surrounding whitespace. Optional fields (IP, port)
//! return `Ok(None)` for empty input, meaning "any".

use crate::core::error::{Error, Field, Result};
use crate::core::rule::{Action, Protocol};

/// Validates a source address.
///
/// Accepts exactly four `.`-separated groups of 1-3 ASCII digits, each in
/// `0..=255`. Prefixes such as `192.168.1.` are rejected.
///
/// # Examples
///
/// ```
/// use rulekeeper::validators::validate_ip;
///
/// assert_eq!(validate_ip("192.168.1.1").unwrap(), Some("192.168.1.1".to_string()));
/// assert_eq!(validate_ip("").unwrap(), None);
/// assert!(validate_ip("192.168.1").is_err());
/// assert!(validate_ip("999.1.1.1").is_err());
/// ```
pub fn validate_ip(raw: &str) -> Result<Option<String>> {
    let ip = raw.trim();
    if ip.is_empty() {
        return Ok(None);
    }

    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() != 4 {
        return Err(Error::invalid(
            Field::Ip,
            format!("'{ip}' must have exactly four dot-separated octets"),
        ));
    }

    for octet in octets {
        if octet.is_empty() || octet.len() > 3 || !octet.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::invalid(
                Field::Ip,
                format!("'{ip}' has a malformed octet '{octet}'"),
            ));
        }
        // At most three ASCII digits, so this cannot overflow
        let value: u16 = octet.parse().unwrap_or(u16::MAX);
        if value > 255 {
            return Err(Error::invalid(
                Field::Ip,
                format!("octet {value} in '{ip}' exceeds 255"),
            ));
        }
    }

    Ok(Some(ip.to_string()))
}

/// Validates a port literal.
///
/// Accepts a string made only of ASCII digits. Signs, whitespace inside the
/// literal and base prefixes are rejected.
///
/// # Examples
///
/// ```
/// use rulekeeper::validators::validate_port;
///
/// assert_eq!(validate_port("80").unwrap(), Some("80".to_string()));
/// assert!(validate_port("8o").is_err());
/// assert!(validate_port("-1").is_err());
/// ```
pub fn validate_port(raw: &str) -> Result<Option<String>> {
    let port = raw.trim();
    if port.is_empty() {
        return Ok(None);
    }

    if !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::invalid(
            Field::Port,
            format!("'{port}' must be a number"),
        ));
    }

    Ok(Some(port.to_string()))
}

/// Validates a protocol name (`tcp`, `udp` or `all`, any case).
pub fn validate_protocol(raw: &str) -> Result<Protocol> {
    let protocol = raw.trim();
    protocol.parse::<Protocol>().map_err(|_| {
        Error::invalid(
            Field::Protocol,
            format!("'{protocol}' is not one of tcp, udp, all"),
        )
    })
}

/// Validates a rule action (`allow` or `block`, any case).
pub fn validate_action(raw: &str) -> Result<Action> {
    let action = raw.trim();
    action.parse::<Action>().map_err(|_| {
        Error::invalid(
            Field::Action,
            format!("'{action}' is not one of allow, block"),
        )
    })
}

/// Checks a caller-supplied rule index against the current rule count.
///
/// # Errors
///
/// Returns `IndexOutOfRange` if `index < 0` or `index >= len`.
pub fn validate_index(index: i64, len: usize) -> Result<usize> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < len)
        .ok_or(Error::IndexOutOfRange { index, len })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_validate_ip_accepts_dotted_quads() {
        assert!(validate_ip("0.0.0.0").is_ok());
        assert!(validate_ip("255.255.255.255").is_ok());
        assert!(validate_ip("10.0.0.5").is_ok());
        // 1-3 digits per group, leading zeros included
        assert_eq!(validate_ip("010.001.0.1").unwrap(), Some("010.001.0.1".to_string()));
    }

    #[test]
    fn test_validate_ip_rejects_malformed() {
        for bad in [
            "192.168.1",
            "192.168.1.",
            "192.168.1.1.1",
            "999.1.1.1",
            "256.0.0.1",
            "1.2.3.0004",
            "a.b.c.d",
            "1..2.3",
            "+1.2.3.4",
            "::1",
            "192.168.1.1/24",
        ] {
            let err = validate_ip(bad).unwrap_err();
            assert!(
                matches!(err, Error::InvalidInput { field: Field::Ip, .. }),
                "{bad} should be rejected as ip"
            );
        }
    }

    #[test]
    fn test_validate_ip_empty_means_any() {
        assert_eq!(validate_ip("").unwrap(), None);
        assert_eq!(validate_ip("   ").unwrap(), None);
    }

    #[test]
    fn test_validate_port() {
        assert_eq!(validate_port("80").unwrap(), Some("80".to_string()));
        assert_eq!(validate_port(" 443 ").unwrap(), Some("443".to_string()));
        assert_eq!(validate_port("").unwrap(), None);
        assert!(validate_port("8o").is_err());
        assert!(validate_port("-1").is_err());
        assert!(validate_port("+1").is_err());
        assert!(validate_port("0x50").is_err());
        assert!(validate_port("8 0").is_err());
        // Unicode digits are not port literals
        assert!(validate_port("٨٠").is_err());
    }

    #[test]
    fn test_validate_protocol_case_insensitive() {
        assert_eq!(validate_protocol("TCP").unwrap(), Protocol::Tcp);
        assert_eq!(validate_protocol("udp").unwrap(), Protocol::Udp);
        assert_eq!(validate_protocol("All").unwrap(), Protocol::All);
        assert!(validate_protocol("icmp").is_err());
        assert!(validate_protocol("").is_err());
    }

    #[test]
    fn test_validate_action() {
        assert_eq!(validate_action("Allow").unwrap(), Action::Allow);
        assert_eq!(validate_action("BLOCK").unwrap(), Action::Block);
        let err = validate_action("drop").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidInput {
                field: Field::Action,
                ..
            }
        ));
    }

    #[test]
    fn test_validate_index_bounds() {
        assert!(matches!(
            validate_index(0, 0),
            Err(Error::IndexOutOfRange { index: 0, len: 0 })
        ));
        assert!(matches!(
            validate_index(-1, 5),
            Err(Error::IndexOutOfRange { index: -1, len: 5 })
        ));
        assert_eq!(validate_index(4, 5).unwrap(), 4);
        assert!(validate_index(5, 5).is_err());
    }

    proptest! {
        #[test]
        fn test_ip_accepts_every_in_range_quad(a in 0u16..=255, b in 0u16..=255, c in 0u16..=255, d in 0u16..=255) {
            let ip = format!("{a}.{b}.{c}.{d}");
            prop_assert_eq!(validate_ip(&ip).unwrap(), Some(ip));
        }

        #[test]
        fn test_ip_rejects_out_of_range_octet(bad in 256u16..=999, pos in 0usize..4) {
            let mut octets = ["1", "2", "3", "4"].map(String::from);
            octets[pos] = bad.to_string();
            prop_assert!(validate_ip(&octets.join(".")).is_err());
        }

        #[test]
        fn test_ip_validator_never_panics(input in "\\PC*") {
            let _ = validate_ip(&input);
        }

        #[test]
        fn test_port_accepts_iff_all_ascii_digits(input in "[0-9a-z+-]{1,8}") {
            let accepted = validate_port(&input).is_ok();
            prop_assert_eq!(accepted, input.bytes().all(|b| b.is_ascii_digit()));
        }

        #[test]
        fn test_index_accepted_iff_in_range(index in -5i64..20, len in 0usize..10) {
            let accepted = validate_index(index, len).is_ok();
            prop_assert_eq!(accepted, index >= 0 && (index as usize) < len);
        }
    }
}
