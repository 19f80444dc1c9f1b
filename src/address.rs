//! Découpage `local@domain` effectué avant toute activité réseau.

use crate::smtp_verify::ProbeError;

/// The two halves of an address that passed the format check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address<'a> {
    pub local: &'a str,
    pub domain: &'a str,
}

/// Splits `email` on its single `@`. Returns `None` unless there is exactly one
/// `@` with a non-empty part on each side.
pub fn split_address(email: &str) -> Option<Address<'_>> {
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(Address { local, domain })
}

/// Domain part of `email`, or [`ProbeError::InvalidFormat`].
pub fn extract_domain(email: &str) -> Result<&str, ProbeError> {
    split_address(email)
        .map(|address| address.domain)
        .ok_or(ProbeError::InvalidFormat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn splits_simple_address() {
        let address = split_address("user@example.com").expect("valid address");
        assert_eq!(address.local, "user");
        assert_eq!(address.domain, "example.com");
    }

    #[test]
    fn rejects_missing_or_extra_at() {
        assert!(split_address("user.example.com").is_none());
        assert!(split_address("a@b@example.com").is_none());
        assert!(split_address("@example.com").is_none());
        assert!(split_address("user@").is_none());
        assert!(split_address("").is_none());
    }

    #[test]
    fn extract_domain_reports_invalid_format() {
        assert_eq!(extract_domain("hello@example.org").ok(), Some("example.org"));
        let err = extract_domain("nope").expect_err("no @ should fail");
        assert!(matches!(err, ProbeError::InvalidFormat));
    }

    proptest! {
        #[test]
        fn without_at_sign_is_never_split(s in "[^@]*") {
            prop_assert!(split_address(&s).is_none());
        }

        #[test]
        fn more_than_one_at_sign_is_never_split(
            a in "[a-z]{0,8}",
            b in "[a-z]{0,8}",
            c in "[a-z]{0,8}",
        ) {
            let input = format!("{a}@{b}@{c}");
            prop_assert!(split_address(&input).is_none());
        }

        #[test]
        fn single_at_with_both_parts_splits(local in "[a-z0-9.]{1,16}", domain in "[a-z0-9.-]{1,24}") {
            let input = format!("{local}@{domain}");
            let address = split_address(&input).expect("well-formed input");
            prop_assert_eq!(address.local, local.as_str());
            prop_assert_eq!(address.domain, domain.as_str());
        }
    }
}
