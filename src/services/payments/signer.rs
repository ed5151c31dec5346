use std::fmt;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{AppError, AppResult};

/// Hex SHA-256 of the UTF-8 concatenation of `parts`.
pub fn sha256_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// Computes the checkout integrity hash the gateway uses to detect a
/// tampered redirect: `sha256(reference || amount_in_cents || currency || secret)`.
#[derive(Clone)]
pub struct IntegritySigner {
    secret: Option<String>,
}

impl fmt::Debug for IntegritySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegritySigner")
            .field("configured", &self.secret.is_some())
            .finish()
    }
}

impl IntegritySigner {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn sign(&self, reference: &str, amount_in_cents: i64, currency: &str) -> AppResult<String> {
        let secret = self.secret.as_deref().ok_or_else(|| {
            AppError::Configuration("payment integrity secret is not configured".into())
        })?;
        let amount = amount_in_cents.to_string();
        Ok(sha256_hex(&[reference, &amount, currency, secret]))
    }

    pub fn verify(
        &self,
        reference: &str,
        amount_in_cents: i64,
        currency: &str,
        candidate: &str,
    ) -> AppResult<bool> {
        let expected = self.sign(reference, amount_in_cents, currency)?;
        Ok(constant_time_eq(&expected, &candidate.to_ascii_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> IntegritySigner {
        IntegritySigner::new(Some("test_integrity_secret".into()))
    }

    #[test]
    fn digest_is_sha256_of_the_concatenation() {
        let hash = signer().sign("order-1", 2_490_000, "COP").expect("hash");
        assert_eq!(hash, sha256_hex(&["order-12490000COPtest_integrity_secret"]));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn same_inputs_same_digest() {
        let a = signer().sign("order-1", 1000, "COP").expect("hash");
        let b = signer().sign("order-1", 1000, "COP").expect("hash");
        assert_eq!(a, b);
    }

    #[test]
    fn any_changed_input_changes_digest() {
        let base = signer().sign("order-1", 1000, "COP").expect("hash");
        let variants = [
            signer().sign("order-2", 1000, "COP").expect("hash"),
            signer().sign("order-1", 1001, "COP").expect("hash"),
            signer().sign("order-1", 1000, "USD").expect("hash"),
            IntegritySigner::new(Some("other".into()))
                .sign("order-1", 1000, "COP")
                .expect("hash"),
        ];
        for variant in variants {
            assert_ne!(base, variant);
        }
    }

    #[test]
    fn missing_secret_is_a_configuration_error() {
        let err = IntegritySigner::new(None)
            .sign("order-1", 1000, "COP")
            .expect_err("no secret");
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(!IntegritySigner::new(Some(String::new())).is_configured());
    }

    #[test]
    fn verify_accepts_uppercase_hex() {
        let hash = signer().sign("order-1", 1000, "COP").expect("hash");
        assert!(signer().verify("order-1", 1000, "COP", &hash.to_uppercase()).expect("verify"));
        assert!(!signer().verify("order-1", 999, "COP", &hash).expect("verify"));
    }

    #[test]
    fn digest_comparison_rejects_prefixes_and_mismatches() {
        let hash = signer().sign("order-1", 1000, "COP").expect("hash");
        assert!(constant_time_eq(&hash, &hash.clone()));
        assert!(!constant_time_eq(&hash, &hash[..63]));
        assert!(!constant_time_eq(&hash, ""));
        let mut flipped = hash.clone().into_bytes();
        flipped[0] = if flipped[0] == b'0' { b'1' } else { b'0' };
        assert!(!constant_time_eq(&hash, &String::from_utf8(flipped).expect("hex")));
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", signer());
        assert!(!rendered.contains("test_integrity_secret"));
    }
}
