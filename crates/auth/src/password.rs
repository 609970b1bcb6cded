//! Salted password hashing (PBKDF2-HMAC-SHA256).
//!
//! Stored credentials are a hex hash plus a hex salt. The salt's hex text is
//! fed to PBKDF2 as-is, which keeps hashes created by earlier deployments valid.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Iteration count for every production credential.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Random bytes per salt (hex-encoded to twice this many characters).
pub const SALT_BYTES: usize = 32;

const HASH_BYTES: usize = 32;

/// A derived credential as persisted on the identity row.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash {
    pub hash: String,
    pub salt: String,
}

impl core::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PasswordHash").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialHasher {
    iterations: u32,
}

impl CredentialHasher {
    pub fn new() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }

    /// Hasher with a non-standard work factor. Tests only: hashes produced
    /// this way do not verify against the production hasher.
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn generate_salt() -> String {
        let mut bytes = [0u8; SALT_BYTES];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Hash `password`, generating a fresh salt unless one is supplied.
    pub fn hash(&self, password: &str, salt: Option<&str>) -> PasswordHash {
        let salt = salt.map(str::to_owned).unwrap_or_else(Self::generate_salt);
        let hash = derive(password, &salt, self.iterations);
        PasswordHash { hash, salt }
    }

    /// Recompute with the stored salt and compare in constant time.
    pub fn verify(&self, password: &str, stored_hash: &str, salt: &str) -> bool {
        let computed = derive(password, salt, self.iterations);
        computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
    }
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new()
    }
}

fn derive(password: &str, salt: &str, iterations: u32) -> String {
    let mut out = [0u8; HASH_BYTES];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut out);
    hex::encode(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fast() -> CredentialHasher {
        CredentialHasher::with_iterations(64)
    }

    #[test]
    fn production_work_factor() {
        assert_eq!(CredentialHasher::new().iterations(), 100_000);
        assert_eq!(CredentialHasher::with_iterations(0).iterations(), 1);
    }

    #[test]
    fn matches_rfc7914_vector() {
        // PBKDF2-HMAC-SHA256("passwd", "salt", c = 1), first 32 bytes.
        let hashed = CredentialHasher::with_iterations(1).hash("passwd", Some("salt"));
        assert_eq!(
            hashed.hash,
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    #[test]
    fn fresh_salts_are_hex_and_distinct() {
        let a = CredentialHasher::generate_salt();
        let b = CredentialHasher::generate_salt();
        assert_eq!(a.len(), SALT_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn same_password_different_salt_differs() {
        let h = fast();
        let a = h.hash("hunter22", None);
        let b = h.hash("hunter22", None);
        assert_ne!(a.hash, b.hash);
        assert!(h.verify("hunter22", &a.hash, &a.salt));
        assert!(h.verify("hunter22", &b.hash, &b.salt));
    }

    #[test]
    fn truncated_or_empty_hash_never_verifies() {
        let h = fast();
        let stored = h.hash("pw", None);
        assert!(!h.verify("pw", &stored.hash[..10], &stored.salt));
        assert!(!h.verify("pw", "", &stored.salt));
    }

    #[test]
    fn debug_does_not_leak_material() {
        let stored = fast().hash("pw", Some("abc"));
        let rendered = format!("{stored:?}");
        assert!(!rendered.contains(&stored.hash));
        assert!(!rendered.contains("abc"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn hash_then_verify(p in ".{0,24}") {
            let h = fast();
            let stored = h.hash(&p, None);
            prop_assert!(h.verify(&p, &stored.hash, &stored.salt));
        }

        #[test]
        fn different_password_fails(p1 in "[a-z]{1,12}", p2 in "[a-z]{1,12}") {
            prop_assume!(p1 != p2);
            let h = fast();
            let stored = h.hash(&p2, None);
            prop_assert!(!h.verify(&p1, &stored.hash, &stored.salt));
        }
    }
}
