//! `userPassword` hashing with Argon2id.
//!
//! Stored values carry the `{ARGON2}` scheme prefix followed by the PHC
//! string, the form OpenLDAP's argon2 module reads.

use std::fmt;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use zeroize::Zeroizing;

use crate::error::{DirectoryError, DirectoryResult};

/// Scheme prefix of every hash produced here.
pub const SCHEME_PREFIX: &str = "{ARGON2}";

/// Argon2id hasher.
///
/// Uses the OWASP recommended parameters by default:
/// - Memory: 19456 KiB (19 MiB)
/// - Iterations: 2
/// - Parallelism: 1
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            params: Params::DEFAULT,
        }
    }

    /// Create a hasher with custom cost parameters.
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> DirectoryResult<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None).map_err(|e| {
            DirectoryError::PasswordHash {
                message: format!("invalid parameters: {e}"),
            }
        })?;
        Ok(Self { params })
    }

    /// Hash `password` into a prefixed `userPassword` value.
    pub fn hash(&self, password: &str) -> DirectoryResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());

        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| DirectoryError::PasswordHash {
                message: e.to_string(),
            })?;

        Ok(format!("{SCHEME_PREFIX}{hash}"))
    }

    /// Check `password` against a stored `userPassword` value.
    ///
    /// Values without the `{ARGON2}` prefix, or with a malformed hash, never
    /// match. Cost parameters are read from the stored value.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        let Some(phc) = strip_scheme(stored) else {
            return false;
        };
        let Ok(parsed) = PasswordHash::new(phc) else {
            return false;
        };

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

fn strip_scheme(stored: &str) -> Option<&str> {
    let prefix = stored.get(..SCHEME_PREFIX.len())?;
    if prefix.eq_ignore_ascii_case(SCHEME_PREFIX) {
        stored.get(SCHEME_PREFIX.len()..)
    } else {
        None
    }
}

/// A password on its way to the directory.
///
/// Holds the freshly computed hash and the plaintext it came from, so that a
/// stored hash can be checked before it is replaced. The plaintext is wiped on
/// drop and never printed.
#[derive(Clone)]
pub struct PasswordCredential {
    plaintext: Zeroizing<String>,
    hashed: String,
}

impl PasswordCredential {
    pub fn new(plaintext: impl Into<String>, hasher: &PasswordHasher) -> DirectoryResult<Self> {
        let plaintext = Zeroizing::new(plaintext.into());
        let hashed = hasher.hash(&plaintext)?;
        Ok(Self { plaintext, hashed })
    }

    /// The hash to store when the current value does not match.
    pub fn hashed(&self) -> &str {
        &self.hashed
    }

    /// Whether an existing stored value already encodes this password.
    pub fn matches(&self, stored: &str) -> bool {
        PasswordHasher::new().verify(&self.plaintext, stored)
    }
}

impl PartialEq for PasswordCredential {
    fn eq(&self, other: &Self) -> bool {
        self.hashed == other.hashed
    }
}

impl Eq for PasswordCredential {}

impl fmt::Debug for PasswordCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordCredential")
            .field("plaintext", &"***REDACTED***")
            .field("hashed", &self.hashed)
            .finish()
    }
}
