use std::fmt;

use crate::hub::{HubError, HubResult};

pub const SALT_LEN: usize = 32;

pub type Salt = [u8; SALT_LEN];

/// Argon2 hash (PHC string) of the password with a per-user salt appended.
#[derive(Clone)]
pub struct HashedPassword {
    hash: String,
    salt: Salt,
}

impl HashedPassword {
    /// Hash with a fresh random salt. Argon2 is slow: call this off the
    /// registry lock and off the async workers.
    pub fn new(password: &str) -> Self {
        let salt: Salt = rand::random();
        let hash = password_auth::generate_hash(salted(password, &salt));
        Self { hash, salt }
    }

    pub fn verify(&self, password: &str) -> HubResult<()> {
        password_auth::verify_password(salted(password, &self.salt), &self.hash)
            .map_err(|_| HubError::InvalidCredentials)
    }
}

impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("HashedPassword(..)")
    }
}

fn salted(password: &str, salt: &Salt) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(password.len() + SALT_LEN);
    bytes.extend_from_slice(password.as_bytes());
    bytes.extend_from_slice(salt);
    bytes
}
