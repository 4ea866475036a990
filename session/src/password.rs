//! Salted password hashing.
//!
//! Stored as hex: `password_hash = sha256(salt || password)` with a random
//! 16-byte salt per user.

use rand::RngCore;
use sha2::{Digest, Sha256};

pub fn generate_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-shape comparison of a presented password against the stored
/// hash.
pub fn verify_password(salt: &str, stored_hash: &str, presented: &str) -> bool {
    let computed = hash_password(salt, presented);
    // Compare digests, not strings of differing length.
    computed.len() == stored_hash.len()
        && computed
            .bytes()
            .zip(stored_hash.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Random password for the bootstrap admin account.
pub fn generate_password() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
