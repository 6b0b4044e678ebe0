//! Password scramble for the authentication handshake.
//!
//! The server never sees the password. It sends a random seed in its
//! [`Handshake`](canal_protocol::Handshake) and the client answers with a
//! token that proves knowledge of the password for that seed only:
//!
//! ```text
//! h1    = SHA1(password)
//! h2    = SHA1(h1)
//! h3    = SHA1(seed ‖ h2)
//! token = h3 XOR h1
//! ```
//!
//! This is the MySQL `mysql_native_password` scramble. The server stores
//! `h2` and can recover `h1` from the token, then check `SHA1(h1) == h2`,
//! so the output must match bit for bit.

use ring::digest::{self, SHA1_FOR_LEGACY_USE_ONLY};

/// Length of a SHA-1 digest, and so of every non-empty token.
pub const TOKEN_LEN: usize = 20;

/// Derives the authentication token for `secret` and `seed`.
///
/// An empty secret means "no authentication" and yields an empty token;
/// no hashing is done in that case.
pub fn derive_token(secret: &[u8], seed: &[u8]) -> Vec<u8> {
    if secret.is_empty() {
        return Vec::new();
    }

    let h1 = digest::digest(&SHA1_FOR_LEGACY_USE_ONLY, secret);
    let h2 = digest::digest(&SHA1_FOR_LEGACY_USE_ONLY, h1.as_ref());

    let mut ctx = digest::Context::new(&SHA1_FOR_LEGACY_USE_ONLY);
    ctx.update(seed);
    ctx.update(h2.as_ref());
    let h3 = ctx.finish();

    h3.as_ref()
        .iter()
        .zip(h1.as_ref())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// The value placed in [`ClientAuth::password`](canal_protocol::ClientAuth):
/// the token as lowercase hex, or empty bytes for an empty secret.
pub fn encode_password(secret: &str, seed: &[u8]) -> Vec<u8> {
    let token = derive_token(secret.as_bytes(), seed);
    if token.is_empty() {
        return Vec::new();
    }
    hex::encode(token).into_bytes()
}
