use anyhow::{Context, Result};
use argon2::{password_hash::SaltString, Argon2, Params, PasswordHasher};
use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

/// Symmetric encrypt/decrypt capability consumed by `SecretService`.
///
/// `encrypt` must generate a fresh nonce on every call. `decrypt` must fail
/// on any ciphertext/nonce pair it did not produce (tampering, truncation,
/// wrong key).
pub trait CryptoProvider: Send + Sync {
    /// Encrypt `plaintext`, returning `(ciphertext, nonce)`.
    fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)>;

    fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>>;
}

/// 32-byte encryption key, either random or derived from a master passphrase.
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Generate a fresh random key.
pub fn generate_key() -> EncryptionKey {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    EncryptionKey(key)
}

/// Load a key from raw bytes. Returns `None` unless exactly 32 bytes are given.
pub fn load_key(bytes: &[u8]) -> Option<EncryptionKey> {
    let key: [u8; KEY_LEN] = bytes.try_into().ok()?;
    Some(EncryptionKey(key))
}

/// Derive a 32-byte encryption key from `master_key` and `salt` using Argon2id.
/// The salt is persisted (`burnote.salt`) and reused across restarts.
pub fn derive_key(master_key: &str, salt: &[u8; 32]) -> Result<EncryptionKey> {
    let salt_string =
        SaltString::encode_b64(salt).map_err(|e| anyhow::anyhow!("invalid salt for argon2: {e}"))?;

    let params = Params::new(
        65536, // m_cost: 64 MiB
        3,     // t_cost: 3 iterations
        1,     // p_cost: 1 lane
        Some(KEY_LEN),
    )
    .map_err(|e| anyhow::anyhow!("argon2 params: {e}"))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let hash = argon2
        .hash_password(master_key.as_bytes(), &salt_string)
        .map_err(|e| anyhow::anyhow!("argon2 hash: {e}"))?;

    let output = hash.hash.context("no hash output")?;
    load_key(output.as_bytes()).context("argon2 output has unexpected length")
}

/// Generate a fresh 32-byte random salt.
pub fn generate_salt() -> [u8; 32] {
    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// ChaCha20-Poly1305 with a random 96-bit nonce per message.
pub struct ChaChaCrypto {
    key: EncryptionKey,
}

impl ChaChaCrypto {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(self.key.as_bytes()))
    }
}

impl CryptoProvider for ChaChaCrypto {
    fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let ciphertext = self
            .cipher()
            .encrypt(&nonce, plaintext)
            .map_err(|e| anyhow::anyhow!("encrypt: {e}"))?;

        Ok((ciphertext, nonce_bytes.to_vec()))
    }

    fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
        let nonce_bytes: [u8; NONCE_LEN] = nonce
            .try_into()
            .map_err(|_| anyhow::anyhow!("nonce must be {NONCE_LEN} bytes, got {}", nonce.len()))?;

        self.cipher()
            .decrypt(&Nonce::from(nonce_bytes), ciphertext)
            .map_err(|e| anyhow::anyhow!("decrypt: {e}"))
    }
}
