use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// Opaque identifier assigned by the store when a record is inserted.
pub type SecretId = String;

/// Stored as bincode-encoded bytes.
/// `ciphertext` is opaque output of a `CryptoProvider`; everything else is
/// plaintext metadata so expiry can be decided without decrypting.
#[derive(Debug, Clone, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct SecretRecord {
    pub id: SecretId,
    /// Ciphertext (value + tag).
    pub ciphertext: Vec<u8>,
    /// Nonce paired with `ciphertext`.
    pub nonce: Vec<u8>,
    /// Maximum number of reveal attempts before the record self-destructs.
    pub view_limit: u32,
    /// Reveal attempts consumed so far.
    pub view_count: u32,
    /// Unix timestamp (seconds) when the record was created.
    pub created_at: i64,
    /// Unix timestamp (seconds) from which the record is expired.
    pub expires_at: i64,
}

impl SecretRecord {
    pub fn from_new(id: SecretId, new: NewSecret) -> Self {
        Self {
            id,
            ciphertext: new.ciphertext.clone(),
            nonce: new.nonce.clone(),
            view_limit: new.view_limit,
            view_count: 0,
            created_at: new.created_at,
            expires_at: new.expires_at,
        }
    }

    /// Returns true once `now` has reached the TTL.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// A record as handed to `SecretStore::insert`, before an id is assigned.
#[derive(Debug, Clone, ZeroizeOnDrop)]
pub struct NewSecret {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub view_limit: u32,
    pub created_at: i64,
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(view_limit: u32, view_count: u32, expires_at: i64) -> SecretRecord {
        SecretRecord {
            id: "abc".into(),
            ciphertext: vec![],
            nonce: vec![0u8; 12],
            view_limit,
            view_count,
            created_at: 1000,
            expires_at,
        }
    }

    #[test]
    fn expiry_is_inclusive_of_the_deadline() {
        let r = make_record(1, 0, 2000);
        assert!(!r.is_expired(1999));
        assert!(r.is_expired(2000));
        assert!(r.is_expired(2001));
    }

    #[test]
    fn from_new_starts_at_zero_views() {
        let new = NewSecret {
            ciphertext: vec![1, 2, 3],
            nonce: vec![9; 12],
            view_limit: 2,
            created_at: 10,
            expires_at: 70,
        };
        let r = SecretRecord::from_new("id1".into(), new);
        assert_eq!(r.id, "id1");
        assert_eq!(r.view_count, 0);
        assert_eq!(r.view_limit, 2);
        assert_eq!(r.ciphertext, vec![1, 2, 3]);
    }
}
