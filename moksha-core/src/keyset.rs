//! This module defines the `MintKeyset` and `Keysets` structs, which are used for managing keysets in Cashu as described in [Nut-02](https://github.com/cashubtc/nuts/blob/main/02.md)
//!
//! The `MintKeyset` struct represents a keyset for the Mint, with a `private_keys` field for the private keys, a `public_keys` field for the public keys, a `keyset_id` field for the ID of the keyset, and a `mint_pubkey` field for the public key of the Mint.
//!
//! The `MintKeyset` struct provides a `new` method for creating a new keyset from a seed and derivation path.
//!
//! The `Keysets` struct represents a collection of keysets, with a `keysets` field for the keysets and a `current_keyset_id` field for the ID of the current keyset.
//!
//! Both the `MintKeyset` and `Keysets` structs are serializable and deserializable using serde.
//!
//! The module also defines a `generate_hash` function for generating a random hash, and several helper functions for deriving keys and keyset IDs.

use hex::ToHex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use base64::{engine::general_purpose, Engine as _};
use bitcoin_hashes::{sha256, Hash};

use itertools::Itertools;
use rand::RngCore;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use utoipa::ToSchema;

use crate::error::MokshaCoreError;

pub const MAX_ORDER: u64 = 64;

/// Recognized accounting units. Closed set; a new fiat unit is a config-time concern, not
/// a code change (NUT-02).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyUnit {
    #[default]
    Sat,
    Msat,
    Usd,
    Eur,
}

impl std::fmt::Display for CurrencyUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sat => write!(f, "sat"),
            Self::Msat => write!(f, "msat"),
            Self::Usd => write!(f, "usd"),
            Self::Eur => write!(f, "eur"),
        }
    }
}

/// The Lightning-facing payment method a quote is denominated in. Closed set today; a
/// placeholder for future methods, matching the single `Bolt11` arm the engine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Bolt11,
}

pub fn generate_hash() -> String {
    let mut rng = rand::thread_rng();
    let mut random = [0u8; 32];
    rng.fill_bytes(&mut random);
    sha256::Hash::hash(&random).to_string()
}

#[derive(Debug, Clone)]
pub struct MintKeyset {
    pub private_keys: HashMap<u64, SecretKey>,
    pub public_keys: HashMap<u64, PublicKey>,
    pub keyset_id: String,
    pub mint_pubkey: PublicKey,
    pub derivation_path: String,
    pub unit: CurrencyUnit,
    pub input_fee_ppk: u64,
    /// unix seconds; keysets are never deleted, only deactivated.
    pub first_seen: i64,
    pub active: bool,
}

impl MintKeyset {
    pub fn legacy_new(seed: String, derivation_path: String) -> MintKeyset {
        let priv_keys = derive_keys(&seed, &derivation_path);
        let pub_keys = derive_pubkeys(&priv_keys);
        MintKeyset {
            private_keys: priv_keys,
            keyset_id: legacy_derive_keyset_id(&pub_keys),
            public_keys: pub_keys,
            mint_pubkey: derive_pubkey(&seed).expect("invalid seed"),
            derivation_path,
            unit: CurrencyUnit::Sat,
            input_fee_ppk: 0,
            first_seen: current_unix_time(),
            active: true,
        }
    }

    pub fn new(seed: String, derivation_path: String) -> MintKeyset {
        Self::new_with(seed, derivation_path, CurrencyUnit::Sat, 0)
    }

    pub fn new_with(
        seed: String,
        derivation_path: String,
        unit: CurrencyUnit,
        input_fee_ppk: u64,
    ) -> MintKeyset {
        let priv_keys = derive_keys(&seed, &derivation_path);
        let pub_keys = derive_pubkeys(&priv_keys);
        MintKeyset {
            private_keys: priv_keys,
            keyset_id: derive_keyset_id(&pub_keys),
            public_keys: pub_keys,
            mint_pubkey: derive_pubkey(&seed).expect("invalid seed"),
            derivation_path,
            unit,
            input_fee_ppk,
            first_seen: current_unix_time(),
            active: true,
        }
    }

    /// Recomputes the id from the derived public keys and asserts it matches the stored id.
    /// Called on boot for keysets loaded from persistence; a mismatch signals corrupted
    /// seed material or storage and is an invariant violation, not a recoverable error.
    pub fn assert_id_matches_derivation(&self) {
        let recomputed = derive_keyset_id(&self.public_keys);
        assert_eq!(
            self.keyset_id, recomputed,
            "keyset id does not match its derived public keys"
        );
    }
}

fn current_unix_time() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Wire representation of one keyset's public keys, as returned from `/v1/keys`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct V1Keyset {
    pub id: String,
    pub unit: CurrencyUnit,
    #[schema(value_type = std::collections::HashMap<String, String>)]
    pub keys: HashMap<u64, PublicKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct V1Keysets {
    pub keysets: Vec<V1KeysetInfo>,
}

/// Wire representation of one keyset's metadata, as returned from `/v1/keysets`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct V1KeysetInfo {
    pub id: String,
    pub unit: CurrencyUnit,
    pub active: bool,
    pub input_fee_ppk: u64,
}

impl From<&MintKeyset> for V1Keyset {
    fn from(keyset: &MintKeyset) -> Self {
        Self {
            id: keyset.keyset_id.clone(),
            unit: keyset.unit,
            keys: keyset.public_keys.clone(),
        }
    }
}

impl From<&MintKeyset> for V1KeysetInfo {
    fn from(keyset: &MintKeyset) -> Self {
        Self {
            id: keyset.keyset_id.clone(),
            unit: keyset.unit,
            active: keyset.active,
            input_fee_ppk: keyset.input_fee_ppk,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Keysets {
    pub keysets: Vec<String>,
}

impl Keysets {
    pub fn new(keysets: Vec<String>) -> Self {
        Self { keysets }
    }

    pub fn current_keyset(
        &self,
        mint_keys: &HashMap<u64, PublicKey>,
    ) -> Result<String, MokshaCoreError> {
        let computed_id = legacy_derive_keyset_id(mint_keys);
        if self.keysets.contains(&computed_id) {
            Ok(computed_id)
        } else {
            Err(MokshaCoreError::InvalidKeysetid)
        }
    }
}

/// Derives a set of secret keys from a master key using a given derivation path.
///
/// # Arguments
///
/// * `master_key` - A string slice that holds the master key.
/// * `derivation_path` - A string slice that holds the derivation path.
///
/// # Returns
///
/// A HashMap containing the derived secret keys, where the key is a u64 value and the value is a SecretKey.
pub fn derive_keys(master_key: &str, derivation_path: &str) -> HashMap<u64, SecretKey> {
    let mut keys = HashMap::new();
    for i in 0..MAX_ORDER {
        let hash = sha256::Hash::hash(format!("{master_key}{derivation_path}{i}").as_bytes());
        let key = SecretKey::from_slice(hash.as_byte_array()).unwrap();
        keys.insert(2u64.pow(i as u32), key);
    }
    keys
}

/// Derives public keys from a given set of secret keys.
///
/// # Arguments
///
/// * `keys` - A HashMap containing the secret keys to derive public keys from.
///
/// # Returns
///
/// A HashMap containing the derived public keys.
pub fn derive_pubkeys(keys: &HashMap<u64, SecretKey>) -> HashMap<u64, PublicKey> {
    let secp = Secp256k1::new();
    keys.keys()
        .map(|amt| (*amt, keys[amt].public_key(&secp)))
        .collect()
}

/// Derives a keyset ID from a HashMap of public keys.
///
/// # Arguments
///
/// * `keys` - A HashMap of public keys.
///
/// # Returns
///
/// A string representing the derived keyset ID.
pub fn legacy_derive_keyset_id(keys: &HashMap<u64, PublicKey>) -> String {
    let pubkeys_concat = keys
        .iter()
        .sorted_by(|(amt_a, _), (amt_b, _)| amt_a.cmp(amt_b))
        .map(|(_, pubkey)| pubkey)
        .join("");
    let hashed_pubkeys = sha256::Hash::hash(pubkeys_concat.as_bytes()).to_byte_array();
    general_purpose::STANDARD.encode(hashed_pubkeys)[..12].to_string()
}

/// Current-scheme keyset id (NUT-02): `00` followed by the first 14 hex chars of the
/// SHA-256 hash over the ascending-amount-ordered, hex-concatenated public keys.
fn derive_keyset_id(keys: &HashMap<u64, PublicKey>) -> String {
    let pubkeys = keys
        .iter()
        .sorted_by(|(amt_a, _), (amt_b, _)| amt_a.cmp(amt_b))
        .map(|(_, pubkey)| pubkey)
        .join("");
    let hashed_pubkeys: String = sha256::Hash::hash(pubkeys.as_bytes()).encode_hex();
    format!("00{}", &hashed_pubkeys[..14])
}

/// # Arguments
///
/// * `seed` - A string slice representing the seed to derive the public key from.
///
/// # Returns
///
/// Returns a `Result` containing the derived `PublicKey` or a `MokshaCoreError` if an error occurs.
pub fn derive_pubkey(seed: &str) -> Result<PublicKey, MokshaCoreError> {
    let hash = sha256::Hash::hash(seed.as_bytes());
    let key = SecretKey::from_slice(hash.as_byte_array())?;
    let secp = Secp256k1::new();
    Ok(key.public_key(&secp))
}
