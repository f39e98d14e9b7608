//! Parsing and evaluation of proof secrets, including `WellKnownSecret` spending conditions
//! (P2PK, HTLC, SCT) as described in NUT-10/NUT-11/NUT-14.
//!
//! A proof's `secret` field is an opaque bytestring from the engine's point of view; this
//! module is only consulted once a secret parses as a tagged `WellKnownSecret` array.

use bitcoin_hashes::{sha256, Hash};
use secp256k1::{schnorr, PublicKey};
use serde::{Deserialize, Serialize};

use crate::error::MokshaCoreError;

pub const MAX_SECRET_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SigFlag {
    #[default]
    SigInputs,
    SigAll,
}

/// Tags are serialized as `[[key, values...], ...]` on the wire; this wrapper gives
/// typed accessors over that shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags(pub Vec<Vec<String>>);

impl Tags {
    fn find(&self, key: &str) -> Option<&Vec<String>> {
        self.0.iter().find(|t| t.first().map(String::as_str) == Some(key))
    }

    pub fn sigflag(&self) -> SigFlag {
        match self.find("sigflag").and_then(|t| t.get(1)) {
            Some(v) if v == "SIG_ALL" => SigFlag::SigAll,
            _ => SigFlag::SigInputs,
        }
    }

    pub fn locktime(&self) -> Option<i64> {
        self.find("locktime")?.get(1)?.parse().ok()
    }

    pub fn n_sigs(&self) -> u64 {
        self.find("n_sigs")
            .and_then(|t| t.get(1))
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
    }

    pub fn pubkeys(&self) -> Vec<String> {
        self.find("pubkeys")
            .map(|t| t[1..].to_vec())
            .unwrap_or_default()
    }

    pub fn refund_pubkeys(&self) -> Vec<String> {
        self.find("refund")
            .map(|t| t[1..].to_vec())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellKnownSecretInner {
    pub nonce: String,
    pub data: String,
    #[serde(default)]
    pub tags: Tags,
}

/// A structured secret, parsed from the two-element JSON array `["KIND", {..}]` wire shape.
#[derive(Debug, Clone)]
pub enum WellKnownSecret {
    P2pk(WellKnownSecretInner),
    Htlc(WellKnownSecretInner),
    Sct(WellKnownSecretInner),
}

impl WellKnownSecret {
    pub fn parse(raw: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        let arr = value.as_array()?;
        if arr.len() != 2 {
            return None;
        }
        let kind = arr[0].as_str()?;
        let inner: WellKnownSecretInner = serde_json::from_value(arr[1].clone()).ok()?;
        match kind {
            "P2PK" => Some(Self::P2pk(inner)),
            "HTLC" => Some(Self::Htlc(inner)),
            "SCT" => Some(Self::Sct(inner)),
            _ => None,
        }
    }
}

/// Witness data attached to a `Proof` to satisfy its secret's spending condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, utoipa::ToSchema)]
pub struct Witness {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub signatures: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub preimage: Option<String>,
    /// SCT: the revealed alternative secret behind the committed Merkle root.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub leaf_secret: Option<String>,
    /// SCT: sibling hashes from leaf to root, hex-encoded.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub merkle_proof: Vec<String>,
}

/// Whether a secret's tags demand a combined `SIG_ALL` signature rather than one scoped to
/// this single input. Only P2PK and HTLC secrets carry a sigflag; anything else is `false`.
pub fn is_sig_all(secret: &str) -> bool {
    match WellKnownSecret::parse(secret) {
        Some(WellKnownSecret::P2pk(inner)) | Some(WellKnownSecret::Htlc(inner)) => {
            inner.tags.sigflag() == SigFlag::SigAll
        }
        _ => false,
    }
}

/// Evaluates whether `witness` satisfies the spending condition encoded in `secret` for a
/// single input proof. `message` is the exact byte string the witness signatures (if any)
/// must cover: `secret` itself under `SIG_INPUTS`, or the concatenation of all input
/// secrets and output `B_` values under `SIG_ALL`.
pub fn verify_secret(
    secret: &str,
    witness: Option<&Witness>,
    sig_all_message: Option<&[u8]>,
) -> Result<(), MokshaCoreError> {
    if secret.len() > MAX_SECRET_LEN {
        return Err(MokshaCoreError::SecretTooLong);
    }

    let Some(parsed) = WellKnownSecret::parse(secret) else {
        // Plain opaque secret: no spending condition beyond length, already checked.
        return Ok(());
    };

    match parsed {
        WellKnownSecret::P2pk(inner) => verify_p2pk(&inner, secret, witness, sig_all_message),
        WellKnownSecret::Htlc(inner) => verify_htlc(&inner, secret, witness, sig_all_message),
        WellKnownSecret::Sct(inner) => verify_sct(&inner, witness, sig_all_message),
    }
}

fn verify_sct(
    inner: &WellKnownSecretInner,
    witness: Option<&Witness>,
    sig_all_message: Option<&[u8]>,
) -> Result<(), MokshaCoreError> {
    let witness = witness
        .ok_or_else(|| MokshaCoreError::ConditionFailed("SCT witness missing".to_string()))?;
    let leaf_secret = witness
        .leaf_secret
        .as_ref()
        .ok_or_else(|| MokshaCoreError::ConditionFailed("SCT leaf_secret missing".to_string()))?;

    if !verify_sct_branch(leaf_secret, &inner.data, &witness.merkle_proof) {
        return Err(MokshaCoreError::ConditionFailed(
            "SCT branch does not fold to the committed root".to_string(),
        ));
    }

    // The revealed leaf is itself a secret (plain or well-known) evaluated against the
    // same witness, so a nested P2PK/HTLC leaf can still find its signature/preimage.
    verify_secret(leaf_secret, Some(witness), sig_all_message)
}

fn verify_p2pk(
    inner: &WellKnownSecretInner,
    secret: &str,
    witness: Option<&Witness>,
    sig_all_message: Option<&[u8]>,
) -> Result<(), MokshaCoreError> {
    let tags = &inner.tags;

    if let Some(locktime) = tags.locktime() {
        let now = current_unix_time();
        if now >= locktime {
            // past locktime: refund pubkeys (if any) may spend unconditionally spendable otherwise
            if tags.refund_pubkeys().is_empty() {
                return Ok(());
            }
            return verify_signatures(
                &tags.refund_pubkeys(),
                1,
                secret,
                witness,
                sig_all_message,
            );
        }
    }

    let mut permitted = vec![inner.data.clone()];
    permitted.extend(tags.pubkeys());
    verify_signatures(&permitted, tags.n_sigs(), secret, witness, sig_all_message)
}

fn verify_htlc(
    inner: &WellKnownSecretInner,
    secret: &str,
    witness: Option<&Witness>,
    sig_all_message: Option<&[u8]>,
) -> Result<(), MokshaCoreError> {
    let witness = witness.ok_or_else(|| {
        MokshaCoreError::ConditionFailed("HTLC witness missing".to_string())
    })?;
    let preimage = witness
        .preimage
        .as_ref()
        .ok_or_else(|| MokshaCoreError::ConditionFailed("HTLC preimage missing".to_string()))?;

    let preimage_bytes = hex::decode(preimage)
        .map_err(|_| MokshaCoreError::ConditionFailed("HTLC preimage not hex".to_string()))?;
    let computed = sha256::Hash::hash(&preimage_bytes).to_string();
    if computed != inner.data {
        return Err(MokshaCoreError::ConditionFailed(
            "HTLC preimage does not match hash".to_string(),
        ));
    }

    let tags = &inner.tags;
    if tags.pubkeys().is_empty() {
        return Ok(());
    }
    verify_signatures(&tags.pubkeys(), tags.n_sigs(), secret, witness, sig_all_message)
}

fn verify_signatures(
    permitted_pubkeys: &[String],
    n_sigs: u64,
    secret: &str,
    witness: Option<&Witness>,
    sig_all_message: Option<&[u8]>,
) -> Result<(), MokshaCoreError> {
    let witness = witness
        .ok_or_else(|| MokshaCoreError::ConditionFailed("witness missing".to_string()))?;

    let message = sig_all_message.unwrap_or(secret.as_bytes());

    let mut distinct_valid = std::collections::HashSet::new();
    for sig_hex in &witness.signatures {
        let Ok(sig_bytes) = hex::decode(sig_hex) else {
            continue;
        };
        let Ok(sig) = schnorr::Signature::from_slice(&sig_bytes) else {
            continue;
        };
        for pk_hex in permitted_pubkeys {
            if distinct_valid.contains(pk_hex) {
                continue;
            }
            let Ok(pk_bytes) = hex::decode(pk_hex) else {
                continue;
            };
            let Ok(full_pk) = PublicKey::from_slice(&pk_bytes) else {
                continue;
            };
            let (xonly, _parity) = full_pk.x_only_public_key();
            let secp = secp256k1::Secp256k1::verification_only();
            let digest = sha256::Hash::hash(message);
            if secp
                .verify_schnorr(&sig, digest.as_byte_array(), &xonly)
                .is_ok()
            {
                distinct_valid.insert(pk_hex.clone());
                break;
            }
        }
    }

    if distinct_valid.len() as u64 >= n_sigs {
        Ok(())
    } else {
        Err(MokshaCoreError::ConditionFailed(format!(
            "need {n_sigs} valid signatures, got {}",
            distinct_valid.len()
        )))
    }
}

fn current_unix_time() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Sorted-pair hashing rule used by the secret-commitment tree: `H(a,b) = SHA256(min(a,b) ∥ max(a,b))`.
/// Makes the tree direction-independent.
pub fn hash_pair(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(lo);
    buf.extend_from_slice(hi);
    *sha256::Hash::hash(&buf).as_byte_array()
}

/// Verifies a secret-commitment-tree leaf against the published Merkle root, folding the
/// branch bottom-up with [`hash_pair`].
pub fn verify_sct_branch(leaf_secret: &str, root_hex: &str, merkle_proof: &[String]) -> bool {
    let leaf_hash = *sha256::Hash::hash(leaf_secret.as_bytes()).as_byte_array();
    let Ok(root) = hex::decode(root_hex) else {
        return false;
    };
    if root.len() != 32 {
        return false;
    }

    let mut current = leaf_hash;
    for sibling_hex in merkle_proof {
        let Ok(sibling_vec) = hex::decode(sibling_hex) else {
            return false;
        };
        let Ok(sibling): Result<[u8; 32], _> = sibling_vec.try_into() else {
            return false;
        };
        current = hash_pair(&current, &sibling);
    }

    current.as_slice() == root.as_slice()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_parse() {
        let tags = Tags(vec![
            vec!["sigflag".to_string(), "SIG_ALL".to_string()],
            vec!["n_sigs".to_string(), "2".to_string()],
            vec![
                "pubkeys".to_string(),
                "aa".to_string(),
                "bb".to_string(),
            ],
        ]);
        assert_eq!(tags.sigflag(), SigFlag::SigAll);
        assert_eq!(tags.n_sigs(), 2);
        assert_eq!(tags.pubkeys(), vec!["aa".to_string(), "bb".to_string()]);
    }

    #[test]
    fn test_is_sig_all_reads_sigflag_tag() {
        let sig_all = serde_json::json!(["P2PK", {
            "nonce": "n",
            "data": "02aa",
            "tags": [["sigflag", "SIG_ALL"]],
        }])
        .to_string();
        assert!(is_sig_all(&sig_all));

        let sig_inputs = serde_json::json!(["P2PK", {
            "nonce": "n",
            "data": "02aa",
            "tags": [],
        }])
        .to_string();
        assert!(!is_sig_all(&sig_inputs));
        assert!(!is_sig_all("a plain opaque secret"));
    }

    #[test]
    fn test_plain_secret_has_no_condition() -> anyhow::Result<()> {
        verify_secret("just a random nonce", None, None)?;
        Ok(())
    }

    #[test]
    fn test_secret_too_long_rejected() {
        let secret = "a".repeat(MAX_SECRET_LEN + 1);
        assert!(verify_secret(&secret, None, None).is_err());
    }

    #[test]
    fn test_htlc_preimage_mismatch_rejected() {
        let hash = sha256::Hash::hash(b"correct preimage").to_string();
        let secret = serde_json::json!(["HTLC", {
            "nonce": "n",
            "data": hash,
            "tags": [],
        }])
        .to_string();

        let witness = Witness {
            preimage: Some(hex::encode(b"wrong preimage!!")),
            ..Default::default()
        };
        assert!(verify_secret(&secret, Some(&witness), None).is_err());
    }

    #[test]
    fn test_htlc_preimage_match_accepted() -> anyhow::Result<()> {
        let preimage = b"the correct preimage";
        let hash = sha256::Hash::hash(preimage).to_string();
        let secret = serde_json::json!(["HTLC", {
            "nonce": "n",
            "data": hash,
            "tags": [],
        }])
        .to_string();

        let witness = Witness {
            preimage: Some(hex::encode(preimage)),
            ..Default::default()
        };
        verify_secret(&secret, Some(&witness), None)?;
        Ok(())
    }

    #[test]
    fn test_sct_branch_roundtrip() {
        let leaf_a = *sha256::Hash::hash(b"alternative-a").as_byte_array();
        let leaf_b = *sha256::Hash::hash(b"alternative-b").as_byte_array();
        let root = hash_pair(&leaf_a, &leaf_b);

        assert!(verify_sct_branch(
            "alternative-a",
            &hex::encode(root),
            &[hex::encode(leaf_b)]
        ));
        assert!(!verify_sct_branch(
            "alternative-a",
            &hex::encode(root),
            &[hex::encode(leaf_a)]
        ));
    }

    #[test]
    fn test_sct_secret_evaluates_leaf() -> anyhow::Result<()> {
        let leaf_a = "plain-alternative-a";
        let leaf_b = *sha256::Hash::hash(b"plain-alternative-b").as_byte_array();
        let root = hash_pair(
            sha256::Hash::hash(leaf_a.as_bytes()).as_byte_array(),
            &leaf_b,
        );

        let secret = serde_json::json!(["SCT", {
            "nonce": "n",
            "data": hex::encode(root),
            "tags": [],
        }])
        .to_string();

        let witness = Witness {
            signatures: vec![],
            preimage: None,
            leaf_secret: Some(leaf_a.to_string()),
            merkle_proof: vec![hex::encode(leaf_b)],
        };
        verify_secret(&secret, Some(&witness), None)?;

        let bad_witness = Witness {
            leaf_secret: Some("not-the-leaf".to_string()),
            ..witness
        };
        assert!(verify_secret(&secret, Some(&bad_witness), None).is_err());
        Ok(())
    }
}
