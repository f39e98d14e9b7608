//! Stateless checks shared by `swap`, `mint` and `melt`: balance arithmetic, per-keyset
//! input fees (NUT-05), duplicate detection, and delegating spending-condition checks
//! (NUT-10/11/14) down to [`moksha_core::secret::verify_secret`].
//!
//! None of these functions touch the database directly - callers are responsible for the
//! promise/spent/pending ledger lookups that decide whether a proof has already been used.

use std::collections::{HashMap, HashSet};

use moksha_core::{
    blind::BlindedMessage, dhke::Dhke, keyset::MintKeyset, proof::Proof, proof::Proofs,
};
use secp256k1::PublicKey;

use crate::error::MokshaMintError;

/// Sums each input's `input_fee_ppk` and rounds up to the next whole unit, per NUT-05.
pub fn calc_fee(
    proofs: &Proofs,
    keysets: &HashMap<String, MintKeyset>,
) -> Result<u64, MokshaMintError> {
    let mut ppk_sum = 0u64;
    for proof in proofs.proofs() {
        let keyset = keysets
            .get(&proof.keyset_id)
            .ok_or_else(|| MokshaMintError::KeysetUnknown(proof.keyset_id.clone()))?;
        ppk_sum += keyset.input_fee_ppk;
    }
    Ok(ppk_sum.div_ceil(1000))
}

pub fn ensure_no_duplicate_outputs(
    outputs: &[moksha_core::blind::BlindedMessage],
) -> Result<(), MokshaMintError> {
    let mut seen = HashSet::new();
    for output in outputs {
        if !seen.insert(output.b_) {
            return Err(MokshaMintError::OutputAlreadySigned(output.b_.to_string()));
        }
    }
    Ok(())
}

pub fn ensure_no_duplicate_inputs(proofs: &Proofs) -> Result<(), MokshaMintError> {
    let mut seen = HashSet::new();
    for proof in proofs.proofs() {
        if !seen.insert(proof.secret.clone()) {
            return Err(MokshaMintError::ProofAlreadySpent(proof.secret));
        }
    }
    Ok(())
}

/// `Y = hash_to_curve(secret)` for every input, the index the spent/pending ledgers use.
pub fn ys_for(proofs: &Proofs) -> Vec<PublicKey> {
    proofs
        .proofs()
        .iter()
        .map(|p| Dhke::hash_to_curve(p.secret.as_bytes()))
        .collect()
}

/// Whether any input in `proofs` carries a `SIG_ALL` secret - if so, every input's
/// signature must be verified against [`sig_all_message`] instead of its own `secret`.
pub fn needs_sig_all(proofs: &Proofs) -> bool {
    proofs
        .proofs()
        .iter()
        .any(|p| moksha_core::secret::is_sig_all(&p.secret))
}

/// The byte string a `SIG_ALL` signature covers: every input secret followed by every
/// output `B_`, each in request order. Matches NUT-11's "all input and output blinded
/// messages" binding so a single signature can't be replayed onto a different swap/melt.
pub fn sig_all_message(proofs: &Proofs, outputs: &[BlindedMessage]) -> Vec<u8> {
    let mut message = String::new();
    for proof in proofs.proofs() {
        message.push_str(&proof.secret);
    }
    for output in outputs {
        message.push_str(&output.b_.to_string());
    }
    message.into_bytes()
}

/// Verifies a single input's BDHKE signature and its spending condition, if any. Callers
/// pass `sig_all_message` only when the secret carries a P2PK `SIG_ALL` flag, which binds
/// the signature to the whole swap/melt request rather than just this one proof.
pub fn verify_input(
    dhke: &Dhke,
    keyset: &MintKeyset,
    proof: &Proof,
    sig_all_message: Option<&[u8]>,
) -> Result<(), MokshaMintError> {
    let private_key = keyset.private_keys.get(&proof.amount).ok_or_else(|| {
        MokshaMintError::AmountUnbalanced(format!(
            "keyset {} has no key for amount {}",
            keyset.keyset_id, proof.amount
        ))
    })?;

    let valid = dhke
        .verify(*private_key, proof.c, proof.secret.clone())
        .map_err(|_| MokshaMintError::SignatureVerification(proof.secret.clone()))?;
    if !valid {
        return Err(MokshaMintError::SignatureVerification(proof.secret.clone()));
    }

    moksha_core::secret::verify_secret(&proof.secret, proof.witness.as_ref(), sig_all_message)
        .map_err(|err| MokshaMintError::ConditionFailed(err.to_string()))
}
