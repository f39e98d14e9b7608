//! This module defines the basic crypto primitives for Blind Diffie-Hellman Key Exchange (blind ecash).
//!
//! Implementation of [RubenSomsen/Blind-DH-ecash.md](https://gist.github.com/RubenSomsen/be7a4760dd4596d06963d67baf140406)
//!
//! Bob (Mint):
//!```python
//! A = a*G
//! return A
//! ```
//!
//!
//! Alice (Client):
//!```python
//! Y = hash_to_curve(secret_message)
//! r = random blinding factor
//! B'= Y + r*G
//! return B'
//! ```
//!
//!
//! Bob:
//!```python
//! C' = a*B'
//! (= a*Y + a*r*G)
//! return C'
//!```
//!
//! Alice:
//!```python
//! C = C' - r*A
//! (= C' - a*r*G)
//! (= a*Y)
//! return C, secret_message
//!```
//!
//! Bob:
//!```python
//! Y = hash_to_curve(secret_message)
//! C == a*Y
//!```
//! If true, C must have originated from Bob
//!
use crate::error::MokshaCoreError;
use bitcoin_hashes::{sha256, Hash};
use rand::thread_rng;
use secp256k1::{All, PublicKey, Scalar, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use std::iter::once;

/// Discrete-log-equality transcript attached to a promise, proving the
/// signer used the same private key `a` as published in the keyset's
/// public key for that denomination.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
pub struct DleqProof {
    #[schema(value_type = String)]
    pub e: SecretKey,
    #[schema(value_type = String)]
    pub s: SecretKey,
}

#[derive(Clone, Debug)]
pub struct Dhke {
    secp: Secp256k1<All>,
}

impl Default for Dhke {
    fn default() -> Self {
        Self::new()
    }
}

impl Dhke {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    fn get_hash(message: &[u8]) -> Vec<u8> {
        let hash = sha256::Hash::hash(message);
        hash.as_byte_array().to_vec()
    }

    /// Generates a point from the message hash and checks if the point lies on the curve.
    /// If it does not, iteratively tries to compute a new point from the hash.
    ///
    /// Exposed publicly as `Y` in NUT-07 proof-state lookups: the mint indexes its
    /// spent/pending ledgers by this value rather than by the raw secret.
    pub fn hash_to_curve(message: &[u8]) -> PublicKey {
        let mut point: Option<PublicKey> = None;
        let mut msg_to_hash = message.to_vec();
        while point.is_none() {
            let hash = Self::get_hash(&msg_to_hash);
            let input = &once(&0x02).chain(hash.iter()).cloned().collect::<Vec<u8>>();
            PublicKey::from_slice(input).map_or_else(|_| msg_to_hash = hash, |p| point = Some(p))
        }
        point.unwrap()
    }

    pub fn step1_alice(
        &self,
        secret_msg: impl Into<String>,
        blinding_factor: Option<&[u8]>,
    ) -> Result<(PublicKey, SecretKey), MokshaCoreError> {
        let mut rng = rand::thread_rng();

        let y = Self::hash_to_curve(secret_msg.into().as_bytes());
        let secret_key = match blinding_factor {
            Some(f) => SecretKey::from_slice(f)?,
            None => SecretKey::new(&mut rng),
        };
        let b = y.combine(&PublicKey::from_secret_key(&self.secp, &secret_key))?;
        Ok((b, secret_key))
    }

    pub fn step2_bob(&self, b: PublicKey, a: &SecretKey) -> Result<PublicKey, MokshaCoreError> {
        b.mul_tweak(&self.secp, &Scalar::from(*a))
            .map_err(MokshaCoreError::Secp256k1Error)
    }

    pub fn step3_alice(
        &self,
        c_: PublicKey,
        r: SecretKey,
        a: PublicKey,
    ) -> Result<PublicKey, MokshaCoreError> {
        c_.combine(
            &a.mul_tweak(&self.secp, &Scalar::from(r))
                .map_err(MokshaCoreError::Secp256k1Error)?
                .negate(&self.secp),
        )
        .map_err(MokshaCoreError::Secp256k1Error)
    }

    pub fn verify(
        &self,
        a: SecretKey,
        c: PublicKey,
        secret_msg: impl Into<String>,
    ) -> Result<bool, MokshaCoreError> {
        let y = Self::hash_to_curve(secret_msg.into().as_bytes());
        Some(c == y.mul_tweak(&self.secp, &Scalar::from(a))?).ok_or(
            MokshaCoreError::Secp256k1Error(secp256k1::Error::InvalidPublicKey),
        )
    }

    /// Signs a blinded message the same way `step2_bob` does, and additionally produces a
    /// DLEQ transcript `(e, s)` proving `a` is the private key behind the denomination's
    /// advertised public key `a_pub`.
    pub fn step2_bob_with_dleq(
        &self,
        b_: PublicKey,
        a: &SecretKey,
        a_pub: PublicKey,
    ) -> Result<(PublicKey, DleqProof), MokshaCoreError> {
        let c_ = self.step2_bob(b_, a)?;
        let r = SecretKey::new(&mut thread_rng());
        let r1 = PublicKey::from_secret_key(&self.secp, &r);
        let r2 = b_.mul_tweak(&self.secp, &Scalar::from(r))?;

        let e = Self::hash_points_to_scalar(&[r1, r2, a_pub, c_])?;
        let ea = a.mul_tweak(&Scalar::from(e))?;
        let s = r.add_tweak(&Scalar::from(ea))?;

        Ok((c_, DleqProof { e, s }))
    }

    /// Verifies a DLEQ transcript against a promise `(B_, C_)` and a keyset's advertised
    /// public key `A` for that denomination.
    pub fn verify_dleq(
        &self,
        proof: &DleqProof,
        a_pub: PublicKey,
        b_: PublicKey,
        c_: PublicKey,
    ) -> Result<bool, MokshaCoreError> {
        // R1' = s*G - e*A
        let s_g = PublicKey::from_secret_key(&self.secp, &proof.s);
        let e_a = a_pub.mul_tweak(&self.secp, &Scalar::from(proof.e))?;
        let r1_prime = s_g.combine(&e_a.negate(&self.secp))?;

        // R2' = s*B_ - e*C_
        let s_b = b_.mul_tweak(&self.secp, &Scalar::from(proof.s))?;
        let e_c = c_.mul_tweak(&self.secp, &Scalar::from(proof.e))?;
        let r2_prime = s_b.combine(&e_c.negate(&self.secp))?;

        let e_prime = Self::hash_points_to_scalar(&[r1_prime, r2_prime, a_pub, c_])?;
        Ok(e_prime == proof.e)
    }

    /// `e = SHA256(R1 ∥ R2 ∥ A ∥ C_)`, where each point is uncompressed-serialized to lowercase
    /// hex and the four hex strings are concatenated and hashed as UTF-8 bytes.
    fn hash_points_to_scalar(points: &[PublicKey; 4]) -> Result<SecretKey, MokshaCoreError> {
        let concat: String = points
            .iter()
            .map(|p| hex::encode(p.serialize_uncompressed()))
            .collect();
        let hash = sha256::Hash::hash(concat.as_bytes());
        SecretKey::from_slice(hash.as_byte_array()).map_err(MokshaCoreError::Secp256k1Error)
    }
}

pub fn public_key_from_hex(hex: &str) -> secp256k1::PublicKey {
    use hex::FromHex;
    let input_vec: Vec<u8> = Vec::from_hex(hex).expect("Invalid Hex String");
    secp256k1::PublicKey::from_slice(&input_vec).expect("Invalid Public Key")
}
