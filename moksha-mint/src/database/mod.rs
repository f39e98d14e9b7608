use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use moksha_core::{
    blind::BlindedSignature,
    keyset::CurrencyUnit,
    primitives::{Bolt11MeltQuote, Bolt11MintQuote},
    proof::Proof,
};
use secp256k1::PublicKey;
use uuid::Uuid;

use crate::error::MokshaMintError;

pub mod postgres;

/// Persisted keyset metadata. Private key material is never stored: the mint re-derives a
/// keyset's keys from its master seed plus `derivation_path` on boot, then restores
/// `first_seen`/`active` from this row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKeysetMeta {
    pub id: String,
    pub unit: CurrencyUnit,
    pub derivation_path: String,
    pub input_fee_ppk: u64,
    pub first_seen: i64,
    pub active: bool,
}

/// Persistence contract for the mint's promise ledger, spent/pending proof ledgers, quote
/// state machines and keyset table.
///
/// Spent and pending proofs are indexed by `Y = hash_to_curve(secret)` rather than the raw
/// secret, matching the NUT-07 proof-state model and keeping the index a fixed-size point
/// instead of an arbitrary-length string.
///
/// Concurrent melt execution is guarded with [`Database::try_start_melt`], and concurrent
/// mint issuance with [`Database::try_start_mint`] - each a single conditional `UPDATE ...
/// WHERE state = '...'` rather than a held `SELECT ... FOR UPDATE` transaction: it gives the
/// same mutual-exclusion guarantee without keeping a connection checked out for the lifetime
/// of a Lightning round-trip.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait Database: Send + Sync {
    async fn insert_promise(
        &self,
        b_: PublicKey,
        signature: BlindedSignature,
    ) -> Result<(), MokshaMintError>;
    async fn get_promise(&self, b_: &PublicKey) -> Result<Option<BlindedSignature>, MokshaMintError>;

    async fn insert_spent(&self, y: PublicKey, proof: Proof) -> Result<(), MokshaMintError>;
    async fn list_spent(&self, ys: Vec<PublicKey>) -> Result<Vec<PublicKey>, MokshaMintError>;

    async fn insert_pending(&self, y: PublicKey, proof: Proof) -> Result<(), MokshaMintError>;
    async fn delete_pending(&self, ys: Vec<PublicKey>) -> Result<(), MokshaMintError>;
    async fn list_pending(&self, ys: Vec<PublicKey>) -> Result<Vec<PublicKey>, MokshaMintError>;

    async fn upsert_mint_quote(&self, quote: Bolt11MintQuote) -> Result<(), MokshaMintError>;
    async fn get_mint_quote_by_id(&self, id: Uuid) -> Result<Bolt11MintQuote, MokshaMintError>;
    async fn get_mint_quote_by_checking_id(
        &self,
        checking_id: String,
    ) -> Result<Option<Bolt11MintQuote>, MokshaMintError>;
    async fn list_unpaid_mint_quotes(&self) -> Result<Vec<Bolt11MintQuote>, MokshaMintError>;
    /// Atomically transitions a mint quote from `PAID` to `ISSUED` and returns it.
    /// Returns [`MokshaMintError::QuoteLocked`] if the quote is not currently `PAID`
    /// (already issued by a concurrent request, or not paid yet).
    async fn try_start_mint(&self, id: Uuid) -> Result<Bolt11MintQuote, MokshaMintError>;

    async fn upsert_melt_quote(&self, quote: Bolt11MeltQuote) -> Result<(), MokshaMintError>;
    async fn get_melt_quote_by_id(&self, id: Uuid) -> Result<Bolt11MeltQuote, MokshaMintError>;
    /// Atomically transitions a melt quote from `UNPAID` to `PENDING` and returns it.
    /// Returns [`MokshaMintError::QuoteLocked`] if the quote is not currently `UNPAID`
    /// (already being processed by another request, or already settled).
    async fn try_start_melt(&self, id: Uuid) -> Result<Bolt11MeltQuote, MokshaMintError>;
    async fn list_pending_melt_quotes(&self) -> Result<Vec<Bolt11MeltQuote>, MokshaMintError>;

    async fn store_keyset(&self, meta: StoredKeysetMeta) -> Result<(), MokshaMintError>;
    async fn list_keysets(&self) -> Result<Vec<StoredKeysetMeta>, MokshaMintError>;
}
