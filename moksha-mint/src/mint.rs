//! The mint engine: keyset lifecycle, and the swap/mint/melt/checkstate/restore state
//! machines that sit behind the `/v1/*` HTTP routes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use moksha_core::{
    amount::split_amount,
    blind::{BlindedMessage, BlindedSignature, TotalAmount},
    dhke::Dhke,
    keyset::{CurrencyUnit, MintKeyset},
    primitives::{
        Bolt11MeltQuote, Bolt11MintQuote, MeltQuoteState, MintQuoteState, ProofState,
        ProofStateEntry,
    },
    proof::Proofs,
};
use secp256k1::PublicKey;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::{
        BuildConfig, DatabaseConfig, LightningFeeConfig, MintConfig, MintInfoConfig, ServerConfig,
    },
    database::{postgres::PostgresDB, Database, StoredKeysetMeta},
    error::MokshaMintError,
    events::{EventBus, MintEvent},
    lightning::{
        cln::{ClnLightning, ClnLightningSettings},
        lnd::{LndLightning, LndLightningSettings},
        AlbyLightning, AlbyLightningSettings, Lightning, LightningType, LnbitsLightning,
        LnbitsLightningSettings, PaymentStatus, StrikeLightning, StrikeLightningSettings,
    },
    model::PayInvoiceStatus,
    verification,
};

/// Result of a single `melt_bolt11` attempt against the Lightning backend, distinct from
/// [`MeltQuoteState`] because `melt_bolt11` needs to tell its own success/failure/in-flight
/// arms apart from the quote state the caller ends up persisting for each of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MeltOutcome {
    Settled,
    Pending,
    Failed,
}

#[derive(Clone)]
pub struct Mint<DB = PostgresDB>
where
    DB: Database,
{
    pub lightning: Arc<dyn Lightning + Send + Sync>,
    pub lightning_type: LightningType,
    pub db: DB,
    pub dhke: Dhke,
    keysets: Arc<RwLock<HashMap<String, MintKeyset>>>,
    pub config: MintConfig,
    pub events: EventBus,
}

impl<DB> Mint<DB>
where
    DB: Database,
{
    /// Loads keysets persisted in `db`, or derives and persists the mint's first keyset if
    /// none exist yet. A keyset is never rotated away from here - only the `keysets` table
    /// decides which ids are active, this is just where they're materialized from the seed.
    pub async fn new(
        lightning: Arc<dyn Lightning + Send + Sync>,
        lightning_type: LightningType,
        db: DB,
        config: MintConfig,
    ) -> Result<Self, MokshaMintError> {
        let stored = db.list_keysets().await?;
        let mut keysets = HashMap::new();

        if stored.is_empty() {
            let keyset = MintKeyset::new_with(
                config.privatekey.clone(),
                config.derivation_path.clone().unwrap_or_default(),
                CurrencyUnit::Sat,
                config.input_fee_ppk,
            );
            db.store_keyset(StoredKeysetMeta {
                id: keyset.keyset_id.clone(),
                unit: keyset.unit,
                derivation_path: keyset.derivation_path.clone(),
                input_fee_ppk: keyset.input_fee_ppk,
                first_seen: keyset.first_seen,
                active: keyset.active,
            })
            .await?;
            keysets.insert(keyset.keyset_id.clone(), keyset);
        } else {
            for meta in stored {
                let mut keyset = MintKeyset::new_with(
                    config.privatekey.clone(),
                    meta.derivation_path.clone(),
                    meta.unit,
                    meta.input_fee_ppk,
                );
                keyset.assert_id_matches_derivation();
                keyset.first_seen = meta.first_seen;
                keyset.active = meta.active;
                keysets.insert(keyset.keyset_id.clone(), keyset);
            }
        }

        Ok(Self {
            lightning,
            lightning_type,
            db,
            dhke: Dhke::new(),
            keysets: Arc::new(RwLock::new(keysets)),
            config,
            events: EventBus::new(),
        })
    }

    pub async fn keysets(&self) -> Vec<MintKeyset> {
        self.keysets.read().await.values().cloned().collect()
    }

    pub async fn keyset_by_id(&self, id: &str) -> Result<MintKeyset, MokshaMintError> {
        self.keysets
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| MokshaMintError::KeysetUnknown(id.to_owned()))
    }

    pub async fn active_keyset(&self, unit: CurrencyUnit) -> Result<MintKeyset, MokshaMintError> {
        self.keysets
            .read()
            .await
            .values()
            .find(|k| k.unit == unit && k.active)
            .cloned()
            .ok_or_else(|| MokshaMintError::KeysetUnknown(format!("no active keyset for {unit}")))
    }

    /// Signs a batch of blinded messages, attaching a DLEQ transcript to each promise and
    /// recording it in the promise ledger so it can never be issued twice.
    #[instrument(level = "debug", skip(self, outputs), err)]
    pub async fn create_blinded_signatures(
        &self,
        outputs: &[BlindedMessage],
    ) -> Result<Vec<BlindedSignature>, MokshaMintError> {
        let mut signatures = Vec::with_capacity(outputs.len());
        for output in outputs {
            if self.db.get_promise(&output.b_).await?.is_some() {
                return Err(MokshaMintError::OutputAlreadySigned(output.b_.to_string()));
            }

            let keyset = self.keyset_by_id(&output.id).await?;
            if !keyset.active {
                return Err(MokshaMintError::KeysetInactive(output.id.clone()));
            }

            let private_key = keyset.private_keys.get(&output.amount).ok_or_else(|| {
                MokshaMintError::AmountUnbalanced(format!(
                    "keyset {} has no key for amount {}",
                    output.id, output.amount
                ))
            })?;
            let public_key = *keyset
                .public_keys
                .get(&output.amount)
                .expect("private/public keys are derived together");

            let (c_, dleq) =
                self.dhke
                    .step2_bob_with_dleq(output.b_, private_key, public_key)?;
            let signature = BlindedSignature {
                amount: output.amount,
                c_,
                id: Some(keyset.keyset_id.clone()),
                dleq: Some(dleq),
            };
            self.db.insert_promise(output.b_, signature.clone()).await?;
            signatures.push(signature);
        }
        Ok(signatures)
    }

    #[instrument(level = "debug", skip(self), err)]
    pub async fn mint_quote_bolt11(
        &self,
        unit: CurrencyUnit,
        amount: u64,
    ) -> Result<Bolt11MintQuote, MokshaMintError> {
        self.active_keyset(unit).await?;

        let invoice = self.lightning.create_invoice(amount).await?;
        let now = Utc::now().timestamp();
        let quote = Bolt11MintQuote {
            quote_id: Uuid::new_v4(),
            payment_request: invoice.payment_request,
            checking_id: hex::encode(&invoice.payment_hash),
            unit,
            amount,
            state: MintQuoteState::Unpaid,
            expiry: (now + self.config.quote_ttl) as u64,
            created_at: now,
            paid_at: None,
        };
        self.db.upsert_mint_quote(quote.clone()).await?;
        Ok(quote)
    }

    /// Looks up a mint quote and refreshes `Unpaid -> Paid`/`Expired` against the Lightning
    /// backend and the wall clock. `Issued` and `Paid` quotes are returned as-is.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn mint_quote_state(
        &self,
        quote_id: Uuid,
    ) -> Result<Bolt11MintQuote, MokshaMintError> {
        let mut quote = self.db.get_mint_quote_by_id(quote_id).await?;

        if quote.state == MintQuoteState::Unpaid {
            if quote.is_expired() {
                quote.state = MintQuoteState::Expired;
                self.db.upsert_mint_quote(quote.clone()).await?;
            } else if self
                .lightning
                .get_invoice_status(quote.payment_request.clone())
                .await?
                == crate::lightning::InvoiceStatus::Paid
            {
                quote.state = MintQuoteState::Paid;
                quote.paid_at = Some(Utc::now().timestamp());
                self.db.upsert_mint_quote(quote.clone()).await?;
                self.events.publish(MintEvent::MintQuoteUpdated {
                    quote_id,
                    state: quote.state,
                });
            }
        }

        Ok(quote)
    }

    #[instrument(level = "debug", skip(self, outputs), err)]
    pub async fn mint_bolt11(
        &self,
        quote_id: Uuid,
        outputs: &[BlindedMessage],
    ) -> Result<Vec<BlindedSignature>, MokshaMintError> {
        let mut quote = self.mint_quote_state(quote_id).await?;

        match quote.state {
            MintQuoteState::Unpaid => {
                return Err(MokshaMintError::QuoteNotPaid(quote_id.to_string()))
            }
            MintQuoteState::Expired => {
                return Err(MokshaMintError::QuoteExpired(quote_id.to_string()))
            }
            MintQuoteState::Issued => {
                return Err(MokshaMintError::QuoteAlreadyIssued(quote_id.to_string()))
            }
            MintQuoteState::Paid => {}
        }

        verification::ensure_no_duplicate_outputs(outputs)?;

        let outputs_total = outputs.to_vec().total_amount();
        if outputs_total != quote.amount {
            return Err(MokshaMintError::AmountUnbalanced(format!(
                "quote amount {} does not match outputs amount {outputs_total}",
                quote.amount
            )));
        }

        {
            let keysets = self.keysets.read().await;
            for output in outputs {
                let unit = keysets
                    .get(&output.id)
                    .map(|k| k.unit)
                    .ok_or_else(|| MokshaMintError::KeysetUnknown(output.id.clone()))?;
                if unit != quote.unit {
                    return Err(MokshaMintError::UnitMismatch(format!(
                        "output keyset {} is {unit}, quote is {}",
                        output.id, quote.unit
                    )));
                }
            }
        }

        // Claim the quote atomically before signing: the conditional `PAID -> ISSUED` update
        // only succeeds for one of two concurrent callers, so the loser errors out here
        // instead of both observing `Paid` and double-issuing against one paid invoice.
        quote = self.db.try_start_mint(quote_id).await?;

        let signatures = match self.create_blinded_signatures(outputs).await {
            Ok(signatures) => signatures,
            Err(err) => {
                quote.state = MintQuoteState::Paid;
                self.db.upsert_mint_quote(quote).await?;
                return Err(err);
            }
        };

        self.events.publish(MintEvent::MintQuoteUpdated {
            quote_id,
            state: quote.state,
        });

        Ok(signatures)
    }

    #[instrument(level = "debug", skip(self), err)]
    pub async fn melt_quote_bolt11(
        &self,
        unit: CurrencyUnit,
        payment_request: String,
    ) -> Result<Bolt11MeltQuote, MokshaMintError> {
        self.active_keyset(unit).await?;

        let payment_quote = self
            .lightning
            .get_payment_quote(payment_request.clone(), None)
            .await?;

        let now = Utc::now().timestamp();
        let quote = Bolt11MeltQuote {
            quote_id: Uuid::new_v4(),
            payment_request,
            checking_id: payment_quote.checking_id,
            unit,
            amount: payment_quote.amount,
            fee_reserve: payment_quote.fee_reserve,
            state: MeltQuoteState::Unpaid,
            change: None,
            payment_preimage: None,
            created_at: now,
            expiry: (now + self.config.quote_ttl) as u64,
        };
        self.db.upsert_melt_quote(quote.clone()).await?;
        Ok(quote)
    }

    #[instrument(level = "debug", skip(self, inputs, outputs), err)]
    pub async fn melt_bolt11(
        &self,
        quote_id: Uuid,
        inputs: &Proofs,
        outputs: Option<&[BlindedMessage]>,
    ) -> Result<Bolt11MeltQuote, MokshaMintError> {
        let mut quote = self.db.try_start_melt(quote_id).await?;

        match self.melt_bolt11_pending(&mut quote, inputs, outputs).await {
            // Settled and Pending both leave the inputs where melt_bolt11_pending put them
            // (spent, or still pending for later reconciliation) and just persist the quote.
            Ok(MeltOutcome::Settled | MeltOutcome::Pending) => {
                self.db.upsert_melt_quote(quote.clone()).await?;
                self.events.publish(MintEvent::MeltQuoteUpdated {
                    quote_id,
                    state: quote.state,
                });
                Ok(quote)
            }
            // A confirmed Lightning failure: release the inputs and let the wallet retry.
            Ok(MeltOutcome::Failed) => {
                let ys = verification::ys_for(inputs);
                self.db.delete_pending(ys).await?;
                quote.state = MeltQuoteState::Unpaid;
                self.db.upsert_melt_quote(quote.clone()).await?;
                self.events.publish(MintEvent::MeltQuoteUpdated {
                    quote_id,
                    state: quote.state,
                });
                Ok(quote)
            }
            // Rejected before any payment was attempted (bad inputs, already spent, quote
            // mismatch): nothing is pending yet, but releasing is still safe and idempotent.
            Err(err) => {
                let ys = verification::ys_for(inputs);
                self.db.delete_pending(ys).await?;
                quote.state = MeltQuoteState::Unpaid;
                self.db.upsert_melt_quote(quote.clone()).await?;
                Err(err)
            }
        }
    }

    /// Runs with `quote` already locked in `PENDING` by [`Database::try_start_melt`]. `Err`
    /// here means the payment was never attempted (validation rejected it up front); the
    /// caller releases the inputs and resets the quote to `UNPAID`. Once a real payment
    /// attempt is made, the outcome is reported via [`MeltOutcome`] instead, since a failed
    /// `pay_invoice` call does not necessarily mean the payment didn't go through.
    async fn melt_bolt11_pending(
        &self,
        quote: &mut Bolt11MeltQuote,
        inputs: &Proofs,
        outputs: Option<&[BlindedMessage]>,
    ) -> Result<MeltOutcome, MokshaMintError> {
        verification::ensure_no_duplicate_inputs(inputs)?;

        let change_outputs = outputs.unwrap_or(&[]);
        let sig_all_message = verification::needs_sig_all(inputs)
            .then(|| verification::sig_all_message(inputs, change_outputs));

        let keysets = self.keysets.read().await.clone();
        for proof in inputs.proofs() {
            let keyset = keysets
                .get(&proof.keyset_id)
                .ok_or_else(|| MokshaMintError::KeysetUnknown(proof.keyset_id.clone()))?;
            if keyset.unit != quote.unit {
                return Err(MokshaMintError::UnitMismatch(format!(
                    "input keyset {} is {}, quote is {}",
                    proof.keyset_id, keyset.unit, quote.unit
                )));
            }
            verification::verify_input(&self.dhke, keyset, &proof, sig_all_message.as_deref())?;
        }

        let ys = verification::ys_for(inputs);
        if !self.db.list_spent(ys.clone()).await?.is_empty() {
            return Err(MokshaMintError::ProofAlreadySpent(
                "one or more inputs are already spent".to_string(),
            ));
        }
        if !self.db.list_pending(ys.clone()).await?.is_empty() {
            return Err(MokshaMintError::ProofPending(
                "one or more inputs are already pending".to_string(),
            ));
        }

        let fee = verification::calc_fee(inputs, &keysets)?;
        let inputs_total = inputs.total_amount();
        if inputs_total < quote.amount + quote.fee_reserve + fee {
            return Err(MokshaMintError::AmountUnbalanced(format!(
                "inputs {inputs_total} do not cover amount {} + fee_reserve {} + input fee {fee}",
                quote.amount, quote.fee_reserve
            )));
        }

        for proof in inputs.proofs() {
            let y = Dhke::hash_to_curve(proof.secret.as_bytes());
            self.db.insert_pending(y, proof).await?;
        }

        // Mint-to-self: if the invoice being melted is one of our own unpaid mint quotes,
        // settle both sides locally instead of round-tripping through the Lightning backend.
        let internal_quote = self
            .db
            .get_mint_quote_by_checking_id(quote.checking_id.clone())
            .await?
            .filter(|q| q.state == MintQuoteState::Unpaid);

        if let Some(mut mint_quote) = internal_quote {
            mint_quote.state = MintQuoteState::Paid;
            mint_quote.paid_at = Some(Utc::now().timestamp());
            self.db.upsert_mint_quote(mint_quote.clone()).await?;
            self.events.publish(MintEvent::MintQuoteUpdated {
                quote_id: mint_quote.quote_id,
                state: mint_quote.state,
            });

            for proof in inputs.proofs() {
                let y = Dhke::hash_to_curve(proof.secret.as_bytes());
                self.db.insert_spent(y, proof).await?;
                self.events.publish(MintEvent::ProofStateChanged {
                    y,
                    state: ProofState::Spent,
                });
            }
            self.db.delete_pending(ys).await?;

            quote.state = MeltQuoteState::Paid;
            quote.payment_preimage = None;
            quote.change = self.sign_melt_change(quote.fee_reserve, outputs).await?;
            return Ok(MeltOutcome::Settled);
        }

        // A transport-level error here (timeout, connection drop) does not tell us whether
        // the backend ever dispatched the payment, so it is treated the same as an explicit
        // PENDING status rather than FAILED: the quote stays PENDING and the inputs stay
        // pending for recover_pending_melts to reconcile later instead of being released.
        // `LightningPermanent` is the one exception: a backend only returns it when it knows
        // the payment was rejected before anything left the mint, so it is safe to release.
        let payment = match self
            .lightning
            .pay_invoice(quote.payment_request.clone(), quote.fee_reserve * 1_000)
            .await
        {
            Ok(payment) => payment,
            Err(err @ MokshaMintError::LightningPermanent(_)) => {
                warn!(quote_id = %quote.quote_id, %err, "pay_invoice rejected permanently");
                quote.state = MeltQuoteState::Unpaid;
                return Ok(MeltOutcome::Failed);
            }
            Err(err) => {
                warn!(quote_id = %quote.quote_id, %err, "pay_invoice errored without a terminal status; leaving quote pending");
                quote.state = MeltQuoteState::Pending;
                return Ok(MeltOutcome::Pending);
            }
        };

        match payment.status {
            PayInvoiceStatus::Failed => {
                quote.state = MeltQuoteState::Unpaid;
                return Ok(MeltOutcome::Failed);
            }
            PayInvoiceStatus::Pending => {
                quote.state = MeltQuoteState::Pending;
                return Ok(MeltOutcome::Pending);
            }
            PayInvoiceStatus::Paid => {}
        }

        for proof in inputs.proofs() {
            let y = Dhke::hash_to_curve(proof.secret.as_bytes());
            self.db.insert_spent(y, proof).await?;
            self.events.publish(MintEvent::ProofStateChanged {
                y,
                state: ProofState::Spent,
            });
        }
        self.db.delete_pending(ys).await?;

        quote.state = MeltQuoteState::Paid;
        quote.payment_preimage = payment.payment_preimage;
        let returned_fee = quote.fee_reserve.saturating_sub(payment.total_fees);
        quote.change = self.sign_melt_change(returned_fee, outputs).await?;

        Ok(MeltOutcome::Settled)
    }

    /// Signs change for the fee-reserve headroom the wallet didn't end up needing, using
    /// the leading outputs the wallet supplied for exactly this purpose (NUT-08).
    async fn sign_melt_change(
        &self,
        returned_fee: u64,
        outputs: Option<&[BlindedMessage]>,
    ) -> Result<Option<Vec<BlindedSignature>>, MokshaMintError> {
        let Some(outputs) = outputs else {
            return Ok(None);
        };
        if returned_fee == 0 || outputs.is_empty() {
            return Ok(None);
        }

        let change_amounts = split_amount(returned_fee);
        if change_amounts.len() > outputs.len() {
            return Ok(None);
        }

        let to_sign: Vec<BlindedMessage> = outputs[..change_amounts.len()]
            .iter()
            .zip(change_amounts)
            .map(|(output, amount)| BlindedMessage {
                amount,
                b_: output.b_,
                id: output.id.clone(),
            })
            .collect();

        Ok(Some(self.create_blinded_signatures(&to_sign).await?))
    }

    #[instrument(level = "debug", skip(self, inputs, outputs), err)]
    pub async fn swap(
        &self,
        inputs: &Proofs,
        outputs: &[BlindedMessage],
    ) -> Result<Vec<BlindedSignature>, MokshaMintError> {
        verification::ensure_no_duplicate_inputs(inputs)?;
        verification::ensure_no_duplicate_outputs(outputs)?;

        let sig_all_message = verification::needs_sig_all(inputs)
            .then(|| verification::sig_all_message(inputs, outputs));

        let keysets = self.keysets.read().await.clone();

        let mut unit = None;
        for proof in inputs.proofs() {
            let keyset = keysets
                .get(&proof.keyset_id)
                .ok_or_else(|| MokshaMintError::KeysetUnknown(proof.keyset_id.clone()))?;
            match unit {
                None => unit = Some(keyset.unit),
                Some(seen) if seen != keyset.unit => {
                    return Err(MokshaMintError::UnitMismatch(
                        "inputs use more than one unit".to_string(),
                    ))
                }
                _ => {}
            }
            verification::verify_input(&self.dhke, keyset, &proof, sig_all_message.as_deref())?;
        }

        for output in outputs {
            let output_unit = keysets
                .get(&output.id)
                .map(|k| k.unit)
                .ok_or_else(|| MokshaMintError::KeysetUnknown(output.id.clone()))?;
            if Some(output_unit) != unit {
                return Err(MokshaMintError::UnitMismatch(
                    "outputs use a different unit than inputs".to_string(),
                ));
            }
        }

        let ys = verification::ys_for(inputs);
        if !self.db.list_spent(ys.clone()).await?.is_empty() {
            return Err(MokshaMintError::ProofAlreadySpent(
                "one or more inputs are already spent".to_string(),
            ));
        }
        if !self.db.list_pending(ys).await?.is_empty() {
            return Err(MokshaMintError::ProofPending(
                "one or more inputs are already pending".to_string(),
            ));
        }

        let fee = verification::calc_fee(inputs, &keysets)?;
        let inputs_total = inputs.total_amount();
        let outputs_total = outputs.to_vec().total_amount();
        if inputs_total != outputs_total + fee {
            return Err(MokshaMintError::AmountUnbalanced(format!(
                "inputs {inputs_total} != outputs {outputs_total} + fee {fee}"
            )));
        }

        // Mark inputs spent before signing any output. `insert_spent` fails on the unique-y
        // violation, so the loser of a concurrent double-spend race errors out here and never
        // reaches `create_blinded_signatures` - nothing is committed for it to recover via
        // `/v1/restore`.
        for proof in inputs.proofs() {
            let y = Dhke::hash_to_curve(proof.secret.as_bytes());
            self.db.insert_spent(y, proof).await?;
            self.events.publish(MintEvent::ProofStateChanged {
                y,
                state: ProofState::Spent,
            });
        }

        self.create_blinded_signatures(outputs).await
    }

    #[instrument(level = "debug", skip(self), err)]
    pub async fn check_state(
        &self,
        ys: Vec<PublicKey>,
    ) -> Result<Vec<ProofStateEntry>, MokshaMintError> {
        let spent = self.db.list_spent(ys.clone()).await?;
        let pending = self.db.list_pending(ys.clone()).await?;

        Ok(ys
            .into_iter()
            .map(|y| {
                let state = if spent.contains(&y) {
                    ProofState::Spent
                } else if pending.contains(&y) {
                    ProofState::Pending
                } else {
                    ProofState::Unspent
                };
                ProofStateEntry {
                    y,
                    state,
                    witness: None,
                }
            })
            .collect())
    }

    #[instrument(level = "debug", skip(self, outputs), err)]
    pub async fn restore(
        &self,
        outputs: &[BlindedMessage],
    ) -> Result<(Vec<BlindedMessage>, Vec<BlindedSignature>), MokshaMintError> {
        let mut found_outputs = Vec::new();
        let mut signatures = Vec::new();
        for output in outputs {
            if let Some(signature) = self.db.get_promise(&output.b_).await? {
                found_outputs.push(output.clone());
                signatures.push(signature);
            }
        }
        Ok((found_outputs, signatures))
    }

    /// Called once on boot: reconciles melt quotes left `PENDING` by a crash or restart
    /// mid-payment. Inputs for those quotes stay in the pending ledger either way - a
    /// wallet discovers their true state through `/v1/checkstate`, this only fixes up the
    /// quote's own status so a `Failed` payment can be retried.
    pub async fn recover_pending_melts(&self) -> Result<(), MokshaMintError> {
        for mut quote in self.db.list_pending_melt_quotes().await? {
            match self
                .lightning
                .get_payment_status(quote.payment_request.clone())
                .await?
            {
                PaymentStatus::Settled => {
                    warn!(
                        quote_id = %quote.quote_id,
                        "melt settled while the mint was down; reconcile pending inputs via checkstate"
                    );
                }
                PaymentStatus::Failed => {
                    quote.state = MeltQuoteState::Unpaid;
                    self.db.upsert_melt_quote(quote).await?;
                }
                PaymentStatus::Pending | PaymentStatus::Unknown => {
                    info!(quote_id = %quote.quote_id, "melt still unresolved after restart");
                }
            }
        }
        Ok(())
    }

    /// Stands in for consuming C7's `paid_invoices_stream`: rather than holding a live
    /// backend subscription open, each unpaid mint quote is re-checked against the backend
    /// in turn. Called in a loop by the task spawned in [`MintBuilder::build`]; a single
    /// pass is exposed here so tests can drive it without a sleep loop.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn poll_unpaid_mint_quotes(&self) -> Result<(), MokshaMintError> {
        for quote in self.db.list_unpaid_mint_quotes().await? {
            if let Err(err) = self.mint_quote_state(quote.quote_id).await {
                warn!(quote_id = %quote.quote_id, %err, "failed polling mint quote status");
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MintBuilder {
    private_key: Option<String>,
    derivation_path: Option<String>,
    lightning_type: Option<LightningType>,
    db_config: Option<DatabaseConfig>,
    fee_config: Option<LightningFeeConfig>,
    mint_info_settings: Option<MintInfoConfig>,
    server_config: Option<ServerConfig>,
    input_fee_ppk: u64,
    quote_ttl: i64,
}

impl MintBuilder {
    pub fn new() -> Self {
        Self {
            quote_ttl: 1800,
            ..Default::default()
        }
    }

    pub fn with_db(mut self, db_config: Option<DatabaseConfig>) -> Self {
        self.db_config = db_config;
        self
    }

    pub fn with_mint_info(mut self, mint_info: Option<MintInfoConfig>) -> Self {
        self.mint_info_settings = mint_info;
        self
    }

    pub fn with_server(mut self, server_config: Option<ServerConfig>) -> Self {
        self.server_config = server_config;
        self
    }

    pub fn with_private_key(mut self, private_key: String) -> Self {
        self.private_key = Some(private_key);
        self
    }

    pub fn with_derivation_path(mut self, derivation_path: Option<String>) -> Self {
        self.derivation_path = derivation_path;
        self
    }

    pub fn with_lightning(mut self, lightning: LightningType) -> Self {
        self.lightning_type = Some(lightning);
        self
    }

    pub fn with_fee(mut self, fee_config: Option<LightningFeeConfig>) -> Self {
        self.fee_config = fee_config;
        self
    }

    pub fn with_input_fee_ppk(mut self, input_fee_ppk: u64) -> Self {
        self.input_fee_ppk = input_fee_ppk;
        self
    }

    pub fn with_quote_ttl(mut self, quote_ttl: i64) -> Self {
        self.quote_ttl = quote_ttl;
        self
    }

    pub async fn build(self) -> Result<Mint<PostgresDB>, MokshaMintError> {
        let lightning_type = self
            .lightning_type
            .clone()
            .expect("lightning backend not set");

        let fee_config = self.fee_config.clone().expect("fee config not set");

        let lightning: Arc<dyn Lightning + Send + Sync> = match lightning_type.clone() {
            LightningType::Lnbits(settings) => Arc::new(LnbitsLightning::new(
                settings.admin_key.expect("LNBITS_ADMIN_KEY not set"),
                settings.url.expect("LNBITS_URL not set"),
                fee_config.clone(),
            )),
            LightningType::Alby(settings) => Arc::new(AlbyLightning::new(
                settings.api_key.expect("ALBY_API_KEY not set"),
                fee_config.clone(),
            )),
            LightningType::Strike(settings) => Arc::new(StrikeLightning::new(
                settings.api_key.expect("STRIKE_API_KEY not set"),
                fee_config.clone(),
            )),
            LightningType::Lnd(settings) => Arc::new(
                LndLightning::new(
                    settings.grpc_host.expect("LND_GRPC_HOST not set"),
                    &settings.tls_cert_path.expect("LND_TLS_CERT_PATH not set"),
                    &settings.macaroon_path.expect("LND_MACAROON_PATH not set"),
                    fee_config.clone(),
                )
                .await?,
            ),
            LightningType::Cln(settings) => Arc::new(
                ClnLightning::new(
                    settings.grpc_host.expect("CLN_GRPC_HOST not set"),
                    &settings.client_cert.expect("CLN_CLIENT_CERT not set"),
                    &settings.client_key.expect("CLN_CLIENT_KEY not set"),
                    &settings.ca_cert.expect("CLN_CA_CERT not set"),
                    fee_config.clone(),
                )
                .await?,
            ),
        };

        let db_config = self.db_config.expect("db config not set");
        let db = PostgresDB::new(&db_config).await?;
        db.migrate().await;

        let config = MintConfig {
            info: self.mint_info_settings.unwrap_or_default(),
            build: BuildConfig::from_env(),
            lightning_fee: self.fee_config.expect("fee config not set"),
            server: self.server_config.unwrap_or_default(),
            database: db_config,
            privatekey: self.private_key.expect("private key not set"),
            derivation_path: self.derivation_path,
            input_fee_ppk: self.input_fee_ppk,
            quote_ttl: self.quote_ttl,
        };

        let mint = Mint::new(lightning, lightning_type, db, config).await?;
        mint.recover_pending_melts().await?;

        let poller = mint.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                if let Err(err) = poller.poll_unpaid_mint_quotes().await {
                    warn!(%err, "mint quote poll loop failed");
                }
            }
        });

        Ok(mint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MockDatabase;
    use crate::lightning::error::LightningError;
    use crate::lightning::MockLightning;
    use crate::model::{CreateInvoiceResult, PayInvoiceResult, PaymentQuote};
    use moksha_core::blind::BlindedMessage;
    use moksha_core::primitives::{Bolt11MintQuote, MeltQuoteState, MintQuoteState, ProofState};
    use moksha_core::proof::{Proof, Proofs};

    fn test_config() -> MintConfig {
        MintConfig {
            privatekey: "TEST_PRIVATE_KEY".to_string(),
            derivation_path: Some("0/0/0/0".to_string()),
            input_fee_ppk: 0,
            quote_ttl: 1800,
            ..Default::default()
        }
    }

    async fn test_mint(lightning: MockLightning, mut db: MockDatabase) -> Mint<MockDatabase> {
        db.expect_list_keysets().returning(|| Ok(vec![]));
        db.expect_store_keyset().returning(|_| Ok(()));
        Mint::new(
            Arc::new(lightning),
            LightningType::Lnbits(Default::default()),
            db,
            test_config(),
        )
        .await
        .expect("failed to build test mint")
    }

    #[tokio::test]
    async fn test_active_keyset_has_all_denominations() -> anyhow::Result<()> {
        let mint = test_mint(MockLightning::new(), MockDatabase::new()).await;
        let keyset = mint.active_keyset(CurrencyUnit::Sat).await?;
        assert_eq!(keyset.public_keys.len(), 64);
        assert!(keyset.active);
        Ok(())
    }

    #[tokio::test]
    async fn test_active_keyset_unknown_unit_is_rejected() -> anyhow::Result<()> {
        let mint = test_mint(MockLightning::new(), MockDatabase::new()).await;
        let result = mint.active_keyset(CurrencyUnit::Usd).await;
        assert!(matches!(result, Err(MokshaMintError::KeysetUnknown(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_blinded_signatures_attach_dleq() -> anyhow::Result<()> {
        let mut db = MockDatabase::new();
        db.expect_get_promise().returning(|_| Ok(None));
        db.expect_insert_promise().returning(|_, _| Ok(()));
        let mint = test_mint(MockLightning::new(), db).await;
        let keyset = mint.active_keyset(CurrencyUnit::Sat).await?;

        let (b_, _r) = mint.dhke.step1_alice("dleq-test-secret", None)?;
        let outputs = vec![BlindedMessage {
            amount: 8,
            b_,
            id: keyset.keyset_id,
        }];

        let signatures = mint.create_blinded_signatures(&outputs).await?;
        assert_eq!(signatures.len(), 1);
        assert!(signatures[0].dleq.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_create_blinded_signatures_rejects_already_signed_output() -> anyhow::Result<()> {
        let mut db = MockDatabase::new();
        let keyset = MintKeyset::new_with(
            "TEST_PRIVATE_KEY".to_string(),
            "0/0/0/0".to_string(),
            CurrencyUnit::Sat,
            0,
        );
        let existing = BlindedSignature {
            amount: 8,
            c_: keyset.mint_pubkey,
            id: Some(keyset.keyset_id.clone()),
            dleq: None,
        };
        db.expect_get_promise()
            .returning(move |_| Ok(Some(existing.clone())));
        let mint = test_mint(MockLightning::new(), db).await;
        let active = mint.active_keyset(CurrencyUnit::Sat).await?;

        let (b_, _r) = mint.dhke.step1_alice("already-signed-secret", None)?;
        let outputs = vec![BlindedMessage {
            amount: 8,
            b_,
            id: active.keyset_id,
        }];

        let result = mint.create_blinded_signatures(&outputs).await;
        assert!(matches!(
            result,
            Err(MokshaMintError::OutputAlreadySigned(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_swap_with_matching_amounts_succeeds() -> anyhow::Result<()> {
        let mut db = MockDatabase::new();
        db.expect_list_spent().returning(|_| Ok(vec![]));
        db.expect_list_pending().returning(|_| Ok(vec![]));
        db.expect_get_promise().returning(|_| Ok(None));
        db.expect_insert_promise().returning(|_, _| Ok(()));
        db.expect_insert_spent().returning(|_, _| Ok(()));
        let mint = test_mint(MockLightning::new(), db).await;
        let keyset = mint.active_keyset(CurrencyUnit::Sat).await?;

        let amount = 8u64;
        let a_priv = keyset.private_keys.get(&amount).unwrap();
        let a_pub = keyset.public_keys.get(&amount).unwrap();
        let secret = "swap-secret".to_string();
        let (b_, r) = mint.dhke.step1_alice(secret.clone(), None)?;
        let c_ = mint.dhke.step2_bob(b_, a_priv)?;
        let c = mint.dhke.step3_alice(c_, r, *a_pub)?;
        let input = Proof::new(amount, secret, c, keyset.keyset_id.clone());

        let (out_b_, _r) = mint.dhke.step1_alice("swap-output-secret", None)?;
        let outputs = vec![BlindedMessage {
            amount,
            b_: out_b_,
            id: keyset.keyset_id,
        }];

        let signatures = mint.swap(&Proofs::new(vec![input]), &outputs).await?;
        assert_eq!(signatures.len(), 1);
        assert_eq!(signatures[0].amount, amount);
        Ok(())
    }

    #[tokio::test]
    async fn test_swap_amount_mismatch_is_rejected() -> anyhow::Result<()> {
        let mut db = MockDatabase::new();
        db.expect_list_spent().returning(|_| Ok(vec![]));
        db.expect_list_pending().returning(|_| Ok(vec![]));
        let mint = test_mint(MockLightning::new(), db).await;
        let keyset = mint.active_keyset(CurrencyUnit::Sat).await?;

        let amount = 8u64;
        let a_priv = keyset.private_keys.get(&amount).unwrap();
        let a_pub = keyset.public_keys.get(&amount).unwrap();
        let secret = "swap-mismatch-secret".to_string();
        let (b_, r) = mint.dhke.step1_alice(secret.clone(), None)?;
        let c_ = mint.dhke.step2_bob(b_, a_priv)?;
        let c = mint.dhke.step3_alice(c_, r, *a_pub)?;
        let input = Proof::new(amount, secret, c, keyset.keyset_id.clone());

        // ask for change worth less than the input - must be rejected before any signing.
        let (out_b_, _r) = mint.dhke.step1_alice("mismatch-output-secret", None)?;
        let outputs = vec![BlindedMessage {
            amount: 4,
            b_: out_b_,
            id: keyset.keyset_id,
        }];

        let result = mint.swap(&Proofs::new(vec![input]), &outputs).await;
        assert!(matches!(result, Err(MokshaMintError::AmountUnbalanced(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_melt_quote_bolt11_sources_fee_reserve_from_payment_quote() -> anyhow::Result<()> {
        let mut lightning = MockLightning::new();
        lightning.expect_get_payment_quote().returning(|_, _| {
            Ok(PaymentQuote {
                checking_id: "checking-id".to_string(),
                amount: 8,
                fee_reserve: 2,
            })
        });
        let mut db = MockDatabase::new();
        db.expect_upsert_melt_quote().returning(|_| Ok(()));
        let mint = test_mint(lightning, db).await;

        let quote = mint
            .melt_quote_bolt11(CurrencyUnit::Sat, "lnbc1invoice".to_string())
            .await?;
        assert_eq!(quote.amount, 8);
        assert_eq!(quote.fee_reserve, 2);
        assert_eq!(quote.checking_id, "checking-id");
        assert_eq!(quote.state, MeltQuoteState::Unpaid);
        Ok(())
    }

    fn melt_quote_fixture(quote_id: Uuid) -> Bolt11MeltQuote {
        Bolt11MeltQuote {
            quote_id,
            payment_request: "lnbc1invoice".to_string(),
            checking_id: "checking-id".to_string(),
            unit: CurrencyUnit::Sat,
            amount: 8,
            fee_reserve: 1,
            state: MeltQuoteState::Pending,
            change: None,
            payment_preimage: None,
            created_at: Utc::now().timestamp(),
            expiry: (Utc::now().timestamp() + 1800) as u64,
        }
    }

    // every melt_bolt11 test covers an input worth 16 sat against an 8 sat quote + 1 sat fee
    // reserve, so the same keyset/proof math is repeated inline rather than factored out, since
    // the thing under test is what each test does with the db/lightning mocks around it.

    #[tokio::test]
    async fn test_melt_bolt11_settles_on_paid_status() -> anyhow::Result<()> {
        let quote_id = Uuid::new_v4();
        let mut lightning = MockLightning::new();
        lightning.expect_pay_invoice().returning(|_, _| {
            Ok(PayInvoiceResult {
                payment_hash: "hash".to_string(),
                payment_preimage: Some("preimage".to_string()),
                total_fees: 0,
                status: PayInvoiceStatus::Paid,
            })
        });
        let mut db = MockDatabase::new();
        let quote = melt_quote_fixture(quote_id);
        db.expect_try_start_melt()
            .returning(move |_| Ok(quote.clone()));
        db.expect_list_spent().returning(|_| Ok(vec![]));
        db.expect_list_pending().returning(|_| Ok(vec![]));
        db.expect_insert_pending().returning(|_, _| Ok(()));
        db.expect_get_mint_quote_by_checking_id()
            .returning(|_| Ok(None));
        db.expect_insert_spent().returning(|_, _| Ok(()));
        db.expect_delete_pending().returning(|_| Ok(()));
        db.expect_upsert_melt_quote()
            .withf(|q| q.state == MeltQuoteState::Paid)
            .returning(|_| Ok(()));
        let mint = test_mint(lightning, db).await;
        let keyset = mint.active_keyset(CurrencyUnit::Sat).await?;

        let amount = 16u64;
        let a_priv = keyset.private_keys.get(&amount).unwrap();
        let a_pub = keyset.public_keys.get(&amount).unwrap();
        let secret = "melt-paid-secret".to_string();
        let (b_, r) = mint.dhke.step1_alice(secret.clone(), None)?;
        let c_ = mint.dhke.step2_bob(b_, a_priv)?;
        let c = mint.dhke.step3_alice(c_, r, *a_pub)?;
        let input = Proof::new(amount, secret, c, keyset.keyset_id.clone());

        let quote = mint
            .melt_bolt11(quote_id, &Proofs::new(vec![input]), None)
            .await?;
        assert_eq!(quote.state, MeltQuoteState::Paid);
        Ok(())
    }

    #[tokio::test]
    async fn test_melt_bolt11_leaves_quote_pending_on_pending_status() -> anyhow::Result<()> {
        let quote_id = Uuid::new_v4();
        let mut lightning = MockLightning::new();
        lightning.expect_pay_invoice().returning(|_, _| {
            Ok(PayInvoiceResult {
                payment_hash: "hash".to_string(),
                payment_preimage: None,
                total_fees: 0,
                status: PayInvoiceStatus::Pending,
            })
        });
        let mut db = MockDatabase::new();
        let quote = melt_quote_fixture(quote_id);
        db.expect_try_start_melt()
            .returning(move |_| Ok(quote.clone()));
        db.expect_list_spent().returning(|_| Ok(vec![]));
        db.expect_list_pending().returning(|_| Ok(vec![]));
        db.expect_insert_pending().returning(|_, _| Ok(()));
        db.expect_get_mint_quote_by_checking_id()
            .returning(|_| Ok(None));
        // a PENDING outcome must not release the inputs: no insert_spent/delete_pending call.
        db.expect_upsert_melt_quote()
            .withf(|q| q.state == MeltQuoteState::Pending)
            .returning(|_| Ok(()));
        let mint = test_mint(lightning, db).await;
        let keyset = mint.active_keyset(CurrencyUnit::Sat).await?;

        let amount = 16u64;
        let a_priv = keyset.private_keys.get(&amount).unwrap();
        let a_pub = keyset.public_keys.get(&amount).unwrap();
        let secret = "melt-pending-secret".to_string();
        let (b_, r) = mint.dhke.step1_alice(secret.clone(), None)?;
        let c_ = mint.dhke.step2_bob(b_, a_priv)?;
        let c = mint.dhke.step3_alice(c_, r, *a_pub)?;
        let input = Proof::new(amount, secret, c, keyset.keyset_id.clone());

        let quote = mint
            .melt_bolt11(quote_id, &Proofs::new(vec![input]), None)
            .await?;
        assert_eq!(quote.state, MeltQuoteState::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn test_melt_bolt11_releases_inputs_on_failed_status() -> anyhow::Result<()> {
        let quote_id = Uuid::new_v4();
        let mut lightning = MockLightning::new();
        lightning.expect_pay_invoice().returning(|_, _| {
            Ok(PayInvoiceResult {
                payment_hash: "hash".to_string(),
                payment_preimage: None,
                total_fees: 0,
                status: PayInvoiceStatus::Failed,
            })
        });
        let mut db = MockDatabase::new();
        let quote = melt_quote_fixture(quote_id);
        db.expect_try_start_melt()
            .returning(move |_| Ok(quote.clone()));
        db.expect_list_spent().returning(|_| Ok(vec![]));
        db.expect_list_pending().returning(|_| Ok(vec![]));
        db.expect_insert_pending().returning(|_, _| Ok(()));
        db.expect_get_mint_quote_by_checking_id()
            .returning(|_| Ok(None));
        db.expect_delete_pending().returning(|_| Ok(()));
        db.expect_upsert_melt_quote()
            .withf(|q| q.state == MeltQuoteState::Unpaid)
            .returning(|_| Ok(()));
        let mint = test_mint(lightning, db).await;
        let keyset = mint.active_keyset(CurrencyUnit::Sat).await?;

        let amount = 16u64;
        let a_priv = keyset.private_keys.get(&amount).unwrap();
        let a_pub = keyset.public_keys.get(&amount).unwrap();
        let secret = "melt-failed-secret".to_string();
        let (b_, r) = mint.dhke.step1_alice(secret.clone(), None)?;
        let c_ = mint.dhke.step2_bob(b_, a_priv)?;
        let c = mint.dhke.step3_alice(c_, r, *a_pub)?;
        let input = Proof::new(amount, secret, c, keyset.keyset_id.clone());

        let quote = mint
            .melt_bolt11(quote_id, &Proofs::new(vec![input]), None)
            .await?;
        assert_eq!(quote.state, MeltQuoteState::Unpaid);
        Ok(())
    }

    #[tokio::test]
    async fn test_melt_bolt11_leaves_quote_pending_on_transient_error() -> anyhow::Result<()> {
        let quote_id = Uuid::new_v4();
        let mut lightning = MockLightning::new();
        lightning.expect_pay_invoice().returning(|_, _| {
            Err(MokshaMintError::Lightning(LightningError::Connect(
                "timeout".to_string(),
            )))
        });
        let mut db = MockDatabase::new();
        let quote = melt_quote_fixture(quote_id);
        db.expect_try_start_melt()
            .returning(move |_| Ok(quote.clone()));
        db.expect_list_spent().returning(|_| Ok(vec![]));
        db.expect_list_pending().returning(|_| Ok(vec![]));
        db.expect_insert_pending().returning(|_, _| Ok(()));
        db.expect_get_mint_quote_by_checking_id()
            .returning(|_| Ok(None));
        // transient/ambiguous errors must not release inputs either: only upsert, no delete.
        db.expect_upsert_melt_quote()
            .withf(|q| q.state == MeltQuoteState::Pending)
            .returning(|_| Ok(()));
        let mint = test_mint(lightning, db).await;
        let keyset = mint.active_keyset(CurrencyUnit::Sat).await?;

        let amount = 16u64;
        let a_priv = keyset.private_keys.get(&amount).unwrap();
        let a_pub = keyset.public_keys.get(&amount).unwrap();
        let secret = "melt-transient-error-secret".to_string();
        let (b_, r) = mint.dhke.step1_alice(secret.clone(), None)?;
        let c_ = mint.dhke.step2_bob(b_, a_priv)?;
        let c = mint.dhke.step3_alice(c_, r, *a_pub)?;
        let input = Proof::new(amount, secret, c, keyset.keyset_id.clone());

        let quote = mint
            .melt_bolt11(quote_id, &Proofs::new(vec![input]), None)
            .await?;
        assert_eq!(quote.state, MeltQuoteState::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn test_melt_bolt11_releases_inputs_on_permanent_lightning_error() -> anyhow::Result<()>
    {
        let quote_id = Uuid::new_v4();
        let mut lightning = MockLightning::new();
        lightning
            .expect_pay_invoice()
            .returning(|_, _| Err(MokshaMintError::LightningPermanent("rejected".to_string())));
        let mut db = MockDatabase::new();
        let quote = melt_quote_fixture(quote_id);
        db.expect_try_start_melt()
            .returning(move |_| Ok(quote.clone()));
        db.expect_list_spent().returning(|_| Ok(vec![]));
        db.expect_list_pending().returning(|_| Ok(vec![]));
        db.expect_insert_pending().returning(|_, _| Ok(()));
        db.expect_get_mint_quote_by_checking_id()
            .returning(|_| Ok(None));
        db.expect_delete_pending().returning(|_| Ok(()));
        db.expect_upsert_melt_quote()
            .withf(|q| q.state == MeltQuoteState::Unpaid)
            .returning(|_| Ok(()));
        let mint = test_mint(lightning, db).await;
        let keyset = mint.active_keyset(CurrencyUnit::Sat).await?;

        let amount = 16u64;
        let a_priv = keyset.private_keys.get(&amount).unwrap();
        let a_pub = keyset.public_keys.get(&amount).unwrap();
        let secret = "melt-permanent-error-secret".to_string();
        let (b_, r) = mint.dhke.step1_alice(secret.clone(), None)?;
        let c_ = mint.dhke.step2_bob(b_, a_priv)?;
        let c = mint.dhke.step3_alice(c_, r, *a_pub)?;
        let input = Proof::new(amount, secret, c, keyset.keyset_id.clone());

        let quote = mint
            .melt_bolt11(quote_id, &Proofs::new(vec![input]), None)
            .await?;
        assert_eq!(quote.state, MeltQuoteState::Unpaid);
        Ok(())
    }

    #[tokio::test]
    async fn test_mint_quote_bolt11_creates_unpaid_quote() -> anyhow::Result<()> {
        let mut lightning = MockLightning::new();
        lightning.expect_create_invoice().returning(|_amount| {
            Ok(CreateInvoiceResult {
                payment_hash: vec![1, 2, 3, 4],
                payment_request: "lnbc1invoice".to_string(),
            })
        });
        let mut db = MockDatabase::new();
        db.expect_upsert_mint_quote().returning(|_| Ok(()));
        let mint = test_mint(lightning, db).await;

        let quote = mint.mint_quote_bolt11(CurrencyUnit::Sat, 21).await?;
        assert_eq!(quote.state, MintQuoteState::Unpaid);
        assert_eq!(quote.amount, 21);
        assert_eq!(quote.checking_id, hex::encode([1, 2, 3, 4]));
        Ok(())
    }

    #[tokio::test]
    async fn test_mint_bolt11_rejects_unpaid_quote() -> anyhow::Result<()> {
        let quote = Bolt11MintQuote {
            quote_id: Uuid::new_v4(),
            payment_request: "lnbc1invoice".to_string(),
            checking_id: "abc".to_string(),
            unit: CurrencyUnit::Sat,
            amount: 8,
            state: MintQuoteState::Unpaid,
            expiry: (Utc::now().timestamp() + 1800) as u64,
            created_at: Utc::now().timestamp(),
            paid_at: None,
        };

        let mut lightning = MockLightning::new();
        lightning
            .expect_get_invoice_status()
            .returning(|_| Ok(crate::lightning::InvoiceStatus::Unpaid));
        let mut db = MockDatabase::new();
        let returned = quote.clone();
        db.expect_get_mint_quote_by_id()
            .returning(move |_| Ok(returned.clone()));
        let mint = test_mint(lightning, db).await;

        let keyset = mint.active_keyset(CurrencyUnit::Sat).await?;
        let (b_, _r) = mint.dhke.step1_alice("mint-bolt11-secret", None)?;
        let outputs = vec![BlindedMessage {
            amount: 8,
            b_,
            id: keyset.keyset_id,
        }];

        let result = mint.mint_bolt11(quote.quote_id, &outputs).await;
        assert!(matches!(result, Err(MokshaMintError::QuoteNotPaid(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_mint_bolt11_signs_and_claims_paid_quote() -> anyhow::Result<()> {
        let quote = Bolt11MintQuote {
            quote_id: Uuid::new_v4(),
            payment_request: "lnbc1invoice".to_string(),
            checking_id: "abc".to_string(),
            unit: CurrencyUnit::Sat,
            amount: 8,
            state: MintQuoteState::Paid,
            expiry: (Utc::now().timestamp() + 1800) as u64,
            created_at: Utc::now().timestamp(),
            paid_at: Some(Utc::now().timestamp()),
        };

        let mut db = MockDatabase::new();
        let returned = quote.clone();
        db.expect_get_mint_quote_by_id()
            .returning(move |_| Ok(returned.clone()));
        let issued = quote.clone();
        db.expect_try_start_mint().returning(move |_| {
            let mut q = issued.clone();
            q.state = MintQuoteState::Issued;
            Ok(q)
        });
        db.expect_get_promise().returning(|_| Ok(None));
        db.expect_insert_promise().returning(|_, _| Ok(()));
        let mint = test_mint(MockLightning::new(), db).await;

        let keyset = mint.active_keyset(CurrencyUnit::Sat).await?;
        let (b_, _r) = mint.dhke.step1_alice("mint-bolt11-issue-secret", None)?;
        let outputs = vec![BlindedMessage {
            amount: 8,
            b_,
            id: keyset.keyset_id,
        }];

        let signatures = mint.mint_bolt11(quote.quote_id, &outputs).await?;
        assert_eq!(signatures.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_mint_bolt11_rejects_concurrently_claimed_quote() -> anyhow::Result<()> {
        let quote = Bolt11MintQuote {
            quote_id: Uuid::new_v4(),
            payment_request: "lnbc1invoice".to_string(),
            checking_id: "abc".to_string(),
            unit: CurrencyUnit::Sat,
            amount: 8,
            state: MintQuoteState::Paid,
            expiry: (Utc::now().timestamp() + 1800) as u64,
            created_at: Utc::now().timestamp(),
            paid_at: Some(Utc::now().timestamp()),
        };

        let mut db = MockDatabase::new();
        let returned = quote.clone();
        db.expect_get_mint_quote_by_id()
            .returning(move |_| Ok(returned.clone()));
        let locked_id = quote.quote_id;
        db.expect_try_start_mint()
            .returning(move |_| Err(MokshaMintError::QuoteLocked(locked_id.to_string())));
        let mint = test_mint(MockLightning::new(), db).await;

        let keyset = mint.active_keyset(CurrencyUnit::Sat).await?;
        let (b_, _r) = mint.dhke.step1_alice("mint-bolt11-race-secret", None)?;
        let outputs = vec![BlindedMessage {
            amount: 8,
            b_,
            id: keyset.keyset_id,
        }];

        let result = mint.mint_bolt11(quote.quote_id, &outputs).await;
        assert!(matches!(result, Err(MokshaMintError::QuoteLocked(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_check_state_reports_unspent_by_default() -> anyhow::Result<()> {
        let mut db = MockDatabase::new();
        db.expect_list_spent().returning(|_| Ok(vec![]));
        db.expect_list_pending().returning(|_| Ok(vec![]));
        let mint = test_mint(MockLightning::new(), db).await;

        let y = Dhke::hash_to_curve(b"check-state-secret");
        let states = mint.check_state(vec![y]).await?;
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].state, ProofState::Unspent);
        Ok(())
    }

    #[tokio::test]
    async fn test_check_state_reports_spent() -> anyhow::Result<()> {
        let mut db = MockDatabase::new();
        let y = Dhke::hash_to_curve(b"spent-secret");
        db.expect_list_spent().returning(move |_| Ok(vec![y]));
        db.expect_list_pending().returning(|_| Ok(vec![]));
        let mint = test_mint(MockLightning::new(), db).await;

        let states = mint.check_state(vec![y]).await?;
        assert_eq!(states[0].state, ProofState::Spent);
        Ok(())
    }

    #[tokio::test]
    async fn test_restore_only_returns_known_outputs() -> anyhow::Result<()> {
        let mut db = MockDatabase::new();
        db.expect_get_promise().returning(|_| Ok(None));
        let mint = test_mint(MockLightning::new(), db).await;

        let (b_, _r) = mint.dhke.step1_alice("restore-secret", None)?;
        let outputs = vec![BlindedMessage {
            amount: 8,
            b_,
            id: "unused".to_string(),
        }];

        let (found, signatures) = mint.restore(&outputs).await?;
        assert!(found.is_empty());
        assert!(signatures.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_recover_pending_melts_resets_failed_payment_to_unpaid() -> anyhow::Result<()> {
        let quote = Bolt11MeltQuote {
            quote_id: Uuid::new_v4(),
            payment_request: "lnbc1invoice".to_string(),
            checking_id: "abc".to_string(),
            unit: CurrencyUnit::Sat,
            amount: 8,
            fee_reserve: 1,
            state: MeltQuoteState::Pending,
            change: None,
            payment_preimage: None,
            created_at: Utc::now().timestamp(),
            expiry: (Utc::now().timestamp() + 1800) as u64,
        };

        let mut lightning = MockLightning::new();
        lightning
            .expect_get_payment_status()
            .returning(|_| Ok(PaymentStatus::Failed));
        let mut db = MockDatabase::new();
        db.expect_list_pending_melt_quotes()
            .returning(move || Ok(vec![quote.clone()]));
        db.expect_upsert_melt_quote()
            .withf(|q| q.state == MeltQuoteState::Unpaid)
            .returning(|_| Ok(()));
        let mint = test_mint(lightning, db).await;

        mint.recover_pending_melts().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_poll_unpaid_mint_quotes_transitions_paid_invoice() -> anyhow::Result<()> {
        let quote = Bolt11MintQuote {
            quote_id: Uuid::new_v4(),
            payment_request: "lnbc1invoice".to_string(),
            checking_id: "abc".to_string(),
            unit: CurrencyUnit::Sat,
            amount: 8,
            state: MintQuoteState::Unpaid,
            expiry: (Utc::now().timestamp() + 1800) as u64,
            created_at: Utc::now().timestamp(),
            paid_at: None,
        };

        let mut lightning = MockLightning::new();
        lightning
            .expect_get_invoice_status()
            .returning(|_| Ok(crate::lightning::InvoiceStatus::Paid));
        let mut db = MockDatabase::new();
        db.expect_list_unpaid_mint_quotes()
            .returning(move || Ok(vec![quote.clone()]));
        db.expect_get_mint_quote_by_id()
            .returning(move |id| {
                Ok(Bolt11MintQuote {
                    quote_id: id,
                    payment_request: "lnbc1invoice".to_string(),
                    checking_id: "abc".to_string(),
                    unit: CurrencyUnit::Sat,
                    amount: 8,
                    state: MintQuoteState::Unpaid,
                    expiry: (Utc::now().timestamp() + 1800) as u64,
                    created_at: Utc::now().timestamp(),
                    paid_at: None,
                })
            });
        db.expect_upsert_mint_quote()
            .withf(|q| q.state == MintQuoteState::Paid)
            .returning(|_| Ok(()));
        let mint = test_mint(lightning, db).await;

        mint.poll_unpaid_mint_quotes().await?;
        Ok(())
    }
}
