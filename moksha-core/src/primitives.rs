//! This module contains all the request and response objects that are used for interacting
//! between the Mint and Wallet over the `/v1/*` API, and the mint/melt quote and proof-state
//! data transferred between the engine and its persistence layer.

use chrono::Utc;
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    blind::{BlindedMessage, BlindedSignature},
    keyset::{CurrencyUnit, PaymentMethod, V1Keyset, V1KeysetInfo},
    proof::Proofs,
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeysResponse {
    pub keysets: Vec<V1Keyset>,
}

pub type KeyResponse = KeysResponse;

// ---------------------------------------------------------------------------------------
// Quote state machines (§3 MintQuote / MeltQuote)
// ---------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum MintQuoteState {
    Unpaid,
    Paid,
    Issued,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeltQuoteState {
    Unpaid,
    Pending,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Bolt11MintQuote {
    pub quote_id: Uuid,
    pub payment_request: String,
    pub checking_id: String,
    pub unit: CurrencyUnit,
    pub amount: u64,
    pub state: MintQuoteState,
    pub expiry: u64,
    pub created_at: i64,
    pub paid_at: Option<i64>,
}

impl Bolt11MintQuote {
    pub fn is_expired(&self) -> bool {
        self.state == MintQuoteState::Unpaid && (self.expiry as i64) < Utc::now().timestamp()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Bolt11MeltQuote {
    pub quote_id: Uuid,
    pub payment_request: String,
    pub checking_id: String,
    pub unit: CurrencyUnit,
    pub amount: u64,
    pub fee_reserve: u64,
    pub state: MeltQuoteState,
    pub change: Option<Vec<BlindedSignature>>,
    pub payment_preimage: Option<String>,
    pub created_at: i64,
    pub expiry: u64,
}

// ---------------------------------------------------------------------------------------
// Proof state (§4.6 proof-state check)
// ---------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProofState {
    Unspent,
    Pending,
    Spent,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProofStateEntry {
    #[serde(rename = "Y")]
    #[schema(value_type = String)]
    pub y: PublicKey,
    pub state: ProofState,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub witness: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostCheckStateRequest {
    #[serde(rename = "Ys")]
    #[schema(value_type = Vec<String>)]
    pub ys: Vec<PublicKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostCheckStateResponse {
    pub states: Vec<ProofStateEntry>,
}

// ---------------------------------------------------------------------------------------
// Restore (§4.6 restore)
// ---------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostRestoreRequest {
    pub outputs: Vec<BlindedMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct PostRestoreResponse {
    pub outputs: Vec<BlindedMessage>,
    pub signatures: Vec<BlindedSignature>,
}

// ---------------------------------------------------------------------------------------
// Swap (NUT-03)
// ---------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostSwapRequest {
    pub inputs: Proofs,
    pub outputs: Vec<BlindedMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct PostSwapResponse {
    pub signatures: Vec<BlindedSignature>,
}

// ---------------------------------------------------------------------------------------
// Mint quote / mint (NUT-04)
// ---------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostMintQuoteBolt11Request {
    pub unit: CurrencyUnit,
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostMintQuoteBolt11Response {
    pub quote: Uuid,
    pub request: String,
    pub state: MintQuoteState,
    pub expiry: u64,
}

impl From<&Bolt11MintQuote> for PostMintQuoteBolt11Response {
    fn from(q: &Bolt11MintQuote) -> Self {
        Self {
            quote: q.quote_id,
            request: q.payment_request.clone(),
            state: q.state,
            expiry: q.expiry,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostMintBolt11Request {
    pub quote: Uuid,
    pub outputs: Vec<BlindedMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct PostMintBolt11Response {
    pub signatures: Vec<BlindedSignature>,
}

// ---------------------------------------------------------------------------------------
// Melt quote / melt (NUT-05)
// ---------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostMeltQuoteBolt11Request {
    pub unit: CurrencyUnit,
    pub request: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostMeltQuoteBolt11Response {
    pub quote: Uuid,
    pub amount: u64,
    pub fee_reserve: u64,
    pub state: MeltQuoteState,
    pub expiry: u64,
}

impl From<&Bolt11MeltQuote> for PostMeltQuoteBolt11Response {
    fn from(q: &Bolt11MeltQuote) -> Self {
        Self {
            quote: q.quote_id,
            amount: q.amount,
            fee_reserve: q.fee_reserve,
            state: q.state,
            expiry: q.expiry,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostMeltBolt11Request {
    pub quote: Uuid,
    pub inputs: Proofs,
    #[serde(default)]
    pub outputs: Option<Vec<BlindedMessage>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostMeltBolt11Response {
    pub state: MeltQuoteState,
    pub payment_preimage: Option<String>,
    pub change: Option<Vec<BlindedSignature>>,
}

impl From<&Bolt11MeltQuote> for PostMeltBolt11Response {
    fn from(q: &Bolt11MeltQuote) -> Self {
        Self {
            state: q.state,
            payment_preimage: q.payment_preimage.clone(),
            change: q.change.clone(),
        }
    }
}

// ---------------------------------------------------------------------------------------
// Mint info (NUT-06)
// ---------------------------------------------------------------------------------------

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct MintInfoResponse {
    pub name: Option<String>,
    #[schema(value_type = String)]
    pub pubkey: PublicKey,
    pub version: Option<String>,
    pub description: Option<String>,
    pub description_long: Option<String>,
    pub contact: Option<Vec<Vec<String>>>,
    pub motd: Option<String>,
    pub nuts: Nuts,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema, Default)]
pub struct Nuts {
    pub nut4: NutPaymentMethodInfo,
    pub nut5: NutPaymentMethodInfo,
    pub nut7: NutSupported,
    pub nut8: NutSupported,
    pub nut9: NutSupported,
    pub nut10: NutSupported,
    pub nut11: NutSupported,
    pub nut12: NutSupported,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema, Default)]
pub struct NutPaymentMethodInfo {
    pub methods: Vec<NutMethodUnit>,
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct NutMethodUnit {
    pub method: PaymentMethod,
    pub unit: CurrencyUnit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, ToSchema, Default)]
pub struct NutSupported {
    pub supported: bool,
}

#[derive(Debug, Deserialize)]
pub struct CashuErrorResponse {
    pub code: u16,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use crate::{dhke::public_key_from_hex, keyset::CurrencyUnit, primitives::*};

    #[test]
    fn test_serialize_empty_swap_response() -> anyhow::Result<()> {
        let response = PostSwapResponse::default();
        let serialized = serde_json::to_string(&response)?;
        assert_eq!(serialized, "{\"signatures\":[]}");
        Ok(())
    }

    #[test]
    fn test_mint_quote_response_state() -> anyhow::Result<()> {
        let response = PostMintQuoteBolt11Response {
            quote: uuid::Uuid::nil(),
            request: "lnbc1...".to_string(),
            state: MintQuoteState::Unpaid,
            expiry: 1000,
        };
        let out = serde_json::to_string(&response)?;
        assert!(out.contains("\"UNPAID\""));
        Ok(())
    }

    #[test]
    fn test_deserialize_mint_info() -> anyhow::Result<()> {
        let mint_info = MintInfoResponse {
            name: Some("Bob's Cashu mint".to_string()),
            pubkey: public_key_from_hex(
                "02a9acc1e48c25eeeb9289b5031cc57da9fe72f3fe2861d264bdc074209b107ba2",
            ),
            version: Some("moksha-mint/0.2.1".to_string()),
            description: Some("The short mint description".to_string()),
            description_long: Some("A description that can be a long piece of text.".to_string()),
            contact: Some(vec![vec!["email".to_string(), "contact@me.com".to_string()]]),
            motd: Some("Message to display to users.".to_string()),
            nuts: Nuts {
                nut4: NutPaymentMethodInfo {
                    methods: vec![NutMethodUnit {
                        method: crate::keyset::PaymentMethod::Bolt11,
                        unit: CurrencyUnit::Sat,
                    }],
                    disabled: false,
                },
                ..Default::default()
            },
        };
        let out = serde_json::to_string_pretty(&mint_info)?;
        assert!(!out.is_empty());
        Ok(())
    }
}
