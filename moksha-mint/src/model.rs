//! Request/result payloads passed between the mint engine and the [`crate::lightning::Lightning`]
//! backend implementations. These never cross the wallet-facing `/v1/*` API directly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct CreateInvoiceParams {
    pub amount: u64,
    pub unit: String,
    pub memo: Option<String>,
    pub expiry: Option<u64>,
    pub webhook: Option<String>,
    pub internal: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct CreateInvoiceResult {
    pub payment_hash: Vec<u8>,
    pub payment_request: String,
}

/// Outcome of a `C7.pay_invoice` call. `Paid` and `Failed` are terminal; `Pending` means the
/// backend accepted the payment attempt but could not confirm settlement before returning, and
/// the mint must leave the melt quote `PENDING` rather than guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayInvoiceStatus {
    Paid,
    Pending,
    Failed,
}

/// A handful of backends (lnbits) only return an opaque 200 on success and an error status
/// otherwise, with no explicit status field in the body; `Paid` is the safe default there since
/// the error case is already routed through `Err` before this type is ever constructed.
fn default_pay_invoice_status() -> PayInvoiceStatus {
    PayInvoiceStatus::Paid
}

/// Not every backend can surface a preimage (some REST APIs just don't return one); callers
/// that need it for NUT-05's `payment_preimage` should treat `None` as "unavailable", not
/// as a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayInvoiceResult {
    pub payment_hash: String,
    #[serde(default)]
    pub payment_preimage: Option<String>,
    #[serde(default)]
    pub total_fees: u64,
    #[serde(default = "default_pay_invoice_status")]
    pub status: PayInvoiceStatus,
}

/// Response to `C7.get_payment_quote`: what it would cost this backend to route `bolt11`.
#[derive(Debug, Clone)]
pub struct PaymentQuote {
    pub checking_id: String,
    pub amount: u64,
    pub fee_reserve: u64,
}
