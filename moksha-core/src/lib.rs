//! `moksha-core` provides the cryptographic and data-model primitives shared by a Cashu
//! mint and its wallet: the BDHKE blind-signature engine, keyset derivation, the
//! P2PK/HTLC/SCT secret-and-witness model, the wire request/response types for the `/v1/*`
//! API, and the `cashuA`/`cashuB` token serialization formats.

pub mod amount;
pub mod blind;
pub mod dhke;
pub mod error;
pub mod fixture;
pub mod keyset;
pub mod primitives;
pub mod proof;
pub mod secret;
pub mod token;
