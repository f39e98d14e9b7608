//! This module defines the `Token` struct, which is used for representing tokens in Cashu as described in [Nut-00](https://github.com/cashubtc/nuts/blob/main/00.md)
//!
//! The `Token` struct represents a token, with an optional `mint` field for the URL of the Mint and a `proofs` field for the proofs associated with the token.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::skip_serializing_none;
use url::Url;

use crate::{
    error::MokshaCoreError,
    keyset::CurrencyUnit,
    proof::{Proof, Proofs},
};

const TOKEN_PREFIX_V3: &str = "cashuA";
const TOKEN_PREFIX_V4: &str = "cashuB";

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    #[serde(serialize_with = "serialize_url", deserialize_with = "deserialize_url")]
    pub mint: Option<Url>,
    pub proofs: Proofs,
}

fn deserialize_url<'de, D>(deserializer: D) -> Result<Option<Url>, D::Error>
where
    D: Deserializer<'de>,
{
    let url_str: Option<String> = Option::deserialize(deserializer)?;
    match url_str {
        Some(s) => Url::parse(&s).map_err(serde::de::Error::custom).map(Some),
        None => Ok(None),
    }
}

fn serialize_url<S>(url: &Option<Url>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match url {
        Some(url) => {
            let mut url_str = url.as_str().to_owned();
            if url_str.ends_with('/') {
                url_str.pop();
            }
            serializer.serialize_str(&url_str)
        }
        None => serializer.serialize_none(),
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenV3 {
    #[serde(rename = "token")]
    pub tokens: Vec<Token>,
    pub memo: Option<String>,
}

impl TokenV3 {
    pub fn new(token: Token) -> Self {
        Self {
            tokens: vec![token],
            memo: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            tokens: vec![],
            memo: None,
        }
    }

    pub fn total_amount(&self) -> u64 {
        self.tokens
            .iter()
            .map(|token| {
                token
                    .proofs
                    .proofs()
                    .iter()
                    .map(|proof| proof.amount)
                    .sum::<u64>()
            })
            .sum()
    }

    pub fn proofs(&self) -> Proofs {
        Proofs::new(
            self.tokens
                .iter()
                .flat_map(|token| token.proofs.proofs())
                .collect(),
        )
    }

    pub fn serialize(&self) -> Result<String, MokshaCoreError> {
        let json = serde_json::to_string(&self)?;
        Ok(format!(
            "{}{}",
            TOKEN_PREFIX_V3,
            general_purpose::URL_SAFE.encode(json.as_bytes())
        ))
    }

    pub fn deserialize(data: impl Into<String>) -> Result<TokenV3, MokshaCoreError> {
        let json = general_purpose::URL_SAFE.decode(
            data.into()
                .strip_prefix(TOKEN_PREFIX_V3)
                .ok_or(MokshaCoreError::InvalidTokenPrefix)?
                .as_bytes(),
        )?;
        Ok(serde_json::from_slice::<TokenV3>(&json)?)
    }

    pub fn mint(&self) -> Option<Url> {
        self.tokens
            .first()
            .and_then(|token| token.mint.as_ref())
            .map(|url| url.to_owned())
    }
}

impl TryFrom<TokenV3> for String {
    type Error = MokshaCoreError;

    fn try_from(token: TokenV3) -> Result<Self, Self::Error> {
        token.serialize()
    }
}

impl TryFrom<String> for TokenV3 {
    type Error = MokshaCoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::deserialize(value)
    }
}

impl From<(Url, Proofs)> for TokenV3 {
    fn from(from: (Url, Proofs)) -> Self {
        Self {
            tokens: vec![Token {
                mint: Some(from.0),
                proofs: from.1,
            }],
            memo: None,
        }
    }
}

/// One keyset's worth of proofs within a V4 token, CBOR field names kept maximally short
/// per NUT-00.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenV4Entry {
    #[serde(rename = "i", with = "cbor_bytes")]
    pub keyset_id: Vec<u8>,
    #[serde(rename = "p")]
    pub proofs: Vec<TokenV4Proof>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenV4Proof {
    pub amount: u64,
    #[serde(rename = "s")]
    pub secret: String,
    #[serde(rename = "c", with = "pubkey_bytes")]
    pub c: secp256k1::PublicKey,
    #[serde(rename = "w", skip_serializing_if = "Option::is_none")]
    pub witness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dleq: Option<crate::dhke::DleqProof>,
}

/// The CBOR, "cashuB"-prefixed token format (NUT-00 V4): proofs are grouped by keyset id so
/// the id is not repeated per proof.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenV4 {
    #[serde(rename = "m")]
    pub mint_url: Url,
    #[serde(rename = "u")]
    pub unit: CurrencyUnit,
    #[serde(rename = "t")]
    pub tokens: Vec<TokenV4Entry>,
    #[serde(rename = "d", skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl TokenV4 {
    pub fn serialize(&self) -> Result<String, MokshaCoreError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| MokshaCoreError::CborError(e.to_string()))?;
        Ok(format!(
            "{TOKEN_PREFIX_V4}{}",
            general_purpose::URL_SAFE_NO_PAD.encode(buf)
        ))
    }

    pub fn deserialize(data: impl Into<String>) -> Result<TokenV4, MokshaCoreError> {
        let raw = general_purpose::URL_SAFE_NO_PAD.decode(
            data.into()
                .strip_prefix(TOKEN_PREFIX_V4)
                .ok_or(MokshaCoreError::InvalidTokenPrefix)?
                .as_bytes(),
        )?;
        ciborium::from_reader(raw.as_slice())
            .map_err(|e| MokshaCoreError::CborError(e.to_string()))
    }

    pub fn proofs(&self) -> Proofs {
        Proofs::new(
            self.tokens
                .iter()
                .flat_map(|entry| {
                    let keyset_id = hex::encode(&entry.keyset_id);
                    entry.proofs.iter().map(move |p| Proof {
                        amount: p.amount,
                        keyset_id: keyset_id.clone(),
                        secret: p.secret.clone(),
                        c: p.c,
                        script: None,
                        witness: None,
                    })
                })
                .collect(),
        )
    }
}

mod cbor_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        <Vec<u8>>::deserialize(d)
    }
}

mod pubkey_bytes {
    use secp256k1::PublicKey;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &PublicKey, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(&key.serialize())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<PublicKey, D::Error> {
        let bytes = <Vec<u8>>::deserialize(d)?;
        PublicKey::from_slice(&bytes).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use url::Url;

    use crate::{
        dhke,
        proof::Proof,
        token::{Token, TokenV3},
    };

    #[test]
    fn test_token() -> anyhow::Result<()> {
        let js = json!(
            {
              "mint": "https://8333.space:3338",
              "proofs": [
                {
                  "id": "DSAl9nvvyfva",
                  "amount": 2,
                  "secret": "EhpennC9qB3iFlW8FZ_pZw",
                  "C": "02c020067db727d586bc3183aecf97fcb800c3f4cc4759f69c626c9db5d8f5b5d4"
                },
                {
                  "id": "DSAl9nvvyfva",
                  "amount": 8,
                  "secret": "TmS6Cv0YT5PU_5ATVKnukw",
                  "C": "02ac910bef28cbe5d7325415d5c263026f15f9b967a079ca9779ab6e5c2db133a7"
                }
              ]
        });

        let token = serde_json::from_value::<super::Token>(js)?;
        assert_eq!(token.mint, Some(Url::parse("https://8333.space:3338")?));
        assert_eq!(token.proofs.len(), 2);
        Ok(())
    }

    #[test]
    fn test_tokens_serialize() -> anyhow::Result<()> {
        use base64::{engine::general_purpose, Engine as _};
        let token = Token {
            mint: Some(Url::parse("https://8333.space:3338/")?),
            proofs: Proof {
                amount: 21,
                secret: "secret".to_string(),
                c: dhke::public_key_from_hex(
                    "02c020067db727d586bc3183aecf97fcb800c3f4cc4759f69c626c9db5d8f5b5d4",
                ),
                keyset_id: "someid".to_string(),
                script: None,
                witness: None,
            }
            .into(),
        };
        let tokens = super::TokenV3 {
            tokens: vec![token],
            memo: Some("my memo".to_string()),
        };

        let serialized: String = tokens.try_into()?;
        assert!(serialized.starts_with("cashuA"));

        // check if mint is serialized without trailing slash
        let json = general_purpose::URL_SAFE.decode(serialized.strip_prefix("cashuA").unwrap())?;
        let deser = String::from_utf8(json)?;
        let json: Value = serde_json::from_str(&deser)?;
        let mint_value = json["token"][0]["mint"].as_str();
        assert_eq!(mint_value, Some("https://8333.space:3338"));
        Ok(())
    }

    #[test]
    fn test_tokens_deserialize() -> anyhow::Result<()> {
        let input = "cashuAeyJ0b2tlbiI6W3sibWludCI6Imh0dHBzOi8vODMzMy5zcGFjZTozMzM4IiwicHJvb2ZzIjpbeyJpZCI6IkRTQWw5bnZ2eWZ2YSIsImFtb3VudCI6Miwic2VjcmV0IjoiRWhwZW5uQzlxQjNpRmxXOEZaX3BadyIsIkMiOiIwMmMwMjAwNjdkYjcyN2Q1ODZiYzMxODNhZWNmOTdmY2I4MDBjM2Y0Y2M0NzU5ZjY5YzYyNmM5ZGI1ZDhmNWI1ZDQifSx7ImlkIjoiRFNBbDludnZ5ZnZhIiwiYW1vdW50Ijo4LCJzZWNyZXQiOiJUbVM2Q3YwWVQ1UFVfNUFUVktudWt3IiwiQyI6IjAyYWM5MTBiZWYyOGNiZTVkNzMyNTQxNWQ1YzI2MzAyNmYxNWY5Yjk2N2EwNzljYTk3NzlhYjZlNWMyZGIxMzNhNyJ9XX1dLCJtZW1vIjoiVGhhbmt5b3UuIn0=";
        let tokens = TokenV3::deserialize(input)?;
        assert_eq!(tokens.memo, Some("Thankyou.".to_string()),);
        assert_eq!(tokens.tokens.len(), 1);
        Ok(())
    }

    #[test]
    fn test_token_v4_roundtrip() -> anyhow::Result<()> {
        use crate::keyset::CurrencyUnit;

        let token = super::TokenV4 {
            mint_url: Url::parse("https://mint.example.com")?,
            unit: CurrencyUnit::Sat,
            tokens: vec![super::TokenV4Entry {
                keyset_id: hex::decode("00f545318e4fad2b")?,
                proofs: vec![super::TokenV4Proof {
                    amount: 8,
                    secret: "some-secret".to_string(),
                    c: dhke::public_key_from_hex(
                        "02c020067db727d586bc3183aecf97fcb800c3f4cc4759f69c626c9db5d8f5b5d4",
                    ),
                    witness: None,
                    dleq: None,
                }],
            }],
            memo: None,
        };

        let serialized = token.serialize()?;
        assert!(serialized.starts_with("cashuB"));

        let restored = super::TokenV4::deserialize(serialized)?;
        assert_eq!(restored, token);
        assert_eq!(restored.proofs().total_amount(), 8);
        Ok(())
    }
}
