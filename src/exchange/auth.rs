//! Upbit request authentication
//!
//! Private endpoints take a `Bearer` JWT signed with HS256. The payload
//! carries the access key and a fresh UUID nonce; requests with parameters
//! add the hex SHA-512 of the url-encoded query string.

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use sha2::{Digest, Sha512};

use super::ExchangeError;

#[derive(Debug, Serialize)]
struct Claims<'a> {
    access_key: &'a str,
    nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_hash_alg: Option<&'static str>,
}

/// API credentials container
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    access_key: String,
    secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn is_empty(&self) -> bool {
        self.access_key.is_empty() || self.secret_key.is_empty()
    }

    /// `Authorization` header value for a request with the given parameters
    pub fn authorization(&self, params: &[(&str, String)]) -> Result<String, ExchangeError> {
        if self.is_empty() {
            return Err(ExchangeError::MissingCredentials);
        }

        let (query_hash, query_hash_alg) = if params.is_empty() {
            (None, None)
        } else {
            (Some(query_hash(&query_string(params))), Some("SHA512"))
        };

        let claims = Claims {
            access_key: &self.access_key,
            nonce: uuid::Uuid::new_v4().to_string(),
            query_hash,
            query_hash_alg,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret_key.as_bytes()),
        )?;
        Ok(format!("Bearer {}", token))
    }
}

/// `application/x-www-form-urlencoded` query string, parameter order preserved
pub fn query_string(params: &[(&str, String)]) -> String {
    reqwest::Url::parse_with_params("https://api.upbit.com/", params)
        .ok()
        .and_then(|url| url.query().map(str::to_string))
        .unwrap_or_default()
}

/// Hex-encoded SHA-512 digest
pub fn query_hash(query: &str) -> String {
    hex::encode(Sha512::digest(query.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
    use std::collections::HashMap;

    #[test]
    fn test_query_string_preserves_order() {
        let params = vec![
            ("market", "KRW-BTC".to_string()),
            ("side", "bid".to_string()),
            ("price", "6000".to_string()),
        ];
        assert_eq!(query_string(&params), "market=KRW-BTC&side=bid&price=6000");
    }

    #[test]
    fn test_query_hash_is_sha512_hex() {
        let hash = query_hash("market=KRW-BTC");
        assert_eq!(hash.len(), 128);
        assert_eq!(hash, query_hash("market=KRW-BTC"));
        assert_ne!(hash, query_hash("market=KRW-ETH"));
    }

    #[test]
    fn test_missing_credentials() {
        let creds = Credentials::default();
        assert!(matches!(
            creds.authorization(&[]),
            Err(ExchangeError::MissingCredentials)
        ));
    }

    #[test]
    fn test_token_claims() {
        let creds = Credentials::new("access", "secret");
        let params = vec![("market", "KRW-BTC".to_string())];
        let header = creds.authorization(&params).unwrap();
        let token = header.strip_prefix("Bearer ").unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        let data = decode::<HashMap<String, serde_json::Value>>(
            token,
            &DecodingKey::from_secret(b"secret"),
            &validation,
        )
        .unwrap();

        assert_eq!(data.claims["access_key"], "access");
        assert_eq!(data.claims["query_hash_alg"], "SHA512");
        assert_eq!(
            data.claims["query_hash"],
            serde_json::Value::String(query_hash("market=KRW-BTC"))
        );
        assert!(data.claims.contains_key("nonce"));
    }
}
