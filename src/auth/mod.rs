//! L2 HMAC-SHA256 authentication for the CLOB REST API.
//!
//! Every trading request carries `POLY_*` headers. The signature is
//! HMAC-SHA256(secret, timestamp + METHOD + path + body), URL-safe base64.
//! The path includes any query string; the body is empty for GET.
//!
//! L2 credentials themselves are obtained with L1 headers: an EIP-712
//! [`ClobAuth`] signature from the wallet key, see [`build_l1_headers_at`].

use crate::signer::{ClobAuth, SignError};
use crate::wallet::Wallet;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

// Header names are case-insensitive; `HeaderName` stores them lowercase.
pub const HEADER_API_KEY: &str = "poly_api_key";
pub const HEADER_SIGNATURE: &str = "poly_signature";
pub const HEADER_TIMESTAMP: &str = "poly_timestamp";
pub const HEADER_PASSPHRASE: &str = "poly_passphrase";
pub const HEADER_ADDRESS: &str = "poly_address";
pub const HEADER_NONCE: &str = "poly_nonce";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ORIGIN: &str = "https://polymarket.com";
const REFERER: &str = "https://polymarket.com/";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("missing API credentials")]
    MissingCredentials,
    #[error("HMAC key error: {0}")]
    HmacKey(String),
    #[error("header {name} has an invalid value")]
    InvalidHeader { name: &'static str },
    #[error("wallet attestation failed: {0}")]
    Attestation(#[from] SignError),
}

#[derive(Clone)]
pub struct L2Credentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
    /// Account address sent as `POLY_ADDRESS`.
    pub address: String,
}

impl L2Credentials {
    pub fn new(
        api_key: &str,
        secret: &str,
        passphrase: &str,
        address: &str,
    ) -> Result<Self, AuthError> {
        if api_key.is_empty() || secret.is_empty() || passphrase.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        Ok(Self {
            api_key: api_key.to_string(),
            secret: secret.to_string(),
            passphrase: passphrase.to_string(),
            address: address.to_string(),
        })
    }
}

impl std::fmt::Debug for L2Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("L2Credentials")
            .field("api_key", &self.api_key)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Decode the API secret into HMAC key bytes.
///
/// Secrets are issued URL-safe base64. Standard base64 is accepted too, and
/// anything that is neither is used as raw bytes.
pub fn decode_secret(secret: &str) -> Vec<u8> {
    URL_SAFE
        .decode(secret)
        .or_else(|_| STANDARD.decode(secret))
        .unwrap_or_else(|_| secret.as_bytes().to_vec())
}

/// Compute the request signature for one message.
pub fn sign_request(
    secret: &str,
    timestamp: &str,
    method: &str,
    path: &str,
    body: &str,
) -> Result<String, AuthError> {
    let message = format!("{}{}{}{}", timestamp, method.to_uppercase(), path, body);
    let mut mac = HmacSha256::new_from_slice(&decode_secret(secret))
        .map_err(|e| AuthError::HmacKey(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), AuthError> {
    let value = HeaderValue::from_str(value).map_err(|_| AuthError::InvalidHeader { name })?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

/// Build L2 auth headers for a CLOB API request, stamped with the current time.
pub fn build_l2_headers(
    creds: &L2Credentials,
    method: &str,
    path: &str,
    body: &str,
) -> Result<HeaderMap, AuthError> {
    build_l2_headers_at(creds, chrono::Utc::now().timestamp(), method, path, body)
}

pub fn build_l2_headers_at(
    creds: &L2Credentials,
    timestamp: i64,
    method: &str,
    path: &str,
    body: &str,
) -> Result<HeaderMap, AuthError> {
    let timestamp = timestamp.to_string();
    let signature = sign_request(&creds.secret, &timestamp, method, path, body)?;

    debug!(
        method = method,
        path = path,
        timestamp = %timestamp,
        "built L2 auth headers"
    );

    let mut headers = browser_headers();
    insert(&mut headers, HEADER_API_KEY, &creds.api_key)?;
    insert(&mut headers, HEADER_SIGNATURE, &signature)?;
    insert(&mut headers, HEADER_TIMESTAMP, &timestamp)?;
    insert(&mut headers, HEADER_PASSPHRASE, &creds.passphrase)?;
    insert(&mut headers, HEADER_ADDRESS, &creds.address)?;
    Ok(headers)
}

/// L1 headers proving control of `wallet`, stamped with the current time.
pub fn build_l1_headers(wallet: &Wallet, chain_id: u64, nonce: u64) -> Result<HeaderMap, AuthError> {
    build_l1_headers_at(wallet, chain_id, chrono::Utc::now().timestamp(), nonce)
}

pub fn build_l1_headers_at(
    wallet: &Wallet,
    chain_id: u64,
    timestamp: i64,
    nonce: u64,
) -> Result<HeaderMap, AuthError> {
    let auth = ClobAuth::new(wallet.address(), timestamp, nonce);
    let signature = auth.sign(wallet, chain_id)?;

    debug!(address = %auth.address, chain_id, nonce, "built L1 auth headers");

    let mut headers = browser_headers();
    insert(&mut headers, HEADER_ADDRESS, &auth.address.to_checksum(None))?;
    insert(&mut headers, HEADER_SIGNATURE, &signature.to_hex())?;
    insert(&mut headers, HEADER_TIMESTAMP, &auth.timestamp)?;
    insert(&mut headers, HEADER_NONCE, &nonce.to_string())?;
    Ok(headers)
}

/// Headers a desktop browser on the exchange's web app would send.
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(reqwest::header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(reqwest::header::ORIGIN, HeaderValue::from_static(ORIGIN));
    headers.insert(reqwest::header::REFERER, HeaderValue::from_static(REFERER));
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers
}
