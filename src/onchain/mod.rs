//! One-time on-chain onboarding: ERC-20 `approve` for the exchange.
//!
//! Shares the wallet with order signing but hashes a legacy EIP-155
//! transaction instead of typed data. Nothing else here talks to the chain.

use crate::signer::{CTF_EXCHANGE, NEG_RISK_CTF_EXCHANGE};
use crate::wallet::{Wallet, WalletError};
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{address, Address, Bytes, Signature, TxKind, B256, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::sol;
use alloy::sol_types::SolCall;
use thiserror::Error;
use tracing::info;

/// Bridged USDC (USDC.e) on Polygon, the exchange's collateral token.
pub const USDC_E: Address = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");
/// Spenders that need a collateral allowance before trading.
pub const EXCHANGE_SPENDERS: [Address; 2] = [CTF_EXCHANGE, NEG_RISK_CTF_EXCHANGE];
pub const APPROVE_GAS_LIMIT: u64 = 60_000;
pub const DEFAULT_RPC_URL: &str = "https://polygon-rpc.com";

sol! {
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

#[derive(Error, Debug)]
pub enum OnchainError {
    #[error("invalid RPC URL: {0}")]
    InvalidRpcUrl(String),
    #[error("RPC error: {0}")]
    Rpc(#[from] alloy::transports::TransportError),
    #[error("failed to sign transaction: {0}")]
    Sign(#[from] WalletError),
}

/// `approve(spender, amount)` calldata.
pub fn approve_calldata(spender: Address, amount: U256) -> Bytes {
    IERC20::approveCall { spender, amount }.abi_encode().into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalParams {
    pub token: Address,
    pub spender: Address,
    pub amount: U256,
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u128,
}

impl ApprovalParams {
    /// Unlimited USDC.e allowance for `spender`.
    pub fn unlimited_usdc(spender: Address, chain_id: u64, nonce: u64, gas_price: u128) -> Self {
        Self {
            token: USDC_E,
            spender,
            amount: U256::MAX,
            chain_id,
            nonce,
            gas_price,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignedApproval {
    /// EIP-2718 encoding, ready for `eth_sendRawTransaction`.
    pub raw: Bytes,
    pub tx_hash: B256,
    pub signing_hash: B256,
    pub signature: Signature,
}

pub fn sign_approval(wallet: &Wallet, params: &ApprovalParams) -> Result<SignedApproval, OnchainError> {
    let tx = TxLegacy {
        chain_id: Some(params.chain_id),
        nonce: params.nonce,
        gas_price: params.gas_price,
        gas_limit: APPROVE_GAS_LIMIT,
        to: TxKind::Call(params.token),
        value: U256::ZERO,
        input: approve_calldata(params.spender, params.amount),
    };
    let signing_hash = tx.signature_hash();
    let signature = wallet.sign_hash(&signing_hash)?;
    let signed = tx.into_signed(signature);
    let tx_hash = *signed.hash();
    let raw: Bytes = TxEnvelope::from(signed).encoded_2718().into();
    Ok(SignedApproval {
        raw,
        tx_hash,
        signing_hash,
        signature,
    })
}

/// Sign and broadcast an unlimited USDC.e approval for `spender`, fetching
/// chain id, pending nonce and gas price from `rpc_url`.
pub async fn send_approval(
    rpc_url: &str,
    wallet: &Wallet,
    spender: Address,
) -> Result<B256, OnchainError> {
    let url = rpc_url
        .parse()
        .map_err(|_| OnchainError::InvalidRpcUrl(rpc_url.to_string()))?;
    let provider: RootProvider = RootProvider::new_http(url);

    let chain_id = provider.get_chain_id().await?;
    let nonce = provider.get_transaction_count(wallet.address()).pending().await?;
    let gas_price = provider.get_gas_price().await?;

    let params = ApprovalParams::unlimited_usdc(spender, chain_id, nonce, gas_price);
    let signed = sign_approval(wallet, &params)?;
    let pending = provider.send_raw_transaction(&signed.raw).await?;
    let tx_hash = *pending.tx_hash();

    info!(
        tx_hash = %tx_hash,
        spender = %spender,
        nonce,
        gas_price,
        chain_id,
        "approval transaction sent"
    );
    Ok(tx_hash)
}
