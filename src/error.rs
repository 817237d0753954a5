use crate::auth::AuthError;
use crate::builder::BuildError;
use crate::client::ClientError;
use crate::config::ConfigError;
use crate::onchain::OnchainError;
use crate::signer::SignError;
use crate::stream::StreamError;
use crate::wallet::WalletError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Sign(#[from] SignError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Onchain(#[from] OnchainError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
