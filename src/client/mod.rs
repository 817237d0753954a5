//! Authenticated REST client for the CLOB exchange.
//!
//! Every request is L2-signed (see `auth`) and sent through the proxy pool.
//! Transport failures and edge-network 403s move the request to the next
//! proxy; each route is tried at most once per request. Everything else is
//! returned to the caller untouched, with the raw body for diagnosis.
//!
//! The one exception to L2 signing is [`ClobClient::derive_api_key`], which
//! authenticates with a wallet signature and yields the L2 credentials.

pub mod proxy;
pub mod types;

pub use proxy::ProxyPool;
pub use types::{AssetType, BalanceAllowance, CancelAllResponse, OpenOrder, OrderResponse};

use crate::auth::{build_l1_headers, build_l2_headers, AuthError, L2Credentials};
use crate::builder::OrderRequest;
use crate::orderbook::{OrderBook, WireBook};
use crate::wallet::Wallet;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error via {route}: {source}")]
    Transport {
        route: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request blocked at the network edge via {route} (HTTP 403)")]
    EdgeBlocked { route: String, body: String },
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("order rejected: {reason}")]
    Rejected { reason: String },
    #[error("unexpected response body: {body}")]
    Decode { body: String },
    #[error("all {attempts} routes failed; last error: {last}")]
    ProxiesExhausted {
        attempts: usize,
        last: Box<ClientError>,
    },
    #[error("invalid proxy {0}")]
    InvalidProxy(String),
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ClientError {
    /// Transport-class failures that a later attempt may get past.
    /// Validation, API and rejection errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Transport { .. }
                | ClientError::EdgeBlocked { .. }
                | ClientError::ProxiesExhausted { .. }
        )
    }
}

/// A 403 whose body is a JSON object came from the exchange itself (bad
/// key, bad signature). Anything else is the edge network's block page.
fn is_edge_block(status: StatusCode, body: &str) -> bool {
    if status != StatusCode::FORBIDDEN {
        return false;
    }
    !matches!(serde_json::from_str::<Value>(body), Ok(Value::Object(_)))
}

struct Request<'a> {
    method: Method,
    /// Path plus query string, exactly as signed.
    path: &'a str,
    body: Option<String>,
}

/// How a request is authenticated.
enum Signing<'a> {
    /// HMAC headers from the client's credentials, rebuilt per attempt.
    L2,
    /// Pre-built wallet attestation headers.
    L1(&'a HeaderMap),
}

pub struct ClobClient {
    base_url: String,
    creds: Option<L2Credentials>,
    pool: ProxyPool,
}

impl ClobClient {
    pub fn new(
        base_url: &str,
        creds: L2Credentials,
        proxies: &[String],
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        Ok(Self::unauthenticated(base_url, proxies, timeout)?.with_credentials(creds))
    }

    /// A client without L2 credentials. Only [`ClobClient::derive_api_key`]
    /// succeeds until credentials are attached.
    pub fn unauthenticated(
        base_url: &str,
        proxies: &[String],
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let pool = ProxyPool::new(proxies, timeout)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            creds: None,
            pool,
        })
    }

    pub fn with_credentials(mut self, creds: L2Credentials) -> Self {
        self.creds = Some(creds);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> Option<&L2Credentials> {
        self.creds.as_ref()
    }

    /// Redacted label of the route the next request starts on.
    pub fn current_proxy(&self) -> &str {
        self.pool.current_label()
    }

    pub fn proxy_count(&self) -> usize {
        self.pool.len()
    }

    async fn attempt(
        &self,
        client: &reqwest::Client,
        req: &Request<'_>,
        signing: &Signing<'_>,
    ) -> Result<Result<(StatusCode, String), reqwest::Error>, ClientError> {
        let body = req.body.as_deref().unwrap_or("");
        let headers = match signing {
            Signing::L2 => {
                let creds = self.creds.as_ref().ok_or(AuthError::MissingCredentials)?;
                build_l2_headers(creds, req.method.as_str(), req.path, body)?
            }
            Signing::L1(headers) => (*headers).clone(),
        };
        let url = format!("{}{}", self.base_url, req.path);

        let mut builder = client.request(req.method.clone(), &url).headers(headers);
        if let Some(body) = &req.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => return Ok(Err(e)),
        };
        let status = response.status();
        Ok(response.text().await.map(|text| (status, text)))
    }

    /// Send with rotation. Returns status and raw body of the first response
    /// that is not an edge block.
    async fn send(&self, req: Request<'_>) -> Result<(StatusCode, String), ClientError> {
        self.send_signed(req, Signing::L2).await
    }

    async fn send_signed(
        &self,
        req: Request<'_>,
        signing: Signing<'_>,
    ) -> Result<(StatusCode, String), ClientError> {
        let attempts = self.pool.len();
        let mut index = self.pool.current_index();
        let mut last = None;

        for attempt in 0..attempts {
            let route = self.pool.route(index);
            let failure = match self.attempt(&route.client, &req, &signing).await? {
                Ok((status, body)) if is_edge_block(status, &body) => ClientError::EdgeBlocked {
                    route: route.label.clone(),
                    body,
                },
                Ok((status, body)) => {
                    if attempt > 0 {
                        self.pool.settle(index);
                        info!(route = %route.label, attempt, "request succeeded after proxy rotation");
                    }
                    debug!(method = %req.method, path = req.path, status = status.as_u16(), "response");
                    return Ok((status, body));
                }
                Err(source) => ClientError::Transport {
                    route: route.label.clone(),
                    source,
                },
            };

            if !self.pool.can_rotate() {
                return Err(failure);
            }
            warn!(
                method = %req.method,
                path = req.path,
                route = %route.label,
                attempt = attempt + 1,
                of = attempts,
                error = %failure,
                "request failed, rotating proxy"
            );
            index = self.pool.advance(index);
            last = Some(failure);
        }

        Err(ClientError::ProxiesExhausted {
            attempts,
            last: Box::new(last.unwrap_or(ClientError::Decode {
                body: String::new(),
            })),
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: Request<'_>,
        accepted: &[StatusCode],
    ) -> Result<T, ClientError> {
        self.send_json_signed(req, Signing::L2, accepted).await
    }

    async fn send_json_signed<T: DeserializeOwned>(
        &self,
        req: Request<'_>,
        signing: Signing<'_>,
        accepted: &[StatusCode],
    ) -> Result<T, ClientError> {
        let (status, body) = self.send_signed(req, signing).await?;
        if !accepted.contains(&status) {
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|_| ClientError::Decode { body })
    }

    /// `GET /auth/derive-api-key`: recover the L2 credentials bound to
    /// `wallet` and `nonce`. Deterministic on the server side; the same pair
    /// always yields the same key.
    pub async fn derive_api_key(
        &self,
        wallet: &Wallet,
        chain_id: u64,
        nonce: u64,
    ) -> Result<L2Credentials, ClientError> {
        let headers = build_l1_headers(wallet, chain_id, nonce)?;
        let issued: types::ApiKeyResponse = self
            .send_json_signed(
                Request {
                    method: Method::GET,
                    path: "/auth/derive-api-key",
                    body: None,
                },
                Signing::L1(&headers),
                &[StatusCode::OK],
            )
            .await?;
        let address = wallet.address().to_checksum(None);
        let creds = L2Credentials::new(&issued.api_key, &issued.secret, &issued.passphrase, &address)?;
        info!(address = %address, api_key = %creds.api_key, "derived API credentials");
        Ok(creds)
    }

    /// `GET /book?token_id=<id>`, levels best-first.
    pub async fn get_order_book(&self, token_id: &str) -> Result<OrderBook, ClientError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("token_id", token_id)
            .finish();
        let path = format!("/book?{}", query);
        let wire: WireBook = self
            .send_json(
                Request {
                    method: Method::GET,
                    path: &path,
                    body: None,
                },
                &[StatusCode::OK],
            )
            .await?;
        Ok(wire.into_book(token_id))
    }

    /// `POST /order`. A `success: false` payload is returned as-is; use
    /// [`OrderResponse::into_result`] to treat it as an error.
    pub async fn post_order(&self, order: &OrderRequest) -> Result<OrderResponse, ClientError> {
        let body = serde_json::to_string(order).map_err(ClientError::Encode)?;
        let response: OrderResponse = self
            .send_json(
                Request {
                    method: Method::POST,
                    path: "/order",
                    body: Some(body),
                },
                &[StatusCode::OK, StatusCode::CREATED],
            )
            .await?;

        if response.success {
            info!(
                order_id = %response.order_id,
                status = %response.status,
                token_id = %order.order.token_id,
                side = %order.order.side,
                "order accepted"
            );
        } else {
            warn!(
                token_id = %order.order.token_id,
                reason = response.reason().unwrap_or(""),
                "order rejected"
            );
        }
        Ok(response)
    }

    /// `DELETE /order` with `{orderID}`.
    pub async fn cancel_order(&self, order_id: &str) -> Result<(), ClientError> {
        let body = serde_json::json!({ "orderID": order_id }).to_string();
        let (status, body) = self
            .send(Request {
                method: Method::DELETE,
                path: "/order",
                body: Some(body),
            })
            .await?;
        if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
            info!(order_id = %order_id, "order cancelled");
            Ok(())
        } else {
            Err(ClientError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// `DELETE /cancel-all`.
    pub async fn cancel_all(&self) -> Result<CancelAllResponse, ClientError> {
        let (status, body) = self
            .send(Request {
                method: Method::DELETE,
                path: "/cancel-all",
                body: None,
            })
            .await?;
        match status {
            StatusCode::NO_CONTENT => Ok(CancelAllResponse::default()),
            StatusCode::OK => {
                let parsed: CancelAllResponse =
                    serde_json::from_str(&body).map_err(|_| ClientError::Decode { body })?;
                info!(cancelled = parsed.canceled.len(), "cancelled all orders");
                Ok(parsed)
            }
            _ => Err(ClientError::Api {
                status: status.as_u16(),
                body,
            }),
        }
    }

    /// `GET /data/orders`.
    pub async fn open_orders(&self) -> Result<Vec<OpenOrder>, ClientError> {
        let (status, body) = self
            .send(Request {
                method: Method::GET,
                path: "/data/orders",
                body: None,
            })
            .await?;
        if status != StatusCode::OK {
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let value: Value =
            serde_json::from_str(&body).map_err(|_| ClientError::Decode { body: body.clone() })?;
        types::parse_open_orders(&value).ok_or(ClientError::Decode { body })
    }

    /// `GET /balance-allowance?asset_type=..&token_id=..`. `token_id` is only
    /// meaningful for conditional tokens.
    pub async fn balance_allowance(
        &self,
        asset_type: AssetType,
        token_id: Option<&str>,
    ) -> Result<BalanceAllowance, ClientError> {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("asset_type", asset_type.as_str());
        if let Some(token_id) = token_id {
            query.append_pair("token_id", token_id);
        }
        let path = format!("/balance-allowance?{}", query.finish());
        let value: Value = self
            .send_json(
                Request {
                    method: Method::GET,
                    path: &path,
                    body: None,
                },
                &[StatusCode::OK],
            )
            .await?;
        BalanceAllowance::from_value(&value).ok_or_else(|| ClientError::Decode {
            body: value.to_string(),
        })
    }
}

impl std::fmt::Debug for ClobClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClobClient")
            .field("base_url", &self.base_url)
            .field("creds", &self.creds)
            .field("pool", &self.pool)
            .finish()
    }
}
