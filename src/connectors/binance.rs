// src/connectors/binance.rs
use crate::connectors::messages::{
    decode_response, AccountInfoResponse, OrderAckResponse, OrderHistoryEntry,
};
use crate::connectors::signer::RequestSigner;
use crate::connectors::traits::ExchangeClient;
use crate::errors::Result;
use crate::types::{AccountSnapshot, OrderRecord, OrderResult, Side};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use uuid::Uuid;

const API_KEY_HEADER: &str = "X-MBX-APIKEY";
const CLIENT_ORDER_PREFIX: &str = "swing-";

pub struct BinanceClient {
    api_key: String,
    signer: RequestSigner,
    http_client: Client,
    base_rest_url: String,
    recv_window_ms: Option<u64>,
}

impl BinanceClient {
    pub fn new(
        base_rest_url: impl Into<String>,
        api_key: String,
        secret_key: &str,
        recv_window_ms: Option<u64>,
    ) -> Result<Self> {
        Ok(Self {
            api_key,
            signer: RequestSigner::new(secret_key)?,
            http_client: Client::new(),
            base_rest_url: base_rest_url.into().trim_end_matches('/').to_string(),
            recv_window_ms,
        })
    }

    /// Appends recvWindow and a fresh timestamp, then the signature over
    /// exactly that query string.
    fn sign_and_build_query(&self, params: Vec<(&str, String)>, timestamp_ms: i64) -> Result<String> {
        let mut params = params;
        if let Some(window) = self.recv_window_ms {
            params.push(("recvWindow", window.to_string()));
        }
        params.push(("timestamp", timestamp_ms.to_string()));

        let query_string = serde_urlencoded::to_string(&params)?;
        let signature = self.signer.sign(&query_string);

        Ok(format!("{}&signature={}", query_string, signature))
    }

    async fn send_signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(&str, String)>,
    ) -> Result<T> {
        let full_query = self.sign_and_build_query(params, Utc::now().timestamp_millis())?;
        let url = format!("{}{}?{}", self.base_rest_url, endpoint, full_query);

        debug!("{} {}", method, endpoint);
        let response = self
            .http_client
            .request(method, &url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        decode_response(status, &body)
    }
}

fn new_client_order_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    // the exchange caps client ids at 36 chars
    format!("{}{}", CLIENT_ORDER_PREFIX, &id[..24])
}

pub fn is_own_order(client_order_id: &str) -> bool {
    client_order_id.starts_with(CLIENT_ORDER_PREFIX)
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn fetch_account(&self) -> Result<AccountSnapshot> {
        let resp: AccountInfoResponse = self
            .send_signed_request(Method::GET, "/api/v3/account", vec![])
            .await?;
        Ok(resp.into())
    }

    async fn place_market_order(
        &self,
        pair: &str,
        side: Side,
        quote_quantity: Decimal,
    ) -> Result<OrderResult> {
        let client_order_id = new_client_order_id();
        let params = vec![
            ("symbol", pair.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quoteOrderQty", quote_quantity.normalize().to_string()),
            ("newClientOrderId", client_order_id.clone()),
            ("newOrderRespType", "ACK".to_string()),
        ];

        info!(
            "🚀 Sending MARKET {} {} notional={} client_id={}",
            side, pair, quote_quantity, client_order_id
        );

        let resp: OrderAckResponse = self
            .send_signed_request(Method::POST, "/api/v3/order", params)
            .await?;
        Ok(resp.into())
    }

    async fn fetch_order_history(&self, pair: &str, limit: u16) -> Result<Vec<OrderRecord>> {
        let params = vec![
            ("symbol", pair.to_string()),
            ("limit", limit.to_string()),
        ];
        let resp: Vec<OrderHistoryEntry> = self
            .send_signed_request(Method::GET, "/api/v3/allOrders", params)
            .await?;
        Ok(resp.into_iter().map(OrderRecord::from).collect())
    }
}
