//! Raw push subscription
//!
//! Subscribes to faucet logs over a WebSocket (`eth_subscribe("logs")`) and
//! decodes the pushed topics and data by hand. Reconnects with exponential
//! backoff and keeps the socket alive with pings.

use crate::chain::{decode_raw_log, ChainError, EventSignatures, EventSource, FaucetEvent, LogOrigin, Subscription};
use alloy_primitives::{Address, B256};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for the push subscription
#[derive(Debug, Clone)]
pub struct ReactiveConfig {
    /// WebSocket endpoint of the node
    pub ws_url: String,
    /// Maximum reconnection delay in milliseconds
    pub reconnect_max_delay_ms: u64,
    /// Consecutive reconnect failures before the subscription gives up
    pub failure_threshold: u32,
    /// Pong timeout in seconds (triggers reconnect if no pong received)
    pub pong_timeout_secs: u64,
    /// Time allowed for the subscription to be confirmed
    pub subscribe_timeout_secs: u64,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://dream-rpc.somnia.network/ws".to_string(),
            reconnect_max_delay_ms: 30000,
            failure_threshold: 5,
            pong_timeout_secs: 60,
            subscribe_timeout_secs: 10,
        }
    }
}

/// One message received from the node
#[derive(Debug, Clone, PartialEq)]
pub enum WsNotification {
    /// Reply to our eth_subscribe request
    Confirmed(String),
    /// Pushed log
    Log(RawLog),
    /// Error reply
    Error(String),
    Other,
}

/// Log as pushed by the node, before decoding
#[derive(Debug, Clone, PartialEq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub tx_hash: Option<B256>,
    pub log_index: Option<u64>,
    pub block_number: Option<u64>,
    pub removed: bool,
}

impl RawLog {
    pub fn origin(&self) -> LogOrigin {
        LogOrigin::new(self.tx_hash, self.log_index, self.block_number)
    }
}

fn parse_hex_u64(value: Option<&serde_json::Value>) -> Option<u64> {
    let s = value?.as_str()?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

/// Parse a JSON-RPC WebSocket frame
pub fn parse_ws_message(text: &str) -> Result<WsNotification, ChainError> {
    let json: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ChainError::EventParseError { reason: e.to_string() })?;

    if let Some(error) = json.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error")
            .to_string();
        return Ok(WsNotification::Error(message));
    }

    // Subscription confirmation
    if let Some(result) = json.get("result") {
        if let Some(id) = result.as_str() {
            return Ok(WsNotification::Confirmed(id.to_string()));
        }
    }

    // Event notification
    if let Some(result) = json.get("params").and_then(|p| p.get("result")) {
        return parse_log_result(result).map(WsNotification::Log);
    }

    Ok(WsNotification::Other)
}

fn parse_log_result(result: &serde_json::Value) -> Result<RawLog, ChainError> {
    let address_str = result
        .get("address")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ChainError::EventParseError {
            reason: "Missing address".to_string(),
        })?;

    let address: Address = address_str.parse().map_err(|_| ChainError::EventParseError {
        reason: format!("Invalid address {}", address_str),
    })?;

    let tx_hash = result
        .get("transactionHash")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<B256>().ok());

    let topics: Vec<B256> = result
        .get("topics")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|t| t.as_str())
                .filter_map(|s| s.parse().ok())
                .collect()
        })
        .unwrap_or_default();

    let data_str = result.get("data").and_then(|v| v.as_str()).unwrap_or("0x");
    let data = hex::decode(data_str.trim_start_matches("0x")).map_err(|e| {
        ChainError::EventParseError {
            reason: format!("Invalid log data: {}", e),
        }
    })?;

    Ok(RawLog {
        address,
        topics,
        data,
        tx_hash,
        log_index: parse_hex_u64(result.get("logIndex")),
        block_number: parse_hex_u64(result.get("blockNumber")),
        removed: result.get("removed").and_then(|v| v.as_bool()).unwrap_or(false),
    })
}

fn subscribe_request(contract: Address) -> serde_json::Value {
    let topics: Vec<String> = EventSignatures::all()
        .iter()
        .map(|s| format!("{:?}", s))
        .collect();

    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_subscribe",
        "params": ["logs", {
            "address": format!("{:?}", contract),
            "topics": [topics]
        }]
    })
}

/// Event source backed by a WebSocket log subscription
pub struct ReactiveSource {
    config: ReactiveConfig,
}

impl ReactiveSource {
    pub fn new(config: ReactiveConfig) -> Self {
        Self { config }
    }
}

/// Connect and subscribe, returning the stream once the node confirmed
async fn open(config: &ReactiveConfig, contract: Address) -> Result<(WsStream, String), ChainError> {
    let (mut ws_stream, _) = connect_async(config.ws_url.as_str()).await?;

    ws_stream
        .send(Message::Text(subscribe_request(contract).to_string().into()))
        .await
        .map_err(|e| ChainError::SubscriptionError(e.to_string()))?;

    let confirm = async {
        while let Some(msg) = ws_stream.next().await {
            if let Message::Text(text) = msg? {
                match parse_ws_message(&text)? {
                    WsNotification::Confirmed(id) => return Ok(id),
                    WsNotification::Error(message) => {
                        return Err(ChainError::SubscriptionError(message))
                    }
                    _ => {}
                }
            }
        }
        Err::<String, ChainError>(ChainError::SubscriptionError(
            "stream closed before confirmation".to_string(),
        ))
    };

    let subscription_id = timeout(Duration::from_secs(config.subscribe_timeout_secs), confirm)
        .await
        .map_err(|_| ChainError::SubscriptionError("subscription not confirmed".to_string()))??;

    tracing::info!(id = %subscription_id, %contract, "📋 Subscription confirmed");
    Ok((ws_stream, subscription_id))
}

#[async_trait::async_trait]
impl EventSource for ReactiveSource {
    fn name(&self) -> &'static str {
        "reactive"
    }

    async fn subscribe(
        &self,
        contract: Address,
        sink: mpsc::UnboundedSender<FaucetEvent>,
    ) -> Result<Subscription, ChainError> {
        tracing::info!(url = %self.config.ws_url, "🔌 Connecting to WebSocket");
        let (stream, subscription_id) = open(&self.config, contract).await?;

        let cancel_token = CancellationToken::new();
        let session = PushSession {
            config: self.config.clone(),
            contract,
            sink,
        };
        let handle = tokio::spawn(session.run(stream, cancel_token.clone()));

        Ok(Subscription::new(subscription_id, cancel_token, handle))
    }
}

struct PushSession {
    config: ReactiveConfig,
    contract: Address,
    sink: mpsc::UnboundedSender<FaucetEvent>,
}

enum SessionEnd {
    Cancelled,
    ReceiverDropped,
    Disconnected,
}

impl PushSession {
    async fn run(self, stream: WsStream, cancel_token: CancellationToken) {
        let mut stream = Some(stream);
        let mut failures: u32 = 0;
        let mut retry_delay = Duration::from_millis(1000);
        let max_delay = Duration::from_millis(self.config.reconnect_max_delay_ms);

        loop {
            let current = match stream.take() {
                Some(s) => s,
                None => {
                    if failures >= self.config.failure_threshold {
                        tracing::error!(failures, "❌ Giving up on feed subscription");
                        return;
                    }
                    tracing::info!("⏳ Reconnecting in {:?}...", retry_delay);
                    tokio::select! {
                        _ = cancel_token.cancelled() => return,
                        _ = sleep(retry_delay) => {}
                    }
                    retry_delay = std::cmp::min(retry_delay * 2, max_delay);

                    match open(&self.config, self.contract).await {
                        Ok((s, _)) => {
                            failures = 0;
                            retry_delay = Duration::from_millis(1000);
                            s
                        }
                        Err(e) => {
                            failures += 1;
                            tracing::error!("❌ WebSocket error: {}", e);
                            continue;
                        }
                    }
                }
            };

            match self.pump(current, &cancel_token).await {
                SessionEnd::Cancelled => {
                    tracing::debug!("🛑 Feed subscription cancelled");
                    return;
                }
                SessionEnd::ReceiverDropped => {
                    tracing::warn!("Feed receiver dropped, closing subscription");
                    return;
                }
                SessionEnd::Disconnected => {
                    failures += 1;
                }
            }
        }
    }

    async fn pump(&self, stream: WsStream, cancel_token: &CancellationToken) -> SessionEnd {
        let (mut write, mut read) = stream.split();

        let mut ping_interval = interval(Duration::from_secs(30));
        let mut pong_check_interval = interval(Duration::from_secs(10));
        let mut last_pong = Instant::now();
        let pong_timeout = Duration::from_secs(self.config.pong_timeout_secs);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Cancelled;
                }
                _ = ping_interval.tick() => {
                    if write.send(Message::Ping(vec![].into())).await.is_err() {
                        tracing::warn!("Failed to send ping");
                        return SessionEnd::Disconnected;
                    }
                }
                _ = pong_check_interval.tick() => {
                    if last_pong.elapsed() > pong_timeout {
                        tracing::warn!(
                            "⚠️ No pong received for {}s, triggering reconnect",
                            last_pong.elapsed().as_secs()
                        );
                        return SessionEnd::Disconnected;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !self.handle_text(&text) {
                                return SessionEnd::ReceiverDropped;
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_pong = Instant::now();
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("WebSocket closed by server");
                            return SessionEnd::Disconnected;
                        }
                        Some(Err(e)) => {
                            tracing::error!("WebSocket error: {}", e);
                            return SessionEnd::Disconnected;
                        }
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return SessionEnd::Disconnected;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Returns false once the receiver is gone
    fn handle_text(&self, text: &str) -> bool {
        let raw = match parse_ws_message(text) {
            Ok(WsNotification::Log(raw)) => raw,
            Ok(WsNotification::Error(message)) => {
                tracing::warn!(%message, "Node reported subscription error");
                return true;
            }
            Ok(_) => return true,
            Err(e) => {
                tracing::warn!("Unparseable push message: {}", e);
                return true;
            }
        };

        if raw.removed || raw.address != self.contract {
            return true;
        }

        match decode_raw_log(&raw.topics, &raw.data, raw.origin()) {
            Ok(event) => self.sink.send(event).is_ok(),
            Err(e) => {
                tracing::warn!("Failed to decode pushed log: {}", e);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_frame(topics: &[B256], data: &str) -> String {
        let topics: Vec<String> = topics.iter().map(|t| format!("{:?}", t)).collect();
        json!({
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {
                "subscription": "0xabc",
                "result": {
                    "address": "0x1111111111111111111111111111111111111111",
                    "topics": topics,
                    "data": data,
                    "blockNumber": "0x10",
                    "transactionHash": format!("{:?}", B256::repeat_byte(0x77)),
                    "logIndex": "0x2",
                    "removed": false
                }
            }
        })
        .to_string()
    }

    #[test]
    fn test_parse_confirmation() {
        let msg = r#"{"jsonrpc":"2.0","id":1,"result":"0xcd0c3e8af590364c09d0fa6a1210faf5"}"#;
        assert_eq!(
            parse_ws_message(msg).unwrap(),
            WsNotification::Confirmed("0xcd0c3e8af590364c09d0fa6a1210faf5".to_string())
        );
    }

    #[test]
    fn test_parse_error_reply() {
        let msg = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}"#;
        assert_eq!(
            parse_ws_message(msg).unwrap(),
            WsNotification::Error("method not found".to_string())
        );
    }

    #[test]
    fn test_parse_log_notification() {
        let requester = Address::repeat_byte(0x22);
        let frame = log_frame(&[EventSignatures::granted(), requester.into_word()], "0x");

        let raw = match parse_ws_message(&frame).unwrap() {
            WsNotification::Log(raw) => raw,
            other => panic!("expected log, got {:?}", other),
        };

        assert_eq!(raw.address, Address::repeat_byte(0x11));
        assert_eq!(raw.topics.len(), 2);
        assert_eq!(raw.block_number, Some(16));
        assert_eq!(raw.log_index, Some(2));
        assert!(raw.origin().event_id().unwrap().ends_with("-2"));
    }

    #[test]
    fn test_parse_rejects_bad_json() {
        assert!(parse_ws_message("not json").is_err());
        assert_eq!(parse_ws_message("{}").unwrap(), WsNotification::Other);
    }

    #[test]
    fn test_subscribe_request_filters_both_events() {
        let request = subscribe_request(Address::repeat_byte(0x11));
        assert_eq!(request["method"], "eth_subscribe");
        assert_eq!(request["params"][0], "logs");
        assert_eq!(request["params"][1]["topics"][0].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_handle_text_forwards_decoded_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = PushSession {
            config: ReactiveConfig::default(),
            contract: Address::repeat_byte(0x11),
            sink: tx,
        };

        let requester = Address::repeat_byte(0x22);
        let frame = log_frame(&[EventSignatures::denied(), requester.into_word()], "0x");
        assert!(session.handle_text(&frame));

        match rx.try_recv().unwrap() {
            FaucetEvent::Denied(e) => {
                assert_eq!(e.requester, requester);
                assert_eq!(e.reason, crate::chain::DEFAULT_DENIAL_REASON);
            }
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn test_handle_text_ignores_other_contracts() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = PushSession {
            config: ReactiveConfig::default(),
            contract: Address::repeat_byte(0x99),
            sink: tx,
        };

        let frame = log_frame(
            &[EventSignatures::granted(), Address::repeat_byte(0x22).into_word()],
            "0x",
        );
        assert!(session.handle_text(&frame));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_handle_text_reports_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let session = PushSession {
            config: ReactiveConfig::default(),
            contract: Address::repeat_byte(0x11),
            sink: tx,
        };

        let frame = log_frame(
            &[EventSignatures::granted(), Address::repeat_byte(0x22).into_word()],
            "0x",
        );
        assert!(!session.handle_text(&frame));
    }
}
