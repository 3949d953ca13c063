//! Error types for chain connectivity

/// Errors that can occur while talking to the faucet contracts
#[derive(Debug, Clone)]
pub enum ChainError {
    // Connection errors
    WebSocketError(String),
    RpcError(String),

    // Event processing errors
    EventParseError { reason: String },
    SubscriptionError(String),

    // Contract interaction errors
    ContractCallFailed(String),
    SubmissionRejected(String),
    WrongNetwork { expected: u64, actual: u64 },
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::WebSocketError(msg) => write!(f, "WebSocket error: {}", msg),
            ChainError::RpcError(msg) => write!(f, "RPC error: {}", msg),
            ChainError::EventParseError { reason } => write!(f, "Event parse error: {}", reason),
            ChainError::SubscriptionError(msg) => write!(f, "Subscription error: {}", msg),
            ChainError::ContractCallFailed(msg) => write!(f, "Contract call failed: {}", msg),
            // Submission failures carry the node/wallet message verbatim so
            // the claim machine can show its first line.
            ChainError::SubmissionRejected(msg) => write!(f, "{}", msg),
            ChainError::WrongNetwork { expected, actual } => {
                write!(f, "Wrong network: expected chain id {}, connected to {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for ChainError {}

impl From<tokio_tungstenite::tungstenite::Error> for ChainError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ChainError::WebSocketError(err.to_string())
    }
}
