use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("config center returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),

    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cache file error: {0}")]
    Cache(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection closed: {0}")]
    Closed(String),
}

pub type SdkResult<T> = Result<T, SdkError>;
