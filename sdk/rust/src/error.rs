//! Client error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-`ok` envelope code, or an `error` event on the subscribe stream
    #[error("broker returned {code}: {message}")]
    Broker { code: String, message: String },

    #[error("decode: {0}")]
    Decode(String),

    #[error("offset store: {0}")]
    OffsetStore(String),

    /// The subscribe handler returned an error
    #[error("handler: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),
}
