//! Thin transports over the core request pipeline (spec §6 "External
//! interfaces"). Neither transport knows anything about pooling, caching,
//! or rate limiting — they decode a frame, call
//! [`obridge_server::dispatch`], and encode whatever comes back.

pub mod http;
pub mod stdio;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid bind address: {0}")]
    Bind(String),
}
