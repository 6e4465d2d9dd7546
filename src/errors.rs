//! Error taxonomy FEC, protocol, connection-abort and I/O classes.

use thiserror::Error;

/// Failure of the Reed–Solomon chunk codec (component A).
#[derive(Debug, Error)]
pub enum FecError {
    #[error("block could not be decoded: too many corrupted bytes")]
    Undecodable,
}

/// Transient protocol-level mismatches (component D).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("received sequence id ahead of expected (got {got}, expected {expected})")]
    SeqSkew { got: u8, expected: u8 },
    #[error("expected ACK flags, got {0:#04x}")]
    UnexpectedFlags(u8),
    #[error("hello plaintext mismatch during key-exchange liveness check")]
    HelloMismatch,
}

/// Top-level error surfaced across the session/transport boundary.
#[derive(Debug, Error)]
pub enum AircomError {
    #[error("connection aborted: retry budget exhausted or sequence desync")]
    ConnectionAborted,

    #[error(transparent)]
    Fec(#[from] FecError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("audio backend error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audio device error: {0}")]
    Cpal(String),
}

pub type Result<T> = std::result::Result<T, AircomError>;
