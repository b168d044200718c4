//! Implicit-TLS FTP client used to pull gazette periods from the archive.
//!
//! The control channel is encrypted from the first byte, and every data
//! channel performs its own handshake against the same server identity. The
//! encryption itself lives in [`transport`] so the command layer in
//! [`client`] can be driven over plain TCP in tests.

pub mod client;
pub mod downloader;
pub mod transport;

pub use client::{parse_list_line, FtpsClient, FtpsOptions};
pub use downloader::{BatchOptions, NameFilter};
pub use transport::{ImplicitTls, PlainLayer, SecureLayer, Transport};

/// Default port for implicit FTPS.
pub const IMPLICIT_FTPS_PORT: u16 = 990;

/// Errors raised by the transfer client. The public boolean operations log
/// these and degrade; the `try_*` variants return them.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("invalid server name: {0}")]
    ServerName(String),

    #[error("unexpected reply to {command}: {code} {message}")]
    Reply {
        command: String,
        code: u16,
        message: String,
    },

    #[error("malformed reply: {0}")]
    Malformed(String),

    #[error("connection closed by server")]
    Closed,

    #[error("not connected")]
    NotConnected,

    #[error("invalid transfer URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to connect to {host}:{port}")]
    ConnectFailed { host: String, port: u16 },
}

impl TransferError {
    /// Whether the error leaves the stream unusable, as opposed to a reply
    /// the server chose to send.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Tls(_) | Self::Closed)
    }
}

pub type TransferResult<T> = Result<T, TransferError>;
