//! Socket transports for the FTP command layer.
//!
//! A [`SecureLayer`] turns a connected TCP stream into a [`Transport`]. The
//! implicit-TLS layer completes the handshake before returning, so the first
//! byte the command layer reads is already decrypted.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme, StreamOwned};
use tracing::debug;

use super::{TransferError, TransferResult};

/// A byte stream the command layer can talk over.
pub trait Transport: Read + Write + Send {
    /// Close the stream, flushing any protocol-level goodbye first.
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// Wraps freshly connected sockets, for the control channel and for every
/// data channel alike.
pub trait SecureLayer: Send + Sync {
    fn wrap(&self, host: &str, stream: TcpStream) -> TransferResult<Box<dyn Transport>>;

    /// Whether channel protection commands (`PBSZ`/`PROT`) apply.
    fn is_secure(&self) -> bool;
}

/// No encryption. Used against local test servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainLayer;

impl SecureLayer for PlainLayer {
    fn wrap(&self, _host: &str, stream: TcpStream) -> TransferResult<Box<dyn Transport>> {
        Ok(Box::new(stream))
    }

    fn is_secure(&self) -> bool {
        false
    }
}

/// Implicit TLS with certificate validation disabled.
///
/// One `ClientConfig` is shared by every channel so its session cache lets
/// data channels resume the control session, which archive servers commonly
/// require.
#[derive(Debug, Clone)]
pub struct ImplicitTls {
    config: Arc<ClientConfig>,
}

impl ImplicitTls {
    pub fn new() -> TransferResult<Self> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
            .with_no_client_auth();
        Ok(Self {
            config: Arc::new(config),
        })
    }
}

impl SecureLayer for ImplicitTls {
    fn wrap(&self, host: &str, mut stream: TcpStream) -> TransferResult<Box<dyn Transport>> {
        let name = ServerName::try_from(host.to_string())
            .map_err(|e| TransferError::ServerName(format!("{host}: {e}")))?;
        let mut conn = ClientConnection::new(Arc::clone(&self.config), name)?;
        while conn.is_handshaking() {
            conn.complete_io(&mut stream)?;
        }
        debug!(
            "TLS established with {host} ({:?})",
            conn.protocol_version()
        );
        Ok(Box::new(TlsTransport(StreamOwned::new(conn, stream))))
    }

    fn is_secure(&self) -> bool {
        true
    }
}

struct TlsTransport(StreamOwned<ClientConnection, TcpStream>);

impl Read for TlsTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.read(buf) {
            // Servers often drop data channels without close_notify.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(0),
            other => other,
        }
    }
}

impl Write for TlsTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Transport for TlsTransport {
    fn shutdown(&mut self) -> io::Result<()> {
        self.0.conn.send_close_notify();
        while self.0.conn.wants_write() {
            self.0.conn.write_tls(&mut self.0.sock)?;
        }
        self.0.sock.shutdown(Shutdown::Both)
    }
}

/// The archive serves a self-signed certificate, so any certificate is
/// accepted. Handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_plain_layer_passes_bytes_through() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            sock.write_all(b"220 ready\r\n").unwrap();
        });

        let tcp = TcpStream::connect(addr).unwrap();
        let mut transport = PlainLayer.wrap("127.0.0.1", tcp).unwrap();
        let mut buf = String::new();
        transport.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "220 ready\r\n");
        server.join().unwrap();
        assert!(!PlainLayer.is_secure());
    }

    #[test]
    fn test_tls_handshake_failure_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            // Speak plain FTP to a TLS client, then hang up.
            let (mut sock, _) = listener.accept().unwrap();
            let _ = sock.write_all(b"220 plain text server\r\n");
        });

        let layer = ImplicitTls::new().unwrap();
        assert!(layer.is_secure());
        let tcp = TcpStream::connect(addr).unwrap();
        assert!(layer.wrap("localhost", tcp).is_err());
        server.join().unwrap();
    }
}
