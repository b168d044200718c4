//! In-process FTP server shared by the integration tests.
//!
//! The server speaks just enough FTP (login, PBSZ/PROT, CWD, PASV, LIST,
//! RETR, QUIT) over loopback. By default it runs unencrypted for the client's
//! `PlainLayer`; with a TLS config it wraps the control channel and every
//! data channel like an implicit FTPS archive. The PASV reply advertises an
//! unroutable address, so a passing transfer proves the client dials the
//! control host instead.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gazette_runtime::ftps::{FtpsClient, FtpsOptions, PlainLayer, SecureLayer};
use rcgen::generate_simple_self_signed;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ServerConfig, ServerConnection, StreamOwned};

/// Remote directory → files in listing order.
pub type Tree = HashMap<String, Vec<(String, Vec<u8>)>>;

#[derive(Clone, Default)]
pub struct ServerOptions {
    /// Wrap every channel in TLS with this configuration.
    pub tls: Option<Arc<ServerConfig>>,
    /// Close the control connection right after the first completed RETR of
    /// each session, like an archive with a short idle timeout.
    pub hang_up_after_retr: bool,
}

#[derive(Default)]
struct Counters {
    retrievals: AtomicUsize,
    sessions: AtomicUsize,
    data_handshakes: AtomicUsize,
}

pub struct FakeServer {
    pub addr: SocketAddr,
    counters: Arc<Counters>,
}

impl FakeServer {
    pub fn start(tree: Tree) -> Self {
        Self::start_with(tree, ServerOptions::default())
    }

    pub fn start_with(tree: Tree, options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let tree = Arc::new(tree);
        let options = Arc::new(options);
        let counters = Arc::new(Counters::default());

        let shared = Arc::clone(&counters);
        thread::spawn(move || {
            for conn in listener.incoming() {
                let Ok(conn) = conn else { break };
                let tree = Arc::clone(&tree);
                let options = Arc::clone(&options);
                let counters = Arc::clone(&shared);
                thread::spawn(move || serve(conn, &tree, &options, &counters));
            }
        });

        Self { addr, counters }
    }

    /// Files sent in full.
    pub fn retrievals(&self) -> usize {
        self.counters.retrievals.load(Ordering::SeqCst)
    }

    /// Control connections accepted.
    pub fn sessions(&self) -> usize {
        self.counters.sessions.load(Ordering::SeqCst)
    }

    /// Data channels that completed a TLS handshake.
    pub fn data_handshakes(&self) -> usize {
        self.counters.data_handshakes.load(Ordering::SeqCst)
    }

    pub fn url(&self, path: &str) -> String {
        format!("ftps://127.0.0.1:{}{path}", self.addr.port())
    }

    pub fn client(&self) -> FtpsClient {
        self.client_with(Arc::new(PlainLayer))
    }

    pub fn client_with(&self, layer: Arc<dyn SecureLayer>) -> FtpsClient {
        FtpsClient::new(
            layer,
            FtpsOptions {
                default_port: self.addr.port(),
                timeout: Duration::from_secs(5),
                ..FtpsOptions::default()
            },
        )
    }
}

/// Server configuration with a freshly generated self-signed certificate
/// for `localhost`.
pub fn self_signed_tls() -> Arc<ServerConfig> {
    let rcgen::CertifiedKey { cert, signing_key } =
        generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_der = CertificateDer::from(cert);
    let key_der = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(signing_key.serialize_der()));
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der)
        .unwrap();
    Arc::new(config)
}

trait Channel: Read + Write + Send {
    fn close(&mut self);
}

impl Channel for TcpStream {
    fn close(&mut self) {
        let _ = self.shutdown(Shutdown::Write);
    }
}

impl Channel for StreamOwned<ServerConnection, TcpStream> {
    fn close(&mut self) {
        self.conn.send_close_notify();
        let _ = self.flush();
        let _ = self.sock.shutdown(Shutdown::Write);
    }
}

fn open_channel(mut tcp: TcpStream, tls: Option<&Arc<ServerConfig>>) -> Option<Box<dyn Channel>> {
    let Some(config) = tls else {
        return Some(Box::new(tcp));
    };
    let mut conn = ServerConnection::new(Arc::clone(config)).ok()?;
    while conn.is_handshaking() {
        conn.complete_io(&mut tcp).ok()?;
    }
    Some(Box::new(StreamOwned::new(conn, tcp)))
}

fn accept_data(
    listener: &TcpListener,
    options: &ServerOptions,
    counters: &Counters,
) -> Option<Box<dyn Channel>> {
    let (tcp, _) = listener.accept().ok()?;
    let channel = open_channel(tcp, options.tls.as_ref())?;
    if options.tls.is_some() {
        counters.data_handshakes.fetch_add(1, Ordering::SeqCst);
    }
    Some(channel)
}

fn serve(tcp: TcpStream, tree: &Tree, options: &ServerOptions, counters: &Counters) {
    counters.sessions.fetch_add(1, Ordering::SeqCst);
    let Some(channel) = open_channel(tcp, options.tls.as_ref()) else {
        return;
    };
    let mut control = BufReader::new(channel);
    let _ = control
        .get_mut()
        .write_all(b"220-Fake gazette archive\r\n220 ready\r\n");

    let mut cwd = String::from("/");
    let mut pasv: Option<TcpListener> = None;

    loop {
        let mut line = String::new();
        if control.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let line = line.trim_end().to_string();
        let (cmd, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        let mut hang_up = false;

        let reply = match cmd {
            "USER" => "331 password required".to_string(),
            "PASS" => "230 logged in".to_string(),
            "PBSZ" => "200 PBSZ=0".to_string(),
            "PROT" => "200 protection level set".to_string(),
            "TYPE" => "200 type set".to_string(),
            "CWD" if tree.contains_key(arg) => {
                cwd = arg.to_string();
                "250 directory changed".to_string()
            }
            "CWD" => "550 no such directory".to_string(),
            "PASV" => {
                let data = TcpListener::bind("127.0.0.1:0").unwrap();
                let port = data.local_addr().unwrap().port();
                pasv = Some(data);
                format!(
                    "227 Entering Passive Mode (10,9,8,7,{},{})",
                    port / 256,
                    port % 256
                )
            }
            "LIST" => match pasv.take() {
                Some(data) => {
                    let _ = control.get_mut().write_all(b"150 listing\r\n");
                    match accept_data(&data, options, counters) {
                        Some(mut sock) => {
                            let _ = sock.write_all(b"total 5\r\n");
                            for (name, body) in &tree[&cwd] {
                                let _ = write!(
                                    sock,
                                    "-rw-r--r--   1 ftp  ftp  {:>8} Oct 13 09:00 {name}\r\n",
                                    body.len()
                                );
                            }
                            sock.close();
                            "226 listing complete".to_string()
                        }
                        None => "425 data connection failed".to_string(),
                    }
                }
                None => "425 use PASV first".to_string(),
            },
            "RETR" => match (pasv.take(), tree[&cwd].iter().find(|(n, _)| n == arg)) {
                (Some(data), Some((name, body))) => {
                    let _ = control
                        .get_mut()
                        .write_all(b"150 opening data connection\r\n");
                    match accept_data(&data, options, counters) {
                        Some(mut sock) if name.starts_with("broken") => {
                            let _ = sock.write_all(&body[..body.len() / 2]);
                            sock.close();
                            "426 transfer aborted".to_string()
                        }
                        Some(mut sock) => {
                            let _ = sock.write_all(body);
                            sock.close();
                            counters.retrievals.fetch_add(1, Ordering::SeqCst);
                            hang_up = options.hang_up_after_retr;
                            "226 transfer complete".to_string()
                        }
                        None => "425 data connection failed".to_string(),
                    }
                }
                (_, None) => "550 no such file".to_string(),
                (None, _) => "425 use PASV first".to_string(),
            },
            "QUIT" => {
                let _ = control.get_mut().write_all(b"221 bye\r\n");
                return;
            }
            _ => "502 not implemented".to_string(),
        };

        let sent = control.get_mut().write_all(format!("{reply}\r\n").as_bytes());
        if sent.is_err() || hang_up {
            return;
        }
    }
}
