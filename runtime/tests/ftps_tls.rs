//! Implicit-TLS sessions against a self-signed in-process archive.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{self_signed_tls, FakeServer, ServerOptions, Tree};
use gazette_runtime::ftps::{BatchOptions, ImplicitTls, SecureLayer};
use tempfile::TempDir;

fn secure_server() -> FakeServer {
    let mut tree: Tree = HashMap::new();
    tree.insert(
        "/A/114/B".to_string(),
        vec![
            ("I400001.xml".to_string(), b"<doc>secure</doc>".to_vec()),
            ("patent.dtd".to_string(), b"<!ELEMENT doc ANY>".to_vec()),
        ],
    );
    FakeServer::start_with(
        tree,
        ServerOptions {
            tls: Some(self_signed_tls()),
            ..ServerOptions::default()
        },
    )
}

fn tls_layer() -> Arc<dyn SecureLayer> {
    Arc::new(ImplicitTls::new().unwrap())
}

// ── Control channel ──

#[test]
fn test_self_signed_certificate_is_accepted() {
    let server = secure_server();
    let mut client = server.client_with(tls_layer());

    assert!(client.connect("127.0.0.1", server.addr.port()));
    let names = client.list("/A/114/B");
    assert_eq!(names, vec!["I400001.xml", "patent.dtd"]);
    assert_eq!(server.data_handshakes(), 1);
}

// ── Data channels ──

#[test]
fn test_period_download_over_tls() {
    let server = secure_server();
    let mut client = server.client_with(tls_layer());
    let dir = TempDir::new().unwrap();

    let xml = BatchOptions::xml_only();
    let stats = client
        .download_from_transfer_url(&server.url("/A/114/B"), dir.path(), Some(&xml), None)
        .unwrap();

    assert_eq!(stats.total, 1);
    assert_eq!(stats.success, 1);
    assert!(stats.is_complete());
    // One handshake for the listing, one for the file.
    assert_eq!(server.data_handshakes(), 2);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("I400001.xml")).unwrap(),
        "<doc>secure</doc>"
    );
    assert!(!dir.path().join("I400001.xml.part").exists());
}
