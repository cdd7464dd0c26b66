//! HTTP/2 over TLS against a self-signed certificate.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use courier_core::{handler_fn, HandlerError, Request};
use courier_server::{Server, TlsSource};
use http::StatusCode;
use rustls::crypto::ring;
use rustls::RootCertStore;
use rustls_pki_types::{CertificateDer, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

struct Identity {
    cert_pem: String,
    key_pem: String,
    cert_der: CertificateDer<'static>,
}

fn identity() -> Identity {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    Identity {
        cert_pem: certified.cert.pem(),
        key_pem: certified.key_pair.serialize_pem(),
        cert_der: certified.cert.der().clone(),
    }
}

fn connector(cert: CertificateDer<'static>) -> TlsConnector {
    let mut roots = RootCertStore::empty();
    roots.add(cert).unwrap();
    let mut config = rustls::ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"h2".to_vec()];
    TlsConnector::from(Arc::new(config))
}

#[tokio::test]
async fn test_get_over_tls() {
    let identity = identity();
    let mut server = Server::builder()
        .host("127.0.0.1")
        .tls(TlsSource::from_pem(identity.cert_pem.clone(), identity.key_pem.clone()))
        .shutdown_timeout(Duration::from_secs(2))
        .build();
    server
        .router_mut()
        .get("/secure", handler_fn(|_req: Request| async { Ok::<_, HandlerError>("encrypted") }))
        .unwrap();
    let running = server.listen(Some(0)).await.unwrap();

    let tcp = TcpStream::connect(running.local_addr()).await.unwrap();
    let tls = connector(identity.cert_der)
        .connect(ServerName::try_from("localhost").unwrap(), tcp)
        .await
        .unwrap();
    assert_eq!(tls.get_ref().1.alpn_protocol(), Some(&b"h2"[..]));

    let (mut client, connection) = h2::client::handshake(tls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });

    let request = http::Request::builder()
        .uri("https://localhost/secure")
        .body(())
        .unwrap();
    let (response, _) = client.send_request(request, true).unwrap();
    let response = response.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body();
    let mut collected = Vec::new();
    while let Some(chunk) = body.data().await {
        collected.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(Bytes::from(collected), Bytes::from_static(b"encrypted"));

    drop(client);
    tokio::time::timeout(Duration::from_secs(5), running.close())
        .await
        .expect("close should finish");
}

#[tokio::test]
async fn test_bad_key_fails_listen() {
    let identity = identity();
    let server = Server::builder()
        .host("127.0.0.1")
        .tls(TlsSource::from_pem(identity.cert_pem.clone(), "not a key"))
        .build();

    let err = server.listen(Some(0)).await.unwrap_err();
    assert!(err.to_string().contains("no private key"));
}
