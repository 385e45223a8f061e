#![allow(clippy::unwrap_used)]
// End-to-end: a proxy over the real KATCP client, against a local server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use edd_core::{
    EndpointAddress, Message, ProductConfig, ProductState, RemoteProductProxy, SensorRegistry,
};

const REQUESTS: &[&str] = &["configure", "deconfigure", "capture-start", "capture-stop"];

/// Accept one connection and answer `?help` plus every request with `ok`.
async fn start_server() -> (EndpointAddress, Arc<Mutex<Vec<Message>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let received: Arc<Mutex<Vec<Message>>> = Arc::default();

    let recv = Arc::clone(&received);
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request = Message::parse(&line).unwrap();
            let mid = request.mid.unwrap();
            let mut out = String::new();
            if request.name == "help" {
                for name in REQUESTS {
                    out.push_str(&format!("{}\n", Message::inform("help", [*name]).with_mid(mid)));
                }
                out.push_str(&format!("{}\n", Message::reply("help", ["ok", "4"]).with_mid(mid)));
            } else {
                out.push_str(&format!("{}\n", Message::reply(request.name.clone(), ["ok"]).with_mid(mid)));
                recv.lock().unwrap().push(request);
            }
            write.write_all(out.as_bytes()).await.unwrap();
        }
    });

    (EndpointAddress::new("127.0.0.1", port), received)
}

#[tokio::test]
async fn test_operations_issued_after_handshake_complete() {
    let (address, received) = start_server().await;
    let mut config = ProductConfig::new("P1", address);
    config.sync_timeout = Some(Duration::from_secs(5));

    let proxy = RemoteProductProxy::connect(Arc::new(SensorRegistry::new()), config);
    proxy.setup_sensors().unwrap();

    // The handshake finishes long before the first operation is issued.
    tokio::time::sleep(Duration::from_millis(300)).await;

    proxy.configure(&json!({"band": "L"})).await.unwrap();
    proxy.capture_start().await.unwrap();
    assert_eq!(proxy.state(), ProductState::Active);
    assert!(proxy.is_capturing());

    let names: Vec<String> = received.lock().unwrap().iter().map(|m| m.name.clone()).collect();
    assert_eq!(names, vec!["configure", "capture-start"]);
}
