#![allow(clippy::unwrap_used)]
// Integration tests for `KatcpClient` against an in-process fake server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use edd_katcp::{
    ConnectionState, Error, KatcpClient, Message, MessageKind, ReconnectConfig, TransportConfig,
};

// ── Fake server ─────────────────────────────────────────────────────

/// Replies keyed by wire request name. A missing entry means "never reply".
#[derive(Clone, Default)]
struct Script {
    replies: HashMap<String, Vec<String>>,
    informs: HashMap<String, Vec<Vec<String>>>,
}

impl Script {
    fn standard() -> Self {
        let mut script = Self::default();
        for name in ["configure", "deconfigure", "capture-start", "capture-stop"] {
            script.replies.insert(name.into(), vec!["ok".into()]);
        }
        script
    }

    fn reply(mut self, name: &str, args: &[&str]) -> Self {
        self.replies
            .insert(name.into(), args.iter().map(|a| (*a).to_string()).collect());
        self
    }

    fn silent(mut self, name: &str) -> Self {
        self.replies.remove(name);
        self
    }

    fn inform(mut self, name: &str, args: &[&str]) -> Self {
        self.informs
            .entry(name.into())
            .or_default()
            .push(args.iter().map(|a| (*a).to_string()).collect());
        self
    }

    fn catalog(&self) -> Vec<String> {
        let mut names: Vec<String> = self.replies.keys().cloned().collect();
        names.push("slow".into());
        names.sort();
        names
    }
}

type Received = Arc<Mutex<Vec<Message>>>;

async fn write_line(stream: &mut tokio::net::tcp::OwnedWriteHalf, msg: &Message) {
    stream
        .write_all(format!("{msg}\n").as_bytes())
        .await
        .unwrap();
}

async fn serve_connection(socket: TcpStream, script: Script, received: Received) {
    let (read, mut write) = socket.into_split();
    write_line(
        &mut write,
        &Message::inform("version-connect", ["katcp-protocol", "5.0-MI"]),
    )
    .await;

    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let request = Message::parse(&line).unwrap();
        let mid = request.mid.unwrap();

        if request.name == "help" {
            for name in script.catalog() {
                let inform = Message::inform("help", [name, "a request".into()]).with_mid(mid);
                write_line(&mut write, &inform).await;
            }
            let count = script.catalog().len().to_string();
            write_line(&mut write, &Message::reply("help", ["ok", count.as_str()]).with_mid(mid)).await;
            continue;
        }

        received.lock().unwrap().push(request.clone());

        if let Some(informs) = script.informs.get(&request.name) {
            for args in informs {
                let inform = Message::inform(request.name.clone(), args.clone()).with_mid(mid);
                write_line(&mut write, &inform).await;
            }
        }
        if let Some(args) = script.replies.get(&request.name) {
            let reply = Message::reply(request.name.clone(), args.clone()).with_mid(mid);
            write_line(&mut write, &reply).await;
        }
    }
}

/// Start a fake server that serves every incoming connection with `script`.
async fn start_server(script: Script) -> (String, Received) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let received: Received = Arc::default();

    let recv = Arc::clone(&received);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve_connection(socket, script.clone(), Arc::clone(&recv)));
        }
    });

    (address, received)
}

fn fast_config() -> TransportConfig {
    TransportConfig {
        request_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(1),
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            max_retries: None,
        },
        ..TransportConfig::default()
    }
}

async fn synced_client(address: &str) -> KatcpClient {
    let client = KatcpClient::new("server-client_test", address, fast_config());
    client.start();
    tokio::time::timeout(Duration::from_secs(5), client.until_synced())
        .await
        .unwrap()
        .unwrap();
    client
}

// ── Sync and requests ───────────────────────────────────────────────

#[tokio::test]
async fn test_syncs_and_sends_request_in_wire_form() {
    let (address, received) = start_server(Script::standard()).await;
    let client = synced_client(&address).await;

    assert_eq!(client.state(), ConnectionState::Synced);
    assert!(client.has_request("capture_start").await);

    let reply = client.request("capture_start", &[], None).await.unwrap();
    assert!(reply.is_ok());
    assert_eq!(reply.message.name, "capture-start");

    let requests = received.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].kind, MessageKind::Request);
    assert_eq!(requests[0].name, "capture-start");
    assert!(requests[0].mid.is_some());
}

#[tokio::test]
async fn test_sync_is_remembered_for_late_waiters() {
    let (address, _) = start_server(Script::standard()).await;
    let client = KatcpClient::new("server-client_late", address, fast_config());
    client.start();
    assert_ne!(client.state(), ConnectionState::Disconnected);

    // Nobody subscribes while the handshake runs; poll the snapshot only.
    let mut polls = 0;
    while client.state() != ConnectionState::Synced {
        assert!(polls < 500, "never synced, state = {:?}", client.state());
        polls += 1;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    tokio::time::timeout(Duration::from_secs(1), client.until_synced())
        .await
        .unwrap()
        .unwrap();
    let reply = client.request("configure", &["{}".to_string()], None).await.unwrap();
    assert!(reply.is_ok());
}

#[tokio::test]
async fn test_arguments_are_escaped_and_restored() {
    let (address, received) = start_server(Script::standard()).await;
    let client = synced_client(&address).await;

    let payload = r#"{"band": "L", "note": ""}"#.to_string();
    let reply = client
        .request("configure", &[payload.clone()], Some(Duration::from_secs(120)))
        .await
        .unwrap();
    assert!(reply.is_ok());

    let requests = received.lock().unwrap().clone();
    assert_eq!(requests[0].arguments, vec![payload]);
}

#[tokio::test]
async fn test_fail_reply_is_returned_not_raised() {
    let script = Script::standard().reply("capture-start", &["fail", "device busy"]);
    let (address, _) = start_server(script).await;
    let client = synced_client(&address).await;

    let reply = client.request("capture_start", &[], None).await.unwrap();
    assert!(!reply.is_ok());
    assert_eq!(reply.status(), "fail");
    assert_eq!(reply.error_message(), Some("device busy"));
}

#[tokio::test]
async fn test_informs_are_collected_with_their_reply() {
    let script = Script::standard()
        .inform("deconfigure", &["releasing", "pipeline"])
        .reply("deconfigure", &["ok", "1"]);
    let (address, _) = start_server(script).await;
    let client = synced_client(&address).await;

    let reply = client.request("deconfigure", &[], None).await.unwrap();
    assert_eq!(reply.values().to_vec(), vec!["1".to_string()]);
    assert_eq!(reply.informs.len(), 1);
    assert_eq!(reply.informs[0].arguments, vec!["releasing", "pipeline"]);
}

#[tokio::test]
async fn test_unknown_request_is_rejected_locally() {
    let (address, received) = start_server(Script::standard()).await;
    let client = synced_client(&address).await;

    let result = client.request("self_destruct", &[], None).await;
    assert!(
        matches!(result, Err(Error::UnknownRequest { ref name }) if name == "self-destruct"),
        "expected UnknownRequest, got: {result:?}"
    );
    assert!(received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_timeout_becomes_fail_reply() {
    let (address, _) = start_server(Script::standard().silent("slow")).await;
    let client = synced_client(&address).await;

    let reply = client
        .request("slow", &[], Some(Duration::from_millis(100)))
        .await
        .unwrap();
    assert!(!reply.is_ok());
    assert_eq!(reply.error_message(), Some("Timed out after 0.1 seconds"));
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_before_start_fails_waiters() {
    let client = KatcpClient::new("idle", "127.0.0.1:1", fast_config());
    client.stop();

    assert!(matches!(client.until_synced().await, Err(Error::Stopped)));
    assert!(matches!(
        client.request("configure", &[], None).await,
        Err(Error::Stopped)
    ));
    assert_eq!(client.state(), ConnectionState::Stopped);
}

#[tokio::test]
async fn test_stop_after_sync_reaches_stopped() {
    let (address, _) = start_server(Script::standard()).await;
    let client = synced_client(&address).await;
    let mut state = client.subscribe_state();

    client.stop();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Stopped),
    )
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test]
async fn test_retry_limit_stops_client() {
    // Bind and drop to get a port nothing listens on.
    let address = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let mut config = fast_config();
    config.reconnect.max_retries = Some(1);

    let client = KatcpClient::new("unreachable", address, config);
    client.start();

    let result = tokio::time::timeout(Duration::from_secs(5), client.until_synced())
        .await
        .unwrap();
    assert!(matches!(result, Err(Error::Stopped)));
}

#[tokio::test]
async fn test_reconnects_after_server_drops_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let received: Received = Arc::default();

    let recv = Arc::clone(&received);
    tokio::spawn(async move {
        // First connection: close immediately after the client syncs.
        let (socket, _) = listener.accept().await.unwrap();
        let script = Script::standard();
        let first = tokio::spawn(serve_connection(socket, script.clone(), Arc::clone(&recv)));
        tokio::time::sleep(Duration::from_millis(200)).await;
        first.abort();

        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve_connection(socket, script.clone(), Arc::clone(&recv)));
        }
    });

    let client = synced_client(&address).await;
    let mut state = client.subscribe_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| matches!(s, ConnectionState::Reconnecting { .. })),
    )
    .await
    .unwrap()
    .unwrap();
    drop(state);

    tokio::time::timeout(Duration::from_secs(5), client.until_synced())
        .await
        .unwrap()
        .unwrap();
    let reply = client.request("capture_stop", &[], None).await.unwrap();
    assert!(reply.is_ok());
}

#[tokio::test]
async fn test_async_informs_are_broadcast() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request = Message::parse(&line).unwrap();
            let mid = request.mid.unwrap();
            write_line(&mut write, &Message::reply("help", ["ok", "0"]).with_mid(mid)).await;
            write_line(&mut write, &Message::inform("interface-changed", Vec::<String>::new())).await;
        }
    });

    let client = KatcpClient::new("informs", address, fast_config());
    let mut informs = client.subscribe_informs();
    client.start();

    let inform = tokio::time::timeout(Duration::from_secs(5), informs.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inform.name, "interface-changed");
}
