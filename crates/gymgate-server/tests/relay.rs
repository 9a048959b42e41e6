//! End-to-end relay tests over a real listener: device registration via
//! `tokio-tungstenite`, dispatch via HTTP.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use gymgate_server::config::ServerConfig;
use gymgate_server::server::RelayServer;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Ws = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn start_relay() -> SocketAddr {
    let server = RelayServer::new(ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..ServerConfig::default()
    });
    let (addr, _handle) = server.listen().await.expect("bind relay");
    addr
}

async fn connect_device(addr: SocketAddr) -> Ws {
    let (ws, _resp) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("websocket connect");
    ws
}

async fn device_count(addr: SocketAddr) -> u64 {
    let body = reqwest::get(format!("http://{addr}/health"))
        .await
        .expect("health request")
        .text()
        .await
        .expect("health body");
    let parsed: serde_json::Value = serde_json::from_str(&body).expect("health json");
    parsed["connected_devices"].as_u64().expect("device count")
}

async fn wait_for_device_count(addr: SocketAddr, expected: u64) {
    for _ in 0..200 {
        if device_count(addr).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("device count never reached {expected}");
}

async fn unlock(addr: SocketAddr, query: &str) -> (reqwest::StatusCode, String) {
    let resp = reqwest::get(format!("http://{addr}/unlock{query}"))
        .await
        .expect("unlock request");
    let status = resp.status();
    let body = resp.text().await.expect("unlock body");
    (status, body)
}

async fn expect_frame(ws: &mut Ws) -> Message {
    tokio::time::timeout(RECV_TIMEOUT, ws.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("receive error")
}

/// The connection was torn down by the server: a Close frame, an abrupt
/// reset, or a clean stream end all count.
async fn expect_connection_gone(ws: &mut Ws) {
    match tokio::time::timeout(RECV_TIMEOUT, ws.next()).await {
        Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => {}
        Ok(Some(Ok(other))) => panic!("expected connection teardown, got frame {other:?}"),
        Err(_) => panic!("timed out waiting for connection teardown"),
    }
}

#[tokio::test]
async fn structured_registration_unlocks_device() {
    let addr = start_relay().await;
    let mut device = connect_device(addr).await;

    device
        .send(Message::Text(
            r#"{"type":"REGISTER","gymID":"gym-42"}"#.into(),
        ))
        .await
        .unwrap();
    wait_for_device_count(addr, 1).await;

    let (status, body) = unlock(addr, "?gymID=gym-42").await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert!(body.contains("Unlock signal sent"));

    let frame = expect_frame(&mut device).await;
    assert_eq!(frame.into_text().unwrap().as_str(), "UNLOCK");
}

#[tokio::test]
async fn legacy_registration_unlocks_device() {
    let addr = start_relay().await;
    let mut device = connect_device(addr).await;

    device.send(Message::Text("gym-7".into())).await.unwrap();
    wait_for_device_count(addr, 1).await;

    let (status, _body) = unlock(addr, "?gymID=gym-7").await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let frame = expect_frame(&mut device).await;
    assert_eq!(frame.into_text().unwrap().as_str(), "UNLOCK");
}

#[tokio::test]
async fn wrong_discriminator_is_rejected() {
    let addr = start_relay().await;
    let mut device = connect_device(addr).await;

    device
        .send(Message::Text(r#"{"type":"PING","gymID":"x"}"#.into()))
        .await
        .unwrap();

    // The connection is closed and nothing is registered.
    expect_connection_gone(&mut device).await;
    assert_eq!(device_count(addr).await, 0);

    let (status, _body) = unlock(addr, "?gymID=x").await;
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_target_is_bad_request() {
    let addr = start_relay().await;
    let (status, _body) = unlock(addr, "").await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_target_is_not_found() {
    let addr = start_relay().await;
    let (status, _body) = unlock(addr, "?gymID=ghost").await;
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn disconnect_unregisters_device() {
    let addr = start_relay().await;
    let mut device = connect_device(addr).await;

    device.send(Message::Text("gym-3".into())).await.unwrap();
    wait_for_device_count(addr, 1).await;

    device.close(None).await.unwrap();
    wait_for_device_count(addr, 0).await;

    let (status, _body) = unlock(addr, "?gymID=gym-3").await;
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn second_registration_supersedes_first() {
    let addr = start_relay().await;

    let mut first = connect_device(addr).await;
    first.send(Message::Text("gym-9".into())).await.unwrap();
    wait_for_device_count(addr, 1).await;

    let mut second = connect_device(addr).await;
    second.send(Message::Text("gym-9".into())).await.unwrap();

    // The displaced connection is actively closed once its successor
    // registers.
    expect_connection_gone(&mut first).await;
    assert_eq!(device_count(addr).await, 1);

    let (status, _body) = unlock(addr, "?gymID=gym-9").await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let frame = expect_frame(&mut second).await;
    assert_eq!(frame.into_text().unwrap().as_str(), "UNLOCK");
}

#[tokio::test]
async fn concurrent_unlocks_are_independent() {
    let addr = start_relay().await;

    let mut devices = Vec::new();
    for i in 0..3 {
        let mut device = connect_device(addr).await;
        device
            .send(Message::Text(format!("gym-{i}").into()))
            .await
            .unwrap();
        devices.push(device);
    }
    wait_for_device_count(addr, 3).await;

    let (a, b, c) = tokio::join!(
        unlock(addr, "?gymID=gym-0"),
        unlock(addr, "?gymID=gym-1"),
        unlock(addr, "?gymID=gym-2"),
    );
    assert_eq!(a.0, reqwest::StatusCode::OK);
    assert_eq!(b.0, reqwest::StatusCode::OK);
    assert_eq!(c.0, reqwest::StatusCode::OK);

    for device in &mut devices {
        let frame = expect_frame(device).await;
        assert_eq!(frame.into_text().unwrap().as_str(), "UNLOCK");
    }
}

#[tokio::test]
async fn frames_after_registration_are_ignored() {
    let addr = start_relay().await;
    let mut device = connect_device(addr).await;

    device.send(Message::Text("gym-5".into())).await.unwrap();
    wait_for_device_count(addr, 1).await;

    // Liveness pings carry no payload semantics and change nothing.
    device.send(Message::Text("ping".into())).await.unwrap();
    device
        .send(Message::Text(r#"{"type":"REGISTER","gymID":"other"}"#.into()))
        .await
        .unwrap();

    assert_eq!(device_count(addr).await, 1);
    let (status, _body) = unlock(addr, "?gymID=gym-5").await;
    assert_eq!(status, reqwest::StatusCode::OK);
    let (status, _body) = unlock(addr, "?gymID=other").await;
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
}
