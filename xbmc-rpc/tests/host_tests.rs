//! XbmcRpc end to end: mocked discovery plus an in-process TCP peer

mod helpers;

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use helpers::{config_for, schema_endpoint, FakeXbmc};
use htpc_core::prelude::*;
use serde_json::{json, Value};
use xbmc_rpc::{XbmcRpc, PEER_TYPE};

fn reply(request: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": request["id"], "result": result})
}

fn push(method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "method": method, "params": params})
}

fn fake_xbmc() -> FakeXbmc {
    FakeXbmc::spawn(|request| match request["method"].as_str() {
        Some("JSONRPC.Ping") => vec![reply(request, json!("pong"))],
        Some("JSONRPC.Version") => vec![reply(
            request,
            json!({"version": {"major": 6, "minor": 14, "patch": 3}}),
        )],
        Some("Player.PlayPause") => vec![reply(request, json!({"speed": "fast"}))],
        Some("GUI.ShowNotification") => vec![
            push(
                "Player.OnPlay",
                json!({"sender": "xbmc", "data": {"item": {"type": "movie"}}}),
            ),
            push(
                "Player.OnPlay",
                json!({"sender": "xbmc", "data": {"item": {"type": "song"}, "player": {"playerid": 0}}}),
            ),
            push("GUI.OnScreensaverActivated", json!({"sender": "xbmc", "data": null})),
            reply(request, json!("OK")),
        ],
        _ => vec![json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": {"code": -32601, "message": "Method not found."}
        })],
    })
}

#[test]
fn test_ping_and_version() {
    let (server, _mock) = schema_endpoint();
    let peer = fake_xbmc();
    let xbmc = XbmcRpc::new("living-room", config_for(&server, peer.port)).unwrap();

    let running = htpc_core::run(&xbmc).unwrap();
    assert!(running.is_connected());
    assert_eq!(
        running.execute("JSONRPC.Ping", json!({}), true),
        Some(json!("pong"))
    );
    assert_eq!(
        running.execute("JSONRPC.Version", Value::Null, true),
        Some(json!({"version": {"major": 6, "minor": 14, "patch": 3}}))
    );
    drop(running);

    assert!(!xbmc.is_connected());
    assert!(matches!(
        xbmc.try_execute("JSONRPC.Ping", json!({}), true),
        Err(HtpcError::NotStarted(_))
    ));
}

#[test]
fn test_reply_failing_returns_schema() {
    let (server, _mock) = schema_endpoint();
    let peer = fake_xbmc();
    let xbmc = XbmcRpc::new("living-room", config_for(&server, peer.port)).unwrap();
    xbmc.start().unwrap();

    assert_eq!(xbmc.execute("Player.PlayPause", json!({"playerid": 1}), true), None);
    assert!(matches!(
        xbmc.try_execute("Player.PlayPause", json!({"playerid": 1}), true),
        Err(HtpcError::InvalidReply { .. })
    ));
    xbmc.stop();
}

#[test]
fn test_fire_and_forget() {
    let (server, _mock) = schema_endpoint();
    let peer = fake_xbmc();
    let xbmc = XbmcRpc::new("living-room", config_for(&server, peer.port)).unwrap();
    xbmc.start().unwrap();

    assert!(matches!(
        xbmc.try_execute("JSONRPC.Ping", json!({}), false),
        Ok(None)
    ));
    // The unawaited reply is dropped and the connection stays usable
    assert_eq!(
        xbmc.execute("JSONRPC.Ping", json!({}), true),
        Some(json!("pong"))
    );
}

#[test]
fn test_validated_pushes_reach_subscribers() {
    let (server, _mock) = schema_endpoint();
    let peer = fake_xbmc();
    let xbmc = XbmcRpc::new("living-room", config_for(&server, peer.port)).unwrap();

    let (tx, rx) = mpsc::channel();
    for name in ["Player.OnPlay", "GUI.OnScreensaverActivated"] {
        let tx = tx.clone();
        xbmc.subscribe(
            name,
            callback(move |publisher, value| {
                tx.send((publisher.name().to_string(), value.clone()))?;
                Ok(())
            }),
        )
        .unwrap();
    }

    xbmc.start().unwrap();
    assert_eq!(
        xbmc.execute(
            "GUI.ShowNotification",
            json!({"title": "XBMC", "message": "hello"}),
            true
        ),
        Some(json!("OK"))
    );

    // The first OnPlay lacks `data.player` and is dropped
    let mut received: Vec<(String, Value)> = (0..2)
        .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
        .collect();
    received.sort_by_key(|(_, value)| value["data"].is_null());

    assert!(received.iter().all(|(publisher, _)| publisher == "living-room"));
    assert_eq!(received[0].1["data"]["item"]["type"], "song");
    assert!(received[1].1["data"].is_null());
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_remote_error_is_transport_failure() {
    let (server, _mock) = schema_endpoint();
    let peer = fake_xbmc();
    let xbmc = XbmcRpc::new("living-room", config_for(&server, peer.port)).unwrap();
    xbmc.start().unwrap();

    match xbmc.try_execute(
        "Addons.ExecuteAddon",
        json!({"addonid": "script.xbmc.subtitles"}),
        true,
    ) {
        Err(HtpcError::Transport { method, message }) => {
            assert_eq!(method, "Addons.ExecuteAddon");
            assert!(message.contains("-32601"));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[test]
fn test_start_without_tcp_listener() {
    let (server, _mock) = schema_endpoint();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let xbmc = XbmcRpc::new("living-room", config_for(&server, port)).unwrap();

    assert!(matches!(
        xbmc.start(),
        Err(HtpcError::Startup { name, .. }) if name == "living-room"
    ));
}

#[test]
fn test_event_handler_wiring() {
    let (server, _mock) = schema_endpoint();
    let peer = fake_xbmc();
    let xbmc: Arc<dyn RpcServer> =
        Arc::new(XbmcRpc::new("living-room", config_for(&server, peer.port)).unwrap());

    let (tx, rx) = mpsc::channel();
    let handler = EventHandler::builder("dim-on-screensaver")
        .on(
            PEER_TYPE,
            "GUI.OnScreensaverActivated",
            callback(move |publisher, _| {
                tx.send(publisher.name().to_string())?;
                Ok(())
            }),
        )
        .on(PEER_TYPE, "GUI.OnSomethingNew", callback(|_, _| Ok(())))
        .build();

    assert_eq!(handler.connect_to(&xbmc), 1);
    handler.start().unwrap();

    xbmc.start().unwrap();
    xbmc.execute(
        "GUI.ShowNotification",
        json!({"title": "XBMC", "message": "hello"}),
        true,
    );
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        "living-room"
    );
    xbmc.stop();
}
