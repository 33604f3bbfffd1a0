//! Test helpers: the discovery endpoint and an in-process TCP peer

#![allow(dead_code)]

use std::io::{BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mockito::{Mock, Server, ServerGuard};
use serde_json::Value;
use xbmc_rpc::XbmcConfig;

pub const INTROSPECT: &str = include_str!("../fixtures/introspect.json");

/// Serve `INTROSPECT` at `GET /jsonrpc`
pub fn schema_endpoint() -> (ServerGuard, Mock) {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/jsonrpc")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(INTROSPECT)
        .create();
    (server, mock)
}

/// Config pointing at `server` for discovery and `tcp_port` for requests
pub fn config_for(server: &ServerGuard, tcp_port: u16) -> XbmcConfig {
    let host_with_port = server.host_with_port();
    let (host, http_port) = host_with_port.rsplit_once(':').unwrap();
    XbmcConfig::new(host)
        .with_ports(http_port.parse().unwrap(), tcp_port)
        .with_request_timeout(Duration::from_secs(2))
        .with_discovery_timeout(Duration::from_secs(2))
}

/// A TCP peer speaking concatenated JSON frames
pub struct FakeXbmc {
    pub port: u16,
    pub handle: JoinHandle<()>,
}

impl FakeXbmc {
    /// Accept one connection; `answer` maps each request to the frames to send back
    pub fn spawn<F>(answer: F) -> Self
    where
        F: Fn(&Value) -> Vec<Value> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            for request in requests(&stream) {
                let frames: String = answer(&request).iter().map(Value::to_string).collect();
                if (&stream).write_all(frames.as_bytes()).is_err() {
                    break;
                }
            }
        });
        Self { port, handle }
    }
}

fn requests(stream: &TcpStream) -> impl Iterator<Item = Value> {
    let reader = BufReader::new(stream.try_clone().unwrap());
    serde_json::Deserializer::from_reader(reader)
        .into_iter::<Value>()
        .map_while(Result::ok)
}
