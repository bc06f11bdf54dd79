//! End-to-end transport tests over real UNIX and TCP sockets

use deimos::transport::{self, client, Endpoint, ServeOptions};
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

fn echo_options(once: bool) -> ServeOptions {
    ServeOptions {
        once,
        secret: None,
        max_request_bytes: 1024 * 1024,
    }
}

fn wait_for_socket(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !path.exists() {
        assert!(Instant::now() < deadline, "server never bound {:?}", path);
        thread::sleep(Duration::from_millis(10));
    }
}

fn serve_once(endpoint: Endpoint, options: ServeOptions) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        transport::serve(&endpoint, &options, |request| {
            json!({"status": "ok", "echo": request})
        })
        .expect("serve");
    })
}

#[test]
fn test_unix_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ipc.sock");
    let endpoint = Endpoint::Unix(path.clone());

    let server = serve_once(endpoint.clone(), echo_options(true));
    wait_for_socket(&path);

    let response = client::send_request(&endpoint, json!({"alias": "stats"})).expect("send");
    assert_eq!(response["status"], "ok");
    assert_eq!(response["echo"]["alias"], "stats");
    server.join().expect("join");
}

#[test]
fn test_tcp_round_trip() {
    // Grab an ephemeral port, release it, then bind the server there.
    let addr = {
        let probe = TcpListener::bind("127.0.0.1:0").expect("probe bind");
        probe.local_addr().expect("local addr").to_string()
    };
    let endpoint = Endpoint::parse(&format!("tcp://{}", addr));

    let server = serve_once(endpoint.clone(), echo_options(true));

    let deadline = Instant::now() + Duration::from_secs(5);
    let response = loop {
        match client::send_request(&endpoint, json!({"ping": 1})) {
            Ok(response) => break response,
            Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
            Err(e) => panic!("tcp connect never succeeded: {}", e),
        }
    };
    assert_eq!(response["echo"]["ping"], 1);
    server.join().expect("join");
}

#[test]
fn test_secret_mismatch_rejected_generically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ipc.sock");
    let endpoint = Endpoint::Unix(path.clone());
    let options = ServeOptions {
        once: true,
        secret: Some("hunter2".to_string()),
        max_request_bytes: 1024 * 1024,
    };

    let server = serve_once(endpoint.clone(), options);
    wait_for_socket(&path);

    let response =
        client::send_request(&endpoint, json!({"alias": "scan", "secret": "wrong"})).expect("send");
    assert_eq!(response["status"], "error");
    assert_eq!(response["error"], "unauthorized");
    server.join().expect("join");
}

#[test]
fn test_correct_secret_accepted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ipc.sock");
    let endpoint = Endpoint::Unix(path.clone());
    let options = ServeOptions {
        once: true,
        secret: Some("hunter2".to_string()),
        max_request_bytes: 1024 * 1024,
    };

    let server = serve_once(endpoint.clone(), options);
    wait_for_socket(&path);

    let response =
        client::send_request(&endpoint, json!({"alias": "x", "secret": "hunter2"})).expect("send");
    assert_eq!(response["status"], "ok");
    server.join().expect("join");
}

#[test]
fn test_oversize_request_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ipc.sock");
    let endpoint = Endpoint::Unix(path.clone());
    let options = ServeOptions {
        once: true,
        secret: None,
        max_request_bytes: 64,
    };

    let server = serve_once(endpoint.clone(), options);
    wait_for_socket(&path);

    let big = json!({"alias": "scan", "blob": "x".repeat(256)});
    let response = client::send_request(&endpoint, big).expect("send");
    assert_eq!(response["status"], "error");
    assert_eq!(response["error"], "request too large");
    server.join().expect("join");
}

#[test]
fn test_malformed_json_gets_response_and_loop_survives() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ipc.sock");
    let endpoint = Endpoint::Unix(path.clone());

    // Background server without `once`; it outlives the test thread.
    let options = echo_options(false);
    let serve_endpoint = endpoint.clone();
    thread::spawn(move || {
        let _ = transport::serve(&serve_endpoint, &options, |request| {
            json!({"status": "ok", "echo": request})
        });
    });
    wait_for_socket(&path);

    // Raw garbage bytes, half-closed like a real client.
    let mut stream = UnixStream::connect(&path).expect("connect");
    stream.write_all(b"{not json").expect("write");
    stream.shutdown(Shutdown::Write).expect("half-close");
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).expect("read");
    let response: Value = serde_json::from_slice(&raw).expect("parse");
    assert_eq!(response["status"], "error");
    assert_eq!(response["error"], "malformed request");

    // The serve loop is still alive and answers a well-formed request.
    let ok = client::send_request(&endpoint, json!({"still": "here"})).expect("send");
    assert_eq!(ok["echo"]["still"], "here");
}

#[test]
fn test_empty_connection_does_not_consume_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ipc.sock");
    let endpoint = Endpoint::Unix(path.clone());

    let server = serve_once(endpoint.clone(), echo_options(true));
    wait_for_socket(&path);

    // Connect and leave without sending anything.
    let probe = UnixStream::connect(&path).expect("connect");
    probe.shutdown(Shutdown::Both).expect("shutdown");

    // The real request still gets served.
    let response = client::send_request(&endpoint, json!({"real": true})).expect("send");
    assert_eq!(response["echo"]["real"], true);
    server.join().expect("join");
}

#[test]
fn test_stale_socket_replaced() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ipc.sock");
    std::fs::write(&path, b"stale").expect("plant stale file");

    let endpoint = Endpoint::Unix(path.clone());
    let server = serve_once(endpoint.clone(), echo_options(true));

    // The pre-existing plain file satisfies a bare existence check, so
    // retry until the server has swapped in a real socket.
    let deadline = Instant::now() + Duration::from_secs(5);
    let response = loop {
        match client::send_request(&endpoint, json!({"fresh": 1})) {
            Ok(response) => break response,
            Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
            Err(e) => panic!("server never replaced stale socket: {}", e),
        }
    };
    assert_eq!(response["echo"]["fresh"], 1);
    server.join().expect("join");
}

#[test]
fn test_socket_owner_only_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ipc.sock");
    let endpoint = Endpoint::Unix(path.clone());

    let server = serve_once(endpoint.clone(), echo_options(true));
    wait_for_socket(&path);

    // The bind and the chmod are two syscalls; poll until it settles.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let mode = std::fs::metadata(&path)
            .expect("metadata")
            .permissions()
            .mode();
        if mode & 0o077 == 0 {
            break;
        }
        assert!(Instant::now() < deadline, "socket stayed at mode {:o}", mode);
        thread::sleep(Duration::from_millis(10));
    }
    assert!(deimos::auth::check_endpoint_permissions(&path));

    client::send_request(&endpoint, json!({})).expect("send");
    server.join().expect("join");
}
