#![cfg(feature = "cli")]

use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn free_port() -> u16 {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .expect("ephemeral bind should work")
        .local_addr()
        .expect("bound socket has an address")
        .port()
}

fn taslink() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_taslink"));
    cmd.env_remove("TASLINK_PORT")
        .env_remove("TASLINK_TIMEOUT")
        .env_remove("TASLINK_MAX_PAYLOAD")
        .arg("--log-level")
        .arg("error");
    cmd
}

fn wait_for_port(port: u16, timeout: Duration) {
    let start = Instant::now();
    loop {
        if TcpStream::connect((Ipv4Addr::LOCALHOST, port)).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("port {port} never opened");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> Output {
    let start = Instant::now();
    while child.try_wait().expect("child status").is_none() {
        if start.elapsed() >= timeout {
            let _ = child.kill();
            break;
        }
        thread::sleep(Duration::from_millis(25));
    }
    child.wait_with_output().expect("child output")
}

#[test]
fn version_prints_package_version() {
    let output = taslink().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("taslink {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn send_reaches_listen() {
    let port = free_port();
    let listen = taslink()
        .arg("--format")
        .arg("json")
        .arg("listen")
        .arg("--bind")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(port.to_string())
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen should start");

    wait_for_port(port, Duration::from_secs(3));

    let send = taslink()
        .arg("send")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(port.to_string())
        .arg("--kind")
        .arg("1")
        .arg("--data")
        .arg("HELLO")
        .output()
        .expect("send should run");
    assert!(send.status.success(), "send failed: {send:?}");

    let output = wait_with_timeout(listen, Duration::from_secs(10));
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"kind\":1"));
    assert!(stdout.contains("\"payload\":\"HELLO\""));
}

#[test]
fn send_wait_prints_echo() {
    let port = free_port();
    let mut echo = taslink()
        .arg("echo")
        .arg("--bind")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(port.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("echo should start");

    wait_for_port(port, Duration::from_secs(3));

    let output = taslink()
        .arg("--format")
        .arg("pretty")
        .arg("send")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--kind")
        .arg("2")
        .arg("--data")
        .arg("RETRY")
        .arg("--wait")
        .output()
        .expect("send should run");

    let _ = echo.kill();
    let _ = echo.wait();

    assert!(output.status.success(), "send failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("kind=2"));
    assert!(stdout.contains("payload=RETRY"));
}

#[test]
fn send_to_closed_port_is_transport_error() {
    let port = free_port();
    let output = taslink()
        .arg("send")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(port.to_string())
        .arg("--timeout")
        .arg("1s")
        .arg("--data")
        .arg("x")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn oversized_payload_is_rejected_before_connecting() {
    let output = taslink()
        .arg("send")
        .arg("127.0.0.1")
        .arg("--max-payload")
        .arg("4")
        .arg("--data")
        .arg("too long")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn invalid_duration_is_usage_error() {
    let output = taslink()
        .arg("send")
        .arg("127.0.0.1")
        .arg("--timeout")
        .arg("soon")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(64));
}
