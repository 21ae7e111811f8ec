//! Dialer that sends HELLO once per connection and prints whatever comes back.
//!
//! Run with:
//!   cargo run --example dial-hello -- 127.0.0.1
//!
//! Pair it with the echo-listener example. Stop the listener and start it again
//! to watch the dialer notice the disconnect and dial again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use taslink::channel::{ChannelConfig, NetworkChannel, DEFAULT_PORT};
use taslink::frame::Frame;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1".to_string());

    let hello_due = Arc::new(AtomicBool::new(false));
    let outbound = {
        let hello_due = Arc::clone(&hello_due);
        move || {
            hello_due
                .swap(false, Ordering::SeqCst)
                .then(|| Frame::new(1, &b"HELLO"[..]))
        }
    };
    let inbound = |frame: Frame| {
        println!(
            "kind={} payload={}",
            frame.kind,
            String::from_utf8_lossy(&frame.payload)
        );
    };

    let channel = NetworkChannel::start(ChannelConfig::dialer(DEFAULT_PORT), inbound, outbound)?;

    loop {
        if !channel.is_connected() {
            // Fails with AlreadyConnected only if a connection raced us.
            if let Err(err) = channel.set_target_address(&target) {
                eprintln!("set target: {err}");
            }
            if channel.wait_until_connected(Duration::from_secs(2)) {
                eprintln!("Connected to {:?}", channel.peer_addr());
                hello_due.store(true, Ordering::SeqCst);
                channel.notify_outbound();
            }
        }
        if channel.consume_disconnect_edge() {
            eprintln!("Link lost");
        }
        thread::sleep(Duration::from_millis(200));
    }
}
