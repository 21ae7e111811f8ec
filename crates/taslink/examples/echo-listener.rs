//! Echo listener: accepts one peer at a time and sends every frame back.
//!
//! Run with:
//!   cargo run --example echo-listener
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1 --kind 1 --data HELLO --wait

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use taslink::channel::{ChannelConfig, NetworkChannel, DEFAULT_PORT};
use taslink::frame::Frame;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (tx, rx) = mpsc::channel::<Frame>();
    let inbound = move |frame: Frame| {
        eprintln!("Received kind {} ({} bytes)", frame.kind, frame.payload.len());
        let _ = tx.send(frame);
    };
    let outbound = move || rx.try_recv().ok();

    let channel = NetworkChannel::start(ChannelConfig::listener(DEFAULT_PORT), inbound, outbound)?;
    if let Some(addr) = channel.local_addr() {
        eprintln!("Listening on {addr}");
    }

    loop {
        if channel.consume_disconnect_edge() {
            eprintln!("Peer disconnected, waiting for the next one");
        }
        thread::sleep(Duration::from_millis(200));
    }
}
