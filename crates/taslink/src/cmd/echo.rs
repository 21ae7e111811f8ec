use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use taslink_channel::NetworkChannel;
use taslink_frame::Frame;
use tracing::info;

use crate::cmd::{install_ctrlc_handler, EchoArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: EchoArgs) -> CliResult<i32> {
    let config = args.link.listener_config(args.bind)?;

    // Inbound frames are queued and picked up by the writer on its next poll.
    let (tx, rx) = mpsc::channel::<Frame>();
    let inbound = move |frame: Frame| {
        info!(kind = frame.kind, size = frame.payload.len(), "echoing frame");
        let _ = tx.send(frame);
    };
    let outbound = move || rx.try_recv().ok();

    let mut channel = NetworkChannel::start(config, inbound, outbound)
        .map_err(|err| channel_error("echo failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    info!(addr = ?channel.local_addr(), "echo listener ready");

    while running.load(Ordering::SeqCst) {
        if channel.consume_disconnect_edge() {
            info!(recoveries = channel.recoveries(), "peer lost, waiting for reconnect");
        }
        thread::sleep(POLL_INTERVAL);
    }

    channel
        .shutdown()
        .map_err(|err| channel_error("shutdown failed", err))?;
    Ok(SUCCESS)
}
