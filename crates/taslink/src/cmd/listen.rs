use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use taslink_channel::NetworkChannel;
use taslink_frame::Frame;
use tracing::info;

use crate::cmd::{install_ctrlc_handler, ListenArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.listener_config(args.bind)?;

    let (tx, rx) = mpsc::channel::<Frame>();
    let mut channel = NetworkChannel::start(
        config,
        move |frame: Frame| {
            let _ = tx.send(frame);
        },
        || None::<Frame>,
    )
    .map_err(|err| channel_error("listen failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    info!(addr = ?channel.local_addr(), "waiting for peer");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        if channel.consume_disconnect_edge() {
            info!(recoveries = channel.recoveries(), "peer lost, waiting for reconnect");
        }

        let frame = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        print_frame(&frame, channel.peer_addr(), format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    channel
        .shutdown()
        .map_err(|err| channel_error("shutdown failed", err))?;
    Ok(SUCCESS)
}
