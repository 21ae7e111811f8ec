use std::fs;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use taslink_channel::NetworkChannel;
use taslink_frame::Frame;
use tracing::debug;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{
    channel_error, io_error, link_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS,
    TIMEOUT,
};
use crate::output::{print_frame, OutputFormat};

const GRACE: Duration = Duration::from_secs(1);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let config = args.link.dialer_config()?;
    let payload = resolve_payload(&args)?;
    if payload.len() > config.max_payload_size {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "payload is {} bytes, max is {}",
                payload.len(),
                config.max_payload_size
            ),
        ));
    }

    let connect_wait = with_grace(config.connect_timeout);
    let send_wait = with_grace(config.send_timeout);

    let (source, sent) = one_shot(Frame::new(args.kind, payload));
    let (tx, responses) = mpsc::channel::<Frame>();
    let mut channel = NetworkChannel::start(
        config,
        move |frame: Frame| {
            let _ = tx.send(frame);
        },
        source,
    )
    .map_err(|err| channel_error("send failed", err))?;

    channel
        .set_target_address(&args.host)
        .map_err(|err| channel_error("invalid target", err))?;

    if !channel.wait_until_connected(connect_wait) {
        return Err(link_error("connect failed", channel.last_error()));
    }
    debug!(peer = ?channel.peer_addr(), "connected");
    channel.notify_outbound();

    if sent.recv_timeout(send_wait).is_err() {
        return Err(match channel.last_error() {
            Some(err) => CliError::new(FAILURE, format!("send failed: {err}")),
            None => CliError::new(TIMEOUT, "send failed: timed out"),
        });
    }

    if args.wait {
        let frame = responses
            .recv_timeout(wait_timeout)
            .map_err(|_| CliError::new(TIMEOUT, "no response before --wait-timeout"))?;
        print_frame(&frame, channel.peer_addr(), format);
    }

    channel
        .shutdown()
        .map_err(|err| channel_error("shutdown failed", err))?;
    Ok(SUCCESS)
}

fn with_grace(timeout: Duration) -> Duration {
    timeout.saturating_add(GRACE)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

/// Outbound source that yields `frame` once.
///
/// The writer only asks for another frame after the previous one was fully
/// written, so the second call is the confirmation that `frame` is on the wire.
fn one_shot(frame: Frame) -> (impl FnMut() -> Option<Frame> + Send + 'static, Receiver<()>) {
    let (tx, rx) = mpsc::channel();
    let mut pending = Some(frame);
    let mut confirmed = false;
    let source = move || {
        if let Some(frame) = pending.take() {
            return Some(frame);
        }
        if !confirmed {
            confirmed = true;
            let _ = tx.send(());
        }
        None
    };
    (source, rx)
}
