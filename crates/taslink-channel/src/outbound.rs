use std::sync::Arc;

use taslink_frame::{Frame, FrameError, FrameWriter, IoRetry};
use tracing::{debug, trace, warn};

use crate::shared::{FatalReport, FatalSource, Shared};

/// Supplies outbound frames to the writer thread.
///
/// Called repeatedly while a connection is live. Returning `None` means
/// "nothing to send right now"; the writer then idles until
/// [`NetworkChannel::notify_outbound`](crate::NetworkChannel::notify_outbound)
/// or the configured idle interval.
pub trait OutboundSource: Send + 'static {
    fn next_frame(&mut self) -> Option<Frame>;
}

impl<F> OutboundSource for F
where
    F: FnMut() -> Option<Frame> + Send + 'static,
{
    fn next_frame(&mut self) -> Option<Frame> {
        self()
    }
}

/// Writer task body.
///
/// A frame is pulled from the source only once a connection is available.
/// If sending it fails fatally the frame is dropped, not retried on the next
/// connection.
pub(crate) fn run_writer<S: OutboundSource>(shared: Arc<Shared>, mut source: S) {
    let retry = IoRetry::new(Arc::clone(&shared.classifier)).with_cancel(shared.cancel.clone());
    let idle = shared.config.writer_idle_interval;
    let mut min_generation = 0;

    'connections: while let Some(conn) = shared.await_connection(min_generation) {
        let generation = conn.generation();
        let mut writer = FrameWriter::with_config(conn.stream(), shared.config.frame_config())
            .with_retry(retry.clone());
        trace!(generation, "writer attached to connection");

        loop {
            if shared.cancel.is_cancelled() {
                break 'connections;
            }
            if !shared.is_live(generation) {
                continue 'connections;
            }

            let Some(frame) = source.next_frame() else {
                shared.wait_outbound(idle);
                continue;
            };

            match writer.write_frame(&frame) {
                Ok(()) => trace!(kind = frame.kind, len = frame.payload.len(), "frame sent"),
                Err(FrameError::Cancelled) => break 'connections,
                Err(err @ FrameError::FrameTooLarge { .. }) => {
                    warn!(kind = frame.kind, error = %err, "dropping oversized outbound frame");
                }
                Err(err) => {
                    warn!(kind = frame.kind, error = %err, "send failed, dropping frame");
                    min_generation = generation + 1;
                    shared.report_fatal(FatalReport {
                        source: FatalSource::Writer,
                        generation,
                        reason: err.to_string(),
                    });
                    continue 'connections;
                }
            }
        }
    }

    debug!("writer task stopped");
}
