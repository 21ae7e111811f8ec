use std::sync::Arc;

use taslink_frame::{Frame, FrameError, FrameReader, IoRetry};
use tracing::{debug, trace, warn};

use crate::shared::{FatalReport, FatalSource, Shared};

/// Receives every inbound frame, in wire order, on the reader thread.
///
/// The handler owns whatever buffer the application reads from. It must not
/// call [`NetworkChannel::shutdown`](crate::NetworkChannel::shutdown): the
/// reader thread would end up joining itself.
pub trait InboundHandler: Send + 'static {
    fn on_frame(&mut self, frame: Frame);
}

impl<F> InboundHandler for F
where
    F: FnMut(Frame) + Send + 'static,
{
    fn on_frame(&mut self, frame: Frame) {
        self(frame)
    }
}

/// Reader task body.
pub(crate) fn run_reader<H: InboundHandler>(shared: Arc<Shared>, mut handler: H) {
    let retry = IoRetry::new(Arc::clone(&shared.classifier)).with_cancel(shared.cancel.clone());
    let mut min_generation = 0;

    while let Some(conn) = shared.await_connection(min_generation) {
        let generation = conn.generation();
        let mut reader = FrameReader::with_config(conn.stream(), shared.config.frame_config())
            .with_retry(retry.clone());
        trace!(generation, "reader attached to connection");

        let err = loop {
            match reader.read_frame() {
                Ok(frame) => {
                    trace!(kind = frame.kind, len = frame.payload.len(), "frame received");
                    handler.on_frame(frame);
                }
                Err(err) => break err,
            }
        };

        if matches!(err, FrameError::Cancelled) {
            break;
        }
        min_generation = generation + 1;
        warn!(generation, error = %err, "receive failed");
        shared.report_fatal(FatalReport {
            source: FatalSource::Reader,
            generation,
            reason: err.to_string(),
        });
    }

    debug!("reader task stopped");
}
