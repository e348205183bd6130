use std::{
    io,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, ReadBuf};

/// Shared switch that cuts a pipeline's output off from the transport.
#[derive(Debug, Clone)]
pub struct OutputGate {
    open: Arc<AtomicBool>,
}

impl OutputGate {
    pub fn new() -> Self {
        Self {
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl Default for OutputGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a transcoder's stdout. Reads end (EOF) as soon as the gate closes,
/// and the first non-empty read raises `started`.
pub struct PipelineReader<R> {
    inner: R,
    gate: OutputGate,
    started: Arc<AtomicBool>,
}

impl<R> PipelineReader<R> {
    pub fn new(inner: R, gate: OutputGate, started: Arc<AtomicBool>) -> Self {
        Self {
            inner,
            gate,
            started,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for PipelineReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.gate.is_open() {
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);

        if let Poll::Ready(Ok(())) = poll {
            if buf.filled().len() > before {
                if !this.gate.is_open() {
                    // Closed while the read was in flight; drop the bytes.
                    buf.set_filled(before);
                    return Poll::Ready(Ok(()));
                }
                this.started.store(true, Ordering::Release);
            }
        }
        poll
    }
}
