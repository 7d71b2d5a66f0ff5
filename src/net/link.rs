//! One connection generation: the transport handle plus its response router.

use super::router::{NotificationSink, Router};
use super::transport::{BoxedStream, FrameReader, Transport};

#[derive(Debug)]
pub struct Link {
    pub transport: Transport,
    pub router: Router,
}

impl Link {
    pub fn new(transport: Transport, router: Router) -> Self {
        Self { transport, router }
    }

    /// Build a link over an already-connected stream.
    pub fn from_stream(
        stream: BoxedStream,
        generation: u64,
        notifications: NotificationSink,
    ) -> (Self, FrameReader) {
        let (transport, reader) = Transport::from_stream(stream, generation);
        (Self::new(transport, Router::new(notifications)), reader)
    }

    pub fn generation(&self) -> u64 {
        self.transport.generation()
    }

    pub fn is_released(&self) -> bool {
        self.transport.is_released()
    }

    /// Close the stream and fail every pending wait.
    ///
    /// Idempotent; returns `true` only for the call that did the release.
    pub fn release(&self) -> bool {
        let first = self.transport.release();
        self.router.close();
        first
    }
}
