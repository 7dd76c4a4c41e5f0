//! Native completion notifications.
//!
//! A request handle is opened with an [`EventSink`]. The native layer calls
//! [`EventSink::emit`] from whatever thread it completes on; the request task
//! awaits the matching [`EventStream::next_event`].

use crate::error::NativeError;
use bytes::Bytes;
use crossfire::mpsc;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Type aliases to hide crossfire's flavor generics from the rest of the crate.
type EventSender = crossfire::MTx<mpsc::List<CallbackEvent>>;
type EventReceiver = crossfire::Rx<mpsc::List<CallbackEvent>>;

/// A completion reported by the native layer for one request handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackEvent {
    SendRequestComplete,
    WriteComplete(usize),
    HeadersAvailable,
    /// Bytes that can be read without blocking; 0 marks the end of the body.
    DataAvailable(u32),
    ReadComplete(Bytes),
    RequestError(NativeError),
}

/// Waker slot shared by the sink and the stream.
///
/// Protected by a [`parking_lot::Mutex`] so the completion thread calling
/// `wake()` cannot race the executor thread registering a new waker.
#[derive(Default)]
struct WakerSlot {
    waker: Mutex<Option<Waker>>,
}

impl WakerSlot {
    fn wake(&self) {
        if let Some(waker) = self.waker.lock().take() {
            waker.wake();
        }
    }

    fn set(&self, waker: &Waker) {
        let mut guard = self.waker.lock();
        match guard.as_ref() {
            Some(existing) if existing.will_wake(waker) => {}
            _ => *guard = Some(waker.clone()),
        }
    }
}

/// Native-side end of a request's notification channel.
#[derive(Clone)]
pub struct EventSink {
    sender: EventSender,
    slot: Arc<WakerSlot>,
}

impl EventSink {
    /// Delivers `event` and wakes the waiting task. Events sent after the
    /// request context is gone are dropped.
    pub fn emit(&self, event: CallbackEvent) {
        tracing::trace!(?event, "callback event");
        if self.sender.send(event).is_ok() {
            self.slot.wake();
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

/// Handler-side end of a request's notification channel.
pub(crate) struct EventStream {
    receiver: EventReceiver,
    slot: Arc<WakerSlot>,
}

/// Creates a connected sink/stream pair.
pub(crate) fn channel() -> (EventSink, EventStream) {
    let (sender, receiver) = mpsc::unbounded_blocking();
    let slot = Arc::new(WakerSlot::default());
    (
        EventSink {
            sender,
            slot: slot.clone(),
        },
        EventStream { receiver, slot },
    )
}

impl EventStream {
    /// Resolves to the next event, or `None` once every sink is dropped and
    /// the queue is empty.
    pub(crate) fn next_event(&mut self) -> NextEvent<'_> {
        NextEvent { stream: self }
    }

    fn try_next(&self) -> Poll<Option<CallbackEvent>> {
        match self.receiver.try_recv() {
            Ok(event) => Poll::Ready(Some(event)),
            Err(crossfire::TryRecvError::Empty) => Poll::Pending,
            Err(crossfire::TryRecvError::Disconnected) => Poll::Ready(None),
        }
    }
}

pub(crate) struct NextEvent<'a> {
    stream: &'a mut EventStream,
}

impl Future for NextEvent<'_> {
    type Output = Option<CallbackEvent>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let stream = &*self.stream;
        if let Poll::Ready(event) = stream.try_next() {
            return Poll::Ready(event);
        }
        // Register, then look again: an event emitted between the first
        // check and registration would otherwise never wake us.
        stream.slot.set(cx.waker());
        stream.try_next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NativeApi;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (sink, mut stream) = channel();
        sink.emit(CallbackEvent::SendRequestComplete);
        sink.emit(CallbackEvent::HeadersAvailable);
        assert_eq!(
            stream.next_event().await,
            Some(CallbackEvent::SendRequestComplete)
        );
        assert_eq!(
            stream.next_event().await,
            Some(CallbackEvent::HeadersAvailable)
        );
    }

    #[tokio::test]
    async fn test_event_from_other_thread_wakes() {
        let (sink, mut stream) = channel();
        let worker = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            sink.emit(CallbackEvent::DataAvailable(42));
        });
        assert_eq!(
            stream.next_event().await,
            Some(CallbackEvent::DataAvailable(42))
        );
        worker.join().unwrap();
    }

    #[tokio::test]
    async fn test_dropped_sink_ends_stream() {
        let (sink, mut stream) = channel();
        sink.emit(CallbackEvent::RequestError(NativeError::new(
            NativeApi::ReadData,
            12030,
        )));
        drop(sink);
        assert!(matches!(
            stream.next_event().await,
            Some(CallbackEvent::RequestError(_))
        ));
        assert_eq!(stream.next_event().await, None);
    }

    #[test]
    fn test_emit_after_stream_dropped_is_silent() {
        let (sink, stream) = channel();
        drop(stream);
        sink.emit(CallbackEvent::HeadersAvailable);
    }
}
