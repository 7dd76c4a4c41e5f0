//! Core RAII wrapper for native handles.

use crate::native::{NativeTransport, RawHandle};
use std::fmt;
use std::sync::Arc;

/// Owns one native handle and closes it through its transport on drop.
///
/// Each value closes its handle exactly once; there is no way to clone it or
/// take the raw value back out.
pub(crate) struct NativeHandle<T: NativeTransport> {
    raw: RawHandle,
    transport: Arc<T>,
}

impl<T: NativeTransport> NativeHandle<T> {
    pub(crate) fn new(transport: Arc<T>, raw: RawHandle) -> Self {
        Self { raw, transport }
    }

    /// Raw value for passing to the transport.
    pub(crate) fn raw(&self) -> RawHandle {
        self.raw
    }

    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: NativeTransport> Drop for NativeHandle<T> {
    fn drop(&mut self) {
        tracing::trace!(handle = self.raw.get(), "closing native handle");
        self.transport.close_handle(self.raw);
    }
}

impl<T: NativeTransport> fmt::Debug for NativeHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeHandle").field(&self.raw.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::EventSink;
    use crate::config::NetworkCredential;
    use crate::native::{AuthChallenge, NativeResult, OpenRequest, SessionParams};
    use crate::options::NativeOption;
    use crate::types::{AuthScheme, AuthTarget};
    use bytes::Bytes;
    use parking_lot::Mutex;

    /// Records closes; every other call is out of scope here.
    #[derive(Default)]
    struct Closes(Mutex<Vec<usize>>);

    impl NativeTransport for Closes {
        fn open_session(&self, _: &SessionParams) -> NativeResult<RawHandle> {
            unreachable!()
        }
        fn connect(&self, _: RawHandle, _: &str, _: u16) -> NativeResult<RawHandle> {
            unreachable!()
        }
        fn open_request(
            &self,
            _: RawHandle,
            _: &OpenRequest<'_>,
            _: EventSink,
        ) -> NativeResult<RawHandle> {
            unreachable!()
        }
        fn set_option(&self, _: RawHandle, _: &NativeOption) -> NativeResult<()> {
            unreachable!()
        }
        fn add_request_headers(&self, _: RawHandle, _: &str) -> NativeResult<()> {
            unreachable!()
        }
        fn send_request(&self, _: RawHandle, _: u32) -> NativeResult<()> {
            unreachable!()
        }
        fn write_data(&self, _: RawHandle, _: Bytes) -> NativeResult<()> {
            unreachable!()
        }
        fn receive_response(&self, _: RawHandle) -> NativeResult<()> {
            unreachable!()
        }
        fn query_status_code(&self, _: RawHandle) -> NativeResult<u16> {
            unreachable!()
        }
        fn query_raw_headers(&self, _: RawHandle) -> NativeResult<String> {
            unreachable!()
        }
        fn query_data_available(&self, _: RawHandle) -> NativeResult<()> {
            unreachable!()
        }
        fn read_data(&self, _: RawHandle, _: usize) -> NativeResult<()> {
            unreachable!()
        }
        fn query_auth_schemes(&self, _: RawHandle) -> NativeResult<AuthChallenge> {
            unreachable!()
        }
        fn set_credentials(
            &self,
            _: RawHandle,
            _: AuthTarget,
            _: AuthScheme,
            _: &NetworkCredential,
        ) -> NativeResult<()> {
            unreachable!()
        }
        fn close_handle(&self, handle: RawHandle) {
            self.0.lock().push(handle.get());
        }
    }

    #[test]
    fn test_closes_exactly_once_in_reverse_order() {
        let transport = Arc::new(Closes::default());
        let raw = |v| RawHandle::new(v).unwrap();
        {
            let _session = NativeHandle::new(transport.clone(), raw(1));
            let request = NativeHandle::new(transport.clone(), raw(2));
            assert_eq!(request.raw(), raw(2));
            assert!(transport.0.lock().is_empty());
        }
        assert_eq!(*transport.0.lock(), vec![2, 1]);
    }

    #[test]
    fn test_raw_handle_rejects_null() {
        assert!(RawHandle::new(0).is_none());
        assert_eq!(RawHandle::new(7).map(RawHandle::get), Some(7));
    }
}
