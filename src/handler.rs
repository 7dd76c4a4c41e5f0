use crate::cancel::CancellationBridge;
use crate::config::{HandlerConfig, Properties};
use crate::error::{Error, Result};
use crate::native::NativeTransport;
use crate::request::{self, HttpRequest};
use crate::response::{CompletionOption, ResponseMessage, ResponseStream};
use crate::session::Session;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

/// An HTTP message handler over a native transport.
///
/// The handler opens its native session lazily, on the first
/// [`send`](Self::send), from a snapshot of its configuration. From then on
/// the configuration is frozen. Requests may run concurrently; each one owns
/// its native handles and releases them on every exit path.
pub struct WinHttpHandler<T: NativeTransport> {
    transport: Arc<T>,
    state: Mutex<State<T>>,
    properties: Mutex<Properties>,
}

struct State<T: NativeTransport> {
    config: Arc<HandlerConfig>,
    session: Option<Arc<Session<T>>>,
    disposed: bool,
}

impl<T: NativeTransport> WinHttpHandler<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, HandlerConfig::default())
    }

    pub fn with_config(transport: T, config: HandlerConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            state: Mutex::new(State {
                config: Arc::new(config),
                session: None,
                disposed: false,
            }),
            properties: Mutex::new(Properties::default()),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// The current configuration snapshot.
    #[must_use]
    pub fn config(&self) -> Arc<HandlerConfig> {
        self.state.lock().config.clone()
    }

    /// Replaces the configuration.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperation`] once a request has been sent, and
    /// [`Error::Disposed`] after [`dispose`](Self::dispose).
    pub fn set_config(&self, config: HandlerConfig) -> Result<()> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(Error::Disposed);
        }
        if state.session.is_some() {
            return Err(Error::InvalidOperation);
        }
        state.config = Arc::new(config);
        Ok(())
    }

    /// Runs `f` on the free-form values attached to this handler. The bag
    /// is locked only for the duration of the call.
    pub fn with_properties<R>(&self, f: impl FnOnce(&mut Properties) -> R) -> R {
        f(&mut self.properties.lock())
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Releases the handler's session. Requests still in flight keep it
    /// alive until they finish. Later sends fail with [`Error::Disposed`].
    pub fn dispose(&self) {
        let session = {
            let mut state = self.state.lock();
            state.disposed = true;
            state.session.take()
        };
        if session.is_some() {
            tracing::debug!("handler disposed");
        }
    }

    /// Sends `request` and returns its response.
    ///
    /// With [`CompletionOption::ResponseContentRead`] the whole body is read
    /// before this returns and the native request is already released.
    pub async fn send(
        &self,
        request: HttpRequest,
        completion: CompletionOption,
    ) -> Result<ResponseMessage<T>> {
        let span = tracing::debug_span!(
            "request",
            method = %request.method(),
            url = %request.url(),
        );
        self.send_inner(request, completion).instrument(span).await
    }

    async fn send_inner(
        &self,
        request: HttpRequest,
        completion: CompletionOption,
    ) -> Result<ResponseMessage<T>> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        let bridge = CancellationBridge::new(request.token());
        bridge.check()?;

        let session = self.session()?;
        let url = request.url().clone();
        let (context, head) = request::execute(session, request, bridge).await?;

        let mut body = ResponseStream::live(context);
        if completion == CompletionOption::ResponseContentRead {
            let bytes = body.read_to_end().await?;
            body = ResponseStream::buffered(bytes);
        }
        Ok(ResponseMessage::new(head, url, body))
    }

    /// The open session, opening it on first use.
    fn session(&self) -> Result<Arc<Session<T>>> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(Error::Disposed);
        }
        if let Some(session) = &state.session {
            return Ok(session.clone());
        }
        state.config.validate_for_send()?;
        let session = Arc::new(Session::open(
            self.transport.clone(),
            state.config.clone(),
        )?);
        state.session = Some(session.clone());
        Ok(session)
    }
}

impl<T: NativeTransport> Drop for WinHttpHandler<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: NativeTransport> fmt::Debug for WinHttpHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("WinHttpHandler")
            .field("config", &state.config)
            .field("session_open", &state.session.is_some())
            .field("disposed", &state.disposed)
            .finish_non_exhaustive()
    }
}

#[cfg(windows)]
impl Default for WinHttpHandler<crate::winhttp::WinHttpTransport> {
    fn default() -> Self {
        Self::new(crate::winhttp::WinHttpTransport::new())
    }
}
