use crate::config::HandlerConfig;
use crate::error::{Error, Result};
use crate::handle::NativeHandle;
use crate::native::{NativeTransport, RawHandle, SessionParams};
use crate::options::session_options;
use crate::proxy::ProxyResolver;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// The native session: one handle, the configuration snapshot it was opened
/// with, and the per-server connection slots.
///
/// Shared through `Arc` by the handler and every in-flight request, so the
/// handle closes after whichever of them lets go last.
pub(crate) struct Session<T: NativeTransport> {
    handle: NativeHandle<T>,
    transport: Arc<T>,
    config: Arc<HandlerConfig>,
    proxy: ProxyResolver,
    slots: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl<T: NativeTransport> Session<T> {
    /// Opens the session handle and applies the session-scope options.
    ///
    /// If any option fails the handle is closed before the error returns.
    pub(crate) fn open(transport: Arc<T>, config: Arc<HandlerConfig>) -> Result<Self> {
        let proxy = ProxyResolver::new(config.windows_proxy_use_policy(), config.proxy())?;
        let params = SessionParams {
            user_agent: config.user_agent().to_string(),
            access_type: proxy.session_access_type(),
            proxy: None,
            proxy_bypass: None,
        };

        let raw = transport.open_session(&params).map_err(|err| {
            tracing::warn!(error = %err, "failed to open session");
            Error::Resource(err)
        })?;
        let handle = NativeHandle::new(transport.clone(), raw);

        for option in session_options(&config) {
            tracing::trace!(option = option.id(), "session option");
            transport
                .set_option(handle.raw(), &option)
                .map_err(Error::Resource)?;
        }

        tracing::debug!(
            handle = raw.get(),
            access_type = ?params.access_type,
            "session opened"
        );

        Ok(Self {
            handle,
            transport,
            config,
            proxy,
            slots: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub(crate) fn config(&self) -> &Arc<HandlerConfig> {
        &self.config
    }

    pub(crate) fn proxy(&self) -> &ProxyResolver {
        &self.proxy
    }

    pub(crate) fn connect(self: &Arc<Self>, host: &str, port: u16) -> Result<Connection<T>> {
        let raw = self
            .transport
            .connect(self.handle.raw(), host, port)
            .map_err(Error::Transport)?;
        Ok(Connection {
            handle: NativeHandle::new(self.transport.clone(), raw),
            _session: self.clone(),
        })
    }

    /// Waits for a free connection slot to `authority`. `None` when the
    /// per-server limit is unbounded.
    pub(crate) async fn acquire_slot(&self, authority: &str) -> Result<Option<OwnedSemaphorePermit>> {
        let Some(limit) = self.config.connection_limit() else {
            return Ok(None);
        };
        let semaphore = self
            .slots
            .lock()
            .entry(authority.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(limit as usize)))
            .clone();
        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| Error::Disposed)?;
        Ok(Some(permit))
    }
}

impl<T: NativeTransport> Drop for Session<T> {
    fn drop(&mut self) {
        tracing::debug!(handle = self.handle.raw().get(), "session closed");
    }
}

/// A connection handle to one server. Keeps its session alive.
pub(crate) struct Connection<T: NativeTransport> {
    handle: NativeHandle<T>,
    _session: Arc<Session<T>>,
}

impl<T: NativeTransport> Connection<T> {
    pub(crate) fn raw(&self) -> RawHandle {
        self.handle.raw()
    }
}
