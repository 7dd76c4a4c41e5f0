//! A scripted, recording stand-in for the native HTTP stack.
//!
//! Completions are emitted on the sink either inline or, for delayed
//! responses, from a helper thread, the same way the OS thread pool would.

#![allow(dead_code)]

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use winhttp_handler::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Session,
    Connection,
    Request,
}

/// One recorded native call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    OpenSession(SessionParams),
    Connect { host: String, port: u16 },
    OpenRequest { method: String, path: String, secure: bool },
    SetOption { kind: Kind, option: NativeOption },
    AddHeaders(String),
    Send { total_length: u32 },
    Write(Bytes),
    ReceiveResponse,
    SetCredentials { scheme: AuthScheme, user: String },
    Close(usize),
}

/// What the fake server does.
#[derive(Debug, Clone)]
pub struct Script {
    pub status: u16,
    /// Header lines after the status line, without CRLF.
    pub headers: Vec<String>,
    pub body: Bytes,
    /// Largest piece a single read hands back.
    pub max_read: usize,
    /// Largest piece a single write accepts.
    pub max_write: usize,
    /// Delay before the response headers arrive.
    pub headers_delay: Option<Duration>,
    pub open_session_error: Option<u32>,
    /// Reported asynchronously after `send_request`.
    pub send_error: Option<u32>,
    /// Answer 401 with these schemes until credentials are set.
    pub challenge: Option<AuthScheme>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            status: 200,
            headers: vec!["Content-Type: text/plain".into()],
            body: Bytes::from_static(b"hello"),
            max_read: usize::MAX,
            max_write: usize::MAX,
            headers_delay: None,
            open_session_error: None,
            send_error: None,
            challenge: None,
        }
    }
}

struct RequestState {
    sink: EventSink,
    offset: usize,
    authorized: bool,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    open: HashMap<usize, Kind>,
    requests: HashMap<usize, RequestState>,
    double_closes: usize,
    peak_requests: usize,
}

pub struct MockTransport {
    script: Mutex<Script>,
    state: Mutex<State>,
    next: AtomicUsize,
}

impl MockTransport {
    pub fn new(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            state: Mutex::new(State::default()),
            next: AtomicUsize::new(0x100),
        }
    }

    pub fn script(&self) -> parking_lot::MutexGuard<'_, Script> {
        self.script.lock()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Options set on handles of `kind`, in order.
    pub fn options(&self, kind: Kind) -> Vec<NativeOption> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SetOption { kind: k, option } if k == kind => Some(option),
                _ => None,
            })
            .collect()
    }

    pub fn option(&self, kind: Kind, id: u32) -> Option<NativeOption> {
        self.options(kind).into_iter().find(|option| option.id() == id)
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| matches(call)).count()
    }

    pub fn open_handles(&self) -> usize {
        self.state.lock().open.len()
    }

    pub fn open_handles_of(&self, kind: Kind) -> usize {
        self.state.lock().open.values().filter(|k| **k == kind).count()
    }

    pub fn double_closes(&self) -> usize {
        self.state.lock().double_closes
    }

    /// Most request handles ever open at the same time.
    pub fn peak_open_requests(&self) -> usize {
        self.state.lock().peak_requests
    }

    /// Everything written through `write_data`, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write(bytes) => Some(bytes),
                _ => None,
            })
            .flat_map(|bytes| bytes.to_vec())
            .collect()
    }

    pub fn headers_sent(&self) -> String {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::AddHeaders(block) => Some(block),
                _ => None,
            })
            .collect()
    }

    fn allocate(&self, kind: Kind) -> RawHandle {
        let value = self.next.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        state.open.insert(value, kind);
        let requests = state.open.values().filter(|k| **k == Kind::Request).count();
        state.peak_requests = state.peak_requests.max(requests);
        drop(state);
        RawHandle::new(value).expect("handle values start above zero")
    }

    fn kind(&self, handle: RawHandle) -> NativeResult<Kind> {
        self.state
            .lock()
            .open
            .get(&handle.get())
            .copied()
            .ok_or(NativeError::new(NativeApi::SetOption, ERROR_WINHTTP_INCORRECT_HANDLE_TYPE))
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }

    fn sink(&self, request: RawHandle, api: NativeApi) -> NativeResult<EventSink> {
        self.state
            .lock()
            .requests
            .get(&request.get())
            .map(|state| state.sink.clone())
            .ok_or(NativeError::new(api, ERROR_WINHTTP_INCORRECT_HANDLE_TYPE))
    }

    fn status(&self, request: RawHandle) -> u16 {
        let script = self.script.lock();
        let authorized = self
            .state
            .lock()
            .requests
            .get(&request.get())
            .is_some_and(|state| state.authorized);
        if script.challenge.is_some() && !authorized {
            401
        } else {
            script.status
        }
    }

    fn remaining(&self, request: RawHandle) -> usize {
        let body_len = self.script.lock().body.len();
        let offset = self
            .state
            .lock()
            .requests
            .get(&request.get())
            .map_or(body_len, |state| state.offset);
        body_len.saturating_sub(offset)
    }
}

impl NativeTransport for MockTransport {
    fn open_session(&self, params: &SessionParams) -> NativeResult<RawHandle> {
        self.record(Call::OpenSession(params.clone()));
        if let Some(code) = self.script.lock().open_session_error {
            return Err(NativeError::new(NativeApi::Open, code));
        }
        Ok(self.allocate(Kind::Session))
    }

    fn connect(&self, _session: RawHandle, host: &str, port: u16) -> NativeResult<RawHandle> {
        self.record(Call::Connect {
            host: host.to_string(),
            port,
        });
        Ok(self.allocate(Kind::Connection))
    }

    fn open_request(
        &self,
        _connection: RawHandle,
        request: &OpenRequest<'_>,
        sink: EventSink,
    ) -> NativeResult<RawHandle> {
        self.record(Call::OpenRequest {
            method: request.method.to_string(),
            path: request.path.to_string(),
            secure: request.secure,
        });
        let handle = self.allocate(Kind::Request);
        self.state.lock().requests.insert(
            handle.get(),
            RequestState {
                sink,
                offset: 0,
                authorized: false,
            },
        );
        Ok(handle)
    }

    fn set_option(&self, handle: RawHandle, option: &NativeOption) -> NativeResult<()> {
        let kind = self.kind(handle)?;
        self.record(Call::SetOption {
            kind,
            option: option.clone(),
        });
        Ok(())
    }

    fn add_request_headers(&self, _request: RawHandle, headers: &str) -> NativeResult<()> {
        self.record(Call::AddHeaders(headers.to_string()));
        Ok(())
    }

    fn send_request(&self, request: RawHandle, total_length: u32) -> NativeResult<()> {
        self.record(Call::Send { total_length });
        let sink = self.sink(request, NativeApi::SendRequest)?;
        match self.script.lock().send_error {
            Some(code) => sink.emit(CallbackEvent::RequestError(NativeError::new(
                NativeApi::SendRequest,
                code,
            ))),
            None => sink.emit(CallbackEvent::SendRequestComplete),
        }
        Ok(())
    }

    fn write_data(&self, request: RawHandle, data: Bytes) -> NativeResult<()> {
        let accepted = data.len().min(self.script.lock().max_write);
        self.record(Call::Write(data.slice(..accepted)));
        self.sink(request, NativeApi::WriteData)?
            .emit(CallbackEvent::WriteComplete(accepted));
        Ok(())
    }

    fn receive_response(&self, request: RawHandle) -> NativeResult<()> {
        self.record(Call::ReceiveResponse);
        let sink = self.sink(request, NativeApi::ReceiveResponse)?;
        match self.script.lock().headers_delay {
            Some(delay) => {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    sink.emit(CallbackEvent::HeadersAvailable);
                });
            }
            None => sink.emit(CallbackEvent::HeadersAvailable),
        }
        Ok(())
    }

    fn query_status_code(&self, request: RawHandle) -> NativeResult<u16> {
        Ok(self.status(request))
    }

    fn query_raw_headers(&self, request: RawHandle) -> NativeResult<String> {
        let status = self.status(request);
        let script = self.script.lock();
        let mut raw = match status {
            401 => "HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: Negotiate\r\n".to_string(),
            200 => "HTTP/1.1 200 OK\r\n".to_string(),
            other => format!("HTTP/1.1 {other} Scripted\r\n"),
        };
        if status != 401 {
            for line in &script.headers {
                raw.push_str(line);
                raw.push_str("\r\n");
            }
        }
        raw.push_str("\r\n");
        Ok(raw)
    }

    fn query_data_available(&self, request: RawHandle) -> NativeResult<()> {
        let sink = self.sink(request, NativeApi::QueryDataAvailable)?;
        let available = self.remaining(request).min(self.script.lock().max_read);
        sink.emit(CallbackEvent::DataAvailable(
            u32::try_from(available).unwrap_or(u32::MAX),
        ));
        Ok(())
    }

    fn read_data(&self, request: RawHandle, len: usize) -> NativeResult<()> {
        let sink = self.sink(request, NativeApi::ReadData)?;
        let (body, max_read) = {
            let script = self.script.lock();
            (script.body.clone(), script.max_read)
        };
        let chunk = {
            let mut state = self.state.lock();
            let Some(request) = state.requests.get_mut(&request.get()) else {
                return Err(NativeError::new(
                    NativeApi::ReadData,
                    ERROR_WINHTTP_INCORRECT_HANDLE_TYPE,
                ));
            };
            let start = request.offset.min(body.len());
            let end = start + len.min(max_read).min(body.len() - start);
            request.offset = end;
            body.slice(start..end)
        };
        sink.emit(CallbackEvent::ReadComplete(chunk));
        Ok(())
    }

    fn query_auth_schemes(&self, _request: RawHandle) -> NativeResult<AuthChallenge> {
        let supported = self.script.lock().challenge.unwrap_or(AuthScheme::NONE);
        Ok(AuthChallenge {
            supported,
            first: supported.strongest().unwrap_or(AuthScheme::NONE),
            target: AuthTarget::Server,
        })
    }

    fn set_credentials(
        &self,
        request: RawHandle,
        _target: AuthTarget,
        scheme: AuthScheme,
        credential: &NetworkCredential,
    ) -> NativeResult<()> {
        self.record(Call::SetCredentials {
            scheme,
            user: credential.qualified_user_name(),
        });
        if let Some(state) = self.state.lock().requests.get_mut(&request.get()) {
            state.authorized = true;
        }
        Ok(())
    }

    fn close_handle(&self, handle: RawHandle) {
        let sink = {
            let mut state = self.state.lock();
            state.calls.push(Call::Close(handle.get()));
            if state.open.remove(&handle.get()).is_none() {
                state.double_closes += 1;
            }
            state.requests.remove(&handle.get())
        };
        drop(sink);
    }
}

pub fn url(s: &str) -> ::url::Url {
    ::url::Url::parse(s).expect("valid test url")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
