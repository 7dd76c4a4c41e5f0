//! [`NativeTransport`] backed by WinHTTP in asynchronous mode.

use crate::callback::{CallbackEvent, EventSink};
use crate::config::NetworkCredential;
use crate::error::{NativeApi, NativeError};
use crate::native::{
    AuthChallenge, NativeResult, NativeTransport, OpenRequest, RawHandle, SessionParams,
};
use crate::options::NativeOption;
use crate::types::{
    AuthScheme, AuthTarget, ERROR_WINHTTP_INCORRECT_HANDLE_TYPE, WINHTTP_AUTH_TARGET_PROXY,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::c_void;
use windows::Win32::Networking::WinHttp::*;
use windows::Win32::Security::Cryptography::{
    CertCreateCertificateContext, CertFreeCertificateContext, CERT_CONTEXT, PKCS_7_ASN_ENCODING,
    X509_ASN_ENCODING,
};
use windows::core::{Error, HSTRING, PCWSTR, PWSTR};

/// Per-request state reachable from the status callback.
///
/// Boxed and leaked when the request opens; reclaimed by the callback on
/// `HANDLE_CLOSING`, which WinHTTP delivers exactly once per handle.
struct RequestState {
    sink: EventSink,
    read_buffer: Mutex<Vec<u8>>,
    /// Kept alive until the matching `WRITE_COMPLETE`.
    write_buffer: Mutex<Option<Bytes>>,
}

/// WinHTTP transport. Request handles carry their callback state; the
/// transport only tracks where that state lives.
#[derive(Debug, Default)]
pub struct WinHttpTransport {
    requests: Mutex<HashMap<usize, usize>>,
}

impl WinHttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self, request: RawHandle) -> Option<&RequestState> {
        let ptr = *self.requests.lock().get(&request.get())?;
        // SAFETY: the state is freed only after the handle closes, and the
        // handler never uses a handle after closing it.
        unsafe { (ptr as *const RequestState).as_ref() }
    }
}

fn as_ptr(handle: RawHandle) -> *mut c_void {
    handle.get() as *mut c_void
}

/// Recovers the Win32 error code from a `windows` error.
fn native_error(api: NativeApi, err: Error) -> NativeError {
    let hr = err.code().0 as u32;
    let code = if hr & 0xFFFF_0000 == 0x8007_0000 {
        hr & 0xFFFF
    } else {
        hr
    };
    NativeError::new(api, code)
}

fn handle_or_error(api: NativeApi, raw: *mut c_void) -> NativeResult<RawHandle> {
    RawHandle::new(raw as usize).ok_or_else(|| native_error(api, Error::from_thread()))
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn api_from_async_result(id: usize) -> NativeApi {
    match id {
        1 => NativeApi::ReceiveResponse,
        2 => NativeApi::QueryDataAvailable,
        3 => NativeApi::ReadData,
        4 => NativeApi::WriteData,
        _ => NativeApi::SendRequest,
    }
}

/// # Safety
///
/// Called by WinHTTP on its own thread pool. `context` is the pointer to a
/// leaked [`RequestState`] installed as the request's context value.
unsafe extern "system" fn status_callback(
    _hinternet: *mut c_void,
    context: usize,
    status: u32,
    status_info: *mut c_void,
    status_info_length: u32,
) {
    if context == 0 {
        return;
    }
    if status == WINHTTP_CALLBACK_STATUS_HANDLE_CLOSING {
        drop(unsafe { Box::from_raw(context as *mut RequestState) });
        return;
    }
    let state = unsafe { &*(context as *const RequestState) };

    let event = match status {
        WINHTTP_CALLBACK_STATUS_SENDREQUEST_COMPLETE => Some(CallbackEvent::SendRequestComplete),
        WINHTTP_CALLBACK_STATUS_HEADERS_AVAILABLE => Some(CallbackEvent::HeadersAvailable),
        WINHTTP_CALLBACK_STATUS_DATA_AVAILABLE if !status_info.is_null() => {
            let bytes = unsafe { *(status_info as *const u32) };
            Some(CallbackEvent::DataAvailable(bytes))
        }
        WINHTTP_CALLBACK_STATUS_READ_COMPLETE => {
            let data = if status_info.is_null() || status_info_length == 0 {
                Bytes::new()
            } else {
                Bytes::copy_from_slice(unsafe {
                    std::slice::from_raw_parts(
                        status_info as *const u8,
                        status_info_length as usize,
                    )
                })
            };
            Some(CallbackEvent::ReadComplete(data))
        }
        WINHTTP_CALLBACK_STATUS_WRITE_COMPLETE if !status_info.is_null() => {
            let written = unsafe { *(status_info as *const u32) };
            state.write_buffer.lock().take();
            Some(CallbackEvent::WriteComplete(written as usize))
        }
        WINHTTP_CALLBACK_STATUS_REQUEST_ERROR if !status_info.is_null() => {
            let result = unsafe { &*(status_info as *const WINHTTP_ASYNC_RESULT) };
            Some(CallbackEvent::RequestError(NativeError::new(
                api_from_async_result(result.dwResult),
                result.dwError,
            )))
        }
        _ => None,
    };

    if let Some(event) = event {
        state.sink.emit(event);
    }
}

impl NativeTransport for WinHttpTransport {
    fn open_session(&self, params: &SessionParams) -> NativeResult<RawHandle> {
        let agent = HSTRING::from(&params.user_agent);
        let proxy = params.proxy.as_deref().map(HSTRING::from);
        let bypass = params.proxy_bypass.as_deref().map(HSTRING::from);
        let pcwstr = |s: &Option<HSTRING>| {
            s.as_ref()
                .map(|h| PCWSTR(h.as_ptr()))
                .unwrap_or(PCWSTR::null())
        };

        let raw = unsafe {
            WinHttpOpen(
                &agent,
                WINHTTP_ACCESS_TYPE(params.access_type.into()),
                pcwstr(&proxy),
                pcwstr(&bypass),
                WINHTTP_FLAG_ASYNC,
            )
        };
        handle_or_error(NativeApi::Open, raw)
    }

    fn connect(&self, session: RawHandle, host: &str, port: u16) -> NativeResult<RawHandle> {
        let host = HSTRING::from(host);
        let raw = unsafe { WinHttpConnect(as_ptr(session), &host, port, 0) };
        handle_or_error(NativeApi::Connect, raw)
    }

    fn open_request(
        &self,
        connection: RawHandle,
        request: &OpenRequest<'_>,
        sink: EventSink,
    ) -> NativeResult<RawHandle> {
        let method = HSTRING::from(request.method);
        let path = HSTRING::from(request.path);
        let flags = if request.secure {
            WINHTTP_FLAG_SECURE
        } else {
            WINHTTP_OPEN_REQUEST_FLAGS(0)
        };

        let raw = unsafe {
            WinHttpOpenRequest(
                as_ptr(connection),
                &method,
                &path,
                PCWSTR::null(),
                PCWSTR::null(),
                std::ptr::null(),
                flags,
            )
        };
        let handle = handle_or_error(NativeApi::OpenRequest, raw)?;

        let state = Box::into_raw(Box::new(RequestState {
            sink,
            read_buffer: Mutex::new(Vec::new()),
            write_buffer: Mutex::new(None),
        }));
        let context = state as usize;

        unsafe {
            WinHttpSetStatusCallback(
                raw,
                Some(status_callback),
                WINHTTP_CALLBACK_FLAG_ALL_NOTIFICATIONS,
                0,
            )
        };
        // Without the context value the callback sees 0 and drops every event.
        let installed = unsafe {
            WinHttpSetOption(
                Some(raw),
                WINHTTP_OPTION_CONTEXT_VALUE,
                Some(&context.to_ne_bytes()),
            )
        };
        if let Err(err) = installed {
            unsafe {
                let _ = WinHttpCloseHandle(raw);
                drop(Box::from_raw(state));
            }
            return Err(native_error(NativeApi::SetOption, err));
        }

        self.requests.lock().insert(handle.get(), context);
        Ok(handle)
    }

    fn set_option(&self, handle: RawHandle, option: &NativeOption) -> NativeResult<()> {
        let raw = Some(as_ptr(handle));
        let id = option.id();
        let fail = |err| native_error(NativeApi::SetOption, err);

        if let Some(value) = option.as_u32() {
            return unsafe { WinHttpSetOption(raw, id, Some(&value.to_ne_bytes())) }.map_err(fail);
        }

        match option {
            NativeOption::TcpKeepAlive {
                on,
                time_ms,
                interval_ms,
            } => {
                let mut buffer = Vec::with_capacity(12);
                buffer.extend_from_slice(&u32::from(*on).to_ne_bytes());
                buffer.extend_from_slice(&time_ms.to_ne_bytes());
                buffer.extend_from_slice(&interval_ms.to_ne_bytes());
                unsafe { WinHttpSetOption(raw, id, Some(&buffer)) }.map_err(fail)
            }
            NativeOption::ClientCertificate(None) => {
                unsafe { WinHttpSetOption(raw, id, None) }.map_err(fail)
            }
            NativeOption::ClientCertificate(Some(cert)) => {
                let context = unsafe {
                    CertCreateCertificateContext(
                        X509_ASN_ENCODING | PKCS_7_ASN_ENCODING,
                        cert.der(),
                    )
                };
                if context.is_null() {
                    return Err(fail(Error::from_thread()));
                }
                // WinHTTP duplicates the context, so ours is freed right away.
                let bytes = unsafe {
                    std::slice::from_raw_parts(
                        context as *const u8,
                        std::mem::size_of::<CERT_CONTEXT>(),
                    )
                };
                let result = unsafe { WinHttpSetOption(raw, id, Some(bytes)) };
                unsafe {
                    let _ = CertFreeCertificateContext(Some(context));
                }
                result.map_err(fail)
            }
            NativeOption::Proxy {
                access_type,
                proxy,
                bypass,
            } => {
                let mut proxy = proxy.as_deref().map(wide);
                let mut bypass = bypass.as_deref().map(wide);
                let pwstr = |s: &mut Option<Vec<u16>>| {
                    s.as_mut()
                        .map(|w| PWSTR(w.as_mut_ptr()))
                        .unwrap_or(PWSTR::null())
                };
                let info = WINHTTP_PROXY_INFO {
                    dwAccessType: WINHTTP_ACCESS_TYPE((*access_type).into()),
                    lpszProxy: pwstr(&mut proxy),
                    lpszProxyBypass: pwstr(&mut bypass),
                };
                let bytes = unsafe {
                    std::slice::from_raw_parts(
                        &info as *const WINHTTP_PROXY_INFO as *const u8,
                        std::mem::size_of::<WINHTTP_PROXY_INFO>(),
                    )
                };
                unsafe { WinHttpSetOption(raw, id, Some(bytes)) }.map_err(fail)
            }
            NativeOption::ProxyUsername(value) | NativeOption::ProxyPassword(value) => {
                let value = wide(value);
                // String options take their length in characters, not bytes.
                let chars = unsafe {
                    std::slice::from_raw_parts(value.as_ptr() as *const u8, value.len() - 1)
                };
                unsafe { WinHttpSetOption(raw, id, Some(chars)) }.map_err(fail)
            }
            _ => Ok(()),
        }
    }

    fn add_request_headers(&self, request: RawHandle, headers: &str) -> NativeResult<()> {
        let header: Vec<u16> = headers.encode_utf16().collect();
        unsafe {
            WinHttpAddRequestHeaders(
                as_ptr(request),
                &header,
                WINHTTP_ADDREQ_FLAG_ADD | WINHTTP_ADDREQ_FLAG_REPLACE,
            )
        }
        .map_err(|err| native_error(NativeApi::AddRequestHeaders, err))
    }

    fn send_request(&self, request: RawHandle, total_length: u32) -> NativeResult<()> {
        let context = self.requests.lock().get(&request.get()).copied().unwrap_or(0);
        unsafe { WinHttpSendRequest(as_ptr(request), None, None, 0, total_length, context) }
            .map_err(|err| native_error(NativeApi::SendRequest, err))
    }

    fn write_data(&self, request: RawHandle, data: Bytes) -> NativeResult<()> {
        let state = self.state(request).ok_or(NativeError::new(
            NativeApi::WriteData,
            ERROR_WINHTTP_INCORRECT_HANDLE_TYPE,
        ))?;
        let ptr = data.as_ptr();
        let len = data.len() as u32;
        *state.write_buffer.lock() = Some(data);
        unsafe {
            WinHttpWriteData(
                as_ptr(request),
                Some(ptr as *const c_void),
                len,
                std::ptr::null_mut(),
            )
        }
        .map_err(|err| native_error(NativeApi::WriteData, err))
    }

    fn receive_response(&self, request: RawHandle) -> NativeResult<()> {
        unsafe { WinHttpReceiveResponse(as_ptr(request), std::ptr::null_mut()) }
            .map_err(|err| native_error(NativeApi::ReceiveResponse, err))
    }

    fn query_status_code(&self, request: RawHandle) -> NativeResult<u16> {
        let mut code = 0u32;
        let mut size = std::mem::size_of::<u32>() as u32;
        unsafe {
            WinHttpQueryHeaders(
                as_ptr(request),
                WINHTTP_QUERY_STATUS_CODE | WINHTTP_QUERY_FLAG_NUMBER,
                PCWSTR::null(),
                Some(&mut code as *mut u32 as *mut _),
                &mut size,
                std::ptr::null_mut(),
            )
        }
        .map_err(|err| native_error(NativeApi::QueryHeaders, err))?;
        Ok(code as u16)
    }

    fn query_raw_headers(&self, request: RawHandle) -> NativeResult<String> {
        let mut buffer_len = 0u32;
        let _ = unsafe {
            WinHttpQueryHeaders(
                as_ptr(request),
                WINHTTP_QUERY_RAW_HEADERS_CRLF,
                PCWSTR::null(),
                None,
                &mut buffer_len,
                std::ptr::null_mut(),
            )
        };
        if buffer_len == 0 {
            return Ok(String::new());
        }

        let mut buffer = vec![0u16; (buffer_len / 2) as usize + 1];
        unsafe {
            WinHttpQueryHeaders(
                as_ptr(request),
                WINHTTP_QUERY_RAW_HEADERS_CRLF,
                PCWSTR::null(),
                Some(buffer.as_mut_ptr() as *mut _),
                &mut buffer_len,
                std::ptr::null_mut(),
            )
        }
        .map_err(|err| native_error(NativeApi::QueryHeaders, err))?;
        Ok(String::from_utf16_lossy(&buffer[..(buffer_len / 2) as usize]))
    }

    fn query_data_available(&self, request: RawHandle) -> NativeResult<()> {
        unsafe { WinHttpQueryDataAvailable(as_ptr(request), std::ptr::null_mut()) }
            .map_err(|err| native_error(NativeApi::QueryDataAvailable, err))
    }

    fn read_data(&self, request: RawHandle, len: usize) -> NativeResult<()> {
        let state = self.state(request).ok_or(NativeError::new(
            NativeApi::ReadData,
            ERROR_WINHTTP_INCORRECT_HANDLE_TYPE,
        ))?;
        let ptr = {
            let mut buffer = state.read_buffer.lock();
            if buffer.len() < len {
                buffer.resize(len, 0);
            }
            buffer.as_mut_ptr()
        };
        unsafe {
            WinHttpReadData(
                as_ptr(request),
                ptr as *mut c_void,
                len as u32,
                std::ptr::null_mut(),
            )
        }
        .map_err(|err| native_error(NativeApi::ReadData, err))
    }

    fn query_auth_schemes(&self, request: RawHandle) -> NativeResult<AuthChallenge> {
        let mut supported = 0u32;
        let mut first = 0u32;
        let mut target = 0u32;
        unsafe {
            WinHttpQueryAuthSchemes(as_ptr(request), &mut supported, &mut first, &mut target)
        }
        .map_err(|err| native_error(NativeApi::QueryAuthSchemes, err))?;
        Ok(AuthChallenge {
            supported: AuthScheme::from(supported),
            first: AuthScheme::from(first),
            target: if target == WINHTTP_AUTH_TARGET_PROXY {
                AuthTarget::Proxy
            } else {
                AuthTarget::Server
            },
        })
    }

    fn set_credentials(
        &self,
        request: RawHandle,
        target: AuthTarget,
        scheme: AuthScheme,
        credential: &NetworkCredential,
    ) -> NativeResult<()> {
        let user = HSTRING::from(credential.qualified_user_name());
        let password = HSTRING::from(&credential.password);
        unsafe {
            WinHttpSetCredentials(
                as_ptr(request),
                target as u32,
                scheme.bits(),
                &user,
                &password,
                std::ptr::null_mut(),
            )
        }
        .map_err(|err| native_error(NativeApi::SetCredentials, err))
    }

    fn close_handle(&self, handle: RawHandle) {
        self.requests.lock().remove(&handle.get());
        unsafe {
            // Ignore errors in Drop paths - cleanup must not panic
            let _ = WinHttpCloseHandle(as_ptr(handle));
        }
    }
}
