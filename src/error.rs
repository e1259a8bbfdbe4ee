use crate::types::Endpoint;
use std::cell::RefCell;
use std::ffi::{c_char, CString};
use std::time::Duration;

/// Errors that can occur while talking to the glasses.
///
/// Only a few of these ever reach a caller of [`Session::next`](crate::Session::next):
/// frame-level problems (`MalformedFrame`) and single connection drops
/// (`ConnectionLost`) are absorbed by the session and show up only as latency.
#[derive(Debug, thiserror::Error)]
pub enum XrealError {
    #[error("Invalid endpoint address '{0}'")]
    InvalidAddress(String),

    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Reconnect failed after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("No sample received within {0:?}")]
    Timeout(Duration),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Stream ended")]
    StreamEnded,

    #[error("Session closed")]
    SessionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure codes surfaced through the C ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    Ok = 0,
    InvalidArgument = 1,
    ConnectFailed = 2,
    StreamEnded = 3,
    Timeout = 4,
    SessionClosed = 5,
    Internal = 6,
}

impl XrealError {
    /// Map the error to the terminal failure code a caller observes.
    pub fn code(&self) -> FailureCode {
        match self {
            XrealError::InvalidAddress(_) => FailureCode::InvalidArgument,
            XrealError::Connect { .. } => FailureCode::ConnectFailed,
            XrealError::ConnectionLost(_)
            | XrealError::ReconnectExhausted { .. }
            | XrealError::StreamEnded => FailureCode::StreamEnded,
            XrealError::Timeout(_) => FailureCode::Timeout,
            XrealError::SessionClosed => FailureCode::SessionClosed,
            XrealError::MalformedFrame(_) | XrealError::Io(_) => FailureCode::Internal,
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        XrealError::MalformedFrame(reason.into())
    }
}

/// Last-error storage for the C FFI layer.
///
/// Held per thread, so a message read through [`LastError::as_ptr`] stays
/// valid until the same thread records another error.
pub(crate) struct LastError {
    message: RefCell<Option<CString>>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: RefCell::new(None),
        }
    }

    pub fn set(&self, err: &XrealError) {
        let text = err.to_string().replace('\0', " ");
        *self.message.borrow_mut() = Some(CString::new(text).unwrap_or_default());
    }

    pub fn clear(&self) {
        *self.message.borrow_mut() = None;
    }

    pub fn as_ptr(&self) -> *const c_char {
        match self.message.borrow().as_ref() {
            Some(msg) => msg.as_ptr(),
            None => std::ptr::null(),
        }
    }
}
