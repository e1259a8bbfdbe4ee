//! C FFI layer.
//!
//! Provides an opaque handle-based API for C/C++ consumers. The generated C
//! header is written to `include/xreal_one_driver.h` by cbindgen.

use crate::error::{FailureCode, LastError};
use crate::session::Session;
use crate::types::SensorSample;
use crate::XrealError;
use std::ffi::{c_char, c_int, CStr};

thread_local! {
    /// Last error message for C consumers, per calling thread.
    static LAST_ERROR: LastError = const { LastError::new() };
}

fn set_last_error(err: &XrealError) {
    LAST_ERROR.with(|last| last.set(err));
}

/// Opaque session handle for C consumers.
pub struct XrealOneHandle(Session);

/// IMU sample in C-compatible layout.
///
/// Kept apart from [`SensorSample`] so the header's `XOImu` name and layout
/// stay fixed when the Rust type changes.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct XOImu {
    /// Angular velocity [x, y, z] in rad/s.
    pub gyro: [f32; 3],
    /// Linear acceleration [x, y, z] in m/s².
    pub accel: [f32; 3],
    /// Device clock in microseconds.
    pub timestamp: u64,
}

impl From<SensorSample> for XOImu {
    fn from(sample: SensorSample) -> Self {
        XOImu {
            gyro: sample.gyro,
            accel: sample.accel,
            timestamp: sample.timestamp,
        }
    }
}

fn into_handle(result: crate::Result<Session>) -> *mut XrealOneHandle {
    match result {
        Ok(session) => {
            LAST_ERROR.with(LastError::clear);
            Box::into_raw(Box::new(XrealOneHandle(session)))
        }
        Err(e) => {
            set_last_error(&e);
            std::ptr::null_mut()
        }
    }
}

/// Connect to the glasses at their default address.
/// Returns NULL on failure (check xo_last_error()).
#[no_mangle]
pub extern "C" fn xo_new() -> *mut XrealOneHandle {
    into_handle(Session::open())
}

/// Connect to the glasses at `addr`, a null-terminated string such as
/// "169.254.2.1:52998". Returns NULL on failure.
///
/// # Safety
/// `addr` must be a valid null-terminated string, or null.
#[no_mangle]
pub unsafe extern "C" fn xo_new_with_addr(addr: *const c_char) -> *mut XrealOneHandle {
    if addr.is_null() {
        set_last_error(&XrealError::InvalidAddress("(null)".into()));
        return std::ptr::null_mut();
    }
    let addr = match CStr::from_ptr(addr).to_str() {
        Ok(s) => s,
        Err(_) => {
            set_last_error(&XrealError::InvalidAddress("(non-UTF-8)".into()));
            return std::ptr::null_mut();
        }
    };
    into_handle(Session::open_addr(addr))
}

/// Receive the next IMU sample into `out`.
/// Returns 0 on success or a non-zero `FailureCode`.
///
/// # Safety
/// `handle` must be a pointer returned by `xo_new*` and `out` a valid
/// `XOImu` pointer; either may be null.
#[no_mangle]
pub unsafe extern "C" fn xo_next(handle: *mut XrealOneHandle, out: *mut XOImu) -> c_int {
    if handle.is_null() || out.is_null() {
        return FailureCode::InvalidArgument as c_int;
    }
    let handle = &mut *handle;

    match handle.0.next() {
        Ok(sample) => {
            out.write(XOImu::from(sample));
            FailureCode::Ok as c_int
        }
        Err(e) => {
            set_last_error(&e);
            e.code() as c_int
        }
    }
}

/// Number of frames dropped so far (checksum failures, bad headers and
/// non-IMU messages).
///
/// # Safety
/// `handle` must be a valid handle pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn xo_dropped_frames(handle: *const XrealOneHandle) -> u64 {
    if handle.is_null() {
        return 0;
    }
    let stats = (*handle).0.stats();
    stats.decoder.checksum_failures + stats.decoder.invalid_headers + stats.malformed_frames
}

/// Close the session and free the handle. Safe to call with NULL.
///
/// # Safety
/// `handle` must be a pointer returned by `xo_new*` that has not been freed,
/// or null.
#[no_mangle]
pub unsafe extern "C" fn xo_free(handle: *mut XrealOneHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Get the last error message recorded on the calling thread. Returns NULL
/// if no error. The pointer is valid until the next driver call on the same
/// thread and must not be handed to other threads.
#[no_mangle]
pub extern "C" fn xo_last_error() -> *const c_char {
    LAST_ERROR.with(LastError::as_ptr)
}
