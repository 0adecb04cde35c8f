//! Ownership transfer across the boundary
//!
//! Strings and arrays that change hands are allocated with the C allocator so
//! that the receiving side can free them no matter which Rust global allocator
//! either side was built with. Every function here documents which side owns the
//! result.

use crate::error::AbiError;
use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

/// Build a `CString`, rejecting interior NUL bytes.
pub fn to_c_string(value: &str) -> Result<CString, AbiError> {
    CString::new(value).map_err(|e| AbiError::InteriorNul(e.nul_position()))
}

/// Build a `CString`, replacing interior NUL bytes with spaces.
///
/// Used for diagnostics, where losing a message is worse than altering it.
pub fn to_c_string_lossy(value: &str) -> CString {
    match CString::new(value) {
        Ok(s) => s,
        Err(_) => {
            let cleaned: Vec<u8> = value
                .bytes()
                .map(|b| if b == 0 { b' ' } else { b })
                .collect();
            // SAFETY: every NUL byte was replaced above
            unsafe { CString::from_vec_unchecked(cleaned) }
        }
    }
}

/// Copy `value` into a C-allocated, NUL-terminated buffer.
///
/// The receiver owns the result and releases it with [`free_c_string`].
/// Interior NUL bytes are replaced. Returns null only when allocation fails.
pub fn into_owned_c_string(value: &str) -> *mut c_char {
    let bytes = to_c_string_lossy(value);
    let bytes = bytes.as_bytes_with_nul();
    // SAFETY: the buffer is sized for `bytes` and written before it is returned
    unsafe {
        let buffer = libc::malloc(bytes.len()) as *mut u8;
        if buffer.is_null() {
            return ptr::null_mut();
        }
        ptr::copy_nonoverlapping(bytes.as_ptr(), buffer, bytes.len());
        buffer as *mut c_char
    }
}

/// Take ownership of a C-allocated string, copy it into Rust and free it.
///
/// Returns `None` for null.
///
/// # Safety
///
/// `value` must be null or a NUL-terminated buffer obtained from `libc::malloc`
/// that nobody else frees.
pub unsafe fn take_owned_c_string(value: *mut c_char) -> Option<String> {
    if value.is_null() {
        return None;
    }
    let copied = CStr::from_ptr(value).to_string_lossy().into_owned();
    libc::free(value as *mut libc::c_void);
    Some(copied)
}

/// Release a string produced by [`into_owned_c_string`]. Null is ignored.
///
/// # Safety
///
/// `value` must be null or come from the C allocator and not be freed twice.
pub unsafe fn free_c_string(value: *mut c_char) {
    if !value.is_null() {
        libc::free(value as *mut libc::c_void);
    }
}

/// Borrow a NUL-terminated string the caller keeps ownership of.
///
/// # Safety
///
/// `value` must be null or point at a NUL-terminated buffer that outlives `'a`.
pub unsafe fn borrow_c_str<'a>(value: *const c_char) -> Option<Cow<'a, str>> {
    if value.is_null() {
        None
    } else {
        Some(CStr::from_ptr(value).to_string_lossy())
    }
}

/// Copy `values` into a C-allocated, null-terminated array of C-allocated strings.
///
/// Release with [`take_owned_c_string_array`].
pub fn into_owned_c_string_array<S: AsRef<str>>(values: &[S]) -> Result<*mut *mut c_char, AbiError> {
    let slots = values.len() + 1;
    let size = slots * std::mem::size_of::<*mut c_char>();
    // SAFETY: the array has `slots` entries, each written before it is returned
    unsafe {
        let array = libc::malloc(size) as *mut *mut c_char;
        if array.is_null() {
            return Err(AbiError::AllocationFailed(size));
        }
        for (i, value) in values.iter().enumerate() {
            let entry = into_owned_c_string(value.as_ref());
            if entry.is_null() {
                for j in 0..i {
                    free_c_string(*array.add(j));
                }
                libc::free(array as *mut libc::c_void);
                return Err(AbiError::AllocationFailed(value.as_ref().len() + 1));
            }
            *array.add(i) = entry;
        }
        *array.add(values.len()) = ptr::null_mut();
        Ok(array)
    }
}

/// Take ownership of a null-terminated array of C-allocated strings.
///
/// Returns an empty vector for null.
///
/// # Safety
///
/// `array` must be null or built the way [`into_owned_c_string_array`] builds it.
pub unsafe fn take_owned_c_string_array(array: *mut *mut c_char) -> Vec<String> {
    let mut values = Vec::new();
    if array.is_null() {
        return values;
    }
    let mut cursor = array;
    while !(*cursor).is_null() {
        if let Some(value) = take_owned_c_string(*cursor) {
            values.push(value);
        }
        cursor = cursor.add(1);
    }
    libc::free(array as *mut libc::c_void);
    values
}

/// Write a freshly allocated copy of `value` into an out-parameter slot.
///
/// # Safety
///
/// `slot` must be null or valid for a pointer-sized write.
pub unsafe fn set_out_string(slot: *mut *mut c_char, value: &str) {
    if !slot.is_null() {
        *slot = into_owned_c_string(value);
    }
}
