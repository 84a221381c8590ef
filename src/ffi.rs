//! FFI bindings for Behavior Mapper
//!
//! This module provides C-compatible functions for calling the mapper from other languages.
//! All functions use C strings (null-terminated) and return allocated memory that
//! must be freed by the caller using `bmap_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::MapperConfig;
use crate::error::MapperError;
use crate::pipeline::{map_behavior, BehaviorMapper};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Parse an optional TOML config; NULL selects the defaults
unsafe fn config_from_ptr(config_toml: *const c_char) -> Result<MapperConfig, MapperError> {
    if config_toml.is_null() {
        return Ok(MapperConfig::default());
    }
    match cstr_to_string(config_toml) {
        Some(toml) => MapperConfig::from_toml_str(&toml),
        None => Err(MapperError::Configuration(
            "config is not valid UTF-8".to_string(),
        )),
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Map a JSON array of activity records to a cluster report JSON.
///
/// # Safety
/// - `records_json` must be a valid null-terminated C string.
/// - `config_toml` must be a valid null-terminated C string, or NULL for defaults.
/// - Returns a newly allocated string that must be freed with `bmap_free_string`.
/// - Returns NULL on error; call `bmap_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn bmap_map_json(
    records_json: *const c_char,
    config_toml: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(records_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid records JSON string pointer");
            return ptr::null_mut();
        }
    };

    let config = match config_from_ptr(config_toml) {
        Ok(c) => c,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match map_behavior(&json_str, &config) {
        Ok(report) => string_to_cstr(&report),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateful Mapper API
// ============================================================================

/// Opaque handle to a BehaviorMapper
pub struct BehaviorMapperHandle {
    mapper: BehaviorMapper,
}

/// Create a new BehaviorMapper from a TOML config.
///
/// # Safety
/// - `config_toml` must be a valid null-terminated C string, or NULL for defaults.
/// - Returns a pointer to a newly allocated BehaviorMapper.
/// - Must be freed with `bmap_mapper_free`.
/// - Returns NULL on error; call `bmap_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn bmap_mapper_new(config_toml: *const c_char) -> *mut BehaviorMapperHandle {
    clear_last_error();

    let mapper = match config_from_ptr(config_toml).and_then(BehaviorMapper::with_config) {
        Ok(m) => m,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    Box::into_raw(Box::new(BehaviorMapperHandle { mapper }))
}

/// Free a BehaviorMapper.
///
/// # Safety
/// - `mapper` must be a valid pointer returned by `bmap_mapper_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn bmap_mapper_free(mapper: *mut BehaviorMapperHandle) {
    if !mapper.is_null() {
        drop(Box::from_raw(mapper));
    }
}

/// Map records with a configured mapper. Reports share the mapper's instance ID.
///
/// # Safety
/// - `mapper` must be a valid pointer returned by `bmap_mapper_new`.
/// - `records_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `bmap_free_string`.
/// - Returns NULL on error; call `bmap_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn bmap_mapper_map_json(
    mapper: *const BehaviorMapperHandle,
    records_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if mapper.is_null() {
        set_last_error("Null mapper pointer");
        return ptr::null_mut();
    }

    let handle = &*mapper;

    let json_str = match cstr_to_string(records_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid records JSON string pointer");
            return ptr::null_mut();
        }
    };

    match handle.mapper.map_json(&json_str) {
        Ok(report) => string_to_cstr(&report),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by mapper functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a `bmap_` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn bmap_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next `bmap_` function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn bmap_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn bmap_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
