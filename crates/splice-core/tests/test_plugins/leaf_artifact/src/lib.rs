//! Minimal artifact exposing both entry points and a one-slot function table.
use std::ffi::c_void;
use std::os::raw::c_int;
use std::sync::atomic::{AtomicUsize, Ordering};

static STARTS: AtomicUsize = AtomicUsize::new(0);

extern "C-unwind" fn start() {
    STARTS.fetch_add(1, Ordering::SeqCst);
}

static TABLE: [extern "C-unwind" fn(); 1] = [start];

#[no_mangle]
pub unsafe extern "C-unwind" fn __splice_extern_init(
    _dependencies: *const *mut c_void,
    out_instance: *mut *mut c_void,
) -> c_int {
    *out_instance = TABLE.as_ptr() as *mut c_void;
    0
}

#[no_mangle]
pub unsafe extern "C-unwind" fn __splice_extern_init_imports(_imports: *const *mut c_void) -> c_int {
    0
}
