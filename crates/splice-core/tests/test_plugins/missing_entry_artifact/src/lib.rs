//! Exports the init entry point but not the imports one.
use std::ffi::c_void;
use std::os::raw::c_int;

static TABLE: [usize; 1] = [0];

#[no_mangle]
pub unsafe extern "C-unwind" fn __splice_extern_init(
    _dependencies: *const *mut c_void,
    out_instance: *mut *mut c_void,
) -> c_int {
    *out_instance = TABLE.as_ptr() as *mut c_void;
    0
}

// Misnamed on purpose; the loader looks for `__splice_extern_init_imports`
#[no_mangle]
pub unsafe extern "C-unwind" fn __splice_extern_init_import(_imports: *const *mut c_void) -> c_int {
    0
}
