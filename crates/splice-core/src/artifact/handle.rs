use std::ffi::c_void;
use std::fmt;

/// Instance handle returned by an artifact's init entry point.
///
/// The [`ArtifactLoader`](super::ArtifactLoader) is the only owner. The handle is
/// not `Clone`; entry points receive its raw value by copy inside a handle array.
#[repr(transparent)]
pub struct OpaqueHandle(*mut c_void);

// The pointee is owned by the native artifact and only touched through its own entry points
unsafe impl Send for OpaqueHandle {}

impl OpaqueHandle {
    /// Wraps a non-null pointer produced by native code
    pub(crate) fn from_raw(ptr: *mut c_void) -> Option<Self> {
        if ptr.is_null() { None } else { Some(Self(ptr)) }
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0
    }
}

impl fmt::Debug for OpaqueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpaqueHandle({:p})", self.0)
    }
}
