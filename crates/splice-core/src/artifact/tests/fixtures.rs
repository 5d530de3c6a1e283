#![cfg(test)]
//! Statically linked artifacts for loader, worker and daemon tests.
//!
//! Every fixture keeps its instance data in a `static` function table, so the
//! instance handle it hands out is simply the table address. Call counters are
//! thread-local because each loader test drives its loader on one thread.

use crate::artifact::native::{ExportedFn, StaticModule, StaticModuleOpener};
use std::cell::Cell;
use std::ffi::c_void;
use std::os::raw::c_int;
use std::path::PathBuf;

pub const LEAF: &str = "/static/leaf.so";
pub const MID: &str = "/static/mid.so";
pub const PEER_A: &str = "/static/peer_a.so";
pub const PEER_B: &str = "/static/peer_b.so";
pub const FAILING: &str = "/static/failing.so";
pub const PANICKING: &str = "/static/panicking.so";
pub const NULL_HANDLE: &str = "/static/null_handle.so";

thread_local! {
    pub static INIT_CALLS: Cell<usize> = const { Cell::new(0) };
    pub static IMPORT_CALLS: Cell<usize> = const { Cell::new(0) };
    pub static START_CALLS: Cell<usize> = const { Cell::new(0) };
}

pub fn path(p: &str) -> PathBuf {
    PathBuf::from(p)
}

pub fn count(counter: &'static std::thread::LocalKey<Cell<usize>>) -> usize {
    counter.with(Cell::get)
}

fn bump(counter: &'static std::thread::LocalKey<Cell<usize>>) {
    counter.with(|c| c.set(c.get() + 1));
}

unsafe extern "C-unwind" fn leaf_start() {
    bump(&START_CALLS);
}

unsafe extern "C-unwind" fn leaf_panic() {
    panic!("start exploded");
}

unsafe extern "C-unwind" fn noop() {}

static LEAF_TABLE: [ExportedFn; 2] = [leaf_start, leaf_panic];
static MID_TABLE: [ExportedFn; 1] = [noop];
static PEER_A_TABLE: [ExportedFn; 1] = [noop];
static PEER_B_TABLE: [ExportedFn; 1] = [noop];

fn table_handle(table: &'static [ExportedFn]) -> *mut c_void {
    table.as_ptr() as *mut c_void
}

unsafe fn handle_at(handles: *const *mut c_void, index: usize) -> *mut c_void {
    unsafe { *handles.add(index) }
}

unsafe extern "C-unwind" fn leaf_init(_deps: *const *mut c_void, out: *mut *mut c_void) -> c_int {
    bump(&INIT_CALLS);
    unsafe { *out = table_handle(&LEAF_TABLE) };
    0
}

/// Refuses to initialise unless handed the leaf's handle first
unsafe extern "C-unwind" fn mid_init(deps: *const *mut c_void, out: *mut *mut c_void) -> c_int {
    bump(&INIT_CALLS);
    if unsafe { handle_at(deps, 0) } != table_handle(&LEAF_TABLE) {
        return 3;
    }
    unsafe { *out = table_handle(&MID_TABLE) };
    0
}

unsafe extern "C-unwind" fn peer_a_init(_deps: *const *mut c_void, out: *mut *mut c_void) -> c_int {
    unsafe { *out = table_handle(&PEER_A_TABLE) };
    0
}

unsafe extern "C-unwind" fn peer_b_init(_deps: *const *mut c_void, out: *mut *mut c_void) -> c_int {
    unsafe { *out = table_handle(&PEER_B_TABLE) };
    0
}

unsafe extern "C-unwind" fn failing_init(_deps: *const *mut c_void, _out: *mut *mut c_void) -> c_int {
    5
}

unsafe extern "C-unwind" fn panicking_init(_deps: *const *mut c_void, _out: *mut *mut c_void) -> c_int {
    panic!("init exploded");
}

unsafe extern "C-unwind" fn null_init(_deps: *const *mut c_void, _out: *mut *mut c_void) -> c_int {
    0
}

unsafe extern "C-unwind" fn count_imports(_imports: *const *mut c_void) -> c_int {
    bump(&IMPORT_CALLS);
    0
}

unsafe extern "C-unwind" fn peer_a_imports(imports: *const *mut c_void) -> c_int {
    if unsafe { handle_at(imports, 0) } == table_handle(&PEER_B_TABLE) { 0 } else { 4 }
}

unsafe extern "C-unwind" fn peer_b_imports(imports: *const *mut c_void) -> c_int {
    if unsafe { handle_at(imports, 0) } == table_handle(&PEER_A_TABLE) { 0 } else { 4 }
}

fn module(init: crate::artifact::native::InitEntryPoint) -> StaticModule {
    StaticModule {
        init,
        init_imports: count_imports,
    }
}

/// Opener serving every fixture above
pub fn opener() -> StaticModuleOpener {
    StaticModuleOpener::new()
        .with_module(LEAF, module(leaf_init))
        .with_module(MID, module(mid_init))
        .with_module(
            PEER_A,
            StaticModule {
                init: peer_a_init,
                init_imports: peer_a_imports,
            },
        )
        .with_module(
            PEER_B,
            StaticModule {
                init: peer_b_init,
                init_imports: peer_b_imports,
            },
        )
        .with_module(FAILING, module(failing_init))
        .with_module(PANICKING, module(panicking_init))
        .with_module(NULL_HANDLE, module(null_init))
}
