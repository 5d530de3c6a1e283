use std::collections::HashMap;
use std::ffi::c_void;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use crate::artifact::error::ArtifactError;
use crate::kernel::constants::{INIT_IMPORTS_SYMBOL, INIT_SYMBOL};

/// `init(dependency_handles, out_instance) -> status`; zero means success
pub type InitEntryPoint =
    unsafe extern "C-unwind" fn(dependencies: *const *mut c_void, out_instance: *mut *mut c_void) -> c_int;

/// `init_imports(import_handles) -> status`; zero means success
pub type InitImportsEntryPoint = unsafe extern "C-unwind" fn(imports: *const *mut c_void) -> c_int;

/// Entries of an artifact's function table
pub type ExportedFn = unsafe extern "C-unwind" fn();

/// A module mapped into the process, able to hand out its fixed entry points
pub trait NativeModule: Send {
    fn resolve_init(&self) -> Result<InitEntryPoint, ArtifactError>;
    fn resolve_init_imports(&self) -> Result<InitImportsEntryPoint, ArtifactError>;
}

/// Platform capability that maps an artifact path to a [`NativeModule`]
pub trait ModuleOpener: Send {
    type Module: NativeModule;

    fn open_module(&self, path: &Path) -> Result<Self::Module, ArtifactError>;
}

fn symbol_name(symbol: &[u8]) -> String {
    String::from_utf8_lossy(symbol.strip_suffix(b"\0").unwrap_or(symbol)).into_owned()
}

/// Shared library opened through `libloading`
#[derive(Debug)]
pub struct DynamicModule {
    path: PathBuf,
    library: Library,
}

impl DynamicModule {
    /// # Safety
    /// `T` must match the real signature of the exported symbol.
    unsafe fn entry_point<T: Copy>(&self, symbol: &[u8]) -> Result<T, ArtifactError> {
        let resolved: Symbol<T> = unsafe { self.library.get(symbol) }.map_err(|e| ArtifactError::MissingEntryPoint {
            path: self.path.clone(),
            symbol: symbol_name(symbol),
            message: format!("libloading error: {}", e),
        })?;
        // Copying the function pointer out is sound while `library` stays alive, which
        // the owning ArtifactLoadState guarantees.
        Ok(*resolved)
    }
}

impl NativeModule for DynamicModule {
    fn resolve_init(&self) -> Result<InitEntryPoint, ArtifactError> {
        unsafe { self.entry_point::<InitEntryPoint>(INIT_SYMBOL) }
    }

    fn resolve_init_imports(&self) -> Result<InitImportsEntryPoint, ArtifactError> {
        unsafe { self.entry_point::<InitImportsEntryPoint>(INIT_IMPORTS_SYMBOL) }
    }
}

/// Opens artifacts as shared libraries from the filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicLibraryOpener;

impl ModuleOpener for DynamicLibraryOpener {
    type Module = DynamicModule;

    fn open_module(&self, path: &Path) -> Result<DynamicModule, ArtifactError> {
        // Opening runs the library's native constructors; unresolved symbols surface here
        let library = unsafe { Library::new(path) }.map_err(|e| ArtifactError::LoadError {
            path: path.to_path_buf(),
            message: format!("libloading error: {}", e),
        })?;
        Ok(DynamicModule {
            path: path.to_path_buf(),
            library,
        })
    }
}

/// Entry points of an artifact linked directly into the host binary
#[derive(Debug, Clone, Copy)]
pub struct StaticModule {
    pub init: InitEntryPoint,
    pub init_imports: InitImportsEntryPoint,
}

impl NativeModule for StaticModule {
    fn resolve_init(&self) -> Result<InitEntryPoint, ArtifactError> {
        Ok(self.init)
    }

    fn resolve_init_imports(&self) -> Result<InitImportsEntryPoint, ArtifactError> {
        Ok(self.init_imports)
    }
}

/// Serves statically registered artifacts by path instead of touching the filesystem
#[derive(Debug, Default, Clone)]
pub struct StaticModuleOpener {
    modules: HashMap<PathBuf, StaticModule>,
}

impl StaticModuleOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: impl Into<PathBuf>, module: StaticModule) {
        self.modules.insert(path.into(), module);
    }

    pub fn with_module(mut self, path: impl Into<PathBuf>, module: StaticModule) -> Self {
        self.register(path, module);
        self
    }
}

impl ModuleOpener for StaticModuleOpener {
    type Module = StaticModule;

    fn open_module(&self, path: &Path) -> Result<StaticModule, ArtifactError> {
        self.modules.get(path).copied().ok_or_else(|| ArtifactError::LoadError {
            path: path.to_path_buf(),
            message: "no statically linked module registered for this path".to_string(),
        })
    }
}
