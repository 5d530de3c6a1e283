use std::any::Any;
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::ptr;

use crate::artifact::error::ArtifactError;
use crate::artifact::handle::OpaqueHandle;
use crate::artifact::native::{ExportedFn, ModuleOpener, NativeModule};
use crate::artifact::state::{ArtifactLoadState, ArtifactPhase};
use crate::plugin_system::plan::{LoadOperation, LoadPhase};

type LoaderResult<T> = std::result::Result<T, ArtifactError>;

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s_ref) = payload.downcast_ref::<&'static str>() {
        (*s_ref).to_string()
    } else if let Some(s_obj) = payload.downcast_ref::<String>() {
        s_obj.clone()
    } else {
        "Unknown panic reason".to_string()
    }
}

/// Outcome of one native entry point call: non-zero status or a panic both become `FfiError`
fn check_status(path: &Path, operation: &str, result: std::thread::Result<i32>) -> LoaderResult<()> {
    match result {
        Ok(0) => Ok(()),
        Ok(status) => Err(ArtifactError::FfiError {
            path: path.to_path_buf(),
            operation: operation.to_string(),
            message: format!("entry point returned status {}", status),
        }),
        Err(payload) => Err(ArtifactError::FfiError {
            path: path.to_path_buf(),
            operation: operation.to_string(),
            message: format!("panic: {}", panic_message(payload)),
        }),
    }
}

/// A callable slot from a final artifact's function table.
///
/// Borrows the loader it came from, so the artifact stays mapped for as long
/// as the function can be called.
#[derive(Debug, Clone)]
pub struct ExportedFunction<'a> {
    path: PathBuf,
    index: usize,
    func: ExportedFn,
    loader: PhantomData<&'a ()>,
}

impl ExportedFunction<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Call the function with no arguments, catching unwinds at the boundary
    pub fn invoke(&self) -> LoaderResult<()> {
        let func = self.func;
        let result = panic::catch_unwind(|| unsafe { func() });
        result.map_err(|payload| ArtifactError::FfiError {
            path: self.path.clone(),
            operation: format!("function[{}]", self.index),
            message: format!("panic: {}", panic_message(payload)),
        })
    }
}

/// Native-side state machine for every artifact in this process.
///
/// Each artifact moves `in-memory -> inited -> final`. Transitions are idempotent:
/// asking for a phase the artifact already reached is a no-op, so an artifact shared
/// by several plugins is loaded and initialised exactly once.
pub struct ArtifactLoader<O: ModuleOpener> {
    opener: O,
    artifacts: HashMap<PathBuf, ArtifactLoadState<O::Module>>,
}

impl<O: ModuleOpener> fmt::Debug for ArtifactLoader<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut phases: Vec<(&PathBuf, ArtifactPhase)> =
            self.artifacts.iter().map(|(path, state)| (path, state.phase())).collect();
        phases.sort();
        f.debug_struct("ArtifactLoader").field("artifacts", &phases).finish()
    }
}

#[allow(clippy::wrong_self_convention)]
impl<O: ModuleOpener> ArtifactLoader<O> {
    pub fn new(opener: O) -> Self {
        Self {
            opener,
            artifacts: HashMap::new(),
        }
    }

    pub fn phase(&self, path: &Path) -> ArtifactPhase {
        self.artifacts
            .get(path)
            .map(ArtifactLoadState::phase)
            .unwrap_or(ArtifactPhase::Unloaded)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Dispatch one planned operation to the matching transition
    pub fn apply(&mut self, operation: &LoadOperation) -> LoaderResult<()> {
        match operation.phase {
            LoadPhase::InMemory => self.to_in_memory(&operation.target),
            LoadPhase::Inited => self.to_inited(&operation.target, &operation.requires),
            LoadPhase::Final => self.to_final(&operation.target, &operation.requires),
        }
    }

    /// Map the artifact into the process
    pub fn to_in_memory(&mut self, path: &Path) -> LoaderResult<()> {
        if self.artifacts.contains_key(path) {
            log::trace!("ARTIFACT[{}]: already in memory", path.display());
            return Ok(());
        }
        let module = self.opener.open_module(path)?;
        self.artifacts
            .insert(path.to_path_buf(), ArtifactLoadState::new(path.to_path_buf(), module));
        log::debug!("ARTIFACT[{}]: in-memory", path.display());
        Ok(())
    }

    /// Call the init entry point with the handles of `requires`, in order
    pub fn to_inited(&mut self, path: &Path, requires: &[PathBuf]) -> LoaderResult<()> {
        let current = self.phase(path);
        if current >= ArtifactPhase::Inited {
            log::trace!("ARTIFACT[{}]: already {}", path.display(), current);
            return Ok(());
        }
        self.ensure_phase(path, path, ArtifactPhase::InMemory)?;
        let handles = self.handle_array(path, requires)?;

        let state = self.state_mut(path)?;
        let init = match state.module() {
            Some(module) => module.resolve_init()?,
            None => return Err(ArtifactError::UnknownArtifact { path: path.to_path_buf() }),
        };

        let mut instance: *mut c_void = ptr::null_mut();
        let out_instance: *mut *mut c_void = &mut instance;
        let dependencies = handles.as_ptr();
        let result = panic::catch_unwind(AssertUnwindSafe(move || unsafe { init(dependencies, out_instance) }));
        check_status(path, "init", result)?;

        let handle = OpaqueHandle::from_raw(instance).ok_or_else(|| ArtifactError::FfiError {
            path: path.to_path_buf(),
            operation: "init".to_string(),
            message: "entry point returned a null instance handle".to_string(),
        })?;
        state.set_instance(handle);
        log::debug!("ARTIFACT[{}]: inited with {} dependency handle(s)", path.display(), handles.len());
        Ok(())
    }

    /// Call the imports entry point with the handles of `requires`, in order
    pub fn to_final(&mut self, path: &Path, requires: &[PathBuf]) -> LoaderResult<()> {
        let current = self.phase(path);
        if current == ArtifactPhase::Final {
            log::trace!("ARTIFACT[{}]: already final", path.display());
            return Ok(());
        }
        self.ensure_phase(path, path, ArtifactPhase::Inited)?;
        let handles = self.handle_array(path, requires)?;

        let state = self.state_mut(path)?;
        let init_imports = match state.module() {
            Some(module) => module.resolve_init_imports()?,
            None => return Err(ArtifactError::UnknownArtifact { path: path.to_path_buf() }),
        };

        let imports = handles.as_ptr();
        let result = panic::catch_unwind(AssertUnwindSafe(move || unsafe { init_imports(imports) }));
        check_status(path, "init_imports", result)?;

        state.mark_final();
        log::debug!("ARTIFACT[{}]: final with {} import handle(s)", path.display(), handles.len());
        Ok(())
    }

    /// Look up slot `index` of the function table the artifact's instance handle points at.
    ///
    /// `table_len` is the table size declared by the artifact's stub and bounds the lookup.
    ///
    /// The returned function borrows the loader, so it cannot outlive the
    /// mapping it points into:
    ///
    /// ```compile_fail
    /// use splice_core::artifact::{ArtifactLoader, StaticModuleOpener};
    /// use std::path::Path;
    ///
    /// let loader = ArtifactLoader::new(StaticModuleOpener::new());
    /// let function = loader.function_pointer(Path::new("/static/leaf.so"), 0, 1);
    /// drop(loader);
    /// let _ = function.map(|f| f.invoke());
    /// ```
    pub fn function_pointer<'a>(
        &'a self,
        path: &Path,
        index: usize,
        table_len: usize,
    ) -> LoaderResult<ExportedFunction<'a>> {
        let state = self
            .artifacts
            .get(path)
            .ok_or_else(|| ArtifactError::UnknownArtifact { path: path.to_path_buf() })?;
        let phase = state.phase();
        if phase != ArtifactPhase::Final {
            return Err(ArtifactError::NotFinal {
                path: path.to_path_buf(),
                actual: phase,
            });
        }
        if index >= table_len {
            return Err(ArtifactError::InvalidFunctionIndex {
                path: path.to_path_buf(),
                index,
                table_len,
            });
        }
        let instance = state.instance().ok_or_else(|| ArtifactError::NotFinal {
            path: path.to_path_buf(),
            actual: phase,
        })?;

        // The instance handle of a final artifact points at its function table.
        // `Option<fn>` shares the layout of a nullable function pointer.
        let table = instance.as_ptr() as *const Option<ExportedFn>;
        let slot = unsafe { *table.add(index) };
        let func = slot.ok_or_else(|| ArtifactError::FfiError {
            path: path.to_path_buf(),
            operation: format!("function[{}]", index),
            message: "function table slot is null".to_string(),
        })?;

        Ok(ExportedFunction {
            path: path.to_path_buf(),
            index,
            func,
            loader: PhantomData,
        })
    }

    fn state_mut(&mut self, path: &Path) -> LoaderResult<&mut ArtifactLoadState<O::Module>> {
        self.artifacts
            .get_mut(path)
            .ok_or_else(|| ArtifactError::UnknownArtifact { path: path.to_path_buf() })
    }

    fn ensure_phase(&self, artifact: &Path, dependency: &Path, required: ArtifactPhase) -> LoaderResult<()> {
        let actual = self.phase(dependency);
        if actual < required {
            return Err(ArtifactError::DependencyNotReady {
                artifact: artifact.to_path_buf(),
                dependency: dependency.to_path_buf(),
                required,
                actual,
            });
        }
        Ok(())
    }

    /// Raw instance handles of `requires`, each of which must be at least inited
    fn handle_array(&self, artifact: &Path, requires: &[PathBuf]) -> LoaderResult<Vec<*mut c_void>> {
        requires
            .iter()
            .map(|dependency| {
                self.ensure_phase(artifact, dependency, ArtifactPhase::Inited)?;
                self.artifacts
                    .get(dependency)
                    .and_then(ArtifactLoadState::instance)
                    .map(OpaqueHandle::as_ptr)
                    .ok_or_else(|| ArtifactError::UnknownArtifact {
                        path: dependency.to_path_buf(),
                    })
            })
            .collect()
    }
}
