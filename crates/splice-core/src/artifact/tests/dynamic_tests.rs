#![cfg(test)]

use crate::artifact::error::ArtifactError;
use crate::artifact::loader::ArtifactLoader;
use crate::artifact::native::DynamicLibraryOpener;
use crate::artifact::state::ArtifactPhase;
use std::path::PathBuf;
use std::process::Command;
use tempfile::{tempdir, TempDir};

// Compiles a fixture cdylib from tests/test_plugins into a fresh target dir.
// Returns the library path and the TempDir that keeps it alive.
fn compile_test_artifact(lib_name: &str, project_subpath: &str) -> Result<(PathBuf, TempDir), String> {
    let base_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let project_path = base_dir.join(project_subpath);
    let target_dir = tempdir().map_err(|e| format!("Failed to create temp dir for compilation: {}", e))?;

    let output = Command::new("cargo")
        .current_dir(&project_path)
        .arg("build")
        .arg("--target-dir")
        .arg(target_dir.path())
        .output()
        .map_err(|e| format!("Failed to execute cargo build for {}: {}", lib_name, e))?;

    if !output.status.success() {
        return Err(format!(
            "Failed to compile test artifact {}: cargo build exited with status {:?}.\nStderr:\n{}",
            lib_name,
            output.status,
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    let lib_filename = if cfg!(target_os = "windows") {
        format!("{}.dll", lib_name)
    } else if cfg!(target_os = "macos") {
        format!("lib{}.dylib", lib_name)
    } else {
        format!("lib{}.so", lib_name)
    };
    let lib_path = target_dir.path().join("debug").join(lib_filename);
    if !lib_path.exists() {
        return Err(format!("Compiled artifact not found at {}", lib_path.display()));
    }
    Ok((lib_path, target_dir))
}

#[test]
fn test_missing_library_is_load_error() {
    let dir = tempdir().unwrap();
    let mut loader = ArtifactLoader::new(DynamicLibraryOpener);
    let missing = dir.path().join("libnothing.so");

    match loader.to_in_memory(&missing) {
        Err(ArtifactError::LoadError { path, message }) => {
            assert_eq!(path, missing);
            assert!(message.starts_with("libloading error"));
        }
        other => panic!("Expected LoadError, got {:?}", other),
    }
    assert_eq!(loader.phase(&missing), ArtifactPhase::Unloaded);
}

#[test]
fn test_shared_library_full_lifecycle() {
    let (lib_path, _target_dir) = compile_test_artifact("leaf_artifact", "tests/test_plugins/leaf_artifact")
        .expect("Failed to compile leaf_artifact");

    let mut loader = ArtifactLoader::new(DynamicLibraryOpener);
    loader.to_in_memory(&lib_path).unwrap();
    loader.to_inited(&lib_path, &[]).unwrap();
    loader.to_final(&lib_path, &[]).unwrap();
    assert_eq!(loader.phase(&lib_path), ArtifactPhase::Final);

    let start = loader.function_pointer(&lib_path, 0, 1).unwrap();
    start.invoke().unwrap();
    assert!(matches!(
        loader.function_pointer(&lib_path, 1, 1),
        Err(ArtifactError::InvalidFunctionIndex { .. })
    ));
}

#[test]
fn test_missing_imports_entry_point() {
    let (lib_path, _target_dir) =
        compile_test_artifact("missing_entry_artifact", "tests/test_plugins/missing_entry_artifact")
            .expect("Failed to compile missing_entry_artifact");

    let mut loader = ArtifactLoader::new(DynamicLibraryOpener);
    loader.to_in_memory(&lib_path).unwrap();
    loader.to_inited(&lib_path, &[]).unwrap();

    match loader.to_final(&lib_path, &[]) {
        Err(ArtifactError::MissingEntryPoint { symbol, .. }) => {
            assert_eq!(symbol, "__splice_extern_init_imports");
        }
        other => panic!("Expected MissingEntryPoint, got {:?}", other),
    }
    assert_eq!(loader.phase(&lib_path), ArtifactPhase::Inited);
}
