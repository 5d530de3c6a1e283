use assert_cmd::Command; // Bring Command into scope
use predicates::prelude::*; // Bring predicate traits into scope
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes a stub index whose artifacts live under the temp dir but are never built
fn write_index(dir: &Path) -> PathBuf {
    let index = dir.join("splice-index.json");
    fs::write(
        &index,
        r#"{
  "plugins": [
    { "id": "demo.leaf", "language": "c", "artifact": "out/libleaf.so",
      "functions": { "start": 0 }, "executable": true },
    { "id": "demo.mid", "language": "rust", "artifact": "out/libmid.so",
      "depends": ["demo.leaf"], "functions": { "main": 0 }, "executable": true },
    { "id": "demo.library", "language": "c", "artifact": "out/liblibrary.so" }
  ]
}"#,
    )
    .unwrap();
    index
}

fn splice() -> Command {
    let mut cmd = Command::cargo_bin("splice").unwrap();
    cmd.env_remove("SPLICE_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() -> Result<(), Box<dyn std::error::Error>> {
    splice()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("worker"))
        .stdout(predicate::str::contains("daemon"))
        .stdout(predicate::str::contains("submit"));
    Ok(())
}

#[test]
fn test_plan_prints_operations() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let index = write_index(dir.path());

    splice()
        .arg("--index")
        .arg(&index)
        .args(["plan", "demo.mid"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Load plan for 'demo.mid' (6 operations)"))
        .stdout(predicate::str::contains("in-memory("))
        .stdout(predicate::str::contains("libleaf.so])"))
        .stdout(predicate::str::contains("final("));
    Ok(())
}

#[test]
fn test_plan_until_stops_early() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let index = write_index(dir.path());

    splice()
        .arg("--index")
        .arg(&index)
        .args(["plan", "demo.mid", "--until", "in-memory"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(1 operations)"))
        .stdout(predicate::str::contains("inited(").not());
    Ok(())
}

#[test]
fn test_plan_unknown_plugin_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let index = write_index(dir.path());

    splice()
        .arg("--index")
        .arg(&index)
        .args(["plan", "demo.ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown plugin 'demo.ghost'"));
    Ok(())
}

#[test]
fn test_missing_index_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;

    splice()
        .arg("--index")
        .arg(dir.path().join("absent.json"))
        .args(["plan", "demo.leaf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("read_stub_index"));
    Ok(())
}

#[test]
fn test_run_rejects_non_executable_plugin() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let index = write_index(dir.path());

    splice()
        .arg("--index")
        .arg(&index)
        .args(["run", "demo.library", "main"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("executable flag not set"));
    Ok(())
}

#[test]
fn test_run_requires_built_artifacts() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let index = write_index(dir.path());

    splice()
        .arg("--index")
        .arg(&index)
        .args(["run", "demo.leaf", "start"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
    Ok(())
}

#[test]
fn test_run_uses_configured_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    write_index(dir.path());
    let config = dir.path().join("splice.json");
    fs::write(
        &config,
        r#"{ "index": "splice-index.json", "execute": { "plugin": "demo.leaf", "function": "stop" } }"#,
    )?;

    // The configured function does not exist, proving the defaults were read
    splice()
        .arg("--config")
        .arg(&config)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("exports no function named 'stop'"));
    Ok(())
}

#[test]
fn test_unsupported_config_extension_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let config = dir.path().join("splice.ini");
    fs::write(&config, "index = nope")?;

    splice()
        .arg("--config")
        .arg(&config)
        .args(["plan", "demo.leaf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported configuration file extension"));
    Ok(())
}

#[test]
fn test_submit_without_daemon_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let index = write_index(dir.path());
    // Reserve a port, then free it so nothing is listening there
    let addr = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?;

    splice()
        .arg("--index")
        .arg(&index)
        .args(["submit", "demo.leaf", "start", "--addr", &addr.to_string()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
    Ok(())
}

// Builds the leaf fixture cdylib from splice-core into its own target dir
fn compile_leaf_artifact(target_dir: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let project = Path::new(env!("CARGO_MANIFEST_DIR")).join("../splice-core/tests/test_plugins/leaf_artifact");
    let output = std::process::Command::new("cargo")
        .current_dir(&project)
        .arg("build")
        .arg("--target-dir")
        .arg(target_dir)
        .output()?;
    if !output.status.success() {
        return Err(format!("cargo build failed:\n{}", String::from_utf8_lossy(&output.stderr)).into());
    }

    let lib_filename = if cfg!(target_os = "windows") {
        "leaf_artifact.dll"
    } else if cfg!(target_os = "macos") {
        "libleaf_artifact.dylib"
    } else {
        "libleaf_artifact.so"
    };
    Ok(target_dir.join("debug").join(lib_filename))
}

#[test]
fn test_run_calls_function_in_worker_process() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let lib_path = compile_leaf_artifact(&dir.path().join("target"))?;
    let index = dir.path().join("splice-index.json");
    fs::write(
        &index,
        format!(
            r#"{{ "plugins": [ {{ "id": "demo.leaf", "language": "rust", "artifact": {:?},
      "functions": {{ "start": 0 }}, "executable": true }} ] }}"#,
            lib_path.display().to_string()
        ),
    )?;

    splice()
        .arg("--index")
        .arg(&index)
        .args(["run", "demo.leaf", "start"])
        .timeout(std::time::Duration::from_secs(60))
        .assert()
        .success()
        .stdout(predicate::str::contains("Called 'start' from 'demo.leaf'"));
    Ok(())
}
