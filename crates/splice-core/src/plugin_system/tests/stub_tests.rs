#![cfg(test)]

use crate::plugin_system::stub::{Language, PluginId, PluginStub};
use std::path::Path;

#[test]
fn test_plugin_id_namespace_and_short_name() {
    let id = PluginId::new("demo.graphics.leaf");
    assert_eq!(id.namespace(), "demo.graphics");
    assert_eq!(id.short_name(), "leaf");

    let bare = PluginId::from("leaf");
    assert_eq!(bare.namespace(), "");
    assert_eq!(bare.short_name(), "leaf");
    assert_eq!(bare.to_string(), "leaf");
}

#[test]
fn test_language_is_normalized() {
    assert_eq!(Language::new("C"), Language::new("c"));
    assert_eq!(Language::new(" Rust ").as_str(), "rust");
}

#[test]
fn test_stub_builder_methods() {
    let stub = PluginStub::new("demo.mid", Language::new("c"), "/artifacts/mid.so")
        .with_depends(["demo.leaf"])
        .with_imports(vec!["demo.other".to_string()])
        .with_function("start", 0)
        .with_function("stop", 2)
        .executable(true);

    assert_eq!(stub.depends, vec![PluginId::new("demo.leaf")]);
    assert_eq!(stub.imports, vec![PluginId::new("demo.other")]);
    assert!(stub.executable);
    assert_eq!(stub.artifact_path(), Path::new("/artifacts/mid.so"));
    assert_eq!(stub.function_index("start"), Some(0));
    assert_eq!(stub.function_index("missing"), None);
    assert_eq!(stub.function_table_len(), 3);
    assert_eq!(stub.to_string(), "demo.mid v0.1.0 (c)");
}

#[test]
fn test_function_table_len_empty() {
    let stub = PluginStub::new("demo.leaf", Language::new("c"), "/artifacts/leaf.so");
    assert_eq!(stub.function_table_len(), 0);
    assert!(!stub.executable);
}
