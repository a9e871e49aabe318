//! Full builds of the Node.js runtime. These download the source and take a
//! long time, run them with `--ignored`.

mod common;

use std::process::Command;

use boxednode::{AddonSpec, CompilationOptions, LogReporter, compile_js_file_as_binary};
use camino::Utf8Path;
use common::utf8_tempdir;

const NODE_VERSION: &str = "^20.0.0";

fn write_script(dir: &Utf8Path, name: &str, contents: &str) -> camino::Utf8PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn run(binary: &Utf8Path, args: &[&str]) -> String {
    let output = Command::new(binary).args(args).output().unwrap();
    assert!(output.status.success(), "{output:?}");
    String::from_utf8(output.stdout).unwrap()
}

#[tokio::test]
#[ignore = "builds Node.js from source"]
async fn test_hello_world() {
    let (_dir, root) = utf8_tempdir();
    let source = write_script(
        &root,
        "hello.js",
        r#"if (process.argv.length > 2) {
  console.log(JSON.stringify(process.argv.slice(2)));
} else {
  console.log("Hello world!");
}"#,
    );
    let target = root.join("hello");

    let options = CompilationOptions::new(source, &target)
        .with_node_version(NODE_VERSION)
        .with_tmpdir(root.join("node"));
    compile_js_file_as_binary(&options, &LogReporter::new())
        .await
        .unwrap();

    assert_eq!(run(&target, &[]), "Hello world!\n");
    // runtime options stay away from the script's arguments
    assert_eq!(run(&target, &["--version", "a"]).trim(), r#"["--version","a"]"#);
}

#[tokio::test]
#[ignore = "builds Node.js from source"]
async fn test_code_cache_is_accepted() {
    let (_dir, root) = utf8_tempdir();
    let source = write_script(
        &root,
        "cached.js",
        "console.log(boxednode.hasCodeCache, boxednode.rejectedCodeCache);",
    );

    let plain = root.join("plain");
    let options = CompilationOptions::new(&source, &plain)
        .with_node_version(NODE_VERSION)
        .with_tmpdir(root.join("node"));
    compile_js_file_as_binary(&options, &LogReporter::new())
        .await
        .unwrap();
    assert_eq!(run(&plain, &[]).trim(), "false false");

    let cached = root.join("cached");
    let mut options = CompilationOptions::new(&source, &cached)
        .with_node_version(NODE_VERSION)
        .with_tmpdir(root.join("node"));
    options.use_code_cache = true;
    compile_js_file_as_binary(&options, &LogReporter::new())
        .await
        .unwrap();
    assert_eq!(run(&cached, &[]).trim(), "true false");
}

#[tokio::test]
#[ignore = "builds Node.js from source and needs npm"]
async fn test_linked_addon() {
    let (_dir, root) = utf8_tempdir();
    let addon = std::env::var("BOXEDNODE_TEST_ADDON")
        .expect("BOXEDNODE_TEST_ADDON must point at an installed weak-napi package");
    let source = write_script(&root, "weak.js", "console.log(String(eval(process.argv[2])));");
    let target = root.join("weak");

    let options = CompilationOptions::new(source, &target)
        .with_node_version(NODE_VERSION)
        .with_tmpdir(root.join("node"))
        .with_addon(AddonSpec::new(addon, r"weakref\.node$"));
    compile_js_file_as_binary(&options, &LogReporter::new())
        .await
        .unwrap();

    let out = run(&target, &[r#"typeof require("weakref.node").WeakTag"#]);
    assert_eq!(out.trim(), "function");
}
