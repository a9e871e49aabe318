use camino::Utf8PathBuf;
use gyp::{DescriptorError, GypFile};

fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().expect("failed creating tempdir");
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("non utf-8 tempdir");
    (dir, root)
}

#[test]
fn test_load_edit_store() {
    let (_dir, root) = scratch();
    let path = root.join("node.gypi");
    std::fs::write(
        &path,
        "# node.gypi\n\
         { 'targets': [ { 'target_name': 'x', 'type': 'none' } ], 'dependencies': [], }\n",
    )
    .unwrap();

    let mut gyp = GypFile::load(&path).unwrap();
    gyp.append_dependencies(["deps/0123/.boxednode.gyp:x"]).unwrap();
    gyp.store().unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    insta::assert_snapshot!(written, @r#"
    {
      "targets": [
        {
          "target_name": "x",
          "type": "none"
        }
      ],
      "dependencies": [
        "deps/0123/.boxednode.gyp:x"
      ]
    }
    "#);

    // written JSON is itself a valid descriptor
    let reloaded = GypFile::load(&path).unwrap();
    assert_eq!(reloaded.root(), gyp.root());
}

#[test]
fn test_store_as_keeps_original() {
    let (_dir, root) = scratch();
    let original = root.join("binding.gyp");
    let copy = root.join(".boxednode.gyp");
    let source = "{'targets': [{'target_name': 'addon'}]}";
    std::fs::write(&original, source).unwrap();

    let mut gyp = GypFile::load(&original).unwrap();
    for mut target in gyp.targets_mut().unwrap() {
        target.set_type("static_library");
    }
    gyp.store_as(&copy).unwrap();

    assert_eq!(std::fs::read_to_string(&original).unwrap(), source);
    let copied = GypFile::load(&copy).unwrap();
    assert_eq!(
        copied.root()["targets"][0]["type"],
        serde_json::json!("static_library")
    );
}

#[test]
fn test_missing_file() {
    let (_dir, root) = scratch();
    let err = GypFile::load(root.join("binding.gyp")).unwrap_err();
    assert!(matches!(err, DescriptorError::Read { .. }));
    assert_eq!(err.path(), Some(root.join("binding.gyp").as_path()));
}
