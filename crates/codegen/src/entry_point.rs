use handlebars::Handlebars;
use serde::Serialize;

use crate::{BlobMode, CodegenResult, blob};

static MAIN_TEMPLATE: &str = include_str!("../templates/main.cc.handlebars");

/// File the produced binary writes generated artifacts to, relative to its
/// working directory
pub const INTERMEDIATE_FILE: &str = "intermediate.out";

/// Everything that varies in the generated `node_main.cc`
#[derive(Debug, Clone)]
pub struct EntryPoint {
    /// Built-in module id of the bootstrap shim, e.g. `app/app`
    pub entry_module: String,
    pub register_functions: Vec<String>,
    pub main_script: String,
    pub code_cache_mode: BlobMode,
    pub code_cache: Vec<u8>,
    pub snapshot_mode: BlobMode,
    pub snapshot: Vec<u8>,
    pub compress_blobs: bool,
}

#[derive(Serialize)]
struct MainData<'a> {
    entry_point: String,
    intermediate_file: String,
    register_functions: &'a [String],
    code_cache_mode: &'static str,
    snapshot_mode: &'static str,
    generate_snapshot: bool,
    consume_snapshot: bool,
    blob_definitions: String,
}

impl EntryPoint {
    pub fn new(namespace: &str, main_script: impl Into<String>) -> Self {
        Self {
            entry_module: format!("{namespace}/{namespace}"),
            register_functions: vec![],
            main_script: main_script.into(),
            code_cache_mode: BlobMode::Ignore,
            code_cache: vec![],
            snapshot_mode: BlobMode::Ignore,
            snapshot: vec![],
            compress_blobs: false,
        }
    }

    #[must_use]
    pub fn with_register_functions(mut self, functions: Vec<String>) -> Self {
        self.register_functions = functions;
        self
    }

    #[must_use]
    pub fn with_code_cache(mut self, mode: BlobMode, data: Vec<u8>) -> Self {
        self.code_cache_mode = mode;
        self.code_cache = data;
        self
    }

    #[must_use]
    pub fn with_snapshot(mut self, mode: BlobMode, data: Vec<u8>) -> Self {
        self.snapshot_mode = mode;
        self.snapshot = data;
        self
    }

    #[must_use]
    pub fn with_compressed_blobs(mut self, compress: bool) -> Self {
        self.compress_blobs = compress;
        self
    }

    /// C++ definitions of every blob the entry point needs
    ///
    /// # Errors
    ///
    /// Fails if compressing a blob fails
    pub fn blob_definitions(&self) -> CodegenResult<String> {
        let mut defs = String::new();
        // the snapshot already holds the evaluated script
        if self.snapshot_mode != BlobMode::Consume {
            defs.push_str(&blob::string_definition(
                "GetBoxednodeMainScriptSource",
                &self.main_script,
                self.compress_blobs,
            )?);
        }
        defs.push_str(&blob::buffer_definition(
            "GetBoxednodeCodeCache",
            &self.code_cache,
            self.compress_blobs,
        )?);
        if self.snapshot_mode == BlobMode::Consume {
            defs.push_str(&blob::buffer_definition(
                "GetBoxednodeSnapshotBlob",
                &self.snapshot,
                self.compress_blobs,
            )?);
        }
        Ok(defs)
    }

    /// # Errors
    ///
    /// Fails on template or compression errors
    pub fn render(&self) -> CodegenResult<String> {
        // the id ends up inside a C string literal that holds a JS string literal
        let entry_point = serde_json::to_string(&serde_json::to_string(&self.entry_module)?)?;
        let data = MainData {
            entry_point,
            intermediate_file: serde_json::to_string(INTERMEDIATE_FILE)?,
            register_functions: &self.register_functions,
            code_cache_mode: self.code_cache_mode.as_str(),
            snapshot_mode: self.snapshot_mode.as_str(),
            generate_snapshot: self.snapshot_mode == BlobMode::Generate,
            consume_snapshot: self.snapshot_mode == BlobMode::Consume,
            blob_definitions: self.blob_definitions()?,
        };

        let mut hb = Handlebars::new();
        hb.register_escape_fn(handlebars::no_escape);
        hb.set_strict_mode(true);
        Ok(hb.render_template(MAIN_TEMPLATE, &data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn define<'a>(code: &'a str, name: &str) -> Option<&'a str> {
        let prefix = format!("#define {name} ");
        code.lines().find_map(|l| l.strip_prefix(prefix.as_str()))
    }

    #[test]
    fn test_entry_point_is_double_quoted() {
        let code = EntryPoint::new("app", "1").render().unwrap();
        let entry = define(&code, "BOXEDNODE_ENTRY_POINT").unwrap();
        insta::assert_snapshot!(entry, @r#""\"app/app\"""#);
        assert_eq!(
            define(&code, "BOXEDNODE_INTERMEDIATE_FILE"),
            Some("\"intermediate.out\"")
        );
    }

    #[test]
    fn test_runtime_options_precede_separator() {
        let code = EntryPoint::new("app", "1").render().unwrap();
        let start = code.find("  if (args.size() > 0) {").unwrap();
        let end = start + code[start..].find("\n  }\n").unwrap();
        let block: Vec<_> = code[start..end].lines().map(str::trim).collect();
        insta::assert_snapshot!(block.join("\n"), @r#"
        if (args.size() > 0) {
        args.insert(args.begin() + 1, "--");
        #if !defined(BOXEDNODE_GENERATE_SNAPSHOT) && !defined(BOXEDNODE_CONSUME_SNAPSHOT)
        args.insert(args.begin() + 1, "--no-node-snapshot");
        #endif
        args.insert(args.begin() + 1, "--openssl-shared-config");
        "#);

        assert!(code.contains("if (i === 1 || i === 2) process.argv.splice(i, 1); }"));
    }

    #[test]
    fn test_register_functions() {
        let code = EntryPoint::new("app", "1")
            .with_register_functions(vec![
                "boxednode_weakref_register_abc".into(),
                "boxednode_other_register_abc".into(),
            ])
            .render()
            .unwrap();

        assert!(code.contains("void boxednode_weakref_register_abc(const void**, const void**);"));
        assert!(code.contains("void boxednode_other_register_abc(const void**, const void**);"));

        let table_start = code.find("boxednode_linked_modules[] = {").unwrap();
        let table = &code[table_start..];
        let first = table.find("boxednode_weakref_register_abc,").unwrap();
        let second = table.find("boxednode_other_register_abc,").unwrap();
        let sentinel = table.find("nullptr").unwrap();
        assert!(first < second && second < sentinel);
    }

    #[test]
    fn test_default_modes() {
        let code = EntryPoint::new("app", "console.log(1)").render().unwrap();
        assert_eq!(define(&code, "BOXEDNODE_CODE_CACHE_MODE"), Some("\"ignore\""));
        assert_eq!(define(&code, "BOXEDNODE_SNAPSHOT_MODE"), Some("\"ignore\""));
        assert!(define(&code, "BOXEDNODE_GENERATE_SNAPSHOT").is_none());
        assert!(define(&code, "BOXEDNODE_CONSUME_SNAPSHOT").is_none());
        assert!(code.contains("Local<String> GetBoxednodeMainScriptSource(Isolate* isolate) {"));
        assert!(code.contains("std::vector<char> GetBoxednodeCodeCache() {"));
        assert!(!code.contains("std::vector<char> GetBoxednodeSnapshotBlob() {"));
        assert!(!code.contains("{{"));
    }

    #[test]
    fn test_code_cache_consume() {
        let code = EntryPoint::new("app", "console.log(1)")
            .with_code_cache(BlobMode::Consume, vec![7, 8, 9])
            .render()
            .unwrap();
        assert_eq!(define(&code, "BOXEDNODE_CODE_CACHE_MODE"), Some("\"consume\""));
        assert!(code.contains("GetBoxednodeCodeCache_source_[] = { 7,8,9 };"));
    }

    #[test]
    fn test_snapshot_generate_keeps_script() {
        let code = EntryPoint::new("app", "console.log(1)")
            .with_snapshot(BlobMode::Generate, vec![])
            .render()
            .unwrap();
        assert_eq!(define(&code, "BOXEDNODE_GENERATE_SNAPSHOT"), Some("1"));
        assert!(code.contains("Local<String> GetBoxednodeMainScriptSource(Isolate* isolate) {"));
    }

    #[test]
    fn test_snapshot_consume_omits_script() {
        let code = EntryPoint::new("app", "console.log(1)")
            .with_snapshot(BlobMode::Consume, vec![1, 2])
            .render()
            .unwrap();
        assert_eq!(define(&code, "BOXEDNODE_CONSUME_SNAPSHOT"), Some("1"));
        assert_eq!(define(&code, "BOXEDNODE_SNAPSHOT_MODE"), Some("\"consume\""));
        assert!(!code.contains("Local<String> GetBoxednodeMainScriptSource(Isolate* isolate) {"));
        assert!(code.contains("GetBoxednodeSnapshotBlob_source_[] = { 1,2 };"));
    }

    #[test]
    fn test_compressed_blobs() {
        let code = EntryPoint::new("app", "console.log(1)")
            .with_compressed_blobs(true)
            .render()
            .unwrap();
        assert!(code.contains("std::string GetBoxednodeMainScriptSource_raw() {"));
        assert!(code.contains("std::string GetBoxednodeCodeCache_raw() {"));
        assert!(code.contains("BrotliDecoderDecompress("));
    }
}
