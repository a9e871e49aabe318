use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;

use crate::{CodegenResult, entry_point::INTERMEDIATE_FILE, format::format_js};

static BOOTSTRAP_TEMPLATE: &str = include_str!("../templates/bootstrap.js.handlebars");

/// A `require()` id pattern that resolves to a statically linked module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequireMapping {
    /// JavaScript regular expression source
    pub pattern: String,
    pub flags: String,
    pub linked_module: String,
}

/// The bootstrap module linked into the runtime as `lib/<ns>/<ns>.js`
#[derive(Debug, Clone, Default)]
pub struct Shim {
    pub mappings: Vec<RequireMapping>,
}

impl Shim {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mapping(
        &mut self,
        pattern: impl Into<String>,
        flags: impl Into<String>,
        linked_module: impl Into<String>,
    ) {
        self.mappings.push(RequireMapping {
            pattern: pattern.into(),
            flags: flags.into(),
            linked_module: linked_module.into(),
        });
    }

    /// The stack trace / fs patches are only needed for native addons
    pub fn enable_bindings_patch(&self) -> bool {
        !self.mappings.is_empty()
    }

    /// JSON object literal embedded as the shim's configuration
    ///
    /// # Errors
    ///
    /// Only fails if serialization fails
    pub fn config(&self) -> CodegenResult<String> {
        let require_mappings: Vec<_> = self
            .mappings
            .iter()
            .map(|m| json!([m.pattern, m.flags, m.linked_module]))
            .collect();
        Ok(serde_json::to_string_pretty(&json!({
            "requireMappings": require_mappings,
            "enableBindingsPatch": self.enable_bindings_patch(),
            "intermediateFile": INTERMEDIATE_FILE,
        }))?)
    }

    /// # Errors
    ///
    /// Fails on template errors
    pub fn render(&self) -> CodegenResult<String> {
        let mut hb = Handlebars::new();
        hb.register_escape_fn(handlebars::no_escape);
        hb.set_strict_mode(true);
        let data = json!({ "config": self.config()? });
        let rendered = hb.render_template(BOOTSTRAP_TEMPLATE, &data)?;
        Ok(format_js(&rendered))
    }
}
