use biome_formatter::IndentStyle;
use biome_js_formatter::{context::JsFormatOptions, format_node};
use biome_js_parser::{JsParserOptions, parse};
use biome_js_syntax::JsFileSource;

/// Pretty-prints a CommonJS script. Code that does not parse is returned
/// unchanged so syntax problems surface when the runtime compiles it.
pub fn format_js(code: &str) -> String {
    let source = JsFileSource::js_script();
    let parsed = parse(code, source, JsParserOptions::default());
    if parsed.has_errors() {
        return code.into();
    }
    let options = JsFormatOptions::new(source).with_indent_style(IndentStyle::Space);

    let formatted = format_node(options, &parsed.syntax()).map(|f| f.print());
    if let Ok(Ok(printed)) = formatted {
        printed.into_code()
    } else {
        code.into()
    }
}
