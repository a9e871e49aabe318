use heck::ToSnakeCase;

/// Turns an arbitrary name (e.g. a GYP `target_name`) into something usable
/// as part of a C identifier
pub fn c_identifier(input: &str) -> String {
    if input.is_empty() {
        return "_".into();
    }

    let mut ident: String = input
        .to_snake_case()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    // allow leading & trailing underscores
    if input.starts_with('_') && !ident.starts_with('_') {
        ident.insert(0, '_');
    }
    if input.ends_with('_') && !ident.ends_with('_') {
        ident.push('_');
    }
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}
