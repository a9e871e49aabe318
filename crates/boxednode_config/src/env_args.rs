use crate::{ConfigError, Result};

/// Extra `./configure` (or `vcbuild.bat`) arguments
pub const CONFIGURE_ARGS_VAR: &str = "BOXEDNODE_CONFIGURE_ARGS";
/// Extra `make` (or `vcbuild.bat`) arguments
pub const MAKE_ARGS_VAR: &str = "BOXEDNODE_MAKE_ARGS";
/// Requests a build with additional engine diagnostics compiled in
pub const DEBUG_BUILD_VAR: &str = "BOXEDNODE_DEBUG_BUILD";

/// Parses an argument list given either as a JSON array of strings or as a
/// comma-separated list. Empty entries are dropped.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidInput`] when the value looks like a JSON
/// array but is not an array of strings.
pub fn parse_arg_list(raw: &str) -> Result<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        let args: Vec<String> = serde_json::from_str(trimmed).map_err(|e| {
            ConfigError::InvalidInput(format!("expected a JSON array of strings: {e}"))
        })?;
        return Ok(args.into_iter().filter(|a| !a.is_empty()).collect());
    }

    Ok(trimmed
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect())
}

/// Reads and parses an argument list from `var` using `lookup`
///
/// # Errors
///
/// Propagates parse failures from [`parse_arg_list`], naming the variable.
pub fn arg_list_from(var: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Vec<String>> {
    match lookup(var) {
        Some(raw) => parse_arg_list(&raw)
            .map_err(|e| ConfigError::InvalidInput(format!("invalid value for {var}: {e}"))),
        None => Ok(vec![]),
    }
}

/// Whether `BOXEDNODE_DEBUG_BUILD` asks for a diagnostic build
pub fn debug_build_requested(lookup: impl Fn(&str) -> Option<String>) -> bool {
    lookup(DEBUG_BUILD_VAR).is_some_and(|v| !v.is_empty() && v != "0")
}
