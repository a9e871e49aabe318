//! Module registration macro overrides appended to the runtime's public
//! headers. With `BUILDING_BOXEDNODE_EXTENSION` defined, an addon's
//! `NODE_MODULE`/`NAPI_MODULE` expands to a `BOXEDNODE_REGISTER_FUNCTION`
//! that hands out its module struct instead of a dynamic initializer.

pub const NODE_H: &str = include_str!("../templates/add-node.h");
pub const NODE_API_H: &str = include_str!("../templates/add-node_api.h");

const MARKER: &str = "// boxednode: static addon registration";

/// Header files under `src/` paired with the text appended to them
pub const PATCHES: [(&str, &str); 2] = [("node.h", NODE_H), ("node_api.h", NODE_API_H)];

/// Appends `addition` to `header` unless a previous run already did
pub fn patch_header(header: &str, addition: &str) -> Option<String> {
    if header.contains(MARKER) {
        return None;
    }
    let mut patched = String::with_capacity(header.len() + addition.len() + MARKER.len() + 2);
    patched.push_str(header);
    if !header.ends_with('\n') {
        patched.push('\n');
    }
    patched.push_str(MARKER);
    patched.push('\n');
    patched.push_str(addition);
    Some(patched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_is_applied_once() {
        let original = "#ifndef SRC_NODE_H_\n#define SRC_NODE_H_\n#endif";
        let patched = patch_header(original, NODE_H).unwrap();
        assert!(patched.starts_with(original));
        assert!(patched.contains("BOXEDNODE_REGISTER_FUNCTION"));
        assert!(patch_header(&patched, NODE_H).is_none());
    }

    #[test]
    fn test_overrides_cover_both_apis() {
        assert!(NODE_H.contains("#define NODE_MODULE_X("));
        assert!(NODE_H.contains("#define NODE_MODULE_CONTEXT_AWARE_X("));
        assert!(NODE_API_H.contains("#define NAPI_MODULE_X("));
        for (_, text) in PATCHES {
            assert!(text.contains("BOXEDNODE_MODULE_NAME"));
        }
    }
}
