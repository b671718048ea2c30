//! Task identifier helpers.
//!
//! Wavefront task ids are stable strings of the form `TASK-001`. The numeric
//! suffix is not interpreted beyond ordering; ids are compared as opaque
//! strings everywhere else.

/// Return `true` when `id` looks like a Wavefront task id (`TASK-` followed
/// by at least one ASCII digit).
pub fn is_task_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix("TASK-") else {
        return false;
    };
    !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
}

/// Return `true` when `id` is safe to embed as a single path segment.
///
/// This rejects path traversal tokens, path separators, empty ids, and
/// overlong ids so the resulting path cannot escape its intended subtree.
pub fn is_safe_id_segment(id: &str) -> bool {
    let id = id.trim();
    if id.is_empty() {
        return false;
    }
    if id.len() > 256 {
        return false;
    }
    if id.contains('/') || id.contains('\\') || id.contains("..") {
        return false;
    }
    true
}
