//! Bit-exact status updates for `tasks.md`.
//!
//! Mutating a status changes exactly the bracketed marker character. Line
//! endings, indentation, surrounding prose, and every other byte of the file
//! are preserved as-is.

use super::status::TaskStatus;
use crate::errors::{DomainError, DomainResult};

/// Flip the status marker for `task_id` to `new_status`.
///
/// The transition must be legal per [`TaskStatus::can_transition_to`], except
/// that writing the status a task already has is accepted as a no-op (this
/// keeps resume paths idempotent). Returns the full updated file contents.
pub fn set_task_marker(
    contents: &str,
    task_id: &str,
    new_status: TaskStatus,
) -> DomainResult<String> {
    let Some((marker_offset, current)) = find_marker(contents, task_id) else {
        return Err(DomainError::TaskNotFound {
            id: task_id.to_string(),
        });
    };

    if current == new_status {
        return Ok(contents.to_string());
    }
    if !current.can_transition_to(new_status) {
        return Err(DomainError::InvalidTransition {
            task_id: task_id.to_string(),
            from: current.as_str(),
            to: new_status.as_str(),
        });
    }

    // Markers are single ASCII bytes, so splicing one byte is UTF-8 safe.
    let mut out = String::with_capacity(contents.len());
    out.push_str(&contents[..marker_offset]);
    out.push(new_status.marker());
    out.push_str(&contents[marker_offset + 1..]);
    Ok(out)
}

/// Locate the marker byte for `task_id`.
///
/// Returns the byte offset of the marker character and the current status.
fn find_marker(contents: &str, task_id: &str) -> Option<(usize, TaskStatus)> {
    let mut line_start = 0usize;
    for line in contents.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();
        let bytes = trimmed.as_bytes();
        if bytes.len() >= 5
            && bytes[0] == b'-'
            && bytes[1] == b' '
            && bytes[2] == b'['
            && bytes[4] == b']'
            && let Some(status) = TaskStatus::from_marker(bytes[3] as char)
        {
            let rest = trimmed[5..].trim_start();
            if let Some((id, _)) = rest.split_once(':')
                && id.trim() == task_id
            {
                return Some((line_start + indent + 3, status));
            }
        }
        line_start += line.len();
    }
    None
}
