//! Canonical JSON rendering.
//!
//! Plans and state files must be diff-stable: sorted keys, 2-space
//! indentation, UTF-8, a trailing newline, and timestamps from an injected
//! clock. Rendering goes through `serde_json::Value`, whose map type keeps
//! keys sorted, so struct field order never leaks into the output.

use serde::Serialize;

/// Semantic validation of a deserialized on-disk model.
///
/// Structural validity (does the JSON parse into the struct) is serde's job;
/// `validate` checks the invariants serde cannot express, e.g. dense wave
/// ids or lock-disjoint parallel waves.
pub trait Validate {
    /// Check semantic invariants, returning a human-readable reason on
    /// failure.
    fn validate(&self) -> Result<(), String>;
}

/// Render `value` as canonical JSON.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    let mut out = serde_json::to_string_pretty(&value)?;
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Unordered {
        zebra: u32,
        apple: u32,
        mango: u32,
    }

    #[test]
    fn keys_are_sorted_regardless_of_field_order() {
        let rendered = to_canonical_json(&Unordered {
            zebra: 1,
            apple: 2,
            mango: 3,
        })
        .unwrap();
        assert_eq!(rendered, "{\n  \"apple\": 2,\n  \"mango\": 3,\n  \"zebra\": 1\n}\n");
    }

    #[test]
    fn output_ends_with_single_newline_and_no_trailing_whitespace() {
        let rendered = to_canonical_json(&serde_json::json!({"k": [1, 2]})).unwrap();
        assert!(rendered.ends_with('\n'));
        assert!(!rendered.ends_with("\n\n"));
        for line in rendered.lines() {
            assert_eq!(line, line.trim_end());
        }
    }
}
