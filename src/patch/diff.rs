//! Structural JSON diff

use serde_json::Value;

use super::types::{PatchError, PatchOp};

/// Compute the edit script turning `old` into `new`
///
/// Fails when either buffer is not valid JSON. Equal documents produce an
/// empty script.
pub fn diff(old: &[u8], new: &[u8]) -> Result<Vec<PatchOp>, PatchError> {
    let old: Value = serde_json::from_slice(old)
        .map_err(|source| PatchError::InvalidJson { side: "old", source })?;
    let new: Value = serde_json::from_slice(new)
        .map_err(|source| PatchError::InvalidJson { side: "new", source })?;

    diff_values(&old, &new)
}

/// Compute the edit script between two parsed documents
pub fn diff_values(old: &Value, new: &Value) -> Result<Vec<PatchOp>, PatchError> {
    json_patch::diff(old, new)
        .0
        .into_iter()
        .map(PatchOp::try_from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::apply_bytes;
    use serde_json::json;

    fn assert_round_trip(old: &str, new: &str) {
        let ops = diff(old.as_bytes(), new.as_bytes()).unwrap();
        let rebuilt = apply_bytes(old.as_bytes(), &ops).unwrap();
        let expected: Value = serde_json::from_str(new).unwrap();
        assert_eq!(rebuilt, expected, "ops: {:?}", ops);
    }

    #[test]
    fn test_scalar_change_is_replace() {
        let ops = diff(br#"{"a":1}"#, br#"{"a":2}"#).unwrap();
        assert_eq!(ops, vec![PatchOp::replace("/a", json!(2))]);
    }

    #[test]
    fn test_appended_array_item_is_add() {
        let ops = diff(br#"{"tags":["x"]}"#, br#"{"tags":["x","y"]}"#).unwrap();
        assert_eq!(ops, vec![PatchOp::add("/tags/1", json!("y"))]);
    }

    #[test]
    fn test_equal_documents_produce_no_ops() {
        let ops = diff(br#"{"a":[1,2],"b":null}"#, br#"{ "b": null, "a": [1, 2] }"#).unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn test_large_numbers_keep_their_digits() {
        let ops = diff(br#"{"a":1}"#, br#"{"a":12345678901234567890123}"#).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].value_bytes(), b"12345678901234567890123".to_vec());

        let ops = diff(br#"{"price":1}"#, br#"{"price":0.10000000000000000001}"#).unwrap();
        assert_eq!(ops[0].value_bytes(), b"0.10000000000000000001".to_vec());
    }

    #[test]
    fn test_round_trip_realistic_documents() {
        assert_round_trip(r#"{"keep":1,"gone":true}"#, r#"{"keep":1,"new":"x"}"#);
        assert_round_trip(r#"[1,2,3,4]"#, r#"[1,9]"#);
        assert_round_trip(r#"{"a/b":{"c~d":1}}"#, r#"{"a/b":{"c~d":2}}"#);
        assert_round_trip(r#"{"a":{"b":1}}"#, r#"{"a":[1]}"#);
        assert_round_trip(
            r#"{"user":{"name":"ana","tags":["x","y","z"]},"count":3}"#,
            r#"{"user":{"name":"ana","tags":["x"],"email":"a@b.c"},"count":4}"#,
        );
        assert_round_trip(
            r#"{"items":[{"id":1,"done":false},{"id":2,"done":false}]}"#,
            r#"{"items":[{"id":1,"done":true},{"id":2,"done":false},{"id":3,"done":false}]}"#,
        );
        assert_round_trip(r#"{"n":1}"#, r#"{"n":98765432109876543210987654321}"#);
    }

    #[test]
    fn test_invalid_json_fails() {
        assert!(matches!(
            diff(b"not json", br#"{"a":1}"#),
            Err(PatchError::InvalidJson { side: "old", .. })
        ));
        assert!(matches!(
            diff(br#"{"a":1}"#, b"{"),
            Err(PatchError::InvalidJson { side: "new", .. })
        ));
    }
}
