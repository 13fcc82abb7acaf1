//! Deterministic identification of pipeline inputs (dataset fingerprints).
//!
//! The hash is BLAKE3 over the canonical JSON encoding of the input records,
//! so the same table yields the same fingerprint whether it came from the
//! embedded sample or from an uploaded CSV with identical values.

use serde::Serialize;

/// Hex BLAKE3 hash of the JSON-encoded records.
pub fn dataset_hash<T: Serialize>(records: &[T]) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(records)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        fund: &'static str,
        cash: f64,
    }

    #[test]
    fn identical_records_hash_identically() {
        let a = [Row { fund: "Quỹ 1", cash: 12.0 }];
        let b = [Row { fund: "Quỹ 1", cash: 12.0 }];
        assert_eq!(dataset_hash(&a).unwrap(), dataset_hash(&b).unwrap());
    }

    #[test]
    fn value_change_changes_hash() {
        let a = [Row { fund: "Quỹ 1", cash: 12.0 }];
        let b = [Row { fund: "Quỹ 1", cash: 12.5 }];
        assert_ne!(dataset_hash(&a).unwrap(), dataset_hash(&b).unwrap());
    }

    #[test]
    fn hash_is_hex() {
        let h = dataset_hash(&[Row { fund: "x", cash: 1.0 }]).unwrap();
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
