//! JSON encoding of stored records.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ClusterStateError, ClusterStateResult};

pub fn encode<T: Serialize>(value: &T) -> ClusterStateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ClusterStateError::Serialize(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(path: &str, bytes: &[u8]) -> ClusterStateResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| ClusterStateError::Deserialize(format!("{path}: {e}")))
}

/// Serde adapter storing a map as a list of `(key, value)` pairs, for maps
/// whose keys are not strings.
pub mod pairs {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        V: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let entries = Vec::<(K, V)>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reports_path_on_garbage() {
        let err = decode::<u64>("/storm/backpressure/t1/n-1", b"not json").unwrap_err();
        match err {
            ClusterStateError::Deserialize(msg) => assert!(msg.contains("/storm/backpressure")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
