//! Serialize a `BTreeMap` as a list of `(key, value)` pairs.
//!
//! JSON objects only allow string keys; durable state is keyed by tuples.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

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
    let entries: Vec<(K, V)> = Vec::deserialize(deserializer)?;
    Ok(entries.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "super")]
        map: BTreeMap<(u16, i32), u64>,
    }

    #[test]
    fn test_tuple_keys_survive_json() {
        let mut map = BTreeMap::new();
        map.insert((1, -5), 10);
        map.insert((2, 7), 20);
        let holder = Holder { map };

        let json = serde_json::to_string(&holder).unwrap();
        assert_eq!(json, r#"{"map":[[[1,-5],10],[[2,7],20]]}"#);
        let back: Holder = serde_json::from_str(&json).unwrap();
        assert_eq!(back, holder);
    }
}
