//! Serde helpers for loosely typed backend payloads

use serde::{Deserialize, Deserializer};

/// Treat an explicit `null` like a missing field
///
/// Pair with `#[serde(default)]` so both absent and null fall back to
/// `T::default()`.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Counter {
        #[serde(default, deserialize_with = "null_as_default")]
        count: u32,
        #[serde(default, deserialize_with = "null_as_default")]
        items: Vec<String>,
    }

    #[test]
    fn test_null_and_missing_fall_back() {
        let counter: Counter = serde_json::from_str(r#"{"count":null,"items":null}"#).unwrap();
        assert_eq!(counter.count, 0);
        assert!(counter.items.is_empty());

        let counter: Counter = serde_json::from_str("{}").unwrap();
        assert_eq!(counter.count, 0);

        let counter: Counter = serde_json::from_str(r#"{"count":4,"items":["a"]}"#).unwrap();
        assert_eq!((counter.count, counter.items.len()), (4, 1));
    }
}
