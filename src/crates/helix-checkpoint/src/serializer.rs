use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Protocol for serializing and deserializing checkpoint data
///
/// Backends use it both for their on-disk encoding and for computing the
/// state fingerprint stored on every checkpoint.
pub trait SerializerProtocol: Send + Sync {
    /// Serialize a value to bytes
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from bytes
    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T>;

    /// Serialize to JSON value (for compatibility)
    fn dumps_json<T: Serialize>(&self, value: &T) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(value)?)
    }
}

/// JSON-based serializer (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for JsonSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Snapshot {
        task: String,
        remaining: u64,
    }

    #[test]
    fn test_json_serializer() {
        let serializer = JsonSerializer::new();
        let data = Snapshot {
            task: "plan trip".to_string(),
            remaining: 500,
        };

        let bytes = serializer.dumps(&data).unwrap();
        let restored: Snapshot = serializer.loads(&bytes).unwrap();
        assert_eq!(data, restored);

        let json = serializer.dumps_json(&data).unwrap();
        assert_eq!(json["remaining"], 500);
    }

    #[test]
    fn test_loads_rejects_garbage() {
        let serializer = JsonSerializer::new();
        let result: Result<Snapshot> = serializer.loads(b"{not json");
        assert!(result.is_err());
    }
}
