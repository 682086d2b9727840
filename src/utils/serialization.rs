// Bincode helpers for the key store file
use crate::error::{Result, SendError};
use serde::{Deserialize, Serialize};

/// Serialize data using bincode 2.0 with standard configuration
pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| SendError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize data using bincode 2.0 with standard configuration
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let config = bincode::config::standard();
    let (data, _) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| SendError::Serialization(format!("Deserialization failed: {e}")))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
    struct StoredKey {
        ciphertext: Vec<u8>,
        nonce: Vec<u8>,
    }

    #[test]
    fn test_serialize_deserialize_map() {
        let mut entries = HashMap::new();
        entries.insert(
            "WYBwT3xLpDnHNtYZiU52oanupVeDKhAvNp".to_string(),
            StoredKey {
                ciphertext: vec![1, 2, 3],
                nonce: vec![0; 12],
            },
        );

        let bytes = serialize(&entries).expect("Serialization should work");
        let decoded: HashMap<String, StoredKey> =
            deserialize(&bytes).expect("Deserialization should work");

        assert_eq!(entries, decoded);
    }

    #[test]
    fn test_deserialize_invalid_data() {
        let invalid_bytes = vec![0xFF, 0xFF, 0xFF, 0xFF];
        let result: Result<StoredKey> = deserialize(&invalid_bytes);
        assert!(result.is_err());
    }
}
