//! Serde helpers for byte fields.
//!
//! JSON has no byte type and serde's default turns `Vec<u8>` into an array
//! of numbers, which is neither compact nor what the RPC peer expects.
//! Every byte field the engine puts on the wire goes through one of these
//! and travels as lowercase hex.
//!
//! ```ignore
//! #[derive(Serialize, Deserialize)]
//! struct Record {
//!     #[serde(with = "crate::encoding::hex_vec")]
//!     payload: Vec<u8>,
//!     #[serde(with = "crate::encoding::hex_array")]
//!     digest: [u8; 32],
//! }
//! ```

/// `Vec<u8>` as a hex string.
pub mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// `[u8; 32]` as a 64-character hex string.
pub mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out).map_err(serde::de::Error::custom)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        #[serde(with = "super::hex_vec")]
        payload: Vec<u8>,
        #[serde(with = "super::hex_array")]
        digest: [u8; 32],
    }

    #[test]
    fn test_hex_fields() {
        let sample = Sample {
            payload: vec![0xca, 0xfe],
            digest: [0x11; 32],
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["payload"], "cafe");
        assert_eq!(json["digest"], "11".repeat(32));
        assert_eq!(serde_json::from_value::<Sample>(json).unwrap(), sample);
    }

    #[test]
    fn test_rejects_short_digest() {
        let json = serde_json::json!({"payload": "", "digest": "abcd"});
        assert!(serde_json::from_value::<Sample>(json).is_err());
    }
}
