//! Fixed-width identifiers used throughout the engine.
//!
//! All four id types are thin newtypes over byte arrays. They carry no
//! behavior beyond hex (de)serialization and the orderings the facade
//! needs (`ListAddresses` returns addresses in ascending order, index
//! collections are keyed on `BlockHash`).

use std::fmt;

/// 16-byte chain identifier. Distinct chains are fully isolated across all
/// per-chain collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct ChainId(pub [u8; 16]);

/// 32-byte block digest. Key into the blob store's `block/` and `state/`
/// namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct BlockHash(pub [u8; 32]);

/// 32-byte transaction identifier. Key into the transaction store's path
/// layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct TxId(pub [u8; 32]);

/// 20-byte account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Address(pub [u8; 20]);

macro_rules! hex_id {
    ($ty:ident, $len:expr) => {
        impl $ty {
            /// Number of raw bytes in this identifier.
            pub const LEN: usize = $len;

            /// Lowercase hex encoding, used for collection-name suffixes,
            /// namespace keys, and path components.
            pub fn to_hex(self) -> String {
                hex::encode(self.0)
            }

            /// Parse a lowercase (or mixed-case) hex string of the expected
            /// length into this identifier. Returns `None` on malformed
            /// input rather than an error: callers treat unparsable path
            /// entries as "not one of ours" and skip them.
            pub fn from_hex(s: &str) -> Option<Self> {
                if s.len() != $len * 2 {
                    return None;
                }
                let mut bytes = [0u8; $len];
                hex::decode_to_slice(s, &mut bytes).ok()?;
                Some($ty(bytes))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl AsRef<[u8]> for $ty {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

hex_id!(ChainId, 16);
hex_id!(BlockHash, 32);
hex_id!(TxId, 32);
hex_id!(Address, 20);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_hex() {
        let h = BlockHash([0xab; 32]);
        let s = h.to_hex();
        assert_eq!(s.len(), 64);
        assert_eq!(BlockHash::from_hex(&s), Some(h));
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(TxId::from_hex("ab"), None);
        assert_eq!(TxId::from_hex(&"ab".repeat(31)), None);
    }

    #[test]
    fn rejects_non_hex() {
        assert_eq!(Address::from_hex(&"zz".repeat(20)), None);
    }

    #[test]
    fn orders_addresses_lexicographically() {
        let mut addrs = vec![Address([2; 20]), Address([1; 20]), Address([3; 20])];
        addrs.sort();
        assert_eq!(addrs, vec![Address([1; 20]), Address([2; 20]), Address([3; 20])]);
    }
}
