/// Hash functions and consistent-hashing rings for client-side sharding
pub mod ring;

pub use ring::{HashRing, RingLayout};

use crate::error::{ConfigError, ShardwireError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MIXING_SEED: u32 = 0xe17a_1465;
const MIXING_M: u64 = 0xc6a4_a793_5bd1_e995;
const MIXING_R: u32 = 47;

/// MD5 of `data`, first four digest bytes read little-endian.
pub fn md5_hash(data: &[u8]) -> u64 {
    let digest = md5::compute(data);
    u64::from(u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]))
}

/// 64-bit multiply-xor-shift mixing hash (MurmurHash64A) with the default seed.
pub fn mixing64(data: &[u8]) -> u64 {
    mixing64_with_seed(data, MIXING_SEED)
}

pub fn mixing64_with_seed(data: &[u8], seed: u32) -> u64 {
    let mut h = u64::from(seed) ^ (data.len() as u64).wrapping_mul(MIXING_M);

    let mut words = data.chunks_exact(8);
    for word in &mut words {
        let mut k = u64::from_le_bytes([
            word[0], word[1], word[2], word[3], word[4], word[5], word[6], word[7],
        ]);
        k = k.wrapping_mul(MIXING_M);
        k ^= k >> MIXING_R;
        k = k.wrapping_mul(MIXING_M);

        h ^= k;
        h = h.wrapping_mul(MIXING_M);
    }

    let tail = words.remainder();
    if !tail.is_empty() {
        for (i, &b) in tail.iter().enumerate().rev() {
            h ^= u64::from(b) << (8 * i);
        }
        h = h.wrapping_mul(MIXING_M);
    }

    h ^= h >> MIXING_R;
    h = h.wrapping_mul(MIXING_M);
    h ^= h >> MIXING_R;
    h
}

/// Hash function used for ring points and key lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Mixing64,
}

impl HashAlgorithm {
    pub fn hash(&self, data: &[u8]) -> u64 {
        match self {
            HashAlgorithm::Md5 => md5_hash(data),
            HashAlgorithm::Mixing64 => mixing64(data),
        }
    }
}

/// Ring flavour selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashingStrategy {
    /// Plain layout, mixing hash
    #[default]
    Plain,
    /// Ketama layout, MD5 lookups
    Ketama,
    /// Plain layout, MD5 hash
    Md5,
    /// Same as `Plain`
    Mixing64,
}

impl HashingStrategy {
    pub fn layout(&self) -> RingLayout {
        match self {
            HashingStrategy::Ketama => RingLayout::Ketama,
            HashingStrategy::Plain | HashingStrategy::Md5 | HashingStrategy::Mixing64 => RingLayout::Plain,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            HashingStrategy::Ketama | HashingStrategy::Md5 => HashAlgorithm::Md5,
            HashingStrategy::Plain | HashingStrategy::Mixing64 => HashAlgorithm::Mixing64,
        }
    }
}

impl fmt::Display for HashingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashingStrategy::Plain => "plain",
            HashingStrategy::Ketama => "ketama",
            HashingStrategy::Md5 => "md5",
            HashingStrategy::Mixing64 => "mixing64",
        };
        f.write_str(name)
    }
}

impl FromStr for HashingStrategy {
    type Err = ShardwireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(HashingStrategy::Plain),
            "ketama" => Ok(HashingStrategy::Ketama),
            "md5" => Ok(HashingStrategy::Md5),
            "mixing64" => Ok(HashingStrategy::Mixing64),
            other => Err(ConfigError::ValidationError(format!(
                "Unknown hashing algorithm '{}', expected plain, ketama, md5 or mixing64",
                other
            ))
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixing64_reference_values() {
        assert_eq!(
            mixing64(b"Lorem ipsum dolor sit amet, consectetur adipisicing elit"),
            0x0920_e0c1_b7ee_b261
        );
        assert_eq!(
            mixing64(&[0xed, 0x53, 0xc4, 0xa5, 0x3b, 0x1b, 0xbd, 0xc2, 0x52, 0x7d, 0xc3, 0xef, 0x53, 0x5f, 0xae, 0x3b]),
            0x4987_cb15_118a_83d9
        );
        assert_eq!(
            mixing64(&[0x23, 0xa8, 0xb1, 0x87, 0x55, 0xf7, 0x8a, 0x4b]),
            0x0682_5c27_bc96_cf40
        );
        assert_eq!(mixing64(&[0x5b, 0x5d]), 0xd66a_e956_c14d_5212);
        assert_eq!(mixing64(&[0x7e]), 0x38ed_30ee_5161_200f);
        assert_eq!(mixing64(&[]), 0x9bfa_e0a4_e613_fc3c);
    }

    #[test]
    fn test_mixing64_custom_seed() {
        assert_eq!(
            mixing64_with_seed(&[0xeb, 0x25, 0x3f, 0x87], 0x344d_1f5c),
            0x0617_f431_bc1a_8e04
        );
    }

    #[test]
    fn test_md5_hash_uses_first_four_bytes() {
        // md5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(md5_hash(b""), 0xd98c_1dd4);
        assert!(md5_hash(b"any key") <= u64::from(u32::MAX));
    }

    #[test]
    fn test_strategy_parse_and_mapping() {
        assert_eq!("KETAMA".parse::<HashingStrategy>().unwrap(), HashingStrategy::Ketama);
        assert!("crc32".parse::<HashingStrategy>().is_err());

        assert_eq!(HashingStrategy::Plain.algorithm(), HashAlgorithm::Mixing64);
        assert_eq!(HashingStrategy::Mixing64.layout(), RingLayout::Plain);
        assert_eq!(HashingStrategy::Md5.algorithm(), HashAlgorithm::Md5);
        assert_eq!(HashingStrategy::Ketama.layout(), RingLayout::Ketama);
        assert_eq!(HashingStrategy::default(), HashingStrategy::Plain);
    }
}
