/// Consistent-hashing ring
///
/// A ring is built once from a shard list and never changed afterwards;
/// membership changes build a new ring.
use super::{HashAlgorithm, HashingStrategy};
use crate::core::ShardDescriptor;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Points per unit of weight in the plain layout
const PLAIN_POINTS_PER_WEIGHT: u64 = 160;
/// Digests per shard (times the shard count) in the Ketama layout
const KETAMA_POINTS_FACTOR: u64 = 40;

/// How the ring points of one shard are generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RingLayout {
    /// `160 * weight` points keyed `{name}*{weight}{n}` or
    /// `SHARD-{index}-NODE-{n}` for unnamed shards
    Plain,
    /// `40 * shards * weight / total_weight` MD5 digests of `{name}-{n}`,
    /// each split into four little-endian 32-bit points
    Ketama,
}

impl RingLayout {
    /// Ring points for the shard at `index`.
    pub fn points(
        &self,
        index: usize,
        shard: &ShardDescriptor,
        shard_count: usize,
        total_weight: u64,
        algorithm: HashAlgorithm,
    ) -> Vec<u64> {
        match self {
            RingLayout::Plain => {
                let count = PLAIN_POINTS_PER_WEIGHT * u64::from(shard.weight);
                (0..count)
                    .map(|n| {
                        let key = match &shard.name {
                            Some(name) => format!("{}*{}{}", name, shard.weight, n),
                            None => format!("SHARD-{}-NODE-{}", index, n),
                        };
                        algorithm.hash(key.as_bytes())
                    })
                    .collect()
            }
            RingLayout::Ketama => {
                let name = shard
                    .name
                    .clone()
                    .unwrap_or_else(|| shard.endpoint.to_string());
                let count = KETAMA_POINTS_FACTOR * shard_count as u64 * u64::from(shard.weight)
                    / total_weight.max(1);
                let mut points = Vec::with_capacity(count as usize * 4);
                for n in 0..count {
                    let digest = md5::compute(format!("{}-{}", name, n).as_bytes());
                    for quarter in digest.0.chunks_exact(4) {
                        let value = u32::from_le_bytes([quarter[0], quarter[1], quarter[2], quarter[3]]);
                        points.push(u64::from(value));
                    }
                }
                points
            }
        }
    }
}

/// Immutable hash ring snapshot
#[derive(Debug, Clone)]
pub struct HashRing {
    points: BTreeMap<u64, Arc<ShardDescriptor>>,
    shards: Vec<Arc<ShardDescriptor>>,
    strategy: HashingStrategy,
}

impl HashRing {
    pub fn build(shards: &[ShardDescriptor], strategy: HashingStrategy) -> Self {
        let layout = strategy.layout();
        let algorithm = strategy.algorithm();
        let total_weight: u64 = shards.iter().map(|s| u64::from(s.weight)).sum();

        let shards: Vec<Arc<ShardDescriptor>> = shards.iter().cloned().map(Arc::new).collect();
        let mut points = BTreeMap::new();
        for (index, shard) in shards.iter().enumerate() {
            for point in layout.points(index, shard, shards.len(), total_weight, algorithm) {
                points.insert(point, shard.clone());
            }
        }

        Self {
            points,
            shards,
            strategy,
        }
    }

    /// Shard owning `hash`: the first point at or after it, wrapping to the
    /// smallest point.
    pub fn locate(&self, hash: u64) -> Option<&Arc<ShardDescriptor>> {
        self.points
            .range(hash..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, shard)| shard)
    }

    /// Shard owning `key`, hashed with the ring's algorithm.
    pub fn resolve(&self, key: &[u8]) -> Option<&Arc<ShardDescriptor>> {
        self.locate(self.hash(key))
    }

    pub fn hash(&self, key: &[u8]) -> u64 {
        self.strategy.algorithm().hash(key)
    }

    pub fn shards(&self) -> &[Arc<ShardDescriptor>] {
        &self.shards
    }

    pub fn strategy(&self) -> HashingStrategy {
        self.strategy
    }

    /// Number of points on the ring
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Endpoint;
    use std::collections::HashMap;

    fn shard(name: &str, port: u16) -> ShardDescriptor {
        ShardDescriptor::new(Endpoint::new("127.0.0.1", port)).with_name(name)
    }

    #[test]
    fn test_ketama_two_equal_shards() {
        let ring = HashRing::build(&[shard("a", 1), shard("b", 2)], HashingStrategy::Ketama);
        assert_eq!(ring.len(), 320);
    }

    #[test]
    fn test_ketama_weights() {
        let heavy = shard("heavy", 1).with_weight(3);
        let light = shard("light", 2);
        let layout = RingLayout::Ketama;
        // 40 * 2 * 3 / 4 = 60 digests, 40 * 2 * 1 / 4 = 20 digests
        assert_eq!(layout.points(0, &heavy, 2, 4, HashAlgorithm::Md5).len(), 240);
        assert_eq!(layout.points(1, &light, 2, 4, HashAlgorithm::Md5).len(), 80);
    }

    #[test]
    fn test_ketama_point_layout() {
        let s = shard("node", 1);
        let points = RingLayout::Ketama.points(0, &s, 1, 1, HashAlgorithm::Md5);
        let digest = md5::compute(b"node-0");
        let first = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
        let fourth = u32::from_le_bytes([digest[12], digest[13], digest[14], digest[15]]);
        assert_eq!(points[0], u64::from(first));
        assert_eq!(points[3], u64::from(fourth));
    }

    #[test]
    fn test_plain_layout_keys() {
        let named = shard("cache", 1).with_weight(2);
        let points = RingLayout::Plain.points(0, &named, 1, 2, HashAlgorithm::Mixing64);
        assert_eq!(points.len(), 320);
        assert_eq!(points[0], HashAlgorithm::Mixing64.hash(b"cache*20"));

        let unnamed = ShardDescriptor::new(Endpoint::new("h", 1));
        let points = RingLayout::Plain.points(3, &unnamed, 4, 4, HashAlgorithm::Md5);
        assert_eq!(points[7], HashAlgorithm::Md5.hash(b"SHARD-3-NODE-7"));
    }

    #[test]
    fn test_locate_wraps_to_smallest() {
        let ring = HashRing::build(&[shard("a", 1), shard("b", 2)], HashingStrategy::Plain);
        let (&smallest, owner) = ring.points.iter().next().unwrap();
        let (&largest, _) = ring.points.iter().next_back().unwrap();

        assert_eq!(ring.locate(smallest).unwrap(), owner);
        if largest < u64::MAX {
            assert_eq!(ring.locate(largest + 1).unwrap(), owner);
        }
        assert_eq!(ring.locate(0).unwrap(), owner);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let shards = [shard("a", 1), shard("b", 2), shard("c", 3)];
        for strategy in [HashingStrategy::Plain, HashingStrategy::Ketama, HashingStrategy::Md5] {
            let ring = HashRing::build(&shards, strategy);
            let again = HashRing::build(&shards, strategy);
            for i in 0..100 {
                let key = format!("key:{}", i);
                assert_eq!(
                    ring.resolve(key.as_bytes()).unwrap().endpoint,
                    again.resolve(key.as_bytes()).unwrap().endpoint
                );
            }
        }
    }

    #[test]
    fn test_distribution_covers_all_shards() {
        let shards = [shard("a", 1), shard("b", 2), shard("c", 3)];
        let ring = HashRing::build(&shards, HashingStrategy::Plain);

        let mut counts: HashMap<u16, usize> = HashMap::new();
        for i in 0..3000 {
            let key = format!("user:{}", i);
            *counts.entry(ring.resolve(key.as_bytes()).unwrap().endpoint.port()).or_default() += 1;
        }
        assert_eq!(counts.len(), 3);
        for count in counts.values() {
            assert!(*count > 600, "uneven distribution: {:?}", counts);
        }
    }

    #[test]
    fn test_empty_ring() {
        let ring = HashRing::build(&[], HashingStrategy::Ketama);
        assert!(ring.is_empty());
        assert!(ring.resolve(b"key").is_none());
    }
}
