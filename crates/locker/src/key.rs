//! 锁名编码
//!
//! PostgreSQL 的 `pg_advisory_lock(int4, int4)` 以两个 32 位整数作为锁标识。
//! 单个 32 位哈希面对开放的命名空间冲突率太高，因此对锁名的 UTF-8 字节
//! 分别计算两种互相独立的哈希（默认 FNV-1a 与 MurmurHash3），两个分量同时
//! 冲突的概率约为两者各自冲突概率的乘积（约 2^-64）。
//!
//! 冲突不是正确性问题：两个不同的锁名落到同一对整数上，只是让它们在后端
//! 竞争同一把锁，降低并发度，但不会破坏任何一个锁名的互斥性。要彻底消除
//! 冲突需要比后端提供的更大的键空间，所以这里不做处理。

use std::fmt;
use std::io::{self, Cursor};
use std::sync::Arc;

/// 32 位哈希函数
///
/// 作为可替换的配置点，集成方可以换成自己的哈希族。
/// 实现必须是确定性的：相同输入在任何进程里都得到相同输出。
pub trait Hash32: Send + Sync {
    fn sum32(&self, bytes: &[u8]) -> io::Result<u32>;
}

/// FNV-1a 32 位
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv1a32;

impl Fnv1a32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
}

impl Hash32 for Fnv1a32 {
    fn sum32(&self, bytes: &[u8]) -> io::Result<u32> {
        Ok(bytes.iter().fold(Self::OFFSET_BASIS, |hash, byte| {
            (hash ^ u32::from(*byte)).wrapping_mul(Self::PRIME)
        }))
    }
}

/// MurmurHash3 x86_32
#[derive(Debug, Clone, Copy, Default)]
pub struct Murmur3 {
    pub seed: u32,
}

impl Murmur3 {
    pub fn with_seed(seed: u32) -> Self {
        Self { seed }
    }
}

impl Hash32 for Murmur3 {
    fn sum32(&self, bytes: &[u8]) -> io::Result<u32> {
        murmur3::murmur3_32(&mut Cursor::new(bytes), self.seed)
    }
}

/// PostgreSQL advisory lock 的原生标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdvisoryKey {
    pub a: i32,
    pub b: i32,
}

impl AdvisoryKey {
    pub fn new(a: i32, b: i32) -> Self {
        Self { a, b }
    }
}

impl fmt::Display for AdvisoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.a, self.b)
    }
}

/// 把字符串锁名映射为 `AdvisoryKey`
#[derive(Clone)]
pub struct KeyEncoder {
    hash_a: Arc<dyn Hash32>,
    hash_b: Arc<dyn Hash32>,
}

impl KeyEncoder {
    pub fn new(hash_a: impl Hash32 + 'static, hash_b: impl Hash32 + 'static) -> Self {
        Self {
            hash_a: Arc::new(hash_a),
            hash_b: Arc::new(hash_b),
        }
    }

    /// 计算锁名对应的整数对
    ///
    /// `u32` 按位转换为 `i32`，与其他按同一方案实现的客户端得到相同的标识。
    pub fn encode(&self, key: &str) -> io::Result<AdvisoryKey> {
        let a = self.hash_a.sum32(key.as_bytes())?;
        let b = self.hash_b.sum32(key.as_bytes())?;
        Ok(AdvisoryKey::new(a as i32, b as i32))
    }
}

impl Default for KeyEncoder {
    fn default() -> Self {
        Self::new(Fnv1a32, Murmur3::default())
    }
}

impl fmt::Debug for KeyEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEncoder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a32_known_values() {
        assert_eq!(Fnv1a32.sum32(b"").unwrap(), 0x811c_9dc5);
        assert_eq!(Fnv1a32.sum32(b"a").unwrap(), 0xe40c_292c);
        assert_eq!(Fnv1a32.sum32(b"foobar").unwrap(), 0xbf9c_f968);
    }

    #[test]
    fn test_murmur3_known_values() {
        assert_eq!(Murmur3::default().sum32(b"").unwrap(), 0);
        assert_eq!(Murmur3::default().sum32(b"hello").unwrap(), 613_153_351);
        assert_ne!(
            Murmur3::with_seed(1).sum32(b"hello").unwrap(),
            Murmur3::default().sum32(b"hello").unwrap()
        );
    }

    #[test]
    fn test_encode_is_deterministic() {
        let encoder = KeyEncoder::default();
        let first = encoder.encode("orders/42").unwrap();
        let second = KeyEncoder::default().encode("orders/42").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_encode_reinterprets_bits() {
        // FNV-1a("") = 0x811c9dc5，最高位为 1，转换后为负数
        let key = KeyEncoder::default().encode("").unwrap();
        assert_eq!(key, AdvisoryKey::new(0x811c_9dc5_u32 as i32, 0));
        assert!(key.a < 0);
    }

    #[test]
    fn test_components_use_different_hashes() {
        let key = KeyEncoder::default().encode("costarring").unwrap();
        assert_ne!(key.a, key.b);
    }

    #[test]
    fn test_custom_hash_pair() {
        struct Constant(u32);

        impl Hash32 for Constant {
            fn sum32(&self, _bytes: &[u8]) -> io::Result<u32> {
                Ok(self.0)
            }
        }

        let encoder = KeyEncoder::new(Constant(7), Constant(u32::MAX));
        assert_eq!(encoder.encode("any").unwrap(), AdvisoryKey::new(7, -1));
    }

    #[test]
    fn test_known_fuzz_corpus_pairs_do_not_collide() {
        let encoder = KeyEncoder::default();
        let corpus = [
            ("costarring", "liquid"),
            ("declinate", "macallums"),
            ("altarage", "zinke"),
            ("altarages", "zinkes"),
        ];
        for (left, right) in corpus {
            let (left_key, right_key) = (encoder.encode(left).unwrap(), encoder.encode(right).unwrap());
            // 这些是已知的 FNV-1a 32 冲突对，第二个哈希必须把它们区分开
            assert_eq!(left_key.a, right_key.a);
            assert_ne!(left_key, right_key, "{left} 与 {right} 不应同时冲突");
        }
    }
}
