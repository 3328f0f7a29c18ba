use std::collections::HashMap;
use std::sync::Mutex;

/// Errors surfaced by a [`BuilderCache`] implementation.
///
/// Cache failures are never fatal to a build: the builder logs them as
/// warnings and falls back to building from scratch.
pub type CacheError = Box<dyn std::error::Error + Send + Sync>;

/// A black-box key/value store of serialized DFAs keyed by build digests.
///
/// The builder computes a deterministic digest of its build request and
/// asks the cache for a previously built DFA under that key; on a miss it
/// builds and offers the result back. The cache is responsible for its
/// own synchronization; the digest/build sequence is not atomic, so an
/// implementation may see a redundant `maybe_cache_item` for a key it
/// already holds and can ignore it (builds are idempotent).
pub trait BuilderCache: Send + Sync {
    /// Fetch the serialized DFA stored under `key`, if any.
    fn get_cached_item(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Offer a freshly built DFA for storage under `key`.
    fn maybe_cache_item(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError>;
}

/// A trivial in-memory [`BuilderCache`], mostly useful in tests and as a
/// per-process memo.
#[derive(Debug, Default)]
pub struct MemoryCache {
    items: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> MemoryCache {
        MemoryCache::default()
    }

    /// The keys stored so far, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        match self.items.lock() {
            Ok(items) => items.keys().cloned().collect(),
            Err(_) => vec![],
        }
    }

    pub fn len(&self) -> usize {
        match self.items.lock() {
            Ok(items) => items.len(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BuilderCache for MemoryCache {
    fn get_cached_item(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let items = self.items.lock().map_err(|_| "cache mutex poisoned")?;
        Ok(items.get(key).cloned())
    }

    fn maybe_cache_item(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let mut items = self.items.lock().map_err(|_| "cache mutex poisoned")?;
        items.entry(key.to_string()).or_insert_with(|| bytes.to_vec());
        Ok(())
    }
}

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Encode bytes in RFC 4648 base32, without padding.
pub(crate) fn base32(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8 + 4) / 5);
    let mut acc: u32 = 0;
    let mut bits = 0;
    for &b in bytes {
        acc = (acc << 8) | b as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[(acc >> bits) as usize & 0x1F] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[(acc << (5 - bits)) as usize & 0x1F] as char);
    }
    out
}
