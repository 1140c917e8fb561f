use scdb_types::primitives::Hash;

/// Plain BLAKE3 digest.
pub fn blake3_hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// BLAKE3 in derive-key mode, so each ledger domain (proposal ids, CTIP
/// leaves, bundle leaves) hashes into a disjoint space.
pub fn blake3_hash_domain(context: &str, data: &[u8]) -> Hash {
    DomainHasher::new(context).bytes(data).finish()
}

/// Incremental hasher for fixed-layout records.
///
/// Fields are fed in order without length prefixes, so callers must only
/// feed fixed-width fields (or put the single variable-width one last).
pub struct DomainHasher {
    inner: blake3::Hasher,
}

impl DomainHasher {
    /// Start a hash in the given derive-key context.
    pub fn new(context: &str) -> Self {
        Self {
            inner: blake3::Hasher::new_derive_key(context),
        }
    }

    /// Start a hash with no domain, only a one-byte node prefix.
    pub fn tagged(prefix: u8) -> Self {
        let mut inner = blake3::Hasher::new();
        inner.update(&[prefix]);
        Self { inner }
    }

    pub fn byte(mut self, b: u8) -> Self {
        self.inner.update(&[b]);
        self
    }

    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.inner.update(data);
        self
    }

    pub fn u16_le(self, v: u16) -> Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn u32_le(self, v: u32) -> Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn u64_le(self, v: u64) -> Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn finish(self) -> Hash {
        *self.inner.finalize().as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_hash_matches_incremental() {
        let whole = blake3_hash_domain("scdb ctip", b"\x03abc");
        let parts = DomainHasher::new("scdb ctip").byte(3).bytes(b"abc").finish();
        assert_eq!(whole, parts);
    }

    #[test]
    fn test_domains_do_not_collide() {
        let data = b"slot 3 bundle";
        let ctip = blake3_hash_domain("scdb ctip", data);
        let bundle = blake3_hash_domain("scdb bundle", data);
        assert_ne!(ctip, bundle);
        assert_ne!(ctip, blake3_hash(data));
    }

    #[test]
    fn test_tagged_prefix_is_first_byte() {
        let tagged = DomainHasher::tagged(0x01).bytes(&[0xaa; 32]).finish();
        let mut raw = vec![0x01];
        raw.extend_from_slice(&[0xaa; 32]);
        assert_eq!(tagged, blake3_hash(&raw));
    }

    #[test]
    fn test_integer_fields_are_little_endian() {
        let a = DomainHasher::new("scdb bundle").u16_le(0x0102).finish();
        let b = DomainHasher::new("scdb bundle").bytes(&[0x02, 0x01]).finish();
        assert_eq!(a, b);
    }
}
