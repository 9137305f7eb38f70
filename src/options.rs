///
/// Boot-time configuration.
///
/// All knobs are fixed when the VM is created; none of them may be changed
/// while code is running.
///
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Max polymorphic inline cache entries per call site.
    pub dispatch_cache_limit: usize,
    /// Max entries held in the packed hash representation.
    pub hash_packed_max: usize,
    /// Bucket-count multiplier applied on hash resize.
    pub hash_bucket_overallocate: usize,
    /// Bucket load factor above which a hash resizes.
    pub hash_load_factor: f64,
    /// Try the linear-time regexp matcher before the backtracking one.
    pub regexp_use_fast_path: bool,
    /// Run both regexp engines and compare their group boundaries.
    pub regexp_compare_engines: bool,
    /// Report each fall-back from the fast regexp path.
    pub regexp_warn_fallback: bool,
    /// Tally regexp compilations per (source, encoding, flags).
    pub regexp_instrument_creation: bool,
    /// Tally regexp match attempts per (source, encoding, flags).
    pub regexp_instrument_match: bool,
    /// Clone the call target when inlining `method_missing`.
    pub method_missing_always_clone: bool,
    /// Force inlining of `method_missing` call targets.
    pub method_missing_always_inline: bool,
    /// Entries per foreign-member write cache.
    pub interop_write_cache: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeOptions {
            dispatch_cache_limit: 8,
            hash_packed_max: 3,
            hash_bucket_overallocate: 4,
            hash_load_factor: 0.75,
            regexp_use_fast_path: true,
            regexp_compare_engines: false,
            regexp_warn_fallback: false,
            regexp_instrument_creation: false,
            regexp_instrument_match: false,
            method_missing_always_clone: true,
            method_missing_always_inline: true,
            interop_write_cache: 8,
        }
    }
}

impl RuntimeOptions {
    /// The packed store is backed by fixed-capacity inline storage, so the
    /// configurable bound can not exceed it.
    pub const PACKED_CAPACITY: usize = 8;

    pub fn validate(&self) -> Result<(), String> {
        if self.hash_packed_max == 0 || self.hash_packed_max > Self::PACKED_CAPACITY {
            return Err(format!(
                "hash-packed-max must be in 1..={}. (given {})",
                Self::PACKED_CAPACITY,
                self.hash_packed_max
            ));
        }
        if !(0.0..1.0).contains(&self.hash_load_factor) || self.hash_load_factor <= 0.0 {
            return Err(format!(
                "hash-load-factor must be in (0.0, 1.0). (given {})",
                self.hash_load_factor
            ));
        }
        if self.dispatch_cache_limit == 0 {
            return Err("dispatch-cache-limit must be positive.".to_string());
        }
        Ok(())
    }
}
