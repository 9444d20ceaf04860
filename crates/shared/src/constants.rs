//! Constants shared across the workspace

/// Default plaintext modulus of the exact scheme: a 55-bit prime congruent to
/// 1 modulo 2^15, so it supports SIMD packing for every degree up to 16384
pub const DEFAULT_PLAINTEXT_MODULUS: u64 = 18_014_398_510_661_633;

/// Default per-multiplication scale of the approximate scheme (Δ = 2^40)
pub const DEFAULT_SCALE_BITS: u32 = 40;

/// Default tolerance for approximate results
pub const DEFAULT_TOLERANCE: f64 = 1e-2;

/// Default number of decimal digits kept by the additive scheme's fixed-point encoding
pub const DEFAULT_FIXED_POINT_DIGITS: u32 = 2;

/// Largest ciphertext slot a 4-byte big-endian length prefix can describe
pub const MAX_SLOT_LEN: usize = u32::MAX as usize;
