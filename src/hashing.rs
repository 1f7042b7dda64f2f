//! Key hashing and control-byte fingerprints.
//!
//! Keys are hashed according to what they are rather than through a
//! [`core::hash::Hasher`] pipeline:
//!
//! - integers are widened to `u64` and run through a fixed avalanche mix
//!   (128-bit integers mix their high half into the low half first),
//! - byte strings are hashed with 64-bit FNV-1a,
//! - anything else can opt in through [`DisplayKey`], which hashes the
//!   `Display` rendering with FNV-1a, or implement [`KeyHash`] directly.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;
use core::hash::Hasher;

use crate::control::DELETED;
use crate::control::EMPTY;

const FNV_OFFSET_BASIS: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

const MIX_C1: u64 = 0xbf58476d1ce4e5b9;
const MIX_C2: u64 = 0x94d049bb133111eb;

/// A key that can be stored in a [`HashTable`](crate::HashTable).
///
/// Implementations must be deterministic, and two keys that compare equal
/// must produce the same hash. Equality is structural and comes from the
/// [`Eq`] supertrait.
///
/// If a key type `K` implements [`Borrow<Q>`](core::borrow::Borrow), then `K`
/// and `Q` must hash identically for borrowed lookups to find anything. The
/// built-in implementations uphold this for `String`/`str`,
/// `Vec<u8>`/`[u8]`/`[u8; N]`, `Box<T>`/`T` and `&T`/`T`.
///
/// # Examples
///
/// ```rust
/// use ctrl_table::HashTable;
/// use ctrl_table::KeyHash;
/// use ctrl_table::hashing::Fnv1a;
/// use core::hash::Hasher;
///
/// #[derive(PartialEq, Eq)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// impl KeyHash for Point {
///     fn key_hash(&self) -> u64 {
///         let mut hasher = Fnv1a::new();
///         hasher.write_i32(self.x);
///         hasher.write_i32(self.y);
///         hasher.finish()
///     }
/// }
///
/// let mut table = HashTable::with_capacity(16);
/// table.put(Point { x: 1, y: 2 }, "a");
/// assert_eq!(table.get(&Point { x: 1, y: 2 }), Some(&"a"));
/// ```
pub trait KeyHash: Eq {
    /// Returns the 64-bit hash of this key.
    fn key_hash(&self) -> u64;
}

/// Avalanche mix applied to integer keys after widening to 64 bits.
#[inline]
pub fn mix64(x: u64) -> u64 {
    let x = (x ^ (x >> 30)).wrapping_mul(MIX_C1);
    let x = (x ^ (x >> 27)).wrapping_mul(MIX_C2);
    x ^ (x >> 31)
}

/// 64-bit FNV-1a over `bytes`.
#[inline]
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hasher = Fnv1a::new();
    hasher.write(bytes);
    hasher.finish()
}

/// Hashes the `Display` rendering of `value` with FNV-1a.
///
/// The rendering is streamed into the hasher, so no intermediate `String` is
/// built. The result equals `fnv1a(value.to_string().as_bytes())`.
pub fn hash_display<T: Display + ?Sized>(value: &T) -> u64 {
    let mut hasher = Fnv1a::new();
    // Writing into the hasher cannot fail; an error here can only come from a
    // misbehaving `Display` impl, in which case the partial rendering is used.
    let _ = fmt::write(&mut hasher, format_args!("{value}"));
    hasher.finish()
}

/// Incremental 64-bit FNV-1a.
///
/// Also usable as a [`Hasher`] for composite keys implementing [`KeyHash`] by
/// hand, and as a [`fmt::Write`] sink.
#[derive(Clone, Copy, Debug)]
pub struct Fnv1a {
    state: u64,
}

impl Fnv1a {
    /// Creates a hasher seeded with the FNV offset basis.
    pub const fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }
}

impl Default for Fnv1a {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Fnv1a {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.state
    }
}

impl fmt::Write for Fnv1a {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Hasher::write(self, s.as_bytes());
        Ok(())
    }
}

/// Derives the 7-bit fingerprint stored in a slot's control byte.
///
/// The two values that would collide with [`EMPTY`] (after masking) or
/// [`DELETED`] are remapped to `0x01`.
#[inline(always)]
pub(crate) fn fingerprint(hash: u64) -> u8 {
    let fp = (hash & 0x7F) as u8;
    if fp == EMPTY & 0x7F || fp == DELETED {
        1
    } else {
        fp
    }
}

macro_rules! impl_integer_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl KeyHash for $ty {
                #[inline]
                fn key_hash(&self) -> u64 {
                    mix64(*self as u64)
                }
            }
        )*
    };
}

impl_integer_key!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, bool, char);

macro_rules! impl_wide_integer_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl KeyHash for $ty {
                /// Folds the high half into the low half. Values that fit in
                /// 64 bits hash like the same value as a `u64`.
                #[inline]
                fn key_hash(&self) -> u64 {
                    let wide = *self as u128;
                    mix64((wide as u64) ^ mix64((wide >> 64) as u64))
                }
            }
        )*
    };
}

impl_wide_integer_key!(u128, i128);

impl KeyHash for str {
    #[inline]
    fn key_hash(&self) -> u64 {
        fnv1a(self.as_bytes())
    }
}

impl KeyHash for String {
    #[inline]
    fn key_hash(&self) -> u64 {
        fnv1a(self.as_bytes())
    }
}

impl KeyHash for [u8] {
    #[inline]
    fn key_hash(&self) -> u64 {
        fnv1a(self)
    }
}

impl<const N: usize> KeyHash for [u8; N] {
    #[inline]
    fn key_hash(&self) -> u64 {
        fnv1a(self)
    }
}

impl KeyHash for Vec<u8> {
    #[inline]
    fn key_hash(&self) -> u64 {
        fnv1a(self)
    }
}

impl<T: KeyHash + ?Sized> KeyHash for &T {
    #[inline]
    fn key_hash(&self) -> u64 {
        (**self).key_hash()
    }
}

impl<T: KeyHash + ?Sized> KeyHash for Box<T> {
    #[inline]
    fn key_hash(&self) -> u64 {
        (**self).key_hash()
    }
}

/// `None` hashes as FNV-1a over empty input and only equals `None`.
impl<T: KeyHash> KeyHash for Option<T> {
    #[inline]
    fn key_hash(&self) -> u64 {
        match self {
            Some(key) => key.key_hash(),
            None => FNV_OFFSET_BASIS,
        }
    }
}

/// Wraps any `Display + Eq` value so it can be used as a key.
///
/// The hash is FNV-1a over the rendered text. This is the slow path: every
/// hash renders the value, and distinct values with the same rendering always
/// collide (they are still told apart by `Eq`).
///
/// # Examples
///
/// ```rust
/// use ctrl_table::DisplayKey;
/// use ctrl_table::HashTable;
///
/// let mut table = HashTable::with_capacity(16);
/// table.put(DisplayKey('x'), "ex");
/// table.put(DisplayKey('y'), "why");
///
/// assert_eq!(table.get(&DisplayKey('x')), Some(&"ex"));
/// assert_eq!(table.get(&DisplayKey('z')), None);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisplayKey<T>(pub T);

impl<T> DisplayKey<T> {
    /// Unwraps the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for DisplayKey<T> {
    fn from(value: T) -> Self {
        DisplayKey(value)
    }
}

impl<T: Display> Display for DisplayKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: Display + Eq> KeyHash for DisplayKey<T> {
    #[inline]
    fn key_hash(&self) -> u64 {
        hash_display(&self.0)
    }
}
