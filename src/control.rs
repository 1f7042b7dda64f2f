//! Control-byte encoding and 16-wide group scans.
//!
//! Every slot of a table owns one control byte. The array carries
//! [`GROUP_SIZE`] extra bytes past the last slot that mirror the first
//! [`GROUP_SIZE`] control bytes, so a group can be loaded starting at any slot
//! index and still observe the wrapped-around slots in probe order.

/// Special control byte marking a slot that has not held a value since the
/// storage was allocated or cleared.
///
/// Chosen as 0x80 (sign bit set) so SSE2 `movemask` scans can use the sign
/// bit alone to find empty slots: neither fingerprints nor [`DELETED`] set it.
pub const EMPTY: u8 = 0x80;

/// Tombstone left behind by a removal. Never terminates a probe.
pub const DELETED: u8 = 0x7F;

/// Number of control bytes inspected per group load, and the width of the
/// mirrored padding at the end of the control array.
pub const GROUP_SIZE: usize = 16;

/// Returns `true` if the control byte is a fingerprint, meaning the slot holds
/// a live entry.
#[inline(always)]
pub(crate) fn is_full(ctrl: u8) -> bool {
    ctrl < DELETED
}

/// A set of slot offsets within one group, lowest offset first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BitMask(u16);

impl BitMask {
    #[inline(always)]
    pub(crate) fn lowest_set_bit(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    /// Drops every offset at or past `limit`.
    #[inline(always)]
    pub(crate) fn below(self, limit: usize) -> Self {
        if limit >= GROUP_SIZE {
            self
        } else {
            BitMask(self.0 & ((1u16 << limit) - 1))
        }
    }
}

impl Iterator for BitMask {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<usize> {
        let bit = self.lowest_set_bit()?;
        self.0 &= self.0 - 1;
        Some(bit)
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))] {
        use core::arch::x86_64::__m128i;
        use core::arch::x86_64::_mm_cmpeq_epi8;
        use core::arch::x86_64::_mm_loadu_si128;
        use core::arch::x86_64::_mm_movemask_epi8;
        use core::arch::x86_64::_mm_set1_epi8;

        /// Sixteen consecutive control bytes held in an SSE2 register.
        #[derive(Clone, Copy)]
        pub(crate) struct Group(__m128i);

        impl Group {
            /// Loads the group starting at `ptr`.
            ///
            /// # Safety
            ///
            /// `ptr` must be valid for reads of [`GROUP_SIZE`] bytes. No
            /// alignment is required.
            #[inline(always)]
            pub(crate) unsafe fn load(ptr: *const u8) -> Self {
                // SAFETY: Caller guarantees GROUP_SIZE readable bytes; the load is
                // unaligned.
                unsafe { Group(_mm_loadu_si128(ptr as *const __m128i)) }
            }

            #[inline(always)]
            pub(crate) fn match_byte(self, byte: u8) -> BitMask {
                // SAFETY: SSE2 is statically enabled for this target.
                unsafe {
                    let cmp = _mm_cmpeq_epi8(self.0, _mm_set1_epi8(byte as i8));
                    BitMask(_mm_movemask_epi8(cmp) as u16)
                }
            }

            /// Offsets holding [`EMPTY`]. Relies on EMPTY being the only
            /// control byte with the sign bit set.
            #[inline(always)]
            pub(crate) fn match_empty(self) -> BitMask {
                // SAFETY: SSE2 is statically enabled for this target.
                unsafe { BitMask(_mm_movemask_epi8(self.0) as u16) }
            }
        }
    } else {
        /// Sixteen consecutive control bytes, scanned one at a time.
        #[derive(Clone, Copy)]
        pub(crate) struct Group([u8; GROUP_SIZE]);

        impl Group {
            /// Loads the group starting at `ptr`.
            ///
            /// # Safety
            ///
            /// `ptr` must be valid for reads of [`GROUP_SIZE`] bytes. No
            /// alignment is required.
            #[inline(always)]
            pub(crate) unsafe fn load(ptr: *const u8) -> Self {
                // SAFETY: Caller guarantees GROUP_SIZE readable bytes.
                unsafe { Group(ptr.cast::<[u8; GROUP_SIZE]>().read_unaligned()) }
            }

            #[inline(always)]
            pub(crate) fn match_byte(self, byte: u8) -> BitMask {
                let mut bits: u16 = 0;
                for (i, &ctrl) in self.0.iter().enumerate() {
                    if ctrl == byte {
                        bits |= 1 << i;
                    }
                }
                BitMask(bits)
            }

            #[inline(always)]
            pub(crate) fn match_empty(self) -> BitMask {
                self.match_byte(EMPTY)
            }
        }
    }
}

impl Group {
    #[inline(always)]
    pub(crate) fn match_deleted(self) -> BitMask {
        self.match_byte(DELETED)
    }
}
