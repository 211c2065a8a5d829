// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Plain numeric values read from or written to target memory in native byte order.

/// A fixed-size value with a native-endian byte representation.
pub trait WireValue: Copy {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Decodes from exactly [`Self::SIZE`] bytes.
    fn from_ne_slice(bytes: &[u8]) -> Option<Self>;

    /// Encodes to [`Self::SIZE`] bytes.
    fn to_ne_vec(self) -> Vec<u8>;
}

macro_rules! wire_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl WireValue for $ty {
                const SIZE: usize = core::mem::size_of::<$ty>();

                fn from_ne_slice(bytes: &[u8]) -> Option<Self> {
                    let raw: [u8; core::mem::size_of::<$ty>()] = bytes.try_into().ok()?;
                    Some(<$ty>::from_ne_bytes(raw))
                }

                fn to_ne_vec(self) -> Vec<u8> {
                    self.to_ne_bytes().to_vec()
                }
            }
        )*
    };
}

wire_value!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64);
