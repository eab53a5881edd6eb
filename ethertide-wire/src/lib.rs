//! Traits for packing and unpacking EtherCAT wire data.
//!
//! Everything on an EtherCAT network is little-endian and byte-packed. These
//! traits give the main `ethertide` crate (and any frame driver built on top
//! of it) one vocabulary for moving typed values in and out of raw telegram
//! buffers without sprinkling `to_le_bytes` calls around.

#![deny(missing_docs)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(unused_qualifications)]

mod error;
mod impls;

pub use error::WireError;

/// A type that can be decoded from the beginning of a raw wire buffer.
pub trait WireRead: Sized {
    /// Unpack an instance of this type from the start of `buf`.
    ///
    /// Fails with [`WireError::ReadBufferTooShort`] if `buf` does not hold
    /// enough bytes, or [`WireError::InvalidValue`] if the bytes do not form a
    /// valid instance.
    fn unpack_from_slice(buf: &[u8]) -> Result<Self, WireError>;
}

/// A type that can be encoded into a raw wire buffer.
pub trait WireWrite {
    /// Pack this value into the beginning of `buf`, returning the written
    /// sub-slice.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than [`packed_len`](WireWrite::packed_len)
    /// bytes. Use [`pack_to_slice`](WireWrite::pack_to_slice) for a checked
    /// variant.
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8];

    /// Checked version of [`pack_to_slice_unchecked`](WireWrite::pack_to_slice_unchecked).
    fn pack_to_slice<'buf>(&self, buf: &'buf mut [u8]) -> Result<&'buf [u8], WireError> {
        if buf.len() < self.packed_len() {
            return Err(WireError::WriteBufferTooShort {
                needed: self.packed_len(),
                got: buf.len(),
            });
        }

        Ok(self.pack_to_slice_unchecked(buf))
    }

    /// The number of bytes this value occupies when packed.
    fn packed_len(&self) -> usize;
}

/// A wire type whose packed size is known at compile time.
pub trait WireSized {
    /// Packed size in bytes.
    const PACKED_LEN: usize;

    /// A `[u8; N]` buffer exactly [`PACKED_LEN`](WireSized::PACKED_LEN) bytes
    /// long.
    type Buffer: AsRef<[u8]> + AsMut<[u8]>;

    /// Create a zeroed buffer sized for the packed representation.
    fn buffer() -> Self::Buffer;
}

/// Pack into an owned, fixed-size buffer.
pub trait WireWriteSized: WireWrite + WireSized {
    /// Pack this value into a fresh fixed-size buffer.
    fn pack(&self) -> Self::Buffer;
}
