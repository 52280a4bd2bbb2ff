//! Big-endian encode/decode primitives shared by every on-disk PortFS record.
//!
//! The codec's only job is the byte-order transformation: field order and
//! width always mirror the in-memory struct. A round-trip `decode(encode(x))`
//! must reproduce `x` exactly for every well-formed record.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer too small: need {need} bytes, got {got}")]
    BufferTooSmall { need: usize, got: usize },
    #[error("malformed record: {0}")]
    Malformed(&'static str),
}

/// Encodes `self` as big-endian bytes into `target`, returning the number of
/// bytes written.
pub trait Encode {
    fn encode(&self, target: &mut [u8]) -> Result<usize, CodecError>;
    fn encoded_len(&self) -> usize;
}

/// Decodes a big-endian record from `input`, returning the value and the
/// number of bytes consumed.
pub trait Decode: Sized {
    fn decode(input: &[u8]) -> Result<(Self, usize), CodecError>;
}

fn check_len(buf_len: usize, need: usize) -> Result<(), CodecError> {
    if buf_len < need {
        Err(CodecError::BufferTooSmall {
            need,
            got: buf_len,
        })
    } else {
        Ok(())
    }
}

macro_rules! impl_int {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode(&self, target: &mut [u8]) -> Result<usize, CodecError> {
                    const SIZE: usize = core::mem::size_of::<$t>();
                    check_len(target.len(), SIZE)?;
                    target[..SIZE].copy_from_slice(&self.to_be_bytes());
                    Ok(SIZE)
                }

                fn encoded_len(&self) -> usize {
                    core::mem::size_of::<$t>()
                }
            }

            impl Decode for $t {
                fn decode(input: &[u8]) -> Result<(Self, usize), CodecError> {
                    const SIZE: usize = core::mem::size_of::<$t>();
                    check_len(input.len(), SIZE)?;
                    let mut bytes = [0u8; SIZE];
                    bytes.copy_from_slice(&input[..SIZE]);
                    Ok((<$t>::from_be_bytes(bytes), SIZE))
                }
            }
        )*
    };
}

impl_int!(u8, u16, u32, u64);

impl<const N: usize> Encode for [u8; N] {
    fn encode(&self, target: &mut [u8]) -> Result<usize, CodecError> {
        check_len(target.len(), N)?;
        target[..N].copy_from_slice(self);
        Ok(N)
    }

    fn encoded_len(&self) -> usize {
        N
    }
}

impl<const N: usize> Decode for [u8; N] {
    fn decode(input: &[u8]) -> Result<(Self, usize), CodecError> {
        check_len(input.len(), N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&input[..N]);
        Ok((out, N))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_ints() {
        let mut buf = [0u8; 8];
        let n: u64 = 0x0123_4567_89ab_cdef;
        let written = n.encode(&mut buf).unwrap();
        assert_eq!(written, 8);
        assert_eq!(buf, [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef]);
        let (decoded, read) = u64::decode(&buf).unwrap();
        assert_eq!(decoded, n);
        assert_eq!(read, 8);
    }

    #[test]
    fn round_trip_array() {
        let mut buf = [0u8; 4];
        let name = [b'a', b'b', b'c', 0];
        name.encode(&mut buf).unwrap();
        let (decoded, _) = <[u8; 4]>::decode(&buf).unwrap();
        assert_eq!(decoded, name);
    }

    #[test]
    fn buffer_too_small_is_reported() {
        let mut buf = [0u8; 1];
        let n: u32 = 1;
        assert_eq!(
            n.encode(&mut buf),
            Err(CodecError::BufferTooSmall { need: 4, got: 1 })
        );
    }
}
