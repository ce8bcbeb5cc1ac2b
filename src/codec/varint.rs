//! Unsigned LEB128 varints as used by protobuf length prefixes.

use std::io::{self, Read};

/// Longest encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Append the encoding of `value` to `buf`, returning the bytes added.
pub fn encode(mut value: u64, buf: &mut Vec<u8>) -> usize {
    let start = buf.len();
    while value >= 0x80 {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
    buf.len() - start
}

/// Number of bytes [`encode`] emits for `value`.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Outcome of reading a varint from a stream.
#[derive(Debug, PartialEq, Eq)]
pub enum VarintRead {
    /// The stream was already at end of input.
    Eof,
    /// The stream ended after `read` bytes of an unfinished varint.
    Truncated { read: usize },
    /// More than [`MAX_VARINT_LEN`] bytes or a value overflowing `u64`.
    Overlong,
    Value(u64),
}

/// Read one varint, retrying interrupted reads.
pub fn read<R: Read>(reader: &mut R) -> io::Result<VarintRead> {
    let mut value = 0u64;
    let mut byte = [0u8; 1];
    for index in 0..MAX_VARINT_LEN {
        loop {
            match reader.read(&mut byte) {
                Ok(0) if index == 0 => return Ok(VarintRead::Eof),
                Ok(0) => return Ok(VarintRead::Truncated { read: index }),
                Ok(_) => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        let low = u64::from(byte[0] & 0x7f);
        if index == MAX_VARINT_LEN - 1 && low > 1 {
            return Ok(VarintRead::Overlong);
        }
        value |= low << (7 * index);
        if byte[0] & 0x80 == 0 {
            return Ok(VarintRead::Value(value));
        }
    }
    Ok(VarintRead::Overlong)
}
