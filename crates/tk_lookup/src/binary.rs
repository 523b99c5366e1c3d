//! Little-endian primitives shared by the binary encoders.

use byteorder::{WriteBytesExt, LE};
use std::io::{self, Write};

/// Magic of the `.bpclt` checksum and game data tables.
pub const PCLT_MAGIC: [u8; 4] = *b"PCLT";

/// Write a collection length as the `int32` count used by every format.
pub fn write_count<W: Write>(out: &mut W, len: usize) -> io::Result<()> {
    out.write_i32::<LE>(to_i32(len)?)
}

/// Convert a length or index to `int32`, failing instead of wrapping.
pub fn to_i32(value: usize) -> io::Result<i32> {
    i32::try_from(value).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("value {} does not fit in an int32 field", value),
        )
    })
}
