//! # MQTT Serialization Utilities
//!
//! This module provides helper functions for reading and writing MQTT-specific data types
//! from and to byte buffers, such as variable-byte integers and length-prefixed strings.

use crate::error::ProtocolError;

/// Largest value a 4-byte variable-byte integer can carry (2^28 - 1).
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Reads a variable-byte integer from the buffer, advancing the cursor.
///
/// This is the encoding MQTT uses for the "remaining length" of every packet:
/// base 128, least significant group first, with the continuation bit (0x80)
/// set on every byte except the last. At most four bytes are accepted.
pub fn read_variable_byte_integer(cursor: &mut usize, buf: &[u8]) -> Result<usize, ProtocolError> {
    let mut multiplier = 1;
    let mut value = 0;
    let mut i = 0;
    loop {
        let encoded_byte = buf
            .get(*cursor + i)
            .ok_or(ProtocolError::MalformedPacket)?;
        value += (encoded_byte & 127) as usize * multiplier;
        if (encoded_byte & 128) == 0 {
            break;
        }
        multiplier *= 128;
        i += 1;
        if i >= 4 {
            return Err(ProtocolError::MalformedPacket);
        }
    }
    *cursor += i + 1;
    Ok(value)
}

/// Writes a variable-byte integer to the start of `buf` and returns the byte count.
pub fn write_variable_byte_integer(buf: &mut [u8], mut val: usize) -> Result<usize, ProtocolError> {
    if val > MAX_REMAINING_LENGTH {
        return Err(ProtocolError::PayloadTooLarge);
    }
    let mut i = 0;
    loop {
        let mut encoded_byte = (val % 128) as u8;
        val /= 128;
        if val > 0 {
            encoded_byte |= 128;
        }
        *buf.get_mut(i).ok_or(ProtocolError::BufferTooSmall)? = encoded_byte;
        i += 1;
        if val == 0 {
            break;
        }
    }
    Ok(i)
}

/// Number of bytes `val` occupies once encoded as a variable-byte integer.
pub const fn variable_byte_integer_len(val: usize) -> usize {
    match val {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Reads a UTF-8 encoded string (prefixed with a 2-byte length) from the buffer.
pub fn read_utf8_string<'a>(cursor: &mut usize, buf: &'a [u8]) -> Result<&'a str, ProtocolError> {
    let len_bytes = buf
        .get(*cursor..*cursor + 2)
        .ok_or(ProtocolError::MalformedPacket)?;
    let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
    *cursor += 2;
    let s = core::str::from_utf8(
        buf.get(*cursor..*cursor + len)
            .ok_or(ProtocolError::MalformedPacket)?,
    )
    .map_err(|_| ProtocolError::InvalidUtf8String)?;
    *cursor += len;
    Ok(s)
}

/// Writes a UTF-8 encoded string (prefixed with a 2-byte length) to the buffer.
pub fn write_utf8_string(buf: &mut [u8], s: &str) -> Result<usize, ProtocolError> {
    write_binary(buf, s.as_bytes())
}

/// Writes length-prefixed binary data (used for the CONNECT password).
pub fn write_binary(buf: &mut [u8], data: &[u8]) -> Result<usize, ProtocolError> {
    let len = data.len();
    if len > u16::MAX as usize {
        return Err(ProtocolError::PayloadTooLarge);
    }
    let len_bytes = (len as u16).to_be_bytes();

    let required_space = 2 + len;
    let slice = buf
        .get_mut(0..required_space)
        .ok_or(ProtocolError::BufferTooSmall)?;

    slice[0..2].copy_from_slice(&len_bytes);
    slice[2..].copy_from_slice(data);
    Ok(required_space)
}

/// Copies raw bytes to the start of `buf`.
pub fn write_bytes(buf: &mut [u8], data: &[u8]) -> Result<usize, ProtocolError> {
    buf.get_mut(0..data.len())
        .ok_or(ProtocolError::BufferTooSmall)?
        .copy_from_slice(data);
    Ok(data.len())
}
