use thiserror::Error;

/// Largest field that can be read from a touch report in one go
pub const MAX_FIELD_BITS: u32 = 32;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitsError {
    #[error("invalid number of bits `{0}`, expected 1..=32")]
    InvalidWidth(u32),
}

/// Read a `bits` wide unsigned value from the report starting at the given
/// bit offset. Bits are assembled least significant first, spanning as many
/// bytes as needed. Fields that lie past the end of the report read as zero.
pub fn extract_bits(report: &[u8], offset: usize, bits: u32) -> Result<u32, BitsError> {
    if bits == 0 || bits > MAX_FIELD_BITS {
        return Err(BitsError::InvalidWidth(bits));
    }

    let end = offset.saturating_add(bits as usize);
    if end > report.len() * 8 {
        return Ok(0);
    }

    let mut output: u32 = 0;
    let mut remaining = bits;
    let mut bit_offset = (offset % 8) as u32;
    let mut byte_offset = offset / 8;

    while remaining > 0 {
        let available = 8 - bit_offset;
        let data_bits = available.min(remaining);
        let mask = 0xffu8 >> (8 - data_bits);
        let byte = (report[byte_offset] >> bit_offset) & mask;

        output |= (byte as u32) << (bits - remaining);

        bit_offset = 0;
        byte_offset += 1;
        remaining -= data_bits;
    }

    Ok(output)
}
