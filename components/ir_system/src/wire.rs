//! Checked little-endian readers shared by the binary formats.

pub(crate) fn read_u8(bytes: &[u8], offset: &mut usize) -> Result<u8, String> {
    let value = *bytes
        .get(*offset)
        .ok_or_else(|| "Not enough bytes for u8 field".to_string())?;
    *offset += 1;
    Ok(value)
}

pub(crate) fn read_u32(bytes: &[u8], offset: &mut usize) -> Result<u32, String> {
    let end = offset
        .checked_add(4)
        .ok_or_else(|| "Offset overflow".to_string())?;
    let slice = bytes
        .get(*offset..end)
        .ok_or_else(|| "Not enough bytes for u32 field".to_string())?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(slice);
    *offset = end;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64(bytes: &[u8], offset: &mut usize) -> Result<u64, String> {
    let end = offset
        .checked_add(8)
        .ok_or_else(|| "Offset overflow".to_string())?;
    let slice = bytes
        .get(*offset..end)
        .ok_or_else(|| "Not enough bytes for u64 field".to_string())?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(slice);
    *offset = end;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn read_slice<'a>(
    bytes: &'a [u8],
    offset: &mut usize,
    len: usize,
) -> Result<&'a [u8], String> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| "Offset overflow".to_string())?;
    let slice = bytes
        .get(*offset..end)
        .ok_or_else(|| format!("Not enough bytes for {}-byte field", len))?;
    *offset = end;
    Ok(slice)
}

/// Reads a u32 length prefix followed by that many UTF-8 bytes.
pub(crate) fn read_string(bytes: &[u8], offset: &mut usize) -> Result<String, String> {
    let len = read_u32(bytes, offset)? as usize;
    let raw = read_slice(bytes, offset, len)?;
    String::from_utf8(raw.to_vec()).map_err(|e| format!("Invalid UTF-8: {}", e))
}

/// Writes a u32 length prefix followed by the raw UTF-8 bytes.
pub(crate) fn write_string(out: &mut Vec<u8>, text: &str) {
    out.extend_from_slice(&(text.len() as u32).to_le_bytes());
    out.extend_from_slice(text.as_bytes());
}
