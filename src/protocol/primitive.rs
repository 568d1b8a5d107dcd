//! Small wire-primitive readers and writers, in the spirit of
//! `zero-mysql::protocol::primitive` but scoped to what this protocol
//! actually needs: little-endian integers, C-strings and raw byte runs.
//! Document bodies themselves are read and written by the `bson` crate.

use crate::error::Error;

pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Writes a NUL-terminated C-string, the full-collection-namespace and
/// index-name encoding used throughout the wire protocol.
pub fn write_cstring(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(value.as_bytes());
    out.push(0);
}

pub fn read_i32(data: &[u8], offset: usize) -> Result<i32, Error> {
    let bytes = data.get(offset..offset + 4).ok_or_else(|| {
        Error::Protocol(format!("truncated i32 at offset {offset} (len {})", data.len()))
    })?;
    let mut array = [0u8; 4];
    array.copy_from_slice(bytes);
    Ok(i32::from_le_bytes(array))
}

pub fn read_i64(data: &[u8], offset: usize) -> Result<i64, Error> {
    let bytes = data.get(offset..offset + 8).ok_or_else(|| {
        Error::Protocol(format!("truncated i64 at offset {offset} (len {})", data.len()))
    })?;
    let mut array = [0u8; 8];
    array.copy_from_slice(bytes);
    Ok(i64::from_le_bytes(array))
}

/// Reads a NUL-terminated C-string starting at `offset`, returning the
/// string and the offset of the byte following the NUL terminator.
pub fn read_cstring(data: &[u8], offset: usize) -> Result<(&str, usize), Error> {
    let rest = data
        .get(offset..)
        .ok_or_else(|| Error::Protocol(format!("cstring offset {offset} out of range")))?;
    let nul = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::Protocol("unterminated cstring".to_string()))?;
    let s = std::str::from_utf8(&rest[..nul])
        .map_err(|err| Error::Protocol(format!("cstring is not valid utf-8: {err}")))?;
    Ok((s, offset + nul + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_reads_i32() {
        let mut buf = Vec::new();
        write_i32(&mut buf, -42);
        assert_eq!(read_i32(&buf, 0).unwrap(), -42);
    }

    #[test]
    fn writes_and_reads_cstring() {
        let mut buf = Vec::new();
        write_cstring(&mut buf, "db.collection");
        let (s, next) = read_cstring(&buf, 0).unwrap();
        assert_eq!(s, "db.collection");
        assert_eq!(next, buf.len());
    }

    #[test]
    fn rejects_unterminated_cstring() {
        let buf = b"no-nul".to_vec();
        assert!(read_cstring(&buf, 0).is_err());
    }
}
