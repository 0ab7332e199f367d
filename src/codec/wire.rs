//! Protobuf wire format primitives: varints, zig-zag, keys, little-endian fixed widths.

use crate::descriptor::Type;
use crate::error::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl WireType {
    pub fn from_u8(v: u8) -> Option<WireType> {
        match v {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            3 => Some(WireType::StartGroup),
            4 => Some(WireType::EndGroup),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }

    /// Wire type used for a single (unpacked) value of `ty`.
    pub fn for_type(ty: Type) -> WireType {
        match ty {
            Type::Int32
            | Type::Int64
            | Type::Uint32
            | Type::Uint64
            | Type::Sint32
            | Type::Sint64
            | Type::Bool
            | Type::Enum => WireType::Varint,
            Type::Fixed64 | Type::Sfixed64 | Type::Double => WireType::Fixed64,
            Type::Fixed32 | Type::Sfixed32 | Type::Float => WireType::Fixed32,
            Type::String | Type::Bytes | Type::Message => WireType::LengthDelimited,
            Type::Group => WireType::StartGroup,
        }
    }
}

/// Read a 32-bit unsigned integer from a little-endian byte slice.
#[inline]
pub fn read_u32_le(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Read a 64-bit unsigned integer from a little-endian byte slice.
#[inline]
pub fn read_u64_le(buf: &[u8]) -> u64 {
    u64::from_le_bytes([buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7]])
}

#[inline]
pub fn put_u32_le(buf: &mut Vec<u8>, val: u32) {
    buf.extend_from_slice(&val.to_le_bytes());
}

#[inline]
pub fn put_u64_le(buf: &mut Vec<u8>, val: u64) {
    buf.extend_from_slice(&val.to_le_bytes());
}

pub fn put_varint(buf: &mut Vec<u8>, mut val: u64) {
    while val >= 0x80 {
        buf.push((val as u8 & 0x7f) | 0x80);
        val >>= 7;
    }
    buf.push(val as u8);
}

#[inline]
pub fn put_key(buf: &mut Vec<u8>, field: u32, wire_type: WireType) {
    put_varint(buf, ((field as u64) << 3) | wire_type as u64);
}

#[inline]
pub fn zigzag_encode32(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

#[inline]
pub fn zigzag_encode64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

#[inline]
pub fn zigzag_decode32(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

#[inline]
pub fn zigzag_decode64(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Cursor over an encoded message.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn slice_from(&self, start: usize) -> &'a [u8] {
        &self.buf[start..self.pos]
    }

    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.pos;
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            let b = *self.buf.get(self.pos).ok_or(DecodeError::Truncated {
                need: self.pos + 1,
                have: self.buf.len(),
            })?;
            self.pos += 1;
            if shift >= 64 {
                return Err(DecodeError::InvalidVarint(start));
            }
            result |= ((b & 0x7f) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    /// Read a field key, returning `(field_number, wire_type)`.
    pub fn read_key(&mut self) -> Result<(u32, WireType), DecodeError> {
        let key = self.read_varint()?;
        let field = (key >> 3) as u32;
        let wt = (key & 7) as u8;
        let wire_type = WireType::from_u8(wt).ok_or(DecodeError::InvalidWireType {
            field,
            wire_type: wt,
        })?;
        if field == 0 {
            return Err(DecodeError::InvalidData("field number 0".into()));
        }
        Ok((field, wire_type))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::Truncated {
            need: usize::MAX,
            have: self.buf.len(),
        })?;
        if end > self.buf.len() {
            return Err(DecodeError::Truncated {
                need: end,
                have: self.buf.len(),
            });
        }
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        Ok(read_u32_le(self.take(4)?))
    }

    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        Ok(read_u64_le(self.take(8)?))
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_varint()? as usize;
        self.take(len)
    }

    pub fn read_string(&mut self, field: u32) -> Result<String, DecodeError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { field })
    }

    /// Skip the value of a field whose key was just read.
    pub fn skip(&mut self, field: u32, wire_type: WireType) -> Result<(), DecodeError> {
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.take(8)?;
            }
            WireType::Fixed32 => {
                self.take(4)?;
            }
            WireType::LengthDelimited => {
                self.read_bytes()?;
            }
            WireType::StartGroup => loop {
                let (f, wt) = self.read_key()?;
                if wt == WireType::EndGroup {
                    if f != field {
                        return Err(DecodeError::InvalidData(format!(
                            "mismatched end group {} for group {}",
                            f, field
                        )));
                    }
                    break;
                }
                self.skip(f, wt)?;
            },
            WireType::EndGroup => {
                return Err(DecodeError::InvalidData(format!(
                    "unexpected end group for field {}",
                    field
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_roundtrip() {
        for v in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            put_varint(&mut buf, v);
            let mut r = Reader::new(&buf);
            assert_eq!(r.read_varint().unwrap(), v);
            assert!(r.is_empty());
        }
    }

    #[test]
    fn test_varint_known_bytes() {
        let mut buf = Vec::new();
        put_varint(&mut buf, 300);
        assert_eq!(buf, [0xac, 0x02]);
    }

    #[test]
    fn test_negative_int32_takes_ten_bytes() {
        let mut buf = Vec::new();
        put_varint(&mut buf, -1i32 as i64 as u64);
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag_encode32(0), 0);
        assert_eq!(zigzag_encode32(-1), 1);
        assert_eq!(zigzag_encode32(1), 2);
        assert_eq!(zigzag_decode32(zigzag_encode32(i32::MIN)), i32::MIN);
        assert_eq!(zigzag_decode64(zigzag_encode64(-12345)), -12345);
    }

    #[test]
    fn test_truncated_bytes() {
        let mut r = Reader::new(&[0x05, 0x01]);
        assert!(matches!(r.read_bytes(), Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn test_skip_group() {
        // field 1 start group, field 2 varint 5, field 1 end group
        let buf = [0x0b, 0x10, 0x05, 0x0c];
        let mut r = Reader::new(&buf);
        let (f, wt) = r.read_key().unwrap();
        assert_eq!((f, wt), (1, WireType::StartGroup));
        r.skip(f, wt).unwrap();
        assert!(r.is_empty());
    }
}
