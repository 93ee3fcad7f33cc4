//! Byte cursor over a pickle stream

use byteorder::{ByteOrder, BE, LE};

use crate::{Error, Result};

pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset into the stream
    #[inline]
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let remaining = self.data.len() - self.pos;
        if n > remaining {
            return Err(Error::UnexpectedEof {
                offset: self.pos,
                needed: n - remaining,
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LE::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LE::read_u32(self.read_bytes(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LE::read_i32(self.read_bytes(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LE::read_u64(self.read_bytes(8)?))
    }

    /// BINFLOAT stores an IEEE 754 double in big-endian order
    pub fn read_f64_be(&mut self) -> Result<f64> {
        Ok(BE::read_f64(self.read_bytes(8)?))
    }

    /// Read a length prefix of `width` bytes and then that many bytes
    pub fn read_counted(&mut self, width: usize) -> Result<&'a [u8]> {
        let len = match width {
            1 => self.read_u8()? as u64,
            4 => self.read_u32()? as u64,
            _ => self.read_u64()?,
        };
        let len = usize::try_from(len).map_err(|_| Error::UnexpectedEof {
            offset: self.pos,
            needed: usize::MAX,
        })?;
        self.read_bytes(len)
    }

    /// Read up to (and consume) the next newline, returning the line without it
    pub fn read_line(&mut self) -> Result<&'a [u8]> {
        let rest = &self.data[self.pos..];
        match rest.iter().position(|&b| b == b'\n') {
            Some(end) => {
                self.pos += end + 1;
                Ok(&rest[..end])
            }
            None => Err(Error::UnexpectedEof {
                offset: self.pos,
                needed: 1,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_scalars() {
        let data = [0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut reader = Reader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 1);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0x12345678);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_past_end() {
        let mut reader = Reader::new(&[0x01, 0x02]);
        let err = reader.read_u32().unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof { offset: 0, needed: 2 }));
    }

    #[test]
    fn test_read_line() {
        let mut reader = Reader::new(b"123\n456");
        assert_eq!(reader.read_line().unwrap(), b"123");
        assert_eq!(reader.offset(), 4);
        assert!(reader.read_line().is_err());
    }

    #[test]
    fn test_read_counted() {
        let mut reader = Reader::new(&[0x03, b'a', b'b', b'c']);
        assert_eq!(reader.read_counted(1).unwrap(), b"abc");
    }
}
