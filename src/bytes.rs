//! Bounds-checked cursor over an owned byte buffer.
//!
//! [`ByteReader`] is the leaf of the parsing stack. It owns the complete file
//! contents (the file handle is already closed), transparently inflates gzip
//! streams once at construction, and exposes fixed-width little-endian reads
//! that never return partial data.

use crate::{CpapError, Result};
use flate2::read::MultiGzDecoder;
use std::io::Read;
use tracing::{debug, trace};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Returns true when `data` starts with the gzip magic bytes.
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= GZIP_MAGIC.len() && data[..GZIP_MAGIC.len()] == GZIP_MAGIC
}

/// Cursor over an owned, possibly decompressed, byte buffer.
#[derive(Debug, Clone)]
pub struct ByteReader {
    data: Vec<u8>,
    position: usize,
    decompressed: bool,
}

impl ByteReader {
    /// Wrap `data`, inflating it first when it is a gzip stream.
    pub fn new(data: Vec<u8>) -> Result<Self> {
        if is_gzip(&data) {
            let mut inflated = Vec::with_capacity(data.len() * 4);
            MultiGzDecoder::new(data.as_slice())
                .read_to_end(&mut inflated)
                .map_err(|source| CpapError::Decompress { source })?;
            debug!(compressed = data.len(), inflated = inflated.len(), "Inflated gzip buffer");
            return Ok(Self { data: inflated, position: 0, decompressed: true });
        }

        Ok(Self { data, position: 0, decompressed: false })
    }

    /// Whether the buffer was inflated from a gzip stream.
    pub fn is_decompressed(&self) -> bool {
        self.decompressed
    }

    /// Current cursor offset.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Total buffer length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Move the cursor to an absolute offset. Seeking to the end is allowed.
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(CpapError::OutOfBounds { offset, requested: 0, len: self.data.len() });
        }
        self.position = offset;
        Ok(())
    }

    /// Read `len` raw bytes and advance.
    pub fn read_bytes(&mut self, len: usize) -> Result<&[u8]> {
        let start = self.position;
        let end = start.checked_add(len).filter(|&end| end <= self.data.len()).ok_or(
            CpapError::OutOfBounds { offset: start, requested: len, len: self.data.len() },
        )?;
        self.position = end;
        Ok(&self.data[start..end])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(bytes);
        Ok(array)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i16_le(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a fixed-width ASCII field, trimming trailing spaces and NULs.
    ///
    /// Fails with [`CpapError::TruncatedField`] when fewer than `width` bytes
    /// remain; the cursor is left untouched in that case.
    pub fn read_ascii(&mut self, field: &str, width: usize) -> Result<String> {
        if self.remaining() < width {
            return Err(CpapError::truncated_field(field, self.position, width, self.remaining()));
        }
        let bytes = self.read_bytes(width)?;
        let end = bytes.iter().rposition(|&b| b != b' ' && b != 0).map_or(0, |pos| pos + 1);
        let value = String::from_utf8_lossy(&bytes[..end]).into_owned();
        trace!(field, width, value = %value, "Read ASCII field");
        Ok(value)
    }

    /// Consume the reader and return the (decompressed) buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn reads_little_endian_integers() {
        let mut reader =
            ByteReader::new(vec![0x34, 0x12, 0xff, 0xff, 0x78, 0x56, 0x34, 0x12, 0x07]).unwrap();
        assert_eq!(reader.read_u16_le().unwrap(), 0x1234);
        assert_eq!(reader.read_i16_le().unwrap(), -1);
        assert_eq!(reader.read_u32_le().unwrap(), 0x1234_5678);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn out_of_bounds_read_fails_without_advancing() {
        let mut reader = ByteReader::new(vec![1, 2, 3]).unwrap();
        reader.seek(2).unwrap();
        match reader.read_i32_le() {
            Err(CpapError::OutOfBounds { offset, requested, len }) => {
                assert_eq!((offset, requested, len), (2, 4, 3));
            }
            other => panic!("Expected OutOfBounds, got {:?}", other),
        }
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn ascii_fields_trim_trailing_padding() {
        let mut reader = ByteReader::new(b"Flow.40ms       L/s\0\0\0\0\0".to_vec()).unwrap();
        assert_eq!(reader.read_ascii("label", 16).unwrap(), "Flow.40ms");
        assert_eq!(reader.read_ascii("dimension", 8).unwrap(), "L/s");
    }

    #[test]
    fn ascii_field_keeps_leading_spaces() {
        let mut reader = ByteReader::new(b"  12    ".to_vec()).unwrap();
        assert_eq!(reader.read_ascii("count", 8).unwrap(), "  12");
    }

    #[test]
    fn short_ascii_field_is_a_truncated_field_error() {
        let mut reader = ByteReader::new(b"0   ".to_vec()).unwrap();
        match reader.read_ascii("version", 8) {
            Err(CpapError::TruncatedField { field, width, available, .. }) => {
                assert_eq!(field, "version");
                assert_eq!(width, 8);
                assert_eq!(available, 4);
            }
            other => panic!("Expected TruncatedField, got {:?}", other),
        }
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn seek_past_end_is_rejected() {
        let mut reader = ByteReader::new(vec![0; 4]).unwrap();
        assert!(reader.seek(4).is_ok());
        assert!(matches!(reader.seek(5), Err(CpapError::OutOfBounds { .. })));
    }

    #[test]
    fn gzip_buffers_are_inflated_once() {
        let payload = b"0       hello world".to_vec();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();
        assert!(is_gzip(&compressed));

        let mut reader = ByteReader::new(compressed).unwrap();
        assert!(reader.is_decompressed());
        assert_eq!(reader.len(), payload.len());
        assert_eq!(reader.read_ascii("version", 8).unwrap(), "0");
    }

    #[test]
    fn corrupt_gzip_reports_decompress_error() {
        let result = ByteReader::new(vec![0x1f, 0x8b, 0x08, 0x00, 0xde, 0xad]);
        assert!(matches!(result, Err(CpapError::Decompress { .. })));
    }
}
