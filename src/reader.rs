use crate::{deserializer::Deserializer, errors::MapFileError, types::Tag};
use std::io::{Read, Seek, SeekFrom};

/// Hard ceiling on a single block read. Crafted or corrupt index entries
/// cannot make the decoder allocate past this regardless of what they claim.
const MAXIMUM_BUFFER_SIZE: usize = 1024 * 1024 * 10;

/// A resizable byte buffer read from a random-access file, with bounded
/// cursor-based decoders for every primitive the block format uses.
///
/// Every decode method checks the cursor against `buffer_data.len()` before
/// touching it - a truncated or adversarial block produces a `MapFileError`,
/// never a panic.
pub struct ReadBuffer<R: Read + Seek> {
    buffer_data: Vec<u8>,
    buffer_position: usize,
    input_channel: R,
    tag_ids: Vec<u32>,
}

impl<R: Read + Seek> ReadBuffer<R> {
    pub fn new(input_channel: R) -> Self {
        Self {
            buffer_data: Vec::new(),
            buffer_position: 0,
            input_channel,
            tag_ids: Vec::new(),
        }
    }

    pub fn read_byte(&mut self) -> Result<u8, MapFileError> {
        if self.buffer_position >= self.buffer_data.len() {
            return Err(MapFileError::BufferOverflow("reading byte".to_string()));
        }
        let byte = self.buffer_data[self.buffer_position];
        self.buffer_position += 1;
        Ok(byte)
    }

    pub fn read_float(&mut self) -> Result<f32, MapFileError> {
        Ok(f32::from_bits(self.read_int()? as u32))
    }

    pub fn read_from_file(&mut self, length: usize) -> Result<bool, MapFileError> {
        if length > MAXIMUM_BUFFER_SIZE {
            return Ok(false);
        }

        self.buffer_data.resize(length, 0);
        self.buffer_position = 0;

        match self
            .input_channel
            .read_exact(&mut self.buffer_data[..length])
        {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    pub fn read_from_file_at_offset(
        &mut self,
        offset: u64,
        length: usize,
    ) -> Result<bool, MapFileError> {
        if length > MAXIMUM_BUFFER_SIZE {
            return Ok(false);
        }

        self.buffer_data.resize(length, 0);
        self.buffer_position = 0;

        self.input_channel.seek(SeekFrom::Start(offset))?;
        match self
            .input_channel
            .read_exact(&mut self.buffer_data[..length])
        {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    pub fn read_int(&mut self) -> Result<i32, MapFileError> {
        if self.buffer_position + 4 > self.buffer_data.len() {
            return Err(MapFileError::BufferOverflow("reading int".to_string()));
        }
        let value = Deserializer::get_int(&self.buffer_data, self.buffer_position);
        self.buffer_position += 4;
        Ok(value)
    }

    pub fn read_long(&mut self) -> Result<i64, MapFileError> {
        if self.buffer_position + 8 > self.buffer_data.len() {
            return Err(MapFileError::BufferOverflow("reading long".to_string()));
        }
        let value = Deserializer::get_long(&self.buffer_data, self.buffer_position);
        self.buffer_position += 8;
        Ok(value)
    }

    pub fn read_short(&mut self) -> Result<i16, MapFileError> {
        if self.buffer_position + 2 > self.buffer_data.len() {
            return Err(MapFileError::BufferOverflow("reading short".to_string()));
        }
        let value = Deserializer::get_short(&self.buffer_data, self.buffer_position);
        self.buffer_position += 2;
        Ok(value)
    }

    /// VBE-U: 7 payload bits per byte, continuation bit 0x80, up to 5 bytes.
    pub fn read_unsigned_int(&mut self) -> Result<u32, MapFileError> {
        let mut result = 0u32;
        let mut shift = 0u32;

        loop {
            if self.buffer_position >= self.buffer_data.len() {
                return Err(MapFileError::BufferOverflow(
                    "reading unsigned VBE int".to_string(),
                ));
            }
            let byte = self.buffer_data[self.buffer_position];
            self.buffer_position += 1;
            result |= ((byte & 0x7f) as u32) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    /// VBE-S: sign-and-magnitude, continuation bit 0x80, sign bit 0x40 of the
    /// terminating byte. Not two's complement zig-zag.
    pub fn read_signed_int(&mut self) -> Result<i32, MapFileError> {
        let mut result = 0i32;
        let mut shift = 0u32;

        loop {
            if self.buffer_position >= self.buffer_data.len() {
                return Err(MapFileError::BufferOverflow(
                    "reading signed VBE int".to_string(),
                ));
            }
            let byte = self.buffer_data[self.buffer_position];
            self.buffer_position += 1;
            if byte & 0x80 == 0 {
                let magnitude = result | (((byte & 0x3f) as i32) << shift);
                return Ok(if byte & 0x40 != 0 { -magnitude } else { magnitude });
            }
            result |= ((byte & 0x7f) as i32) << shift;
            shift += 7;
        }
    }

    /// Fills `into` with `into.len()` VBE-S values, used for coordinate
    /// delta blocks. Avoids a per-node allocation on the decode hot path.
    pub fn read_signed_ints(&mut self, into: &mut [i32]) -> Result<(), MapFileError> {
        for slot in into.iter_mut() {
            *slot = self.read_signed_int()?;
        }
        Ok(())
    }

    pub fn read_tags(
        &mut self,
        tags_array: &[Tag],
        number_of_tags: u8,
    ) -> Result<Vec<Tag>, MapFileError> {
        self.tag_ids.clear();
        let max_tag = tags_array.len() as u32;

        for _ in 0..number_of_tags {
            let tag_id = self.read_unsigned_int()?;
            if tag_id >= max_tag {
                return Err(MapFileError::InvalidTagIndex(tag_id));
            }
            self.tag_ids.push(tag_id);
        }

        Ok(self
            .tag_ids
            .iter()
            .map(|&id| tags_array[id as usize].clone())
            .collect())
    }

    pub fn read_utf8_encoded_string(&mut self) -> Result<String, MapFileError> {
        let length = self.read_unsigned_int()? as usize;
        self.read_utf8_encoded_string_with_length(length)
    }

    /// Fills `into` from the buffer at the current cursor, advancing it by
    /// `into.len()` bytes. Used to capture a string-pool slice once per
    /// block into reused scratch storage rather than re-reading per way.
    pub fn read_bytes(&mut self, into: &mut [u8]) -> Result<(), MapFileError> {
        let len = into.len();
        if self.buffer_position + len > self.buffer_data.len() {
            return Err(MapFileError::BufferOverflow(
                "reading byte block".to_string(),
            ));
        }
        into.copy_from_slice(&self.buffer_data[self.buffer_position..self.buffer_position + len]);
        self.buffer_position += len;
        Ok(())
    }

    pub fn read_utf8_encoded_string_with_length(
        &mut self,
        string_length: usize,
    ) -> Result<String, MapFileError> {
        if self.buffer_position + string_length > self.buffer_data.len() {
            return Err(MapFileError::BufferOverflow(format!(
                "invalid string length: {}",
                string_length
            )));
        }
        self.buffer_position += string_length;
        String::from_utf8(
            self.buffer_data[self.buffer_position - string_length..self.buffer_position].to_vec(),
        )
        .map_err(MapFileError::from)
    }

    /// Repeatedly reads a way's `(way_data_size, tile_bitmask)` header pair,
    /// skipping forward past ways whose bitmask does not intersect
    /// `bitmask`. Rewinds to the flag byte of the first way that does
    /// intersect (or that exhausts `remaining`) and returns the number of
    /// ways left to process from there, plus the flag-byte offset of the
    /// last way skipped (if any) so its tags can be replayed.
    pub fn skip_ways(
        &mut self,
        bitmask: u16,
        mut remaining: i32,
    ) -> Result<(i32, Option<usize>), MapFileError> {
        let mut last_tag_position = None;
        loop {
            if remaining <= 0 {
                return Ok((remaining, last_tag_position));
            }
            let way_data_size = self.read_unsigned_int()? as i64;
            let tile_bitmask = self.read_short()? as u16;

            if (tile_bitmask & bitmask) == 0 {
                last_tag_position = Some(self.buffer_position);
                let skip = way_data_size - 2;
                if skip < 0 {
                    return Err(MapFileError::BlockDecode(format!(
                        "invalid way data size: {}",
                        way_data_size
                    )));
                }
                self.skip_bytes(skip as usize)?;
                remaining -= 1;
                continue;
            }

            // Rewind past the 2-byte bitmask just consumed, back to the
            // flag byte (way_data_size) of the matching way.
            self.buffer_position -= 2;
            return Ok((remaining, last_tag_position));
        }
    }

    /// Peeks the tags at an absolute buffer offset without disturbing the
    /// current cursor - used to replay a skipped way's tags for
    /// `tags_changed` comparison.
    pub fn peek_tags_at(
        &mut self,
        position: usize,
        tags_array: &[Tag],
    ) -> Result<Vec<Tag>, MapFileError> {
        let saved_position = self.buffer_position;
        self.buffer_position = position;
        let result = (|| {
            let special_byte = self.read_byte()?;
            let number_of_tags = special_byte & 0x0f;
            self.read_tags(tags_array, number_of_tags)
        })();
        self.buffer_position = saved_position;
        result
    }

    pub fn get_buffer_position(&self) -> usize {
        self.buffer_position
    }

    pub fn get_buffer_size(&self) -> usize {
        self.buffer_data.len()
    }

    pub fn set_buffer_position(&mut self, position: usize) {
        self.buffer_position = position;
    }

    pub fn skip_bytes(&mut self, bytes: usize) -> Result<(), MapFileError> {
        if self.buffer_position + bytes > self.buffer_data.len() {
            return Err(MapFileError::BufferOverflow("skip past end".to_string()));
        }
        self.buffer_position += bytes;
        Ok(())
    }
}

/// Resolves a VBE-U-length-prefixed UTF-8 string at `offset` inside a
/// standalone byte slice - the way-string pool captured once per block by
/// `BlockDecoder::process_ways`, which is no longer attached to a live
/// `ReadBuffer` cursor by the time a way's string references are resolved.
pub fn read_string_from_pool(pool: &[u8], offset: i32) -> Result<String, MapFileError> {
    if offset < 0 {
        return Err(MapFileError::BlockDecode(format!(
            "invalid string pool offset: {}",
            offset
        )));
    }
    let mut position = offset as usize;
    let mut length = 0u32;
    let mut shift = 0u32;
    loop {
        let byte = *pool.get(position).ok_or_else(|| {
            MapFileError::BufferOverflow("string pool offset out of range".to_string())
        })?;
        position += 1;
        length |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    let length = length as usize;
    let end = position + length;
    if end > pool.len() {
        return Err(MapFileError::BufferOverflow(
            "string pool entry exceeds pool bounds".to_string(),
        ));
    }
    String::from_utf8(pool[position..end].to_vec()).map_err(MapFileError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn buf(bytes: Vec<u8>) -> ReadBuffer<Cursor<Vec<u8>>> {
        let len = bytes.len();
        let mut rb = ReadBuffer::new(Cursor::new(bytes));
        rb.read_from_file(len).unwrap();
        rb
    }

    fn encode_vbe_u(mut value: u32) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            out.push(byte);
            if value == 0 {
                break;
            }
        }
        out
    }

    fn encode_vbe_s(value: i32) -> Vec<u8> {
        let negative = value < 0;
        let mut magnitude = value.unsigned_abs();
        let mut out = Vec::new();
        loop {
            if magnitude < 0x40 {
                let mut byte = magnitude as u8;
                if negative {
                    byte |= 0x40;
                }
                out.push(byte);
                break;
            } else {
                out.push(((magnitude & 0x7f) as u8) | 0x80);
                magnitude >>= 7;
            }
        }
        out
    }

    #[test]
    fn vbe_u_round_trip() {
        for x in [0u32, 1, 127, 128, 16384, 2_000_000_000, u32::MAX] {
            let mut rb = buf(encode_vbe_u(x));
            assert_eq!(rb.read_unsigned_int().unwrap(), x);
        }
    }

    #[test]
    fn vbe_s_round_trip() {
        for x in [
            0i32, 1, -1, 63, -63, 64, -64, 100_000, -100_000, i32::MAX, i32::MIN + 1,
        ] {
            let mut rb = buf(encode_vbe_s(x));
            assert_eq!(rb.read_signed_int().unwrap(), x);
        }
    }

    #[test]
    fn read_byte_past_end_is_error_not_panic() {
        let mut rb = buf(vec![1]);
        assert!(rb.read_byte().is_ok());
        assert!(rb.read_byte().is_err());
    }

    #[test]
    fn read_unsigned_int_truncated_is_error() {
        let mut rb = buf(vec![0x80]);
        assert!(rb.read_unsigned_int().is_err());
    }

    #[test]
    fn read_string_reads_length_prefixed_utf8() {
        let mut bytes = encode_vbe_u(2);
        bytes.extend_from_slice(b"hi");
        let mut rb = buf(bytes);
        assert_eq!(rb.read_utf8_encoded_string().unwrap(), "hi");
    }

    #[test]
    fn read_tags_rejects_out_of_range_index() {
        let table = vec![Tag::new("a".into(), "1".into())];
        let mut rb = buf(encode_vbe_u(5));
        assert!(rb.read_tags(&table, 1).is_err());
    }

    #[test]
    fn skip_ways_skips_non_matching_and_stops_at_match() {
        let mut bytes = Vec::new();
        bytes.extend(encode_vbe_u(4));
        bytes.extend_from_slice(&0x0001u16.to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0x00]);
        bytes.extend(encode_vbe_u(99));
        bytes.extend_from_slice(&0x8000u16.to_be_bytes());
        let mut rb = buf(bytes);
        let (remaining, last_tag_position) = rb.skip_ways(0x8000, 2).unwrap();
        assert_eq!(remaining, 1);
        assert_eq!(last_tag_position, Some(3)); // flag byte of the skipped way
        let way_data_size = rb.read_unsigned_int().unwrap();
        assert_eq!(way_data_size, 99);
    }

    #[test]
    fn read_string_from_pool_reads_length_prefixed_entry_at_offset() {
        let mut pool = Vec::new();
        pool.extend(encode_vbe_u(2));
        pool.extend_from_slice(b"hi");
        assert_eq!(read_string_from_pool(&pool, 0).unwrap(), "hi");
    }

    #[test]
    fn read_string_from_pool_rejects_offset_past_the_pool() {
        let pool = encode_vbe_u(2);
        assert!(read_string_from_pool(&pool, 50).is_err());
    }
}
