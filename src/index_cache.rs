use crate::deserializer::Deserializer;
use crate::errors::MapFileError;
use crate::header::SubFileParameter;
use lru::LruCache;
use std::io::{Read, Seek, SeekFrom};
use std::num::NonZeroUsize;

const INDEX_ENTRIES_PER_BLOCK: usize = 128;
const SIZE_OF_INDEX_BLOCK: usize =
    INDEX_ENTRIES_PER_BLOCK * SubFileParameter::BYTES_PER_INDEX_ENTRY as usize;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IndexCacheEntryKey {
    sub_file_parameter: SubFileParameter,
    index_block_number: i64,
}

/// LRU cache of 128-entry index blocks (40-bit packed offset + water flag
/// per entry, see `SubFileParameter::BYTES_PER_INDEX_ENTRY`), keyed by which
/// sub-file and which block of the index they came from.
pub struct IndexCache<R: Read + Seek> {
    map: LruCache<IndexCacheEntryKey, Vec<u8>>,
    file_channel: R,
}

impl<R: Read + Seek> IndexCache<R> {
    pub fn new(file_channel: R, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            map: LruCache::new(capacity),
            file_channel,
        }
    }

    pub fn destroy(&mut self) {
        self.map.clear();
    }

    /// Returns the raw packed 40-bit index entry for `block_number`; the
    /// caller is responsible for masking out the water-flag bit and the
    /// offset, since what each one means depends on whether this is the
    /// last block of the sub-file.
    pub fn get_index_entry(
        &mut self,
        sub_file_parameter: &SubFileParameter,
        block_number: i64,
    ) -> Result<i64, MapFileError> {
        if block_number >= sub_file_parameter.number_of_blocks {
            return Err(MapFileError::IndexOutOfRange(block_number));
        }

        let index_block_number = block_number / INDEX_ENTRIES_PER_BLOCK as i64;
        let key = IndexCacheEntryKey {
            sub_file_parameter: sub_file_parameter.clone(),
            index_block_number,
        };

        let index_block = if let Some(block) = self.map.get(&key) {
            block.clone()
        } else {
            let index_block_position = sub_file_parameter.index_start_address
                + index_block_number * SIZE_OF_INDEX_BLOCK as i64;

            let remaining_index_size =
                (sub_file_parameter.index_end_address - index_block_position) as usize;
            let index_block_size = std::cmp::min(SIZE_OF_INDEX_BLOCK, remaining_index_size);

            if index_block_size == 0 {
                return Err(MapFileError::BlockDecode("invalid index block size".into()));
            }

            let mut index_block = vec![0u8; index_block_size];
            self.file_channel
                .seek(SeekFrom::Start(index_block_position as u64))?;

            match self.file_channel.read_exact(&mut index_block) {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(0),
                Err(e) => return Err(e.into()),
            }

            self.map.put(key, index_block.clone());
            index_block
        };

        let index_entry_in_block = block_number % INDEX_ENTRIES_PER_BLOCK as i64;
        let address_in_index_block =
            (index_entry_in_block * SubFileParameter::BYTES_PER_INDEX_ENTRY as i64) as usize;

        if address_in_index_block + SubFileParameter::BYTES_PER_INDEX_ENTRY as usize
            > index_block.len()
        {
            return Ok(0);
        }

        Ok(Deserializer::get_five_bytes_long(
            &index_block,
            address_in_index_block,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sfp(number_of_blocks: i64, index_start: i64, index_end: i64) -> SubFileParameter {
        SubFileParameter {
            base_zoom_level: 0,
            blocks_height: 1,
            blocks_width: 1,
            boundary_tile_bottom: 0,
            boundary_tile_left: 0,
            boundary_tile_right: 0,
            boundary_tile_top: 0,
            index_end_address: index_end,
            index_start_address: index_start,
            number_of_blocks,
            start_address: 0,
            sub_file_size: 0,
            zoom_level_max: 0,
            zoom_level_min: 0,
        }
    }

    #[test]
    fn rejects_block_number_past_sub_file_extent() {
        let mut cache = IndexCache::new(Cursor::new(vec![0u8; 1024]), 4);
        let param = sfp(1, 0, 5 * INDEX_ENTRIES_PER_BLOCK as i64);
        assert!(cache.get_index_entry(&param, 5).is_err());
    }

    #[test]
    fn caches_repeated_lookups() {
        let mut data = vec![0u8; SIZE_OF_INDEX_BLOCK];
        // entry 0: five bytes, value 42
        data[4] = 42;
        let mut cache = IndexCache::new(Cursor::new(data), 4);
        let param = sfp(1, 0, SIZE_OF_INDEX_BLOCK as i64);
        assert_eq!(cache.get_index_entry(&param, 0).unwrap(), 42);
        // second call should hit the cache and still return the same value
        assert_eq!(cache.get_index_entry(&param, 0).unwrap(), 42);
    }
}
