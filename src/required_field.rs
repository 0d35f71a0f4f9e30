use crate::errors::MapFileError;
use crate::header::MapFileInfoBuilder;
use crate::reader::ReadBuffer;
use crate::types::{BoundingBox, Tag};
use std::io::{Read, Seek};
use tracing::debug;

const BINARY_OSM_MAGIC_BYTE: &str = "mapsforge binary OSM";
const HEADER_SIZE_MAX: i32 = 1000000;
const HEADER_SIZE_MIN: i32 = 70;
const MERCATOR: &str = "Mercator";
const SUPPORTED_FILE_VERSION_MIN: i32 = 3;
const SUPPORTED_FILE_VERSION_MAX: i32 = 5;

pub struct RequiredFields;

impl RequiredFields {
    pub fn read_magic_byte<R: Read + Seek>(
        read_buffer: &mut ReadBuffer<R>,
    ) -> Result<(), MapFileError> {
        const BINARY_OSM_MAGIC_BYTE: &str = "mapsforge binary OSM";
        let magic_byte_length = BINARY_OSM_MAGIC_BYTE.len();

        // Read the magic byte directly with known length, not as a length-prefixed string
        if !read_buffer.read_from_file(magic_byte_length + 4)? {
            return Err(MapFileError::new("reading magic byte has failed"));
        }

        let magic_byte = read_buffer.read_utf8_encoded_string_with_length(magic_byte_length)?;

        if magic_byte != BINARY_OSM_MAGIC_BYTE {
            return Err(MapFileError::new(format!(
                "invalid magic byte: {} (expected: {})",
                magic_byte, BINARY_OSM_MAGIC_BYTE
            )));
        }

        Ok(())
    }

    pub fn read_remaining_header<R: Read + Seek>(
        read_buffer: &mut ReadBuffer<R>,
    ) -> Result<(), MapFileError> {
        let remaining_header_size = read_buffer.read_int()?;
        if remaining_header_size < HEADER_SIZE_MIN || remaining_header_size > HEADER_SIZE_MAX {
            return Err(MapFileError::new(format!(
                "invalid remaining header size: {}",
                remaining_header_size
            )));
        }

        if !read_buffer.read_from_file(remaining_header_size as usize)? {
            return Err(MapFileError::new(format!(
                "reading header data has failed: {}",
                remaining_header_size
            )));
        }

        Ok(())
    }

    pub fn read_file_version<R: Read + Seek>(
        read_buffer: &mut ReadBuffer<R>,
        map_file_info_builder: &mut MapFileInfoBuilder,
    ) -> Result<(), MapFileError> {
        let file_version = read_buffer.read_int()?;
        if file_version < SUPPORTED_FILE_VERSION_MIN || file_version > SUPPORTED_FILE_VERSION_MAX {
            return Err(MapFileError::new(format!(
                "unsupported file version: {}",
                file_version
            )));
        }
        debug!("file version: {}", file_version);
        map_file_info_builder.file_version = file_version;
        Ok(())
    }

    pub fn read_file_size<R: Read + Seek>(
        read_buffer: &mut ReadBuffer<R>,
        file_size: i64,
        map_file_info_builder: &mut MapFileInfoBuilder,
    ) -> Result<(), MapFileError> {
        let header_file_size = read_buffer.read_long()?;
        if header_file_size != file_size {
            return Err(MapFileError::new(format!(
                "invalid file size: {}",
                header_file_size
            )));
        }
        map_file_info_builder.file_size = file_size;
        Ok(())
    }

    pub fn read_bounding_box<R: Read + Seek>(
        read_buffer: &mut ReadBuffer<R>,
        map_file_info_builder: &mut MapFileInfoBuilder,
    ) -> Result<(), MapFileError> {
        let min_latitude = read_buffer.read_int()? as f64 / 1_000_000.0;
        let min_longitude = read_buffer.read_int()? as f64 / 1_000_000.0;
        let max_latitude = read_buffer.read_int()? as f64 / 1_000_000.0;
        let max_longitude = read_buffer.read_int()? as f64 / 1_000_000.0;

        let bounding_box =
            BoundingBox::new(min_latitude, min_longitude, max_latitude, max_longitude)?;
        debug!(
            "bounding box: ({}, {}) - ({}, {})",
            bounding_box.min_latitude,
            bounding_box.min_longitude,
            bounding_box.max_latitude,
            bounding_box.max_longitude
        );
        map_file_info_builder.bounding_box = Some(bounding_box);
        Ok(())
    }

    pub fn read_tile_pixel_size<R: Read + Seek>(
        read_buffer: &mut ReadBuffer<R>,
        map_file_info_builder: &mut MapFileInfoBuilder,
    ) -> Result<(), MapFileError> {
        // No fixed tile size to validate against - renderers query it back
        // out of MapFileInfo and size their tiles to match.
        let tile_pixel_size = read_buffer.read_short()? as i32;
        map_file_info_builder.tile_pixel_size = tile_pixel_size;
        Ok(())
    }

    pub fn read_map_date<R: Read + Seek>(
        read_buffer: &mut ReadBuffer<R>,
        map_file_info_builder: &mut MapFileInfoBuilder,
    ) -> Result<(), MapFileError> {
        let map_date = read_buffer.read_long()?;
        if map_date < 1200000000000 {
            return Err(MapFileError::new(format!(
                "invalid map date: {}",
                map_date
            )));
        }
        map_file_info_builder.map_date = map_date;
        Ok(())
    }
    pub fn read_poi_tags<R: Read + Seek>(
        read_buffer: &mut ReadBuffer<R>,
        map_file_info_builder: &mut MapFileInfoBuilder,
    ) -> Result<(), MapFileError> {
        let number_of_poi_tags = read_buffer.read_short()? as i32;
        if number_of_poi_tags < 0 {
            return Err(MapFileError::new(format!(
                "invalid number of POI tags: {}",
                number_of_poi_tags
            )));
        }

        let mut poi_tags = Vec::with_capacity(number_of_poi_tags as usize);
        for current_tag_id in 0..number_of_poi_tags {
            let tag = read_buffer.read_utf8_encoded_string()?;
            if tag.is_empty() {
                return Err(MapFileError::new(format!(
                    "POI tag must not be null: {}",
                    current_tag_id
                )));
            }
            poi_tags.push(Tag::from_string(tag));
        }
        debug!("read {} POI tags", poi_tags.len());
        map_file_info_builder.poi_tags = poi_tags;
        Ok(())
    }

    pub fn read_projection_name<R: Read + Seek>(
        read_buffer: &mut ReadBuffer<R>,
        map_file_info_builder: &mut MapFileInfoBuilder,
    ) -> Result<(), MapFileError> {
        let projection_name = read_buffer.read_utf8_encoded_string()?;
        if projection_name != MERCATOR {
            return Err(MapFileError::new(format!(
                "unsupported projection: {}",
                projection_name
            )));
        }
        map_file_info_builder.projection_name = projection_name;
        Ok(())
    }

    pub fn read_way_tags<R: Read + Seek>(
        read_buffer: &mut ReadBuffer<R>,
        map_file_info_builder: &mut MapFileInfoBuilder,
    ) -> Result<(), MapFileError> {
        let number_of_way_tags = read_buffer.read_short()? as i32;
        if number_of_way_tags < 0 {
            return Err(MapFileError::new(format!(
                "invalid number of way tags: {}",
                number_of_way_tags
            )));
        }

        let mut way_tags = Vec::with_capacity(number_of_way_tags as usize);
        for current_tag_id in 0..number_of_way_tags {
            let tag = read_buffer.read_utf8_encoded_string()?;
            if tag.is_empty() {
                return Err(MapFileError::new(format!(
                    "way tag must not be null: {}",
                    current_tag_id
                )));
            }
            way_tags.push(Tag::from_string(tag));
        }
        debug!("read {} way tags", way_tags.len());
        map_file_info_builder.way_tags = way_tags;
        Ok(())
    }
}
