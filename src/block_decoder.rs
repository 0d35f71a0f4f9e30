use std::io::{Read, Seek};

use tracing::warn;

use crate::callback::TileCallback;
use crate::errors::MapFileError;
use crate::header::SubFileParameter;
use crate::map_file::Selector;
use crate::query_parameters::QueryParameters;
use crate::reader::ReadBuffer;
use crate::types::{BoundingBox, LatLongUtils, Tag};

// POI constants
const POI_FEATURE_ELEVATION: u8 = 0x20;
const POI_FEATURE_HOUSE_NUMBER: u8 = 0x40;
const POI_FEATURE_NAME: u8 = 0x80;
const POI_LAYER_BITMASK: u8 = 0xf0;
const POI_LAYER_SHIFT: u8 = 4;
const POI_NUMBER_OF_TAGS_BITMASK: u8 = 0x0f;
/// The on-disk layer nibble is an unsigned 0..15 value biased by this much
/// so it can represent signed layers -5..+10 without a sign bit.
const LAYER_BIAS: i8 = 5;

const SIGNATURE_LENGTH_BLOCK: usize = 32;
const SIGNATURE_LENGTH_POI: usize = 32;
const SIGNATURE_LENGTH_WAY: usize = 32;

const TAG_KEY_ELE: &str = "ele";
const TAG_KEY_HOUSE_NUMBER: &str = "addr:housenumber";
const TAG_KEY_NAME: &str = "name";
const TAG_KEY_REF: &str = "ref";

const WAY_FEATURE_DATA_BLOCKS_BYTE: u8 = 0x08;
const WAY_FEATURE_DOUBLE_DELTA_ENCODING: u8 = 0x04;
const WAY_FEATURE_HOUSE_NUMBER: u8 = 0x40;
const WAY_FEATURE_LABEL_POSITION: u8 = 0x10;
const WAY_FEATURE_NAME: u8 = 0x80;
const WAY_FEATURE_REF: u8 = 0x20;
const WAY_LAYER_BITMASK: u8 = 0xf0;
const WAY_LAYER_SHIFT: u8 = 4;
const WAY_NUMBER_OF_TAGS_BITMASK: u8 = 0x0f;

const INVALID_FIRST_WAY_OFFSET: &str = "invalid first way offset: ";
const MAX_WAY_COORDINATE_BLOCKS: usize = i16::MAX as usize;
const MAX_WAY_NODES_PER_BLOCK: usize = i16::MAX as usize;

/// How aggressively `process_ways` extends the query bounding box before
/// deciding whether a way is relevant, and the small-node elision
/// thresholds a future revision could use. Carried as config rather than
/// the teacher's `static mut` globals.
#[derive(Debug, Clone, Copy)]
pub struct WayFilterConfig {
    pub enabled: bool,
    pub distance_meters: i32,
    pub min_lat_filter: f64,
    pub min_lon_filter: f64,
}

impl Default for WayFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            distance_meters: 20,
            min_lat_filter: 0.0,
            min_lon_filter: 0.0,
        }
    }
}

/// Decodes one base-zoom block at a time, reusing its scratch buffers
/// across calls so decoding a tile never allocates per-POI or per-way.
#[derive(Default)]
pub struct BlockDecoder {
    coords: Vec<f32>,
    lengths: Vec<i32>,
    delta_scratch: Vec<i32>,
    poi_tags: Vec<Tag>,
    way_tags: Vec<Tag>,
    /// Raw way-strings block for the block currently being decoded, captured
    /// once by `process_ways` before the way sequence and reused for every
    /// name/house-number/ref reference in it.
    string_pool: Vec<u8>,
    /// Tags most recently handed to `render_way` (or replayed from a way
    /// `skip_ways` fast-forwarded past) in the block currently being
    /// decoded, reset at the start of each `process_ways` call.
    last_way_tags: Option<Vec<Tag>>,
}

impl BlockDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn process_block<R: Read + Seek>(
        &mut self,
        read_buffer: &mut ReadBuffer<R>,
        query_parameters: &QueryParameters,
        sub_file_parameter: &SubFileParameter,
        bounding_box: &BoundingBox,
        tile_latitude: f64,
        tile_longitude: f64,
        selector: Selector,
        debug_file: bool,
        poi_tag_table: &[Tag],
        way_tag_table: &[Tag],
        way_filter: &WayFilterConfig,
        callback: &mut dyn TileCallback,
    ) -> Result<(), MapFileError> {
        if debug_file {
            let signature =
                read_buffer.read_utf8_encoded_string_with_length(SIGNATURE_LENGTH_BLOCK)?;
            if !signature.starts_with("###TileStart") {
                return Err(MapFileError::BlockDecode(format!(
                    "invalid block signature: {}",
                    signature
                )));
            }
        }

        let zoom_table = Self::read_zoom_table(sub_file_parameter, read_buffer)?;
        let zoom_table_row =
            query_parameters.query_zoom_level - sub_file_parameter.zoom_level_min as i32;
        let row = zoom_table
            .get(zoom_table_row as usize)
            .ok_or_else(|| MapFileError::BlockDecode("zoom table row out of range".into()))?;
        let pois_on_query_zoom_level = row[0] as usize;
        let ways_on_query_zoom_level = row[1] as usize;

        let first_way_offset = read_buffer.read_unsigned_int()? as i64;
        if first_way_offset < 0 {
            return Err(MapFileError::BlockDecode(format!(
                "{}{}",
                INVALID_FIRST_WAY_OFFSET, first_way_offset
            )));
        }
        let first_way_offset = first_way_offset + read_buffer.get_buffer_position() as i64;
        if first_way_offset > read_buffer.get_buffer_size() as i64 {
            return Err(MapFileError::BlockDecode(format!(
                "{}{}",
                INVALID_FIRST_WAY_OFFSET, first_way_offset
            )));
        }

        let filter_required =
            query_parameters.query_zoom_level > sub_file_parameter.base_zoom_level as i32;

        self.process_pois(
            read_buffer,
            tile_latitude,
            tile_longitude,
            pois_on_query_zoom_level,
            bounding_box,
            filter_required,
            debug_file,
            poi_tag_table,
            callback,
        );

        if matches!(selector, Selector::Pois) {
            return Ok(());
        }

        if read_buffer.get_buffer_position() as i64 > first_way_offset {
            return Err(MapFileError::BlockDecode(format!(
                "invalid buffer position: {}",
                read_buffer.get_buffer_position()
            )));
        }
        read_buffer.set_buffer_position(first_way_offset as usize);

        self.process_ways(
            read_buffer,
            query_parameters,
            ways_on_query_zoom_level,
            bounding_box,
            filter_required,
            tile_latitude,
            tile_longitude,
            selector,
            debug_file,
            way_tag_table,
            way_filter,
            callback,
        )
    }

    fn read_zoom_table<R: Read + Seek>(
        sub_file_parameter: &SubFileParameter,
        read_buffer: &mut ReadBuffer<R>,
    ) -> Result<Vec<[i32; 2]>, MapFileError> {
        let rows =
            (sub_file_parameter.zoom_level_max - sub_file_parameter.zoom_level_min + 1) as usize;
        let mut zoom_table = vec![[0, 0]; rows];

        let mut cumulated_pois = 0i32;
        let mut cumulated_ways = 0i32;
        for row in zoom_table.iter_mut() {
            cumulated_pois += read_buffer.read_unsigned_int()? as i32;
            cumulated_ways += read_buffer.read_unsigned_int()? as i32;
            row[0] = cumulated_pois;
            row[1] = cumulated_ways;
        }

        Ok(zoom_table)
    }

    #[allow(clippy::too_many_arguments)]
    fn process_pois<R: Read + Seek>(
        &mut self,
        read_buffer: &mut ReadBuffer<R>,
        tile_latitude: f64,
        tile_longitude: f64,
        number_of_pois: usize,
        bounding_box: &BoundingBox,
        filter_required: bool,
        debug_file: bool,
        poi_tag_table: &[Tag],
        callback: &mut dyn TileCallback,
    ) {
        for poi_index in 0..number_of_pois {
            if let Err(e) = self.process_one_poi(
                read_buffer,
                tile_latitude,
                tile_longitude,
                bounding_box,
                filter_required,
                debug_file,
                poi_tag_table,
                callback,
            ) {
                warn!(
                    "stopping POI processing for this block at poi {}/{}: {}",
                    poi_index, number_of_pois, e
                );
                return;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_one_poi<R: Read + Seek>(
        &mut self,
        read_buffer: &mut ReadBuffer<R>,
        tile_latitude: f64,
        tile_longitude: f64,
        bounding_box: &BoundingBox,
        filter_required: bool,
        debug_file: bool,
        poi_tag_table: &[Tag],
        callback: &mut dyn TileCallback,
    ) -> Result<(), MapFileError> {
        if debug_file {
            let signature =
                read_buffer.read_utf8_encoded_string_with_length(SIGNATURE_LENGTH_POI)?;
            if !signature.starts_with("***POIStart") {
                return Err(MapFileError::BlockDecode(format!(
                    "invalid POI signature: {}",
                    signature
                )));
            }
        }

        let latitude =
            tile_latitude + LatLongUtils::microdegrees_to_degrees(read_buffer.read_signed_int()?);
        let longitude =
            tile_longitude + LatLongUtils::microdegrees_to_degrees(read_buffer.read_signed_int()?);

        let special_byte = read_buffer.read_byte()?;
        let layer = ((special_byte & POI_LAYER_BITMASK) >> POI_LAYER_SHIFT) as i8 - LAYER_BIAS;
        let number_of_tags = special_byte & POI_NUMBER_OF_TAGS_BITMASK;

        self.poi_tags = read_buffer.read_tags(poi_tag_table, number_of_tags)?;

        let feature_byte = read_buffer.read_byte()?;
        if feature_byte & POI_FEATURE_NAME != 0 {
            self.poi_tags.push(Tag::new(
                TAG_KEY_NAME.to_string(),
                read_buffer.read_utf8_encoded_string()?,
            ));
        }
        if feature_byte & POI_FEATURE_HOUSE_NUMBER != 0 {
            self.poi_tags.push(Tag::new(
                TAG_KEY_HOUSE_NUMBER.to_string(),
                read_buffer.read_utf8_encoded_string()?,
            ));
        }
        if feature_byte & POI_FEATURE_ELEVATION != 0 {
            self.poi_tags.push(Tag::new(
                TAG_KEY_ELE.to_string(),
                read_buffer.read_signed_int()?.to_string(),
            ));
        }

        if !filter_required || bounding_box.contains(latitude, longitude) {
            let lat_micro = LatLongUtils::degrees_to_microdegrees(latitude);
            let lon_micro = LatLongUtils::degrees_to_microdegrees(longitude);
            callback.render_point_of_interest(layer, lat_micro, lon_micro, &self.poi_tags);
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn process_ways<R: Read + Seek>(
        &mut self,
        read_buffer: &mut ReadBuffer<R>,
        query_parameters: &QueryParameters,
        number_of_ways: usize,
        bounding_box: &BoundingBox,
        filter_required: bool,
        tile_latitude: f64,
        tile_longitude: f64,
        selector: Selector,
        debug_file: bool,
        way_tag_table: &[Tag],
        way_filter: &WayFilterConfig,
        callback: &mut dyn TileCallback,
    ) -> Result<(), MapFileError> {
        let filter_bbox = if way_filter.enabled {
            bounding_box.extend_meters(way_filter.distance_meters)
        } else {
            bounding_box.clone()
        };

        let strings_size = read_buffer.read_unsigned_int()? as usize;
        self.string_pool.clear();
        self.string_pool.resize(strings_size, 0);
        read_buffer.read_bytes(&mut self.string_pool)?;
        self.last_way_tags = None;

        let mut way_index = 0;
        while way_index < number_of_ways {
            match self.process_one_way(
                read_buffer,
                query_parameters,
                filter_required,
                tile_latitude,
                tile_longitude,
                selector,
                debug_file,
                way_tag_table,
                way_filter,
                &filter_bbox,
                callback,
            ) {
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "aborting way processing for this block at way {}/{}: {}",
                        way_index, number_of_ways, e
                    );
                    return Err(e);
                }
            }
            way_index += 1;
        }

        Ok(())
    }

    /// Decodes (or skips, if excluded by the tile bitmask) exactly one way
    /// entry. Returns once the cursor sits at the start of the next entry.
    #[allow(clippy::too_many_arguments)]
    fn process_one_way<R: Read + Seek>(
        &mut self,
        read_buffer: &mut ReadBuffer<R>,
        query_parameters: &QueryParameters,
        filter_required: bool,
        tile_latitude: f64,
        tile_longitude: f64,
        selector: Selector,
        debug_file: bool,
        way_tag_table: &[Tag],
        way_filter: &WayFilterConfig,
        filter_bbox: &BoundingBox,
        callback: &mut dyn TileCallback,
    ) -> Result<(), MapFileError> {
        if debug_file {
            let signature =
                read_buffer.read_utf8_encoded_string_with_length(SIGNATURE_LENGTH_WAY)?;
            if !signature.starts_with("---WayStart") {
                return Err(MapFileError::BlockDecode(format!(
                    "invalid way signature: {}",
                    signature
                )));
            }
        }

        // skip_ways(bitmask, 1) either rewinds to right after way_data_size
        // (this way intersects the query tile; keep decoding) or consumes
        // the whole entry and returns 0 (this way is irrelevant; nothing
        // left to decode for it). Either way it records the flag-byte
        // position of the last way it skipped, so a kept way immediately
        // following a run of skips can replay and compare against that
        // way's tags instead of the previous *kept* way's.
        let mut last_tag_position = None;
        if query_parameters.use_tile_bitmask {
            let (remaining, skipped_at) =
                read_buffer.skip_ways(query_parameters.query_tile_bitmask as u16, 1)?;
            last_tag_position = skipped_at;
            if remaining == 0 {
                return Ok(());
            }
            read_buffer.skip_bytes(2)?; // the tile bitmask field itself
        } else {
            read_buffer.read_unsigned_int()?; // way_data_size, unused here
            read_buffer.skip_bytes(2)?; // tile bitmask field, unused here
        }

        let special_byte = read_buffer.read_byte()?;
        let layer = ((special_byte & WAY_LAYER_BITMASK) >> WAY_LAYER_SHIFT) as i8 - LAYER_BIAS;
        let number_of_tags = special_byte & WAY_NUMBER_OF_TAGS_BITMASK;

        self.way_tags = read_buffer.read_tags(way_tag_table, number_of_tags)?;

        // tags_changed compares the tag-index-derived array only (not the
        // name/house-number/ref fields decoded below) against whichever tag
        // array was decoded last in this block - the previous kept way, or,
        // if skip_ways just fast-forwarded past one or more ways, the last
        // one of those, replayed from its recorded flag-byte position.
        let previous_tags = match last_tag_position {
            Some(position) => Some(read_buffer.peek_tags_at(position, way_tag_table)?),
            None => self.last_way_tags.clone(),
        };
        let tags_changed = previous_tags.as_deref() != Some(self.way_tags.as_slice());
        self.last_way_tags = Some(self.way_tags.clone());

        let feature_byte = read_buffer.read_byte()?;
        let feature_name = feature_byte & WAY_FEATURE_NAME != 0;
        let feature_house_number = feature_byte & WAY_FEATURE_HOUSE_NUMBER != 0;
        let feature_ref = feature_byte & WAY_FEATURE_REF != 0;
        let feature_label_position = feature_byte & WAY_FEATURE_LABEL_POSITION != 0;
        let feature_data_blocks_byte = feature_byte & WAY_FEATURE_DATA_BLOCKS_BYTE != 0;
        let feature_double_delta = feature_byte & WAY_FEATURE_DOUBLE_DELTA_ENCODING != 0;

        // Name/house-number/ref are VBE-U byte-offset references into the
        // way-string pool captured at the top of process_ways, not inline
        // strings - resolve each through the callback before it ever
        // reaches render_way.
        if feature_name {
            let reference = read_buffer.read_unsigned_int()? as i32;
            self.way_tags.push(Tag::new(
                TAG_KEY_NAME.to_string(),
                callback.read_string(&self.string_pool, reference)?,
            ));
        }
        if feature_house_number {
            let reference = read_buffer.read_unsigned_int()? as i32;
            self.way_tags.push(Tag::new(
                TAG_KEY_HOUSE_NUMBER.to_string(),
                callback.read_string(&self.string_pool, reference)?,
            ));
        }
        if feature_ref {
            let reference = read_buffer.read_unsigned_int()? as i32;
            self.way_tags.push(Tag::new(
                TAG_KEY_REF.to_string(),
                callback.read_string(&self.string_pool, reference)?,
            ));
        }

        // Label placement is a rendering concern, out of scope for a decode
        // callback - read past it to keep the cursor aligned and drop it.
        if feature_label_position {
            read_buffer.read_signed_int()?;
            read_buffer.read_signed_int()?;
        }

        let way_data_blocks = if feature_data_blocks_byte {
            read_buffer.read_unsigned_int()? as i32
        } else {
            1
        };
        if way_data_blocks < 1 {
            return Err(MapFileError::BlockDecode(format!(
                "invalid number of way data blocks: {}",
                way_data_blocks
            )));
        }

        for _ in 0..way_data_blocks {
            self.coords.clear();
            self.lengths.clear();
            self.decode_way_data_block(
                tile_latitude,
                tile_longitude,
                feature_double_delta,
                read_buffer,
            )?;

            if self.coords.is_empty() {
                continue;
            }

            if filter_required
                && way_filter.enabled
                && !Self::coords_intersect_bbox(&self.coords, filter_bbox)
            {
                continue;
            }

            let emit = matches!(selector, Selector::All)
                || feature_name
                || feature_house_number
                || feature_ref
                || Self::has_label_tag(&self.way_tags);
            if !emit {
                continue;
            }

            callback.render_way(
                layer,
                &self.way_tags,
                &self.coords,
                &self.lengths,
                tags_changed,
            );
        }

        Ok(())
    }

    fn decode_way_data_block<R: Read + Seek>(
        &mut self,
        tile_latitude: f64,
        tile_longitude: f64,
        double_delta_encoding: bool,
        read_buffer: &mut ReadBuffer<R>,
    ) -> Result<(), MapFileError> {
        let number_of_blocks = read_buffer.read_unsigned_int()? as usize;
        if number_of_blocks < 1 || number_of_blocks > MAX_WAY_COORDINATE_BLOCKS {
            return Err(MapFileError::BlockDecode(format!(
                "invalid number of way coordinate blocks: {}",
                number_of_blocks
            )));
        }

        for _ in 0..number_of_blocks {
            let number_of_way_nodes = read_buffer.read_unsigned_int()? as usize;
            if number_of_way_nodes < 2 || number_of_way_nodes > MAX_WAY_NODES_PER_BLOCK {
                return Err(MapFileError::BlockDecode(format!(
                    "invalid number of way nodes: {}",
                    number_of_way_nodes
                )));
            }

            self.delta_scratch.resize(number_of_way_nodes * 2, 0);
            read_buffer.read_signed_ints(&mut self.delta_scratch)?;

            let start_len = self.coords.len();
            if double_delta_encoding {
                Self::decode_double_delta(
                    &self.delta_scratch,
                    tile_latitude,
                    tile_longitude,
                    &mut self.coords,
                );
            } else {
                Self::decode_single_delta(
                    &self.delta_scratch,
                    tile_latitude,
                    tile_longitude,
                    &mut self.coords,
                );
            }
            let emitted_pairs = (self.coords.len() - start_len) / 2;
            self.lengths.push(emitted_pairs as i32);
        }

        Ok(())
    }

    fn decode_single_delta(deltas: &[i32], tile_lat: f64, tile_lon: f64, out: &mut Vec<f32>) {
        let mut lat = tile_lat + LatLongUtils::microdegrees_to_degrees(deltas[0]);
        let mut lon = tile_lon + LatLongUtils::microdegrees_to_degrees(deltas[1]);
        out.push(lon as f32);
        out.push(lat as f32);

        let node_count = deltas.len() / 2;
        for i in 1..node_count {
            lat += LatLongUtils::microdegrees_to_degrees(deltas[2 * i]);
            lon += LatLongUtils::microdegrees_to_degrees(deltas[2 * i + 1]);
            lon = clamp_longitude(lon);
            out.push(lon as f32);
            out.push(lat as f32);
        }
    }

    fn decode_double_delta(deltas: &[i32], tile_lat: f64, tile_lon: f64, out: &mut Vec<f32>) {
        let mut lat = tile_lat + LatLongUtils::microdegrees_to_degrees(deltas[0]);
        let mut lon = tile_lon + LatLongUtils::microdegrees_to_degrees(deltas[1]);
        out.push(lon as f32);
        out.push(lat as f32);

        let mut single_delta_lat = 0.0;
        let mut single_delta_lon = 0.0;
        let node_count = deltas.len() / 2;
        for i in 1..node_count {
            let double_delta_lat = LatLongUtils::microdegrees_to_degrees(deltas[2 * i]);
            let double_delta_lon = LatLongUtils::microdegrees_to_degrees(deltas[2 * i + 1]);
            single_delta_lat += double_delta_lat;
            single_delta_lon += double_delta_lon;
            lat += single_delta_lat;
            lon += single_delta_lon;
            lon = clamp_longitude(lon);
            out.push(lon as f32);
            out.push(lat as f32);
        }
    }

    fn has_label_tag(tags: &[Tag]) -> bool {
        tags.iter()
            .any(|tag| tag.key == TAG_KEY_NAME || tag.key == TAG_KEY_REF)
    }

    fn coords_intersect_bbox(coords: &[f32], bbox: &BoundingBox) -> bool {
        coords
            .chunks_exact(2)
            .any(|pair| bbox.contains(pair[1] as f64, pair[0] as f64))
    }
}

fn clamp_longitude(longitude: f64) -> f64 {
    if longitude < LatLongUtils::LONGITUDE_MIN
        && (LatLongUtils::LONGITUDE_MIN - longitude).abs() < 0.001
    {
        LatLongUtils::LONGITUDE_MIN
    } else if longitude > LatLongUtils::LONGITUDE_MAX
        && (longitude - LatLongUtils::LONGITUDE_MAX).abs() < 0.001
    {
        LatLongUtils::LONGITUDE_MAX
    } else {
        longitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_delta_straight_line_preserves_endpoints() {
        // Two nodes, delta in microdegrees: (0,0) then +1000000 lat, +1000000 lon
        let deltas = vec![0, 0, 1_000_000, 1_000_000];
        let mut out = Vec::new();
        BlockDecoder::decode_single_delta(&deltas, 10.0, 20.0, &mut out);
        assert_eq!(out.len(), 4);
        assert!((out[0] - 20.0).abs() < 1e-4);
        assert!((out[1] - 10.0).abs() < 1e-4);
        assert!((out[2] - 21.0).abs() < 1e-4);
        assert!((out[3] - 11.0).abs() < 1e-4);
    }

    #[test]
    fn double_delta_accumulates_velocity() {
        // node0 at origin, node1 +1 delta, node2 double-delta +1 (so lat advances by 1 then 2)
        let deltas = vec![0, 0, 1_000_000, 1_000_000, 1_000_000, 1_000_000];
        let mut out = Vec::new();
        BlockDecoder::decode_double_delta(&deltas, 0.0, 0.0, &mut out);
        assert_eq!(out.len(), 6);
        // node2 lat = 1 (single delta after node1) + 2 (double-delta accumulation) = 3
        assert!((out[5] - 3.0).abs() < 1e-4);
    }

    #[test]
    fn layer_bias_recenters_nibble() {
        let nibble: u8 = 5; // encodes layer 0
        let layer = nibble as i8 - LAYER_BIAS;
        assert_eq!(layer, 0);
    }
}
