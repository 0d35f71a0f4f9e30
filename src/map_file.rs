use tracing::{info, warn};

use crate::block_decoder::{BlockDecoder, WayFilterConfig};
use crate::callback::TileCallback;
use crate::errors::MapFileError;
use crate::header::{MapFileHeader, MapFileInfo};
use crate::index_cache::IndexCache;
use crate::map_data::{MapReadResult, PointOfInterest, PoiWayBundle, Way};
use crate::mercator::MercatorProjection;
use crate::query_parameters::QueryParameters;
use crate::reader::ReadBuffer;
use crate::tile::Tile;
use crate::types::{BoundingBox, LatLong, LatLongUtils, Tag};
use crate::SubFileParameter;
use std::fs::File;
use std::path::Path;

pub const INDEX_CACHE_SIZE: usize = 64;
pub const DEFAULT_START_ZOOM_LEVEL: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selector {
    All,
    Pois,
    Named,
}

const BITMASK_INDEX_OFFSET: i64 = 0x7F_FFFF_FFFF;
const BITMASK_INDEX_WATER: i64 = 0x8000000000;

/// Tunables the teacher hard-codes as free-standing `const`s and two
/// `static mut` globals (`WAY_FILTER_ENABLED`/`WAY_FILTER_DISTANCE`).
/// Collected here as one explicit, inspectable value with no process-wide
/// mutable state.
#[derive(Debug, Clone, Copy)]
pub struct DecoderConfig {
    pub max_buffer_size: usize,
    pub max_way_nodes_sequence_length: usize,
    pub index_cache_capacity: usize,
    pub way_filter_enabled: bool,
    pub way_filter_distance_meters: i32,
    pub min_lat_filter: f64,
    pub min_lon_filter: f64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 1024 * 1024 * 10,
            max_way_nodes_sequence_length: i16::MAX as usize,
            index_cache_capacity: INDEX_CACHE_SIZE,
            way_filter_enabled: true,
            way_filter_distance_meters: 20,
            min_lat_filter: 0.0,
            min_lon_filter: 0.0,
        }
    }
}

impl DecoderConfig {
    fn way_filter(&self) -> WayFilterConfig {
        WayFilterConfig {
            enabled: self.way_filter_enabled,
            distance_meters: self.way_filter_distance_meters,
            min_lat_filter: self.min_lat_filter,
            min_lon_filter: self.min_lon_filter,
        }
    }
}

pub struct MapFile {
    file: File,
    pub header: MapFileHeader,
    database_index_cache: Option<IndexCache<File>>,
    file_size: i64,
    timestamp: i64,
    zoom_level_min: u8,
    zoom_level_max: u8,
    config: DecoderConfig,
    block_decoder: BlockDecoder,
}

impl MapFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MapFileError> {
        Self::open_with_config(path, DecoderConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        config: DecoderConfig,
    ) -> Result<Self, MapFileError> {
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len() as i64;
        let timestamp = std::fs::metadata(&path)?
            .modified()?
            .duration_since(std::time::UNIX_EPOCH)?
            .as_secs() as i64;

        let mut read_buffer = ReadBuffer::new(file.try_clone()?);

        let mut header = MapFileHeader::new();
        header.read_header(&mut read_buffer, file_size)?;

        let database_index_cache = Some(IndexCache::new(
            file.try_clone()?,
            config.index_cache_capacity,
        ));

        Ok(Self {
            file,
            header,
            database_index_cache,
            file_size,
            timestamp,
            zoom_level_min: 0,
            zoom_level_max: u8::MAX,
            config,
            block_decoder: BlockDecoder::new(),
        })
    }

    pub fn get_map_file_info(&self) -> Option<&MapFileInfo> {
        self.header.get_map_file_info()
    }

    pub fn get_data_timestamp(&self, _tile: &Tile) -> i64 {
        self.timestamp
    }

    pub fn get_map_languages(&self) -> Option<Vec<String>> {
        self.get_map_file_info().and_then(|info| {
            info.languages_preference
                .as_ref()
                .map(|langs| langs.split(',').map(|s| s.to_string()).collect())
        })
    }

    pub fn restrict_to_zoom_range(&mut self, min_zoom: u8, max_zoom: u8) {
        self.zoom_level_max = max_zoom;
        self.zoom_level_min = min_zoom;
    }

    pub fn start_position(&self) -> Result<LatLong, MapFileError> {
        let info = self
            .get_map_file_info()
            .ok_or_else(|| MapFileError::InvalidHeader("missing MapFileInfo".into()))?;
        if let Some(pos) = &info.start_position {
            return Ok(pos.clone());
        }
        Ok(info.bounding_box.get_center_point())
    }

    pub fn start_zoom_level(&self) -> u8 {
        self.get_map_file_info()
            .and_then(|info| info.start_zoom_level)
            .unwrap_or(DEFAULT_START_ZOOM_LEVEL)
    }

    fn close_file_channel(&mut self) {
        if let Some(cache) = &mut self.database_index_cache {
            cache.destroy();
        }
    }

    /// Streams every POI/way in `tile` to `callback` without allocating a
    /// return value - the zero-allocation entry point. Format-level errors
    /// (truncated index, I/O failure) propagate; per-block/per-record
    /// failures are logged and the query continues with the next block.
    pub fn execute_query(
        &mut self,
        tile: &Tile,
        callback: &mut dyn TileCallback,
    ) -> Result<(), MapFileError> {
        self.execute_query_range(tile, tile, Selector::All, callback)?;
        Ok(())
    }

    fn execute_query_range(
        &mut self,
        upper_left: &Tile,
        lower_right: &Tile,
        selector: Selector,
        callback: &mut dyn TileCallback,
    ) -> Result<bool, MapFileError> {
        if upper_left.tile_x > lower_right.tile_x || upper_left.tile_y > lower_right.tile_y {
            return Err(MapFileError::InvalidHeader(
                "upper-left tile must be above and left of lower-right tile".into(),
            ));
        }

        if upper_left.zoom_level < self.zoom_level_min || upper_left.zoom_level > self.zoom_level_max
        {
            return Ok(false);
        }

        let query_zoom_level = self.header.get_query_zoom_level(upper_left.zoom_level) as i32;
        let sub_file_parameter = self
            .header
            .get_sub_file_parameter(query_zoom_level as usize)
            .ok_or_else(|| {
                MapFileError::InvalidHeader(format!(
                    "no sub-file for zoom level: {}",
                    query_zoom_level
                ))
            })?
            .clone();

        let mut query_parameters = QueryParameters::new();
        query_parameters.query_zoom_level = query_zoom_level;
        query_parameters.calculate_base_tiles(upper_left, lower_right, &sub_file_parameter);
        query_parameters.calculate_blocks(&sub_file_parameter);

        let bounding_box = Tile::get_bounding_box_range(upper_left, lower_right);

        self.process_blocks(
            &query_parameters,
            &sub_file_parameter,
            &bounding_box,
            selector,
            callback,
        )
    }

    fn process_blocks(
        &mut self,
        query_parameters: &QueryParameters,
        sub_file_parameter: &SubFileParameter,
        bounding_box: &BoundingBox,
        selector: Selector,
        callback: &mut dyn TileCallback,
    ) -> Result<bool, MapFileError> {
        let mut query_is_water = true;
        let mut query_read_water_info = false;

        let debug_file = self
            .get_map_file_info()
            .map(|info| info.debug_file)
            .unwrap_or(false);
        let poi_tag_table = self
            .get_map_file_info()
            .map(|info| info.poi_tags.clone())
            .unwrap_or_default();
        let way_tag_table = self
            .get_map_file_info()
            .map(|info| info.way_tags.clone())
            .unwrap_or_default();
        let way_filter = self.config.way_filter();

        info!(
            "Processing blocks from {} to {} (x) and {} to {} (y)",
            query_parameters.from_block_x,
            query_parameters.to_block_x,
            query_parameters.from_block_y,
            query_parameters.to_block_y
        );

        for row in query_parameters.from_block_y..=query_parameters.to_block_y {
            for column in query_parameters.from_block_x..=query_parameters.to_block_x {
                let block_number = row * sub_file_parameter.blocks_width + column;

                let current_block_index_entry = match self
                    .database_index_cache
                    .as_mut()
                    .ok_or_else(|| MapFileError::InvalidHeader("missing index cache".into()))?
                    .get_index_entry(sub_file_parameter, block_number)
                {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("error getting index entry: {}", e);
                        continue;
                    }
                };

                if query_is_water {
                    query_is_water &= (current_block_index_entry & BITMASK_INDEX_WATER) != 0;
                    query_read_water_info = true;
                }

                let current_block_pointer = current_block_index_entry & BITMASK_INDEX_OFFSET;
                if current_block_pointer == 0 {
                    continue;
                }
                if current_block_pointer > sub_file_parameter.sub_file_size {
                    warn!(
                        "skipping block with pointer > sub_file_size: {} > {}",
                        current_block_pointer, sub_file_parameter.sub_file_size
                    );
                    continue;
                }

                let next_block_pointer = if block_number + 1 == sub_file_parameter.number_of_blocks
                {
                    sub_file_parameter.sub_file_size
                } else {
                    match self
                        .database_index_cache
                        .as_mut()
                        .unwrap()
                        .get_index_entry(sub_file_parameter, block_number + 1)
                    {
                        Ok(next_entry) => {
                            let next_ptr = next_entry & BITMASK_INDEX_OFFSET;
                            if next_ptr > sub_file_parameter.sub_file_size {
                                warn!(
                                    "next block pointer > sub_file_size: {} > {}",
                                    next_ptr, sub_file_parameter.sub_file_size
                                );
                                continue;
                            }
                            next_ptr
                        }
                        Err(e) => {
                            warn!("error getting next index entry: {}", e);
                            continue;
                        }
                    }
                };

                let current_block_size = (next_block_pointer - current_block_pointer) as usize;
                if current_block_size == 0 {
                    continue;
                }
                if current_block_size > self.config.max_buffer_size {
                    warn!(
                        "skipping block larger than max_buffer_size: {} > {}",
                        current_block_size, self.config.max_buffer_size
                    );
                    continue;
                }

                let mut read_buffer = ReadBuffer::new(self.file.try_clone()?);

                let file_position =
                    (sub_file_parameter.start_address + current_block_pointer) as u64;
                match read_buffer.read_from_file_at_offset(file_position, current_block_size) {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!("failed to read block at {}", file_position);
                        continue;
                    }
                    Err(e) => {
                        warn!("error reading block at {}: {}", file_position, e);
                        continue;
                    }
                }

                let tile_latitude = MercatorProjection::tile_y_to_latitude(
                    sub_file_parameter.boundary_tile_top + row,
                    sub_file_parameter.base_zoom_level,
                );
                let tile_longitude = MercatorProjection::tile_x_to_longitude(
                    sub_file_parameter.boundary_tile_left + column,
                    sub_file_parameter.base_zoom_level,
                );

                if let Err(e) = self.block_decoder.process_block(
                    &mut read_buffer,
                    query_parameters,
                    sub_file_parameter,
                    bounding_box,
                    tile_latitude,
                    tile_longitude,
                    selector,
                    debug_file,
                    &poi_tag_table,
                    &way_tag_table,
                    &way_filter,
                    callback,
                ) {
                    warn!("error processing block {}: {}", block_number, e);
                    continue;
                }
            }
        }

        Ok(query_is_water && query_read_water_info)
    }

    /// Returns every POI and way in `tile`, collected into owned vectors.
    /// Allocates a `PointOfInterest`/`Way` per feature; prefer
    /// [`MapFile::execute_query`] on a hot path.
    pub fn read_map_data(&mut self, tile: &Tile) -> Result<MapReadResult, MapFileError> {
        self.read_map_data_impl(tile, tile, Selector::All)
    }

    pub fn read_poi_data(&mut self, tile: &Tile) -> Result<MapReadResult, MapFileError> {
        self.read_map_data_impl(tile, tile, Selector::Pois)
    }

    pub fn read_named_items(&mut self, tile: &Tile) -> Result<MapReadResult, MapFileError> {
        self.read_map_data_impl(tile, tile, Selector::Named)
    }

    fn read_map_data_impl(
        &mut self,
        upper_left: &Tile,
        lower_right: &Tile,
        selector: Selector,
    ) -> Result<MapReadResult, MapFileError> {
        let mut collector = CollectingCallback::default();
        let is_water =
            self.execute_query_range(upper_left, lower_right, selector, &mut collector)?;

        let mut result = MapReadResult::new();
        result.add(PoiWayBundle::new(collector.pois, collector.ways));
        result.is_water = is_water;
        Ok(result)
    }
}

impl Drop for MapFile {
    fn drop(&mut self) {
        self.close_file_channel();
    }
}

/// Adapts the callback-driven decode path back to the teacher's owned
/// `PoiWayBundle`/`MapReadResult` shape, for callers that still want one.
#[derive(Default)]
struct CollectingCallback {
    pois: Vec<PointOfInterest>,
    ways: Vec<Way>,
}

impl TileCallback for CollectingCallback {
    fn render_point_of_interest(&mut self, layer: i8, lat: i32, lon: i32, tags: &[Tag]) {
        let position = LatLong::new(
            LatLongUtils::microdegrees_to_degrees(lat),
            LatLongUtils::microdegrees_to_degrees(lon),
        );
        self.pois
            .push(PointOfInterest::new(layer, tags.to_vec(), position));
    }

    fn render_way(
        &mut self,
        layer: i8,
        tags: &[Tag],
        coords: &[f32],
        lengths: &[i32],
        _tags_changed: bool,
    ) {
        let mut way_nodes = Vec::with_capacity(lengths.len());
        let mut offset = 0usize;
        for &len in lengths {
            let len = len as usize;
            let mut segment = Vec::with_capacity(len);
            for i in 0..len {
                let lon = coords[(offset + i) * 2] as f64;
                let lat = coords[(offset + i) * 2 + 1] as f64;
                segment.push(LatLong::new(lat, lon));
            }
            way_nodes.push(segment);
            offset += len;
        }
        self.ways.push(Way::new(layer, tags.to_vec(), way_nodes, None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_config_default_matches_teacher_constants() {
        let config = DecoderConfig::default();
        assert_eq!(config.index_cache_capacity, INDEX_CACHE_SIZE);
        assert!(config.way_filter_enabled);
        assert_eq!(config.way_filter_distance_meters, 20);
        assert_eq!(config.min_lat_filter, 0.0);
        assert_eq!(config.min_lon_filter, 0.0);
    }
}
