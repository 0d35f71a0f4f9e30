use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

/// Builds a minimal, valid single-sub-file `.map` byte buffer: no fixture
/// files ship with this crate, so tests construct the on-disk format
/// directly from the same field order `MapFileHeader::read_header` expects.
pub struct MapFileBuilder {
    pub min_latitude: f64,
    pub min_longitude: f64,
    pub max_latitude: f64,
    pub max_longitude: f64,
    pub base_zoom_level: u8,
    pub map_date: i64,
    poi_tag_table: Vec<String>,
    way_tag_table: Vec<String>,
    pois: Vec<Vec<u8>>,
    ways: Vec<Vec<u8>>,
    water: bool,
    zoom_level_max_offset: u8,
    /// Way-string pool, built up alongside `ways` by `way_named` - each
    /// entry is a VBE-U length prefix followed by the raw UTF-8 bytes, at
    /// the offset a way's name reference points back to.
    string_pool: Vec<u8>,
}

impl MapFileBuilder {
    pub fn new() -> Self {
        Self {
            min_latitude: 10.0,
            min_longitude: 10.0,
            max_latitude: 10.5,
            max_longitude: 10.5,
            base_zoom_level: 2,
            map_date: 1_600_000_000_000,
            poi_tag_table: Vec::new(),
            way_tag_table: Vec::new(),
            pois: Vec::new(),
            ways: Vec::new(),
            water: false,
            zoom_level_max_offset: 0,
            string_pool: Vec::new(),
        }
    }

    /// Widens the sub-file's zoom range to `base_zoom_level..=base_zoom_level
    /// + offset`, so a query at a deeper zoom level exercises the tile
    /// bitmask path instead of being clamped back to the base zoom level.
    pub fn zoom_level_max_offset(mut self, offset: u8) -> Self {
        self.zoom_level_max_offset = offset;
        self
    }

    pub fn poi_tag(mut self, tag: &str) -> Self {
        self.poi_tag_table.push(tag.to_string());
        self
    }

    pub fn way_tag(mut self, tag: &str) -> Self {
        self.way_tag_table.push(tag.to_string());
        self
    }

    pub fn water(mut self, water: bool) -> Self {
        self.water = water;
        self
    }

    /// Appends one POI record, layer 0, no tags, no features, at an
    /// (lat, lon) micro-degree offset from the tile's reference corner.
    pub fn poi(mut self, lat_offset: i32, lon_offset: i32) -> Self {
        let mut bytes = Vec::new();
        bytes.extend(vbe_s(lat_offset));
        bytes.extend(vbe_s(lon_offset));
        bytes.push(0x50); // layer nibble biased to 5 (signed layer 0), 0 tags
        bytes.push(0x00); // feature byte: no name/house-number/elevation
        self.pois.push(bytes);
        self
    }

    /// Appends one way, layer 0, no tags, single coordinate block, single
    /// delta encoding, with the given (lat, lon) micro-degree node deltas.
    pub fn way(self, node_deltas: &[(i32, i32)]) -> Self {
        self.way_encoded(0xffff, false, node_deltas)
    }

    /// Same as [`MapFileBuilder::way`], but double-delta encoded.
    pub fn way_double_delta(self, node_deltas: &[(i32, i32)]) -> Self {
        self.way_encoded(0xffff, true, node_deltas)
    }

    /// Same as [`MapFileBuilder::way`], but tagged with an explicit tile
    /// bitmask for tile-bitmask-filtering scenarios.
    pub fn way_with_bitmask(self, bitmask: u16, node_deltas: &[(i32, i32)]) -> Self {
        self.way_encoded(bitmask, false, node_deltas)
    }

    fn way_encoded(mut self, bitmask: u16, double_delta: bool, node_deltas: &[(i32, i32)]) -> Self {
        let mut body = Vec::new();
        body.extend_from_slice(&bitmask.to_be_bytes());
        body.push(0x50); // layer nibble biased to 5, 0 tags
        body.push(if double_delta { 0x04 } else { 0x00 }); // WAY_FEATURE_DOUBLE_DELTA_ENCODING
        body.extend(vbe_u(1)); // one coordinate block
        body.extend(vbe_u(node_deltas.len() as u32));
        for &(lat, lon) in node_deltas {
            body.extend(vbe_s(lat));
            body.extend(vbe_s(lon));
        }

        let mut record = Vec::new();
        record.extend(vbe_u(body.len() as u32));
        record.extend(body);
        self.ways.push(record);
        self
    }

    /// Appends one way carrying the given tag-table indices (layer 0, no
    /// features), to exercise `tags_changed` comparisons across ways that
    /// decode to the same or different tag arrays.
    pub fn way_tagged(mut self, tag_indices: &[u32], node_deltas: &[(i32, i32)]) -> Self {
        let mut body = Vec::new();
        body.extend_from_slice(&0xffffu16.to_be_bytes());
        body.push(0x50 | tag_indices.len() as u8);
        for &index in tag_indices {
            body.extend(vbe_u(index));
        }
        body.push(0x00); // feature byte: no name/house-number/ref/double-delta
        body.extend(vbe_u(1));
        body.extend(vbe_u(node_deltas.len() as u32));
        for &(lat, lon) in node_deltas {
            body.extend(vbe_s(lat));
            body.extend(vbe_s(lon));
        }

        let mut record = Vec::new();
        record.extend(vbe_u(body.len() as u32));
        record.extend(body);
        self.ways.push(record);
        self
    }

    /// Appends one way with a pooled name reference (layer 0, no tags).
    pub fn way_named(mut self, name: &str, node_deltas: &[(i32, i32)]) -> Self {
        let reference = self.string_pool.len() as u32;
        self.string_pool.extend(utf8_string(name));

        let mut body = Vec::new();
        body.extend_from_slice(&0xffffu16.to_be_bytes());
        body.push(0x50); // layer nibble biased to 5, 0 tags
        body.push(0x80); // WAY_FEATURE_NAME
        body.extend(vbe_u(reference));
        body.extend(vbe_u(1));
        body.extend(vbe_u(node_deltas.len() as u32));
        for &(lat, lon) in node_deltas {
            body.extend(vbe_s(lat));
            body.extend(vbe_s(lon));
        }

        let mut record = Vec::new();
        record.extend(vbe_u(body.len() as u32));
        record.extend(body);
        self.ways.push(record);
        self
    }

    /// Assembles the file and writes it to a fresh path under the OS temp
    /// directory. Returns the path; the caller owns cleanup.
    pub fn write_to_temp_file(&self) -> PathBuf {
        let bytes = self.build();
        let path = unique_temp_path();
        let mut file = std::fs::File::create(&path).expect("create temp map file");
        file.write_all(&bytes).expect("write temp map file");
        path
    }

    fn build(&self) -> Vec<u8> {
        let header_tail = self.build_header_tail(0);
        let header_length = 21 + 4 + header_tail.len() as i64;

        let block = self.build_block();
        let index_len = 5usize;
        let sub_file_size = (index_len + block.len()) as i64;
        let file_size = header_length + sub_file_size;

        let header_tail = self.build_header_tail(header_length);
        assert_eq!(header_tail.len(), self.build_header_tail(0).len());

        let mut out = Vec::new();
        out.extend_from_slice(b"mapsforge binary OSM");
        out.extend_from_slice(&(header_tail.len() as i32).to_be_bytes());
        out.extend(self.patch_file_size(header_tail, file_size));
        out.extend(self.build_index_entry());
        out.extend(block);
        out
    }

    fn build_index_entry(&self) -> Vec<u8> {
        let mut offset: i64 = 5; // block starts right after this single index entry
        if self.water {
            offset |= 0x8000000000;
        }
        offset.to_be_bytes()[3..8].to_vec()
    }

    fn build_block(&self) -> Vec<u8> {
        let mut poi_data = Vec::new();
        for poi in &self.pois {
            poi_data.extend_from_slice(poi);
        }
        let mut way_data = Vec::new();
        for way in &self.ways {
            way_data.extend_from_slice(way);
        }

        let mut block = Vec::new();
        // One zoom table row per zoom level in the sub-file's range. This
        // block carries the same feature set at every zoom level it serves.
        for _ in 0..=self.zoom_level_max_offset {
            block.extend(vbe_u(self.pois.len() as u32));
            block.extend(vbe_u(self.ways.len() as u32));
        }
        // The way sequence begins with the way-string pool `way_named`
        // builds up; fixtures that never call it leave it empty.
        let mut way_section = vbe_u(self.string_pool.len() as u32);
        way_section.extend(&self.string_pool);
        way_section.extend(way_data);

        block.extend(vbe_u(poi_data.len() as u32)); // first way offset
        block.extend(poi_data);
        block.extend(way_section);
        block
    }

    fn build_header_tail(&self, start_address: i64) -> Vec<u8> {
        let mut tail = Vec::new();
        tail.extend_from_slice(&0i32.to_be_bytes()); // file_version, patched by caller check below
        tail.extend_from_slice(&0i64.to_be_bytes()); // file_size, patched below
        tail.extend_from_slice(&self.map_date.to_be_bytes());
        tail.extend_from_slice(&micro(self.min_latitude).to_be_bytes());
        tail.extend_from_slice(&micro(self.min_longitude).to_be_bytes());
        tail.extend_from_slice(&micro(self.max_latitude).to_be_bytes());
        tail.extend_from_slice(&micro(self.max_longitude).to_be_bytes());
        tail.extend_from_slice(&256i16.to_be_bytes()); // tile pixel size
        tail.extend(utf8_string("Mercator"));
        tail.push(0x00); // optional fields flag: none set
        tail.extend_from_slice(&(self.poi_tag_table.len() as i16).to_be_bytes());
        for tag in &self.poi_tag_table {
            tail.extend(utf8_string(tag));
        }
        tail.extend_from_slice(&(self.way_tag_table.len() as i16).to_be_bytes());
        for tag in &self.way_tag_table {
            tail.extend(utf8_string(tag));
        }
        tail.push(1); // number of sub-files
        tail.push(self.base_zoom_level);
        tail.push(self.base_zoom_level); // zoom_level_min
        tail.push(self.base_zoom_level + self.zoom_level_max_offset); // zoom_level_max
        tail.extend_from_slice(&start_address.to_be_bytes());
        tail.extend_from_slice(&0i64.to_be_bytes()); // sub_file_size, patched below
        tail
    }

    /// `build_header_tail` writes placeholders for `file_version` (always 4,
    /// fixed width) is skipped here; `file_size`/`sub_file_size` are 8-byte
    /// fixed-width fields at known offsets, patched once lengths are known.
    fn patch_file_size(&self, mut tail: Vec<u8>, file_size: i64) -> Vec<u8> {
        tail[0..4].copy_from_slice(&3i32.to_be_bytes()); // supported file version
        tail[4..12].copy_from_slice(&file_size.to_be_bytes());
        let sub_file_size = file_size - (21 + 4 + tail.len() as i64);
        let len = tail.len();
        tail[len - 8..].copy_from_slice(&sub_file_size.to_be_bytes());
        tail
    }
}

fn micro(degrees: f64) -> i32 {
    (degrees * 1_000_000.0).round() as i32
}

fn utf8_string(s: &str) -> Vec<u8> {
    let mut out = vbe_u(s.len() as u32);
    out.extend_from_slice(s.as_bytes());
    out
}

pub fn vbe_u(mut value: u32) -> Vec<u8> {
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

pub fn vbe_s(value: i32) -> Vec<u8> {
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

fn unique_temp_path() -> PathBuf {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let thread_tag: String = format!("{:?}", std::thread::current().id())
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    std::env::temp_dir().join(format!(
        "mapsforge-tile-decoder-test-{}-{}-{}.map",
        std::process::id(),
        thread_tag,
        n
    ))
}
