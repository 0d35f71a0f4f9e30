use std::env;
use std::process::ExitCode;

use mapsforge_tile_decoder::{MapFile, MercatorProjection, Tag, Tile, TileCallback};

/// Prints a summary of a `.map` file and, optionally, the POIs/ways found in
/// one tile. Replaces the teacher's `minifb` GUI with a decode-only CLI -
/// rendering is out of scope here, the callback just counts and previews.
fn main() -> ExitCode {
    tracing_subscriber::fmt::try_init().ok();

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: mapforge-inspect <file.map> [lat lon zoom]");
        return ExitCode::FAILURE;
    };

    let mut map_file = match MapFile::open(&path) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("failed to open {}: {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let Some(info) = map_file.get_map_file_info() else {
        eprintln!("map file has no header info");
        return ExitCode::FAILURE;
    };
    println!("file version:     {}", info.file_version);
    println!("map date:         {}", info.map_date);
    println!("zoom levels:      {}..={}", info.zoom_level_min, info.zoom_level_max);
    println!(
        "bounding box:     ({}, {}) to ({}, {})",
        info.bounding_box.min_latitude,
        info.bounding_box.min_longitude,
        info.bounding_box.max_latitude,
        info.bounding_box.max_longitude
    );
    println!("tile pixel size:  {}", info.tile_pixel_size);
    println!("projection:       {}", info.projection_name);
    println!("sub-files:        {}", info.number_of_sub_files);
    if let Some(comment) = &info.comment {
        println!("comment:          {}", comment);
    }

    let (lat, lon, zoom) = match (args.next(), args.next(), args.next()) {
        (Some(lat), Some(lon), Some(zoom)) => {
            let lat: f64 = match lat.parse() {
                Ok(v) => v,
                Err(_) => {
                    eprintln!("invalid latitude: {}", lat);
                    return ExitCode::FAILURE;
                }
            };
            let lon: f64 = match lon.parse() {
                Ok(v) => v,
                Err(_) => {
                    eprintln!("invalid longitude: {}", lon);
                    return ExitCode::FAILURE;
                }
            };
            let zoom: u8 = match zoom.parse() {
                Ok(v) => v,
                Err(_) => {
                    eprintln!("invalid zoom level: {}", zoom);
                    return ExitCode::FAILURE;
                }
            };
            (lat, lon, zoom)
        }
        _ => return ExitCode::SUCCESS,
    };

    let tile_x = MercatorProjection::longitude_to_tile_x(lon, zoom);
    let tile_y = MercatorProjection::latitude_to_tile_y(lat, zoom);
    let tile = Tile::new(tile_x, tile_y, zoom, 256);

    println!("\nquerying tile ({}, {}) at zoom {}", tile_x, tile_y, zoom);

    let mut callback = PreviewCallback::default();
    if let Err(e) = map_file.execute_query(&tile, &mut callback) {
        eprintln!("query failed: {}", e);
        return ExitCode::FAILURE;
    }

    println!("POIs:  {}", callback.poi_count);
    println!("ways:  {}", callback.way_count);
    for line in &callback.preview {
        println!("  {}", line);
    }

    ExitCode::SUCCESS
}

#[derive(Default)]
struct PreviewCallback {
    poi_count: usize,
    way_count: usize,
    preview: Vec<String>,
}

const PREVIEW_LIMIT: usize = 10;

impl TileCallback for PreviewCallback {
    fn render_point_of_interest(&mut self, layer: i8, lat: i32, lon: i32, tags: &[Tag]) {
        self.poi_count += 1;
        if self.preview.len() < PREVIEW_LIMIT {
            self.preview.push(format!(
                "poi layer={} lat={} lon={} tags={}",
                layer,
                lat,
                lon,
                tags.len()
            ));
        }
    }

    fn render_way(
        &mut self,
        layer: i8,
        tags: &[Tag],
        _coords: &[f32],
        lengths: &[i32],
        _tags_changed: bool,
    ) {
        self.way_count += 1;
        if self.preview.len() < PREVIEW_LIMIT {
            self.preview.push(format!(
                "way layer={} tags={} blocks={}",
                layer,
                tags.len(),
                lengths.len()
            ));
        }
    }
}
