mod common;

use common::MapFileBuilder;
use mapsforge_tile_decoder::MapFile;

#[test]
fn reads_header_fields_from_a_well_formed_file() {
    let builder = MapFileBuilder::new()
        .poi_tag("shop")
        .way_tag("highway")
        .poi(0, 0);
    let path = builder.write_to_temp_file();

    let map_file = MapFile::open(&path).expect("open synthetic map file");
    let info = map_file.get_map_file_info().expect("map file info");

    assert_eq!(info.file_version, 3);
    assert_eq!(info.map_date, builder.map_date);
    assert_eq!(info.projection_name, "Mercator");
    assert_eq!(info.tile_pixel_size, 256);
    assert_eq!(info.number_of_sub_files, 1);
    assert_eq!(info.zoom_level_min, builder.base_zoom_level);
    assert_eq!(info.zoom_level_max, builder.base_zoom_level);
    assert_eq!(info.poi_tags.len(), 1);
    assert_eq!(info.poi_tags[0].key, "shop");
    assert_eq!(info.way_tags.len(), 1);
    assert_eq!(info.way_tags[0].key, "highway");
    assert!(!info.debug_file);
    assert!((info.bounding_box.min_latitude - builder.min_latitude).abs() < 1e-6);
    assert!((info.bounding_box.max_longitude - builder.max_longitude).abs() < 1e-6);

    std::fs::remove_file(&path).ok();
}

#[test]
fn rejects_a_file_with_no_magic_byte() {
    let path = std::env::temp_dir().join("mapsforge-tile-decoder-test-garbage.map");
    std::fs::write(&path, vec![0u8; 128]).expect("write garbage file");

    assert!(MapFile::open(&path).is_err());

    std::fs::remove_file(&path).ok();
}

#[test]
fn rejects_a_file_whose_declared_size_does_not_match_its_actual_size() {
    let path = MapFileBuilder::new().poi(0, 0).write_to_temp_file();

    // Corrupt the on-disk file_size field's claim by appending a trailing
    // byte the header doesn't know about.
    let mut bytes = std::fs::read(&path).expect("read synthetic map file");
    bytes.push(0);
    std::fs::write(&path, bytes).expect("rewrite corrupted file");

    assert!(MapFile::open(&path).is_err());

    std::fs::remove_file(&path).ok();
}

#[test]
fn start_position_falls_back_to_the_bounding_box_center_point() {
    let builder = MapFileBuilder::new().poi(0, 0);
    let path = builder.write_to_temp_file();
    let map_file = MapFile::open(&path).expect("open synthetic map file");

    let start = map_file.start_position().expect("start position");
    let expected_lat = (builder.min_latitude + builder.max_latitude) / 2.0;
    let expected_lon = (builder.min_longitude + builder.max_longitude) / 2.0;
    assert!((start.latitude - expected_lat).abs() < 1e-6);
    assert!((start.longitude - expected_lon).abs() < 1e-6);

    std::fs::remove_file(&path).ok();
}
