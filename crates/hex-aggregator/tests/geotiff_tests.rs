//! GeoTIFF source tests against synthetic tiles.

use hex_aggregator::{
    extract_window, AggregationError, GeoBounds, GeoTiffSource, GeoTransform, InMemoryRaster,
    PixelWindow, RasterSource,
};
use test_utils::{
    assert_approx_eq, assert_coords_approx_eq, create_cycling_grid, create_scattered_loss_grid,
    lossyear_geotiff_bytes, raster::CASCADES_100X90, raster::CASCADES_400, raster::COARSE_10X10, require_test_file,
    temp_test_dir, write_lossyear_geotiff, LossyearTiff,
};

fn bounds_from(tuple: (f64, f64, f64, f64)) -> GeoBounds {
    let (west, south, east, north) = tuple;
    GeoBounds::new(north, south, east, west)
}

fn cascades_transform() -> GeoTransform {
    GeoTransform::north_up(
        CASCADES_400.origin_lon,
        CASCADES_400.origin_lat,
        CASCADES_400.pixel_size,
        -CASCADES_400.pixel_size,
    )
}

// ============================================================================
// Opening and georeferencing
// ============================================================================

#[test]
fn test_open_reads_dimensions_and_transform() {
    let dir = temp_test_dir();
    let path = dir.path().join("lossyear.tif");
    let data = create_scattered_loss_grid(CASCADES_400.width, CASCADES_400.height, 1);
    write_lossyear_geotiff(&path, &LossyearTiff::new(CASCADES_400, &data)).unwrap();

    let source = GeoTiffSource::open(&path).unwrap();
    assert_eq!(source.dimensions(), (400, 400));

    let gt = source.transform();
    assert!(gt.is_north_up());
    assert_approx_eq!(gt.origin_x, -122.2, 1e-9);
    assert_approx_eq!(gt.origin_y, 44.4, 1e-9);
    assert_approx_eq!(gt.pixel_width, 0.001, 1e-12);
    assert_approx_eq!(gt.pixel_height, -0.001, 1e-12);

    let (lon, lat) = gt.pixel_center(0, 0);
    assert_coords_approx_eq!((lon, lat), (-122.1995, 44.3995), 1e-9);
}

#[test]
fn test_from_reader_in_memory() {
    let data = create_cycling_grid(10, 10, 30);
    let bytes = lossyear_geotiff_bytes(&LossyearTiff::new(COARSE_10X10, &data)).unwrap();

    let mut source = GeoTiffSource::from_reader(std::io::Cursor::new(bytes), "memory").unwrap();
    assert_eq!(source.dimensions(), (10, 10));
    assert_eq!(source.read(&PixelWindow::full(10, 10)).unwrap(), data);
}

#[test]
fn test_tiff_without_georeference_is_rejected() {
    use tiff::encoder::{colortype::Gray8, TiffEncoder};

    let mut cursor = std::io::Cursor::new(Vec::new());
    TiffEncoder::new(&mut cursor)
        .unwrap()
        .write_image::<Gray8>(4, 4, &[0u8; 16])
        .unwrap();
    cursor.set_position(0);

    assert!(matches!(
        GeoTiffSource::from_reader(cursor, "plain"),
        Err(AggregationError::InvalidGeoreference(_))
    ));
}

// ============================================================================
// Windowed reads
// ============================================================================

#[test]
fn test_windowed_read_across_strips_matches_memory() {
    let data = create_scattered_loss_grid(CASCADES_400.width, CASCADES_400.height, 42);
    let bytes = lossyear_geotiff_bytes(
        &LossyearTiff::new(CASCADES_400, &data).with_rows_per_strip(7),
    )
    .unwrap();

    let mut tiff_source = GeoTiffSource::from_reader(std::io::Cursor::new(bytes), "strips").unwrap();
    let mut memory = InMemoryRaster::new(data, 400, 400, cascades_transform()).unwrap();

    for window in [
        PixelWindow::new(0, 0, 400, 400),
        PixelWindow::new(13, 5, 101, 29),
        PixelWindow::new(399, 399, 1, 1),
        PixelWindow::new(0, 393, 400, 7),
        PixelWindow::new(250, 6, 3, 2),
    ] {
        assert_eq!(
            tiff_source.read(&window).unwrap(),
            memory.read(&window).unwrap(),
            "window {:?}",
            window
        );
    }
}

#[test]
fn test_windowed_read_across_tiles_matches_memory() {
    let spec = CASCADES_100X90;
    let data = create_scattered_loss_grid(spec.width, spec.height, 7);
    let transform = GeoTransform::north_up(
        spec.origin_lon,
        spec.origin_lat,
        spec.pixel_size,
        -spec.pixel_size,
    );

    for sixteen_bit in [false, true] {
        // 32 pixel tiles: 4 across, 3 down, right and bottom tiles padded
        let mut tile = LossyearTiff::new(spec, &data).with_tiles(32);
        if sixteen_bit {
            tile = tile.sixteen_bit();
        }
        let bytes = lossyear_geotiff_bytes(&tile).unwrap();

        let mut tiff_source =
            GeoTiffSource::from_reader(std::io::Cursor::new(bytes), "tiles").unwrap();
        let mut memory = InMemoryRaster::new(data.clone(), 100, 90, transform).unwrap();
        assert_eq!(tiff_source.dimensions(), (100, 90));

        for window in [
            PixelWindow::full(100, 90),
            PixelWindow::new(20, 10, 70, 75),
            PixelWindow::new(31, 31, 2, 2),
            PixelWindow::new(90, 60, 10, 30),
            PixelWindow::new(96, 0, 4, 90),
            PixelWindow::new(0, 89, 100, 1),
        ] {
            assert_eq!(
                tiff_source.read(&window).unwrap(),
                memory.read(&window).unwrap(),
                "window {:?} (16-bit: {})",
                window,
                sixteen_bit
            );
        }
    }
}

#[test]
fn test_sixteen_bit_tile_reads_same_values() {
    let data = create_cycling_grid(10, 10, 30);
    let bytes = lossyear_geotiff_bytes(&LossyearTiff::new(COARSE_10X10, &data).sixteen_bit())
        .unwrap();

    let mut source = GeoTiffSource::from_reader(std::io::Cursor::new(bytes), "u16").unwrap();
    assert_eq!(source.read(&PixelWindow::new(2, 3, 5, 4)).unwrap().len(), 20);
    assert_eq!(source.read(&PixelWindow::full(10, 10)).unwrap(), data);
}

#[test]
fn test_read_outside_raster_fails() {
    let data = create_cycling_grid(10, 10, 30);
    let bytes = lossyear_geotiff_bytes(&LossyearTiff::new(COARSE_10X10, &data)).unwrap();
    let mut source = GeoTiffSource::from_reader(std::io::Cursor::new(bytes), "small").unwrap();

    assert!(matches!(
        source.read(&PixelWindow::new(5, 5, 6, 1)),
        Err(AggregationError::OutOfBounds { .. })
    ));
}

// ============================================================================
// extract_window
// ============================================================================

#[test]
fn test_extract_window_from_geotiff() {
    let data = create_scattered_loss_grid(CASCADES_400.width, CASCADES_400.height, 3);
    let bytes = lossyear_geotiff_bytes(
        &LossyearTiff::new(CASCADES_400, &data).with_rows_per_strip(16),
    )
    .unwrap();
    let mut source = GeoTiffSource::from_reader(std::io::Cursor::new(bytes), "cascades").unwrap();

    let bounds = GeoBounds::new(44.3, 44.1, -121.9, -122.1);
    let window = extract_window(&mut source, &bounds).unwrap();

    assert_eq!(window.source_window(), PixelWindow::new(100, 100, 200, 200));
    assert_eq!(window.width(), 200);
    assert_eq!(window.height(), 200);
    assert_eq!(window.get(0, 0), Some(data[100 * 400 + 100]));
    assert_eq!(window.get(199, 199), Some(data[299 * 400 + 299]));

    let (lon, lat) = window.transform().pixel_to_geo(0.0, 0.0);
    assert_coords_approx_eq!((lon, lat), (-122.1, 44.3), 1e-9);
}

#[test]
fn test_extract_window_outside_tile_is_empty() {
    let data = create_cycling_grid(10, 10, 30);
    let bytes = lossyear_geotiff_bytes(&LossyearTiff::new(COARSE_10X10, &data)).unwrap();
    let mut source = GeoTiffSource::from_reader(std::io::Cursor::new(bytes), "small").unwrap();

    let window =
        extract_window(&mut source, &bounds_from(test_utils::bbox::EAST_OF_TILE)).unwrap();
    assert!(window.is_empty());
}

// ============================================================================
// Real tile (only when cached locally)
// ============================================================================

#[test]
fn test_real_hansen_tile_window() {
    let path = require_test_file!("Hansen_GFC-2023-v1.11_lossyear_50N_130W.tif");
    let mut source = GeoTiffSource::open(&path).unwrap();
    assert_eq!(source.dimensions(), (40000, 40000));

    let window = source
        .window_from_bounds(&bounds_from(test_utils::bbox::PACIFIC_NORTHWEST))
        .unwrap();
    assert_eq!(window, PixelWindow::new(20000, 4000, 20000, 28000));

    let values = source.read(&PixelWindow::new(20000, 4000, 64, 64)).unwrap();
    assert!(values.iter().all(|&v| v <= 23));
}
