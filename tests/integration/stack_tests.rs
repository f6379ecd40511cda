//! Stack info and mirror probing integration tests.
//!
//! Tests verify:
//! - Stack info records build working fetchers
//! - Mirrors without a URL layout are skipped
//! - Probing reports unreachable mirrors as missing timings

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use catmaid_tiles::error::{ImageError, StackError};
use catmaid_tiles::spatial::{StackOrientation, Xyz};
use catmaid_tiles::stack::{Stack, StackInfo, TileSourceType};
use catmaid_tiles::tile::{FetcherOptions, ImageFetcher, RoiMode};

use super::test_utils::{mirror, pattern, stack, MockTileSource, TILE_HEIGHT, TILE_WIDTH};

fn stack_info() -> StackInfo {
    StackInfo::from_json(json!({
        "dimension": {"x": 100, "y": 200, "z": 300},
        "translation": {"x": 10.0, "y": 20.0, "z": 30.0},
        "resolution": {"x": 2.0, "y": 2.0, "z": 50.0},
        "orientation": 0,
        "broken_slices": {"4": 1, "7": 1},
        "canary_location": {"x": 300, "y": 0, "z": 1},
        "mirrors": [
            {
                "image_base": "http://hdf5/",
                "tile_height": TILE_HEIGHT,
                "tile_width": TILE_WIDTH,
                "tile_source_type": 3,
                "file_extension": "h5",
                "title": "hdf5",
                "position": 0
            },
            {
                "image_base": "http://backup",
                "tile_height": TILE_HEIGHT,
                "tile_width": TILE_WIDTH,
                "tile_source_type": 1,
                "file_extension": ".png",
                "title": "backup",
                "position": 2
            },
            {
                "image_base": "http://primary/",
                "tile_height": TILE_HEIGHT,
                "tile_width": TILE_WIDTH,
                "tile_source_type": 1,
                "file_extension": "png",
                "title": "primary",
                "position": 1
            }
        ]
    }))
    .unwrap()
}

#[test]
fn test_stack_from_info() {
    let stack = Stack::from_stack_info(&stack_info()).unwrap();

    assert_eq!(stack.dimension, Xyz::new(100, 200, 300));
    assert_eq!(stack.broken_slices.iter().copied().collect::<Vec<_>>(), vec![4, 7]);
    assert_eq!(stack.canary_location, Xyz::new(300, 0, 1));

    // hdf5 mirror skipped, the rest ordered by position
    let titles: Vec<_> = stack.mirrors().iter().map(|m| m.title()).collect();
    assert_eq!(titles, vec!["primary", "backup"]);
    assert_eq!(stack.mirrors()[1].image_base(), "http://backup/");
    assert_eq!(stack.mirrors()[1].file_extension(), "png");
    assert_eq!(
        stack.mirrors()[0].tile_source_type(),
        TileSourceType::FileBased
    );

    let placement = stack.project().unwrap();
    assert_eq!(placement.orientation, StackOrientation::XY);
    assert_eq!(placement.resolution, Xyz::new(2.0, 2.0, 50.0));
}

#[test]
fn test_unknown_tile_source_type_is_fatal() {
    let mut info = stack_info();
    info.mirrors[1].tile_source_type = 42;

    match Stack::from_stack_info(&info).unwrap_err() {
        StackError::UnknownTileSourceType(code) => assert_eq!(code, 42),
        e => panic!("Expected UnknownTileSourceType, got {:?}", e),
    }
}

#[test]
fn test_zero_resolution_is_rejected() {
    let mut info = stack_info();
    info.resolution = Some(Xyz::new(Some(2.0), Some(0.0), Some(50.0)));

    let result =
        ImageFetcher::from_stack_info(&info, Arc::new(MockTileSource::new()), FetcherOptions::default());
    match result.err().unwrap() {
        ImageError::Stack(StackError::InvalidStackInfo(msg)) => assert!(msg.contains("resolution")),
        e => panic!("Expected InvalidStackInfo, got {:?}", e),
    }
}

#[tokio::test]
async fn test_fetch_from_stack_info() {
    let source = Arc::new(MockTileSource::new());
    let mut fetcher =
        ImageFetcher::from_stack_info(&stack_info(), Arc::clone(&source), FetcherOptions::default())
            .unwrap();

    // project (30 + 50*2, 20 + 2*8, 10 + 2*6) is stack (2, 8, 6)
    let volume = fetcher
        .get([[130, 36, 22], [230, 56, 42]], RoiMode::Project, 0)
        .await
        .unwrap();

    assert_eq!(volume.shape(), &[2, 10, 10]);
    assert!(source
        .request_urls()
        .iter()
        .all(|url| url.starts_with("http://primary/")));
    for ((z, y, x), value) in volume.indexed_iter() {
        assert_eq!(*value, pattern(z as i64 + 2, y as i64 + 8, x as i64 + 6));
    }
}

#[tokio::test]
async fn test_broken_slices_from_info_are_filled() {
    let source = Arc::new(MockTileSource::new());
    let options = FetcherOptions::default().with_cval(255);
    let mut fetcher =
        ImageFetcher::from_stack_info(&stack_info(), Arc::clone(&source), options).unwrap();

    let volume = fetcher
        .get_stack_space([[4, 0, 0], [5, 10, 10]], 0)
        .await
        .unwrap();

    assert!(volume.iter().all(|v| *v == 255));
    assert_eq!(source.request_count(), 0);
}

// =============================================================================
// Mirror Probing
// =============================================================================

#[tokio::test]
async fn test_probe_uses_canary_tile() {
    let source = MockTileSource::new();
    let stack = Stack::from_stack_info(&stack_info()).unwrap();

    let timings = stack
        .probe_mirrors(&source, Duration::from_secs(1), 3, false)
        .await;

    assert_eq!(timings.len(), 2);
    assert!(timings.iter().all(|t| t.is_some()));
    assert_eq!(source.request_count(), 6);

    // canary x 300 falls in column 1
    let urls = source.request_urls();
    assert_eq!(urls[0], "http://primary/1/0_1_0.png");
    assert_eq!(urls[5], "http://backup/1/0_1_0.png");
}

#[tokio::test]
async fn test_probe_reports_unreachable() {
    let source = MockTileSource::new()
        .with_unreachable("http://a/")
        .with_status("http://b/", 500);
    let stack = stack(
        &[],
        vec![
            mirror("http://a/").with_title("a"),
            mirror("http://b/").with_title("b").with_position(1),
        ],
    );

    let timings = stack
        .probe_mirrors(&source, Duration::from_secs(1), 1, true)
        .await;

    // any answer counts as reachable, even an error status
    assert!(timings[0].is_none());
    assert!(timings[1].is_some());
    assert_eq!(Stack::fastest_index(&timings), Some(1));

    let fastest = stack
        .get_fastest_mirror(&source, Duration::from_secs(1), 1, true)
        .await
        .unwrap();
    assert_eq!(fastest.title(), "b");
}
