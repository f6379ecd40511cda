//! End-to-end fetch tests against the mock tile server.
//!
//! Tests verify:
//! - Tile counts for simple regions
//! - Broken slices and cache hits issue no requests
//! - Stitching across tile boundaries, in any axis order
//! - Missing tiles become blank, other failures are fatal
//! - Concurrent fetching matches serial fetching

use std::sync::Arc;
use std::time::Duration;

use ndarray::{Array2, Array3};

use catmaid_tiles::error::{FetchError, ImageError};
use catmaid_tiles::io::Credentials;
use catmaid_tiles::spatial::{AxisOrder, StackOrientation, Xyz};
use catmaid_tiles::stack::{ProjectPlacement, TileIndex};
use catmaid_tiles::tile::{FetcherOptions, ImageFetcher, RoiMode, Scheduling};

use super::test_utils::{mirror, pattern, stack, MockTileSource, TILE_HEIGHT, TILE_WIDTH};

fn fetcher(
    source: &Arc<MockTileSource>,
    broken_slices: &[i64],
    options: FetcherOptions,
) -> ImageFetcher<MockTileSource> {
    ImageFetcher::new(
        stack(broken_slices, vec![mirror("http://tiles/")]),
        Arc::clone(source),
        options,
    )
    .unwrap()
}

/// Check a (z, y, x) volume against the pattern starting at `origin`.
fn assert_matches_pattern(volume: &Array3<u8>, origin: [i64; 3]) {
    for ((z, y, x), value) in volume.indexed_iter() {
        let expected = pattern(
            origin[0] + z as i64,
            origin[1] + y as i64,
            origin[2] + x as i64,
        );
        assert_eq!(*value, expected, "mismatch at ({}, {}, {})", z, y, x);
    }
}

// =============================================================================
// Tile Counts
// =============================================================================

#[tokio::test]
async fn test_single_tile_fetch() {
    let source = Arc::new(MockTileSource::new());
    let mut fetcher = fetcher(&source, &[], FetcherOptions::default());

    let volume = fetcher
        .get([[0, 0, 0], [1, 20, 20]], RoiMode::Scaled, 0)
        .await
        .unwrap();

    assert_eq!(volume.shape(), &[1, 20, 20]);
    assert_eq!(source.request_count(), 1);
    assert_eq!(source.request_urls(), vec!["http://tiles/0/0_0_0.png"]);
    assert_matches_pattern(&volume, [0, 0, 0]);
}

#[tokio::test]
async fn test_two_slices_fetch_two_tiles() {
    let source = Arc::new(MockTileSource::new());
    let mut fetcher = fetcher(&source, &[], FetcherOptions::default());

    let volume = fetcher
        .get([[0, 0, 0], [2, 20, 20]], RoiMode::Scaled, 0)
        .await
        .unwrap();

    assert_eq!(volume.shape(), &[2, 20, 20]);
    assert_eq!(source.request_count(), 2);
    assert_matches_pattern(&volume, [0, 0, 0]);
}

#[tokio::test]
async fn test_repeat_fetch_uses_cache() {
    let source = Arc::new(MockTileSource::new());
    let mut fetcher = fetcher(&source, &[], FetcherOptions::default());

    let first = fetcher
        .get([[0, 0, 0], [2, 20, 20]], RoiMode::Scaled, 0)
        .await
        .unwrap();
    let second = fetcher
        .get([[0, 5, 5], [2, 25, 25]], RoiMode::Scaled, 0)
        .await
        .unwrap();

    assert_eq!(source.request_count(), 2);
    assert_eq!(fetcher.tile_cache().len(), 2);
    assert_matches_pattern(&first, [0, 0, 0]);
    assert_matches_pattern(&second, [0, 5, 5]);
}

// =============================================================================
// Local Tiles
// =============================================================================

#[tokio::test]
async fn test_broken_slice_fill() {
    let source = Arc::new(MockTileSource::new());
    let mut fetcher = fetcher(&source, &[100], FetcherOptions::default().with_cval(7));

    let volume = fetcher
        .get([[100, 0, 0], [101, 20, 20]], RoiMode::Scaled, 0)
        .await
        .unwrap();

    assert_eq!(volume.shape(), &[1, 20, 20]);
    assert!(volume.iter().all(|v| *v == 7));
    assert_eq!(source.request_count(), 0);
}

#[tokio::test]
async fn test_broken_slice_mixed_with_fetched() {
    let source = Arc::new(MockTileSource::new());
    let mut fetcher = fetcher(&source, &[100], FetcherOptions::default().with_cval(7));

    let volume = fetcher
        .get([[99, 0, 0], [102, 10, 10]], RoiMode::Scaled, 0)
        .await
        .unwrap();

    assert_eq!(source.request_count(), 2);
    assert!(volume.index_axis(ndarray::Axis(0), 1).iter().all(|v| *v == 7));
    assert_eq!(volume[[0, 3, 4]], pattern(99, 3, 4));
    assert_eq!(volume[[2, 3, 4]], pattern(101, 3, 4));
}

#[tokio::test]
async fn test_cache_hit_avoids_fetch() {
    let source = Arc::new(MockTileSource::new());
    let mut fetcher = fetcher(&source, &[], FetcherOptions::default());

    let idx = TileIndex::new(0, 0, 0, 0, TILE_HEIGHT, TILE_WIDTH);
    let cached = Array2::from_shape_fn((TILE_HEIGHT as usize, TILE_WIDTH as usize), |(y, x)| {
        ((y + x) % 13) as u8
    });
    fetcher.tile_cache_mut().put(idx, cached.clone());

    let volume = fetcher
        .get(
            [[0, 0, 0], [1, TILE_HEIGHT as i64, TILE_WIDTH as i64]],
            RoiMode::Scaled,
            0,
        )
        .await
        .unwrap();

    assert_eq!(source.request_count(), 0);
    assert_eq!(volume.index_axis(ndarray::Axis(0), 0), cached);
}

// =============================================================================
// Stitching
// =============================================================================

#[tokio::test]
async fn test_multi_tile_stitching() {
    let source = Arc::new(MockTileSource::new());
    let mut fetcher = fetcher(&source, &[], FetcherOptions::default().with_cache_items(None));

    // y 100..150 spans rows 0-1, x 200..300 spans cols 0-1
    let volume = fetcher
        .get([[3, 100, 200], [6, 150, 300]], RoiMode::Scaled, 0)
        .await
        .unwrap();

    assert_eq!(volume.shape(), &[3, 50, 100]);
    assert_eq!(source.request_count(), 12);
    assert_matches_pattern(&volume, [3, 100, 200]);
}

#[tokio::test]
async fn test_xyz_target_order() {
    let source = Arc::new(MockTileSource::new());
    let options = FetcherOptions::default().with_target_order(AxisOrder::XYZ);
    let mut fetcher = fetcher(&source, &[], options);

    let volume = fetcher
        .get([[200, 100, 3], [300, 150, 6]], RoiMode::Scaled, 0)
        .await
        .unwrap();

    assert_eq!(volume.shape(), &[100, 50, 3]);
    for ((x, y, z), value) in volume.indexed_iter() {
        assert_eq!(*value, pattern(z as i64 + 3, y as i64 + 100, x as i64 + 200));
    }
}

#[tokio::test]
async fn test_get_into_caller_sink() {
    let source = Arc::new(MockTileSource::new());
    let mut fetcher = fetcher(&source, &[], FetcherOptions::default());

    let mut out = Array3::<u8>::zeros((2, 30, 40));
    fetcher
        .get_into([[10, 120, 240], [12, 150, 280]], RoiMode::Scaled, 0, &mut out)
        .await
        .unwrap();

    assert_matches_pattern(&out, [10, 120, 240]);
}

#[tokio::test]
async fn test_zoom_level_halves_xy() {
    let source = Arc::new(MockTileSource::new());
    let fetcher = fetcher(&source, &[], FetcherOptions::default());

    let scaled = fetcher
        .roi_to_scaled([[0.5, 0.5, 0.5], [9.5, 9.5, 9.5]], RoiMode::Stack, 1)
        .unwrap();

    assert_eq!(scaled.min, [0, 0, 0]);
    assert_eq!(scaled.max, [10, 5, 5]);
}

#[tokio::test]
async fn test_zoomed_fetch_requests_zoom_level() {
    let source = Arc::new(MockTileSource::new());
    let mut fetcher = fetcher(&source, &[], FetcherOptions::default());

    let volume = fetcher
        .get_stack_space([[0, 0, 0], [1, 40, 40]], 1)
        .await
        .unwrap();

    assert_eq!(volume.shape(), &[1, 20, 20]);
    assert_eq!(source.request_urls(), vec!["http://tiles/0/0_0_1.png"]);
}

#[tokio::test]
async fn test_project_space_fetch() {
    let source = Arc::new(MockTileSource::new());
    let placement = ProjectPlacement {
        translation: Xyz::new(100.0, 200.0, 300.0),
        resolution: Xyz::new(4.0, 4.0, 40.0),
        orientation: StackOrientation::XY,
    };
    let stack = stack(&[], vec![mirror("http://tiles/")]).with_project(placement);
    let mut fetcher =
        ImageFetcher::new(stack, Arc::clone(&source), FetcherOptions::default()).unwrap();

    // z 300 + 40*2 = 380, y 200 + 4*10 = 240, x 100 + 4*20 = 180
    let volume = fetcher
        .get_project_space([[380.0, 240.0, 180.0], [420.0, 280.0, 260.0]], 0)
        .await
        .unwrap();

    assert_eq!(volume.shape(), &[1, 10, 20]);
    assert_matches_pattern(&volume, [2, 10, 20]);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_missing_tile_is_blank() {
    let source = Arc::new(MockTileSource::new().with_status("/0/0_0_0.png", 404));
    let mut fetcher = fetcher(&source, &[], FetcherOptions::default().with_cval(3));

    let volume = fetcher
        .get([[0, 0, 0], [2, 10, 10]], RoiMode::Scaled, 0)
        .await
        .unwrap();

    assert_eq!(source.request_count(), 2);
    assert!(volume.index_axis(ndarray::Axis(0), 0).iter().all(|v| *v == 3));
    assert_eq!(volume[[1, 2, 2]], pattern(1, 2, 2));
}

#[tokio::test]
async fn test_server_error_is_fatal() {
    for scheduling in [Scheduling::Serial, Scheduling::Concurrent { workers: 4 }] {
        let source = Arc::new(MockTileSource::new().with_status("/1/", 500));
        let options = FetcherOptions::default().with_scheduling(scheduling);
        let mut fetcher = fetcher(&source, &[], options);

        let result = fetcher.get([[0, 0, 0], [3, 10, 10]], RoiMode::Scaled, 0).await;

        match result.unwrap_err() {
            ImageError::Fetch(FetchError::Http { url, status }) => {
                assert_eq!(status, 500);
                assert_eq!(url, "http://tiles/1/0_0_0.png");
            }
            e => panic!("Expected Http error, got {:?}", e),
        }
    }
}

#[tokio::test]
async fn test_unsupported_content_type() {
    let source = Arc::new(MockTileSource::new().with_content_type("image/tiff"));
    let mut fetcher = fetcher(&source, &[], FetcherOptions::default());

    let result = fetcher.get([[0, 0, 0], [1, 10, 10]], RoiMode::Scaled, 0).await;

    match result.unwrap_err() {
        ImageError::Fetch(FetchError::UnsupportedContentType(ct)) => {
            assert_eq!(ct, "image/tiff");
        }
        e => panic!("Expected UnsupportedContentType, got {:?}", e),
    }
}

#[tokio::test]
async fn test_timeout_is_fatal() {
    let source = Arc::new(MockTileSource::new().with_unreachable("http://tiles/"));
    let mut fetcher = fetcher(&source, &[], FetcherOptions::default());

    let result = fetcher.get([[0, 0, 0], [1, 10, 10]], RoiMode::Scaled, 0).await;

    assert!(matches!(
        result,
        Err(ImageError::Fetch(FetchError::Timeout { .. }))
    ));
}

// =============================================================================
// Scheduling
// =============================================================================

#[tokio::test]
async fn test_concurrent_matches_serial() {
    let roi = [[3, 100, 200], [7, 300, 600]];

    let serial_source = Arc::new(MockTileSource::new());
    let mut serial = fetcher(&serial_source, &[5], FetcherOptions::default().with_cval(9));
    let expected = serial.get(roi, RoiMode::Scaled, 0).await.unwrap();

    let concurrent_source = Arc::new(MockTileSource::new());
    let options = FetcherOptions::default()
        .with_cval(9)
        .with_scheduling(Scheduling::Concurrent { workers: 3 });
    let mut concurrent = fetcher(&concurrent_source, &[5], options);
    let actual = concurrent.get(roi, RoiMode::Scaled, 0).await.unwrap();

    assert_eq!(actual, expected);
    assert_eq!(
        concurrent_source.request_count(),
        serial_source.request_count()
    );
    assert!(concurrent_source.max_in_flight() <= 3);
}

#[tokio::test]
async fn test_threaded_constructor_is_concurrent() {
    let source = Arc::new(MockTileSource::new());
    let fetcher = ImageFetcher::threaded(
        stack(&[], vec![mirror("http://tiles/")]),
        Arc::clone(&source),
        FetcherOptions::default(),
    )
    .unwrap();

    assert!(matches!(
        fetcher.options().scheduling,
        Scheduling::Concurrent { .. }
    ));
}

// =============================================================================
// Mirrors and Credentials
// =============================================================================

#[tokio::test]
async fn test_selected_mirror_is_used() {
    let source = Arc::new(MockTileSource::new());
    let mirrors = vec![
        mirror("http://a/").with_title("a").with_position(0),
        mirror("http://b/").with_title("b").with_position(1),
    ];
    let mut fetcher = ImageFetcher::new(
        stack(&[], mirrors),
        Arc::clone(&source),
        FetcherOptions::default().with_preferred_mirror("b"),
    )
    .unwrap();

    fetcher
        .get([[0, 0, 0], [1, 10, 10]], RoiMode::Scaled, 0)
        .await
        .unwrap();
    assert_eq!(source.request_urls(), vec!["http://b/0/0_0_0.png"]);

    // unknown position leaves the selection alone
    fetcher.set_mirror(7i64).unwrap();
    assert_eq!(fetcher.mirror().title(), "b");

    fetcher.set_mirror(0i64).unwrap();
    fetcher.clear_cache();
    fetcher
        .get([[0, 0, 0], [1, 10, 10]], RoiMode::Scaled, 0)
        .await
        .unwrap();
    assert_eq!(source.request_urls().last().unwrap(), "http://a/0/0_0_0.png");
}

#[tokio::test]
async fn test_fastest_mirror() {
    let source = Arc::new(
        MockTileSource::new()
            .with_delay("http://slow/", Duration::from_millis(50))
            .with_unreachable("http://down/"),
    );
    let mirrors = vec![
        mirror("http://down/").with_title("down").with_position(0),
        mirror("http://slow/").with_title("slow").with_position(1),
        mirror("http://fast/").with_title("fast").with_position(2),
    ];
    let mut fetcher =
        ImageFetcher::new(stack(&[], mirrors), Arc::clone(&source), FetcherOptions::default())
            .unwrap();

    fetcher.set_fastest_mirror(2, true).await.unwrap();
    assert_eq!(fetcher.mirror().title(), "fast");
}

#[tokio::test]
async fn test_no_reachable_mirror() {
    let source = Arc::new(MockTileSource::new().with_unreachable("http://"));
    let mut fetcher = fetcher(&source, &[], FetcherOptions::default());

    let result = fetcher.set_fastest_mirror(1, false).await;
    assert!(matches!(
        result,
        Err(ImageError::Stack(catmaid_tiles::error::StackError::NoMirrorReachable))
    ));
}

#[tokio::test]
async fn test_mirror_credentials_take_precedence() {
    let source = Arc::new(MockTileSource::new());
    let own = Credentials::new("mirror-user", "mirror-pass");
    let shared = Credentials::new("user", "pass");
    let mirrors = vec![
        mirror("http://a/").with_title("a").with_auth(own.clone()),
        mirror("http://b/").with_title("b").with_position(1),
    ];
    let mut fetcher = ImageFetcher::new(
        stack(&[], mirrors),
        Arc::clone(&source),
        FetcherOptions::default().with_auth(shared.clone()),
    )
    .unwrap();

    fetcher
        .get([[0, 0, 0], [1, 10, 10]], RoiMode::Scaled, 0)
        .await
        .unwrap();
    fetcher.set_mirror("b").unwrap();
    fetcher.clear_cache();
    fetcher
        .get([[0, 0, 0], [1, 10, 10]], RoiMode::Scaled, 0)
        .await
        .unwrap();

    let seen: Vec<_> = source.requests().into_iter().map(|r| r.auth).collect();
    assert_eq!(seen, vec![Some(own), Some(shared)]);
}
