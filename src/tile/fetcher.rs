//! Region fetch engine.
//!
//! [`ImageFetcher`] turns a region of interest into the set of tiles that
//! cover it, gets every tile (from the cache, by synthesising a broken
//! slice, or over the network), trims the edge tiles and writes them into
//! one volume in the caller's axis order.
//!
//! # Pipeline
//!
//! ```text
//! ROI (project | stack | scaled, caller axis order)
//!     │ roi_to_scaled: transform, rescale, floor min / ceil max
//!     ▼
//! scaled ROI ──► min/max pixel ──► min/max TileIndex ──► tile cuboid
//!                                                           │
//!                       ┌───────────────────┬───────────────┤
//!                       ▼                   ▼               ▼
//!                  cache hit        broken slice fill   network fetch
//!                       └───────────────────┴───────────────┤
//!                                                           ▼
//!                                      trim, reorient zyx → target, write
//! ```
//!
//! Placement depends only on each tile's own index, so concurrent fetches
//! may complete in any order.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, ArrayViewD, Ix3};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::cache::{TileCache, DEFAULT_CACHE_ITEMS};
use super::sink::VolumeSink;
use crate::client::CatmaidClient;
use crate::error::{ClientError, FetchError, ImageError};
use crate::io::{decode_tile, Credentials, TileSource};
use crate::spatial::{AxisOrder, CoordinateTransformer, StackOrientation, Xyz};
use crate::stack::{fill_tiled_cuboid, Stack, StackInfo, StackMirror, TileIndex};

/// Default number of concurrent tile requests
pub const DEFAULT_WORKERS: usize = 10;

/// Largest pixel coordinate magnitude a region may convert to
pub const MAX_PIXEL_COORD: f64 = 9_007_199_254_740_992.0;

/// Default per-tile request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

// =============================================================================
// Request types
// =============================================================================

/// Coordinate space a region of interest is given in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RoiMode {
    /// Real-world project coordinates
    Project,
    /// Voxel coordinates at zoom level 0
    #[default]
    Stack,
    /// Pixel coordinates at the requested zoom level
    Scaled,
}

impl fmt::Display for RoiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoiMode::Project => "project",
            RoiMode::Stack => "stack",
            RoiMode::Scaled => "scaled",
        })
    }
}

impl FromStr for RoiMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "project" => Ok(RoiMode::Project),
            "stack" => Ok(RoiMode::Stack),
            "scaled" => Ok(RoiMode::Scaled),
            _ => Err(format!(
                "Invalid ROI mode: {s} (expected 'project', 'stack' or 'scaled')"
            )),
        }
    }
}

/// Region of interest: half-open `[min, max)` bounds, columns in the
/// fetcher's target axis order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Roi {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }
}

impl From<[[f64; 3]; 2]> for Roi {
    fn from([min, max]: [[f64; 3]; 2]) -> Self {
        Self { min, max }
    }
}

impl From<[[i64; 3]; 2]> for Roi {
    fn from([min, max]: [[i64; 3]; 2]) -> Self {
        Self {
            min: min.map(|v| v as f64),
            max: max.map(|v| v as f64),
        }
    }
}

impl From<[[i32; 3]; 2]> for Roi {
    fn from([min, max]: [[i32; 3]; 2]) -> Self {
        Self {
            min: min.map(f64::from),
            max: max.map(f64::from),
        }
    }
}

/// A region in whole pixels of one zoom level, in the target axis order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaledRoi {
    pub min: [i64; 3],
    pub max: [i64; 3],
}

impl ScaledRoi {
    /// Extents of the output volume.
    ///
    /// # Errors
    ///
    /// `InvalidRoi` if the maximum lies below the minimum on any axis, or
    /// the element count does not fit in an allocation.
    pub fn shape(&self) -> Result<[usize; 3], ImageError> {
        let invalid = || ImageError::InvalidRoi {
            min: self.min,
            max: self.max,
        };

        let mut shape = [0usize; 3];
        for i in 0..3 {
            let extent = self.max[i].checked_sub(self.min[i]).ok_or_else(invalid)?;
            shape[i] = usize::try_from(extent).map_err(|_| invalid())?;
        }

        let count = shape
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .ok_or_else(invalid)?;
        if count > isize::MAX as usize {
            return Err(invalid());
        }
        Ok(shape)
    }
}

/// What to do with tiles on slices listed as broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrokenSliceHandling {
    /// Fill with the constant value
    #[default]
    Fill,
    Above,
    Below,
    Closest,
    Interpolate,
}

impl fmt::Display for BrokenSliceHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BrokenSliceHandling::Fill => "fill",
            BrokenSliceHandling::Above => "above",
            BrokenSliceHandling::Below => "below",
            BrokenSliceHandling::Closest => "closest",
            BrokenSliceHandling::Interpolate => "interpolate",
        })
    }
}

/// How tiles that miss the cache are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheduling {
    /// One request at a time
    #[default]
    Serial,
    /// Up to `workers` requests in flight
    Concurrent { workers: usize },
}

/// Ways of choosing a mirror.
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorSelector {
    Position(i64),
    Title(String),
    Mirror(StackMirror),
}

impl FromStr for MirrorSelector {
    type Err = std::convert::Infallible;

    /// Integers select by position, anything else by title.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<i64>() {
            Ok(position) => MirrorSelector::Position(position),
            Err(_) => MirrorSelector::Title(s.to_string()),
        })
    }
}

impl From<i64> for MirrorSelector {
    fn from(position: i64) -> Self {
        MirrorSelector::Position(position)
    }
}

impl From<&str> for MirrorSelector {
    fn from(title: &str) -> Self {
        MirrorSelector::Title(title.to_string())
    }
}

impl From<StackMirror> for MirrorSelector {
    fn from(mirror: StackMirror) -> Self {
        MirrorSelector::Mirror(mirror)
    }
}

// =============================================================================
// Options
// =============================================================================

/// Construction options for [`ImageFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherOptions {
    /// Axis order of ROI columns and output dimensions
    pub target_order: AxisOrder,
    pub preferred_mirror: Option<MirrorSelector>,
    /// Per-tile request timeout
    pub timeout: Duration,
    pub cache_items: Option<usize>,
    pub cache_bytes: Option<usize>,
    pub broken_slice_handling: BrokenSliceHandling,
    /// Value for broken-slice and missing tiles
    pub cval: u8,
    /// Used for mirrors that have no credentials of their own
    pub auth: Option<Credentials>,
    /// Whether z is rescaled along with x and y
    pub scale_z: bool,
    pub scheduling: Scheduling,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            target_order: AxisOrder::ZYX,
            preferred_mirror: None,
            timeout: DEFAULT_TIMEOUT,
            cache_items: Some(DEFAULT_CACHE_ITEMS),
            cache_bytes: None,
            broken_slice_handling: BrokenSliceHandling::Fill,
            cval: 0,
            auth: None,
            scale_z: false,
            scheduling: Scheduling::Serial,
        }
    }
}

impl FetcherOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_order(mut self, order: AxisOrder) -> Self {
        self.target_order = order;
        self
    }

    pub fn with_preferred_mirror(mut self, selector: impl Into<MirrorSelector>) -> Self {
        self.preferred_mirror = Some(selector.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cache_items(mut self, max_items: Option<usize>) -> Self {
        self.cache_items = max_items;
        self
    }

    pub fn with_cache_bytes(mut self, max_bytes: Option<usize>) -> Self {
        self.cache_bytes = max_bytes;
        self
    }

    pub fn with_broken_slice_handling(mut self, handling: BrokenSliceHandling) -> Self {
        self.broken_slice_handling = handling;
        self
    }

    pub fn with_cval(mut self, cval: u8) -> Self {
        self.cval = cval;
        self
    }

    pub fn with_auth(mut self, auth: Credentials) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_scale_z(mut self, scale_z: bool) -> Self {
        self.scale_z = scale_z;
        self
    }

    pub fn with_scheduling(mut self, scheduling: Scheduling) -> Self {
        self.scheduling = scheduling;
        self
    }
}

// =============================================================================
// Image Fetcher
// =============================================================================

/// Fetches arbitrary regions of a stack from one of its mirrors.
///
/// The fetcher owns its stack and tile cache and is meant for a single
/// caller at a time (`get` takes `&mut self`).
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use catmaid_tiles::io::HttpTileSource;
/// use catmaid_tiles::spatial::Xyz;
/// use catmaid_tiles::stack::{Stack, StackMirror, TileSourceType};
/// use catmaid_tiles::tile::{FetcherOptions, ImageFetcher};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mirror = StackMirror::new(
///     "https://tiles.example.org/stack1",
///     256,
///     256,
///     TileSourceType::FileBased,
///     "jpg",
/// )?;
/// let stack = Stack::new(Xyz::new(2048, 2048, 100), [], None).with_mirrors([mirror]);
///
/// let source = Arc::new(HttpTileSource::new());
/// let mut fetcher = ImageFetcher::threaded(stack, source, FetcherOptions::default())?;
///
/// // 10 slices of a 512x512 region, as a (z, y, x) array
/// let volume = fetcher.get_stack_space([[0, 0, 0], [10, 512, 512]], 0).await?;
/// assert_eq!(volume.dim(), (10, 512, 512));
/// # Ok(())
/// # }
/// ```
pub struct ImageFetcher<S: TileSource> {
    stack: Stack,
    source: Arc<S>,
    transformer: CoordinateTransformer,
    cache: TileCache,
    mirror: Option<usize>,
    options: FetcherOptions,
}

impl<S: TileSource + 'static> ImageFetcher<S> {
    /// Create a fetcher using `options.scheduling`.
    ///
    /// # Errors
    ///
    /// - `NoMirrors` if the stack has no mirrors
    /// - `MirrorNotInStack` if `options.preferred_mirror` is a mirror the
    ///   stack does not contain
    pub fn new(stack: Stack, source: Arc<S>, options: FetcherOptions) -> Result<Self, ImageError> {
        if stack.mirrors().is_empty() {
            return Err(ImageError::NoMirrors);
        }

        let transformer = stack.coordinate_transformer().with_scale_z(options.scale_z);
        let cache = TileCache::new(options.cache_items, options.cache_bytes);
        let preferred = options.preferred_mirror.clone();

        let mut fetcher = Self {
            stack,
            source,
            transformer,
            cache,
            mirror: None,
            options,
        };

        if let Some(selector) = preferred {
            fetcher.set_mirror(selector)?;
        }
        Ok(fetcher)
    }

    /// Create a fetcher that requests tiles concurrently, with
    /// [`DEFAULT_WORKERS`] requests in flight unless `options` already
    /// asks for concurrent scheduling.
    pub fn threaded(stack: Stack, source: Arc<S>, options: FetcherOptions) -> Result<Self, ImageError> {
        let options = match options.scheduling {
            Scheduling::Serial => options.with_scheduling(Scheduling::Concurrent {
                workers: DEFAULT_WORKERS,
            }),
            Scheduling::Concurrent { .. } => options,
        };
        Self::new(stack, source, options)
    }

    /// Create a fetcher for a stack described by a stack info record.
    pub fn from_stack_info(
        info: &StackInfo,
        source: Arc<S>,
        options: FetcherOptions,
    ) -> Result<Self, ImageError> {
        Self::new(Stack::from_stack_info(info)?, source, options)
    }

    /// Create a fetcher for one of the client's project's stacks.
    pub async fn from_catmaid(
        client: &CatmaidClient,
        stack_id: i64,
        source: Arc<S>,
        options: FetcherOptions,
    ) -> Result<Self, ClientError> {
        let info = client.stack_info(stack_id).await?;
        Ok(Self::from_stack_info(&info, source, options)?)
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn transformer(&self) -> &CoordinateTransformer {
        &self.transformer
    }

    pub fn options(&self) -> &FetcherOptions {
        &self.options
    }

    pub fn target_order(&self) -> AxisOrder {
        self.options.target_order
    }

    pub fn tile_cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn tile_cache_mut(&mut self) -> &mut TileCache {
        &mut self.cache
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Credentials for mirrors without their own.
    pub fn set_auth(&mut self, auth: Option<Credentials>) {
        self.options.auth = auth;
    }

    // -------------------------------------------------------------------------
    // Mirror selection
    // -------------------------------------------------------------------------

    /// Index into the stack's mirrors of the mirror in use.
    ///
    /// With no mirror selected this warns and falls back to the first
    /// mirror.
    pub fn mirror_index(&self) -> usize {
        match self.mirror {
            Some(idx) => idx,
            None => {
                warn!(
                    mirror = self.stack.mirrors()[0].title(),
                    "No mirror set: falling back to the first mirror, which may not be accessible. \
                     Consider set_fastest_mirror."
                );
                0
            }
        }
    }

    /// The mirror in use; see [`ImageFetcher::mirror_index`].
    pub fn mirror(&self) -> &StackMirror {
        &self.stack.mirrors()[self.mirror_index()]
    }

    pub fn selected_mirror(&self) -> Option<&StackMirror> {
        self.mirror.map(|idx| &self.stack.mirrors()[idx])
    }

    pub fn unset_mirror(&mut self) {
        self.mirror = None;
    }

    /// Select a mirror by position, title, or value.
    ///
    /// Position and title misses only warn and leave the selection
    /// unchanged; multiple matches warn and pick the first.
    ///
    /// # Errors
    ///
    /// `MirrorNotInStack` if a mirror value is given that is not one of the
    /// stack's mirrors.
    pub fn set_mirror(&mut self, selector: impl Into<MirrorSelector>) -> Result<(), ImageError> {
        let mirrors = self.stack.mirrors();

        let (label, matches): (String, Vec<usize>) = match selector.into() {
            MirrorSelector::Mirror(mirror) => {
                let idx = mirrors
                    .iter()
                    .position(|m| *m == mirror)
                    .ok_or(ImageError::MirrorNotInStack)?;
                self.mirror = Some(idx);
                return Ok(());
            }
            MirrorSelector::Position(position) => (
                format!("position {position}"),
                (0..mirrors.len())
                    .filter(|i| mirrors[*i].position() == position)
                    .collect(),
            ),
            MirrorSelector::Title(title) => (
                format!("title {title:?}"),
                (0..mirrors.len())
                    .filter(|i| mirrors[*i].title() == title)
                    .collect(),
            ),
        };

        match matches.as_slice() {
            [] => {
                let available: Vec<String> = mirrors
                    .iter()
                    .map(|m| format!("{} ({})", m.position(), m.title()))
                    .collect();
                warn!(
                    "No mirror with {}; choose from {}",
                    label,
                    available.join(", ")
                );
            }
            [first, rest @ ..] => {
                if !rest.is_empty() {
                    warn!(
                        "More than one mirror with {}, picking {:?}",
                        label,
                        mirrors[*first].title()
                    );
                }
                self.mirror = Some(*first);
            }
        }
        Ok(())
    }

    /// Probe every mirror and select the fastest.
    pub async fn set_fastest_mirror(&mut self, reps: usize, normalise: bool) -> Result<(), ImageError> {
        let idx = self
            .stack
            .fastest_mirror_index(&*self.source, self.options.timeout, reps, normalise)
            .await?;
        info!(
            mirror = self.stack.mirrors()[idx].title(),
            position = self.stack.mirrors()[idx].position(),
            "Selected fastest mirror"
        );
        self.mirror = Some(idx);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Fetching
    // -------------------------------------------------------------------------

    /// Convert a region into whole pixels at `zoom_level`, keeping the
    /// target axis order.
    ///
    /// The minimum is floored and the maximum ceiled, so the result may
    /// extend up to one pixel beyond the requested region on each side.
    ///
    /// # Errors
    ///
    /// `UnrepresentableRoi` if any converted coordinate is NaN, infinite
    /// or larger in magnitude than [`MAX_PIXEL_COORD`].
    pub fn roi_to_scaled(
        &self,
        roi: impl Into<Roi>,
        mode: RoiMode,
        zoom_level: impl Into<f64>,
    ) -> Result<ScaledRoi, ImageError> {
        let roi = roi.into();
        let zoom = integer_zoom(zoom_level.into())?;
        let order = self.options.target_order;

        let mut rows = vec![roi.min, roi.max];

        if mode == RoiMode::Project {
            let placement = self
                .stack
                .project()
                .ok_or_else(|| ImageError::UnsupportedRoiMode(RoiMode::Project.to_string()))?;
            if placement.orientation != StackOrientation::XY {
                warn!(
                    orientation = %placement.orientation,
                    "Stack orientation differs from project: the returned array follows the \
                     stack's orientation, not the project's"
                );
            }
            rows = self.transformer.project_to_stack_array(&rows, order);
        }

        if mode != RoiMode::Scaled {
            rows = self.transformer.stack_to_scaled_array(&rows, zoom, 0, order);
        }

        let (min, max) = (rows[0], rows[1]);
        if min
            .iter()
            .chain(&max)
            .any(|v| !v.is_finite() || v.abs() > MAX_PIXEL_COORD)
        {
            return Err(ImageError::UnrepresentableRoi { min, max });
        }

        Ok(ScaledRoi {
            min: min.map(|v| v.floor() as i64),
            max: max.map(|v| v.ceil() as i64),
        })
    }

    /// Fetch a region into a new array laid out in the target axis order.
    pub async fn get(
        &mut self,
        roi: impl Into<Roi>,
        mode: RoiMode,
        zoom_level: impl Into<f64>,
    ) -> Result<Array3<u8>, ImageError> {
        let zoom_level = zoom_level.into();
        let scaled = self.roi_to_scaled(roi, mode, zoom_level)?;
        let mut out = Array3::zeros(scaled.shape()?);
        self.assemble(scaled, integer_zoom(zoom_level)?, &mut out)
            .await?;
        Ok(out)
    }

    /// Fetch a region into a caller-supplied sink whose shape matches the
    /// scaled region.
    pub async fn get_into<V: VolumeSink + ?Sized>(
        &mut self,
        roi: impl Into<Roi>,
        mode: RoiMode,
        zoom_level: impl Into<f64>,
        out: &mut V,
    ) -> Result<(), ImageError> {
        let zoom_level = zoom_level.into();
        let scaled = self.roi_to_scaled(roi, mode, zoom_level)?;
        let expected = scaled.shape()?;
        let actual = out.shape();
        if expected != actual {
            return Err(ImageError::OutputShapeMismatch { expected, actual });
        }
        self.assemble(scaled, integer_zoom(zoom_level)?, out).await
    }

    pub async fn get_project_space(
        &mut self,
        roi: impl Into<Roi>,
        zoom_level: impl Into<f64>,
    ) -> Result<Array3<u8>, ImageError> {
        self.get(roi, RoiMode::Project, zoom_level).await
    }

    pub async fn get_stack_space(
        &mut self,
        roi: impl Into<Roi>,
        zoom_level: impl Into<f64>,
    ) -> Result<Array3<u8>, ImageError> {
        self.get(roi, RoiMode::Stack, zoom_level).await
    }

    pub async fn get_scaled_space(
        &mut self,
        roi: impl Into<Roi>,
        zoom_level: impl Into<f64>,
    ) -> Result<Array3<u8>, ImageError> {
        self.get(roi, RoiMode::Scaled, zoom_level).await
    }

    async fn assemble<V: VolumeSink + ?Sized>(
        &mut self,
        roi: ScaledRoi,
        zoom_level: i32,
        out: &mut V,
    ) -> Result<(), ImageError> {
        if roi.shape()?.contains(&0) {
            return Ok(());
        }

        let order = self.options.target_order;
        let min_pixel = order.scatter(roi.min);
        let max_pixel = order.scatter(roi.max).map(|v| v - 1);

        let mirror_idx = self.mirror_index();
        let mirror = &self.stack.mirrors()[mirror_idx];

        let (min_tile, min_offset) = mirror.get_tile_index(min_pixel, zoom_level);
        let (max_tile, max_offset) = mirror.get_tile_index(max_pixel, zoom_level);
        let tiles = fill_tiled_cuboid(min_tile, max_tile)?;

        let layout = TileLayout {
            min_tile,
            max_tile,
            min_offset,
            max_offset,
            target_order: order,
        };

        debug!(
            tiles = tiles.len(),
            mirror = mirror.title(),
            zoom_level,
            "Assembling region"
        );

        // Resolve cache hits and broken slices locally; collect the rest.
        let mut pending = Vec::new();
        for idx in tiles {
            if let Some(tile) = self.cache.get(&idx) {
                debug!(tile = %idx, "Tile cache hit");
                layout.place(&idx, tile.view(), out)?;
                continue;
            }

            if self.stack.broken_slices.contains(&idx.depth) {
                let handling = self.options.broken_slice_handling;
                if handling != BrokenSliceHandling::Fill {
                    return Err(ImageError::BrokenSliceHandlingNotImplemented(
                        handling.to_string(),
                    ));
                }
                debug!(tile = %idx, "Filling tile on broken slice");
                let tile = blank_tile(&idx, self.options.cval);
                layout.place(&idx, tile.view(), out)?;
                self.cache.put(idx, tile);
                continue;
            }

            pending.push((idx, mirror.generate_url(&idx)?));
        }

        if pending.is_empty() {
            return Ok(());
        }

        let auth = mirror.auth().or(self.options.auth.as_ref()).cloned();
        let request = TileRequest {
            auth,
            timeout: self.options.timeout,
            cval: self.options.cval,
        };

        match self.options.scheduling {
            Scheduling::Serial => {
                for (idx, url) in pending {
                    let tile = request.fetch(&*self.source, &idx, &url).await?;
                    layout.place(&idx, tile.view(), out)?;
                    self.cache.put(idx, tile);
                }
            }
            Scheduling::Concurrent { workers } => {
                let limit = Arc::new(Semaphore::new(workers.max(1)));
                let request = Arc::new(request);
                let mut fetches = JoinSet::new();

                for (idx, url) in pending {
                    let source = Arc::clone(&self.source);
                    let limit = Arc::clone(&limit);
                    let request = Arc::clone(&request);
                    fetches.spawn(async move {
                        let _permit = limit
                            .acquire_owned()
                            .await
                            .map_err(|e| FetchError::Task(e.to_string()))?;
                        let tile = request.fetch(&*source, &idx, &url).await?;
                        Ok::<_, FetchError>((idx, tile))
                    });
                }

                while let Some(joined) = fetches.join_next().await {
                    let fetched = joined
                        .map_err(|e| FetchError::Task(e.to_string()))
                        .and_then(|result| result);
                    match fetched {
                        Ok((idx, tile)) => {
                            layout.place(&idx, tile.view(), out)?;
                            self.cache.put(idx, tile);
                        }
                        Err(e) => {
                            fetches.abort_all();
                            return Err(e.into());
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

fn integer_zoom(zoom_level: f64) -> Result<i32, ImageError> {
    if !zoom_level.is_finite() || zoom_level.fract() != 0.0 {
        return Err(ImageError::UnsupportedZoomLevel(zoom_level));
    }
    Ok(zoom_level as i32)
}

/// A tile of the index's size filled with `cval`.
fn blank_tile(idx: &TileIndex, cval: u8) -> Array2<u8> {
    Array2::from_elem((idx.height as usize, idx.width as usize), cval)
}

/// Reorder a 2-D `(y, x)` or 3-D `(z, y, x)` volume into `target` order.
///
/// 2-D input gains a leading depth axis of length 1.
///
/// # Errors
///
/// `InvalidVolumeRank` for any other number of dimensions.
pub fn reorient_volume<'a>(
    volume: ArrayViewD<'a, u8>,
    target: AxisOrder,
) -> Result<ArrayView3<'a, u8>, ImageError> {
    let ndim = volume.ndim();
    let volume = match ndim {
        2 => volume.insert_axis(ndarray::Axis(0)),
        3 => volume,
        n => return Err(ImageError::InvalidVolumeRank(n)),
    };
    let volume = volume
        .into_dimensionality::<Ix3>()
        .map_err(|_| ImageError::InvalidVolumeRank(ndim))?;
    Ok(volume.permuted_axes(target.permutation_from(&AxisOrder::ZYX)))
}

// =============================================================================
// Tile requests
// =============================================================================

/// Per-call settings shared by every tile request.
struct TileRequest {
    auth: Option<Credentials>,
    timeout: Duration,
    cval: u8,
}

impl TileRequest {
    /// GET and decode one tile. A 404 becomes a blank tile.
    async fn fetch<S: TileSource + ?Sized>(
        &self,
        source: &S,
        idx: &TileIndex,
        url: &str,
    ) -> Result<Array2<u8>, FetchError> {
        debug!(url, "Fetching tile");
        let response = source.get(url, self.auth.as_ref(), self.timeout).await?;

        if response.is_not_found() {
            warn!(url, "Tile not found (404), using blank tile");
            return Ok(blank_tile(idx, self.cval));
        }
        if !response.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: response.status,
            });
        }
        decode_tile(&response)
    }
}

// =============================================================================
// Tile placement
// =============================================================================

/// Where the tiles of one request land in the output.
///
/// Offsets are the positions of the region's first and last pixels within
/// the min and max corner tiles.
struct TileLayout {
    min_tile: TileIndex,
    max_tile: TileIndex,
    min_offset: Xyz<i64>,
    max_offset: Xyz<i64>,
    target_order: AxisOrder,
}

impl TileLayout {
    fn place<V: VolumeSink + ?Sized>(
        &self,
        idx: &TileIndex,
        tile: ArrayView2<'_, u8>,
        out: &mut V,
    ) -> Result<(), ImageError> {
        let min_row = idx.row == self.min_tile.row;
        let max_row = idx.row == self.max_tile.row;
        let min_col = idx.col == self.min_tile.col;
        let max_col = idx.col == self.max_tile.col;

        // Tiles larger than the mirror's geometry are cut down to it.
        let (rows, cols) = tile.dim();
        let rows = rows.min(idx.height as usize);
        let cols = cols.min(idx.width as usize);

        let y0 = if min_row { self.min_offset.y as usize } else { 0 };
        let y1 = if max_row {
            (self.max_offset.y + 1) as usize
        } else {
            rows
        }
        .min(rows);
        let x0 = if min_col { self.min_offset.x as usize } else { 0 };
        let x1 = if max_col {
            (self.max_offset.x + 1) as usize
        } else {
            cols
        }
        .min(cols);

        if y0 >= y1 || x0 >= x1 {
            return Ok(());
        }

        let trimmed = tile.slice(s![y0..y1, x0..x1]);
        let block = reorient_volume(trimmed.into_dyn(), self.target_order)?;

        let untrimmed = idx.coords().sub(self.min_tile.coords());
        let topleft = Xyz::new(
            if min_col { 0 } else { untrimmed.x - self.min_offset.x },
            if min_row { 0 } else { untrimmed.y - self.min_offset.y },
            untrimmed.z,
        );
        let offset = self.target_order.gather(&topleft).map(|v| v as usize);

        out.write_block(offset, block);
        Ok(())
    }
}
