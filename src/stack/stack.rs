use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::info::StackInfo;
use super::mirror::StackMirror;
use crate::error::StackError;
use crate::io::TileSource;
use crate::spatial::{Axis, CoordinateTransformer, StackOrientation, Xyz};

/// Where a stack sits in its project's real-world coordinate frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectPlacement {
    pub translation: Xyz<f64>,
    pub resolution: Xyz<f64>,
    pub orientation: StackOrientation,
}

impl Default for ProjectPlacement {
    fn default() -> Self {
        Self {
            translation: Xyz::splat(0.0),
            resolution: Xyz::splat(1.0),
            orientation: StackOrientation::XY,
        }
    }
}

/// A tiled image volume served by one or more mirrors.
///
/// Mirrors are kept sorted by `(position, title)`. A stack loaded from a
/// project's stack info also carries its [`ProjectPlacement`].
#[derive(Debug, Clone)]
pub struct Stack {
    /// Voxel extents at zoom level 0
    pub dimension: Xyz<u64>,

    /// Slices with no imagery
    pub broken_slices: BTreeSet<i64>,

    /// A pixel every mirror is expected to serve
    pub canary_location: Xyz<i64>,

    mirrors: Vec<StackMirror>,
    project: Option<ProjectPlacement>,
}

impl Stack {
    pub fn new(
        dimension: Xyz<u64>,
        broken_slices: impl IntoIterator<Item = i64>,
        canary_location: Option<Xyz<i64>>,
    ) -> Self {
        Self {
            dimension,
            broken_slices: broken_slices.into_iter().collect(),
            canary_location: canary_location.unwrap_or_default(),
            mirrors: Vec::new(),
            project: None,
        }
    }

    pub fn with_mirrors(mut self, mirrors: impl IntoIterator<Item = StackMirror>) -> Self {
        self.mirrors.extend(mirrors);
        self.sort_mirrors();
        self
    }

    pub fn with_project(mut self, placement: ProjectPlacement) -> Self {
        self.project = Some(placement);
        self
    }

    pub fn add_mirror(&mut self, mirror: StackMirror) {
        self.mirrors.push(mirror);
        self.sort_mirrors();
    }

    fn sort_mirrors(&mut self) {
        self.mirrors
            .sort_by(|a, b| (a.position(), a.title()).cmp(&(b.position(), b.title())));
    }

    pub fn mirrors(&self) -> &[StackMirror] {
        &self.mirrors
    }

    pub fn project(&self) -> Option<&ProjectPlacement> {
        self.project.as_ref()
    }

    /// Build a project-placed stack from a stack info record.
    ///
    /// Mirrors whose tile source type has no known URL layout, or whose
    /// tile size has a zero dimension, are skipped with a warning rather
    /// than failing the whole stack.
    ///
    /// # Errors
    ///
    /// `InvalidStackInfo` if the resolution is zero or non-finite along any
    /// axis, or the translation is non-finite.
    pub fn from_stack_info(info: &StackInfo) -> Result<Self, StackError> {
        let transformer = CoordinateTransformer::from_partial(
            info.resolution,
            info.translation,
            info.orientation,
        );
        let placement = ProjectPlacement {
            translation: transformer.translation(),
            resolution: transformer.resolution(),
            orientation: info.orientation,
        };
        for axis in Axis::ALL {
            let resolution = placement.resolution[axis];
            if !resolution.is_finite() || resolution == 0.0 {
                return Err(StackError::InvalidStackInfo(format!(
                    "resolution along {axis} must be finite and non-zero, got {resolution}"
                )));
            }
            if !placement.translation[axis].is_finite() {
                return Err(StackError::InvalidStackInfo(format!(
                    "translation along {axis} must be finite"
                )));
            }
        }

        let mut mirrors = Vec::with_capacity(info.mirrors.len());
        for record in &info.mirrors {
            match StackMirror::from_record(record) {
                Ok(mirror) => mirrors.push(mirror),
                Err(
                    e @ (StackError::UnsupportedTileSourceType(_)
                    | StackError::InvalidTileGeometry { .. }),
                ) => {
                    warn!(image_base = %record.image_base, "Skipping mirror: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Self::new(
            info.dimension,
            info.broken_slices.to_set()?,
            info.canary_location,
        )
        .with_mirrors(mirrors)
        .with_project(placement))
    }

    /// Transformer between this stack's project space and stack space.
    ///
    /// A stack with no project placement gets the identity transform.
    pub fn coordinate_transformer(&self) -> CoordinateTransformer {
        let placement = self.project.unwrap_or_default();
        CoordinateTransformer::new(
            placement.resolution,
            placement.translation,
            placement.orientation,
        )
    }

    // -------------------------------------------------------------------------
    // Mirror probing
    // -------------------------------------------------------------------------

    /// Time fetching the canary tile from every mirror.
    ///
    /// Returns one entry per mirror, in mirror order: total seconds over
    /// `reps` requests (divided by the tile's pixel count when `normalise`
    /// is set), or `None` if the mirror timed out or refused the
    /// connection. Any HTTP response, whatever its status, counts as
    /// reachable.
    pub async fn probe_mirrors<S: TileSource + ?Sized>(
        &self,
        source: &S,
        timeout: Duration,
        reps: usize,
        normalise: bool,
    ) -> Vec<Option<f64>> {
        let reps = reps.max(1);
        let mut timings = Vec::with_capacity(self.mirrors.len());

        for mirror in &self.mirrors {
            let (tile, _) = mirror.get_tile_index(self.canary_location, 0);
            let url = match mirror.generate_url(&tile) {
                Ok(url) => url,
                Err(e) => {
                    warn!(mirror = mirror.title(), "Cannot probe mirror: {}", e);
                    timings.push(None);
                    continue;
                }
            };

            let start = Instant::now();
            let mut reachable = true;
            for _ in 0..reps {
                if let Err(e) = source.get(&url, mirror.auth(), timeout).await {
                    debug!(url = %url, "Mirror unreachable: {}", e);
                    reachable = false;
                    break;
                }
            }

            if !reachable {
                timings.push(None);
                continue;
            }

            let mut seconds = start.elapsed().as_secs_f64();
            if normalise {
                seconds /= tile.pixel_count() as f64;
            }
            info!(
                mirror = mirror.title(),
                position = mirror.position(),
                "Mirror responded in {:.6}s{}",
                seconds,
                if normalise { " per pixel" } else { "" }
            );
            timings.push(Some(seconds));
        }

        timings
    }

    /// Index into [`Stack::mirrors`] of the mirror with the lowest probe
    /// time.
    ///
    /// # Errors
    ///
    /// `NoMirrorReachable` if every mirror failed.
    pub async fn fastest_mirror_index<S: TileSource + ?Sized>(
        &self,
        source: &S,
        timeout: Duration,
        reps: usize,
        normalise: bool,
    ) -> Result<usize, StackError> {
        let timings = self.probe_mirrors(source, timeout, reps, normalise).await;
        Self::fastest_index(&timings).ok_or(StackError::NoMirrorReachable)
    }

    /// The mirror with the lowest probe time.
    pub async fn get_fastest_mirror<S: TileSource + ?Sized>(
        &self,
        source: &S,
        timeout: Duration,
        reps: usize,
        normalise: bool,
    ) -> Result<&StackMirror, StackError> {
        let idx = self
            .fastest_mirror_index(source, timeout, reps, normalise)
            .await?;
        Ok(&self.mirrors[idx])
    }

    /// Position of the smallest timing in the output of
    /// [`Stack::probe_mirrors`]; earlier entries win ties.
    pub fn fastest_index(timings: &[Option<f64>]) -> Option<usize> {
        timings
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.map(|t| (i, t)))
            .fold(None, |best: Option<(usize, f64)>, (i, t)| match best {
                Some((_, best_t)) if best_t <= t => best,
                _ => Some((i, t)),
            })
            .map(|(i, _)| i)
    }
}
