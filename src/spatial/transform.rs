//! Transformation between project space and stack space.
//!
//! Project space is the real-world coordinate frame shared by every stack in
//! a project (e.g. nanometres). Stack space is voxel indices of one stack at
//! zoom level 0. Scaled space is stack space divided by `2^zoom_level`, i.e.
//! pixel indices of one level of the image pyramid.
//!
//! A stack's orientation says which project plane its sections are cut in,
//! so project axis `y` may well be stack axis `z`:
//!
//! ```text
//!  orientation   stack x   stack y   stack z (depth)
//!  xy            x         y         z
//!  xz            x         z         y
//!  zy            z         y         x
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use super::axis::{Axis, AxisOrder, Xyz};
use crate::client::CatmaidClient;
use crate::error::{ClientError, SpatialError};
use crate::stack::Stack;

// =============================================================================
// Stack Orientation
// =============================================================================

/// Which project plane a stack's sections lie in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StackOrientation {
    #[default]
    XY = 0,
    XZ = 1,
    ZY = 2,
}

impl StackOrientation {
    /// Project axes that stack x and stack y map onto.
    pub fn axes(self) -> [Axis; 2] {
        match self {
            StackOrientation::XY => [Axis::X, Axis::Y],
            StackOrientation::XZ => [Axis::X, Axis::Z],
            StackOrientation::ZY => [Axis::Z, Axis::Y],
        }
    }

    /// The project axis not in the section plane, which stack z maps onto.
    pub fn depth_axis(self) -> Axis {
        let [a, b] = self.axes();
        Axis::ALL
            .into_iter()
            .find(|axis| *axis != a && *axis != b)
            .unwrap_or(Axis::Z)
    }
}

impl TryFrom<i64> for StackOrientation {
    type Error = SpatialError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StackOrientation::XY),
            1 => Ok(StackOrientation::XZ),
            2 => Ok(StackOrientation::ZY),
            other => Err(SpatialError::InvalidOrientation(other.to_string())),
        }
    }
}

impl FromStr for StackOrientation {
    type Err = SpatialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xy" => Ok(StackOrientation::XY),
            "xz" => Ok(StackOrientation::XZ),
            "zy" => Ok(StackOrientation::ZY),
            _ => Err(SpatialError::InvalidOrientation(s.to_string())),
        }
    }
}

impl fmt::Display for StackOrientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b] = self.axes();
        write!(f, "{}{}", a, b)
    }
}

impl<'de> Deserialize<'de> for StackOrientation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Code(i64),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Code(code) => StackOrientation::try_from(code),
            Repr::Name(name) => name.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Coordinate Transformer
// =============================================================================

/// Converts coordinates between project, stack and scaled stack space.
///
/// Resolution is project units per voxel side; translation is the location
/// of the stack's origin in project space. Both are keyed by project axis.
///
/// Equality compares resolution, translation and `scale_z` only; two
/// transformers differing just in orientation compare equal.
#[derive(Debug, Clone)]
pub struct CoordinateTransformer {
    resolution: Xyz<f64>,
    translation: Xyz<f64>,
    orientation: StackOrientation,
    scale_z: bool,
    depth_dim: Axis,

    /// Stack axis -> project axis
    stack_to_project_axes: Xyz<Axis>,

    /// Project axis -> stack axis
    project_to_stack_axes: Xyz<Axis>,
}

impl CoordinateTransformer {
    pub fn new(
        resolution: Xyz<f64>,
        translation: Xyz<f64>,
        orientation: StackOrientation,
    ) -> Self {
        let [first, second] = orientation.axes();
        let depth_dim = orientation.depth_axis();

        let stack_to_project_axes = Xyz::new(first, second, depth_dim);
        let mut project_to_stack_axes = Xyz::splat(Axis::X);
        for stack_axis in Axis::ALL {
            project_to_stack_axes[stack_to_project_axes[stack_axis]] = stack_axis;
        }

        Self {
            resolution,
            translation,
            orientation,
            scale_z: false,
            depth_dim,
            stack_to_project_axes,
            project_to_stack_axes,
        }
    }

    /// Build from possibly-incomplete resolution and translation, defaulting
    /// missing resolution components to 1 and translation components to 0.
    pub fn from_partial(
        resolution: Option<Xyz<Option<f64>>>,
        translation: Option<Xyz<Option<f64>>>,
        orientation: StackOrientation,
    ) -> Self {
        let resolution = resolution.map_or(Xyz::splat(1.0), |r| r.fill_missing(1.0));
        let translation = translation.map_or(Xyz::splat(0.0), |t| t.fill_missing(0.0));
        Self::new(resolution, translation, orientation)
    }

    /// Whether z participates in zoom rescaling (off by default; useful for
    /// isotropic stacks).
    pub fn with_scale_z(mut self, scale_z: bool) -> Self {
        self.scale_z = scale_z;
        self
    }

    pub fn resolution(&self) -> Xyz<f64> {
        self.resolution
    }

    pub fn translation(&self) -> Xyz<f64> {
        self.translation
    }

    pub fn orientation(&self) -> StackOrientation {
        self.orientation
    }

    pub fn scale_z(&self) -> bool {
        self.scale_z
    }

    /// The project axis that stack depth runs along.
    pub fn depth_dim(&self) -> Axis {
        self.depth_dim
    }

    // -------------------------------------------------------------------------
    // Project <-> stack
    // -------------------------------------------------------------------------

    /// Transform one project-space coordinate, returning the stack axis it
    /// lands on together with its stack-space value.
    pub fn project_to_stack_coord(&self, proj_axis: Axis, value: f64) -> (Axis, f64) {
        (
            self.project_to_stack_axes[proj_axis],
            (value - self.translation[proj_axis]) / self.resolution[proj_axis],
        )
    }

    /// Transform one stack-space coordinate, returning the project axis it
    /// lands on together with its project-space value.
    pub fn stack_to_project_coord(&self, stack_axis: Axis, value: f64) -> (Axis, f64) {
        let proj_axis = self.stack_to_project_axes[stack_axis];
        (
            proj_axis,
            value * self.resolution[proj_axis] + self.translation[proj_axis],
        )
    }

    pub fn project_to_stack(&self, project: Xyz<f64>) -> Xyz<f64> {
        let mut out = Xyz::splat(0.0);
        for axis in Axis::ALL {
            let (stack_axis, value) = self.project_to_stack_coord(axis, project[axis]);
            out[stack_axis] = value;
        }
        out
    }

    pub fn stack_to_project(&self, stack: Xyz<f64>) -> Xyz<f64> {
        let mut out = Xyz::splat(0.0);
        for axis in Axis::ALL {
            let (proj_axis, value) = self.stack_to_project_coord(axis, stack[axis]);
            out[proj_axis] = value;
        }
        out
    }

    /// Transform rows of project coordinates, whose columns are in `order`,
    /// into stack coordinates with columns in the same order.
    pub fn project_to_stack_array(&self, rows: &[[f64; 3]], order: AxisOrder) -> Vec<[f64; 3]> {
        rows.iter()
            .map(|row| order.gather(&self.project_to_stack(order.scatter(*row))))
            .collect()
    }

    /// Transform rows of stack coordinates, whose columns are in `order`,
    /// into project coordinates with columns in the same order.
    pub fn stack_to_project_array(&self, rows: &[[f64; 3]], order: AxisOrder) -> Vec<[f64; 3]> {
        rows.iter()
            .map(|row| order.gather(&self.stack_to_project(order.scatter(*row))))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Stack <-> scaled
    // -------------------------------------------------------------------------

    /// Rescale a stack coordinate from `src_zoom` to `tgt_zoom`.
    ///
    /// z is returned unchanged unless `scale_z` is set.
    pub fn stack_to_scaled_coord(&self, axis: Axis, value: f64, tgt_zoom: i32, src_zoom: i32) -> f64 {
        if axis == Axis::Z && !self.scale_z {
            return value;
        }
        value / 2f64.powi(tgt_zoom - src_zoom)
    }

    pub fn stack_to_scaled(&self, stack: Xyz<f64>, tgt_zoom: i32, src_zoom: i32) -> Xyz<f64> {
        Xyz::from_fn(|axis| self.stack_to_scaled_coord(axis, stack[axis], tgt_zoom, src_zoom))
    }

    /// Rescale rows of stack coordinates whose columns are in `order`.
    pub fn stack_to_scaled_array(
        &self,
        rows: &[[f64; 3]],
        tgt_zoom: i32,
        src_zoom: i32,
        order: AxisOrder,
    ) -> Vec<[f64; 3]> {
        rows.iter()
            .map(|row| {
                let scaled = self.stack_to_scaled(order.scatter(*row), tgt_zoom, src_zoom);
                order.gather(&scaled)
            })
            .collect()
    }
}

impl CoordinateTransformer {
    /// Transformer for a stack, fetched from a CATMAID instance.
    ///
    /// # Errors
    ///
    /// - `MissingProjectId` if the client has no project
    /// - any request or stack info error from [`CatmaidClient::stack_info`]
    pub async fn from_catmaid(client: &CatmaidClient, stack_id: i64) -> Result<Self, ClientError> {
        let info = client.stack_info(stack_id).await?;
        Ok(Stack::from_stack_info(&info)?.coordinate_transformer())
    }
}

impl Default for CoordinateTransformer {
    fn default() -> Self {
        Self::new(Xyz::splat(1.0), Xyz::splat(0.0), StackOrientation::XY)
    }
}

// TODO: confirm whether orientation should take part in equality; it is
// left out to match how transformers have always compared.
impl PartialEq for CoordinateTransformer {
    fn eq(&self, other: &Self) -> bool {
        self.resolution == other.resolution
            && self.translation == other.translation
            && self.scale_z == other.scale_z
    }
}

// =============================================================================
// Tests
// =============================================================================
