//! Axis labels, per-axis triples and axis orderings.
//!
//! Coordinates are carried as [`Xyz`] triples indexed by [`Axis`], so a
//! transformer or mirror can never see a triple with a missing axis. Arrays
//! handed in and out by callers are plain `[T; 3]` rows whose column meaning
//! is given by an [`AxisOrder`].

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SpatialError;

// =============================================================================
// Axis
// =============================================================================

/// One of the three spatial axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes in x, y, z order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Lower-case label of this axis.
    pub fn as_char(self) -> char {
        match self {
            Axis::X => 'x',
            Axis::Y => 'y',
            Axis::Z => 'z',
        }
    }

    /// Parse a single axis label, case-insensitively.
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'x' => Some(Axis::X),
            'y' => Some(Axis::Y),
            'z' => Some(Axis::Z),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

// =============================================================================
// Xyz
// =============================================================================

/// A value for each of the x, y and z axes.
///
/// Deserializes from (and serializes to) a `{"x": .., "y": .., "z": ..}`
/// object, which is how the server describes dimensions, resolutions,
/// translations and pixel locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Xyz<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}

impl<T> Xyz<T> {
    pub const fn new(x: T, y: T, z: T) -> Self {
        Self { x, y, z }
    }

    /// Apply `f` to every component.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Xyz<U> {
        Xyz {
            x: f(self.x),
            y: f(self.y),
            z: f(self.z),
        }
    }

    /// Build a triple by evaluating `f` for every axis.
    pub fn from_fn(mut f: impl FnMut(Axis) -> T) -> Self {
        Self {
            x: f(Axis::X),
            y: f(Axis::Y),
            z: f(Axis::Z),
        }
    }
}

impl<T: Copy> Xyz<T> {
    /// Same value on every axis.
    pub const fn splat(value: T) -> Self {
        Self {
            x: value,
            y: value,
            z: value,
        }
    }

    #[inline]
    pub fn get(&self, axis: Axis) -> T {
        self[axis]
    }
}

impl<T: Copy> Xyz<Option<T>> {
    /// Replace every missing component with `default`.
    pub fn fill_missing(self, default: T) -> Xyz<T> {
        self.map(|v| v.unwrap_or(default))
    }
}

impl Xyz<i64> {
    /// Component-wise difference.
    pub fn sub(self, other: Xyz<i64>) -> Xyz<i64> {
        Xyz::from_fn(|axis| self[axis] - other[axis])
    }
}

impl<T> Index<Axis> for Xyz<T> {
    type Output = T;

    fn index(&self, axis: Axis) -> &T {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }
}

impl<T> IndexMut<Axis> for Xyz<T> {
    fn index_mut(&mut self, axis: Axis) -> &mut T {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }
}

// =============================================================================
// AxisOrder
// =============================================================================

/// A permutation of the three axes, naming the column (or array dimension)
/// order a caller works in.
///
/// `"zyx"` is the row-major order used for C-style arrays and is the default;
/// `"xyz"` is the Fortran-style order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisOrder([Axis; 3]);

impl AxisOrder {
    /// Row-major order: depth, then rows, then columns.
    pub const ZYX: AxisOrder = AxisOrder([Axis::Z, Axis::Y, Axis::X]);

    /// Column-major order.
    pub const XYZ: AxisOrder = AxisOrder([Axis::X, Axis::Y, Axis::Z]);

    /// Build an order from three axes, failing unless they are a permutation.
    pub fn new(axes: [Axis; 3]) -> Result<Self, SpatialError> {
        let distinct = axes[0] != axes[1] && axes[1] != axes[2] && axes[0] != axes[2];
        if !distinct {
            let label: String = axes.iter().map(|a| a.as_char()).collect();
            return Err(SpatialError::InvalidAxisOrder(label));
        }
        Ok(Self(axes))
    }

    pub fn axes(&self) -> [Axis; 3] {
        self.0
    }

    /// Column index of `axis` in this order.
    pub fn position(&self, axis: Axis) -> usize {
        // Every order is a permutation, so the axis is always present.
        self.0.iter().position(|a| *a == axis).unwrap_or(0)
    }

    /// Lay out a triple as a row in this order.
    pub fn gather<T: Copy>(&self, xyz: &Xyz<T>) -> [T; 3] {
        [xyz[self.0[0]], xyz[self.0[1]], xyz[self.0[2]]]
    }

    /// Read a row given in this order back into a triple.
    pub fn scatter<T: Copy>(&self, row: [T; 3]) -> Xyz<T> {
        Xyz::from_fn(|axis| row[self.position(axis)])
    }

    /// For each position of `self`, the position of the same axis in `other`.
    ///
    /// Used as the argument to `permuted_axes` when turning an array laid out
    /// in `other` into one laid out in `self`.
    pub fn permutation_from(&self, other: &AxisOrder) -> [usize; 3] {
        [
            other.position(self.0[0]),
            other.position(self.0[1]),
            other.position(self.0[2]),
        ]
    }
}

impl Default for AxisOrder {
    fn default() -> Self {
        AxisOrder::ZYX
    }
}

impl FromStr for AxisOrder {
    type Err = SpatialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SpatialError::InvalidAxisOrder(s.to_string());
        let axes: Vec<Axis> = s
            .chars()
            .map(Axis::from_char)
            .collect::<Option<_>>()
            .ok_or_else(invalid)?;
        let axes: [Axis; 3] = axes.try_into().map_err(|_| invalid())?;
        AxisOrder::new(axes).map_err(|_| invalid())
    }
}

impl fmt::Display for AxisOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for axis in self.0 {
            write!(f, "{}", axis)?;
        }
        Ok(())
    }
}
