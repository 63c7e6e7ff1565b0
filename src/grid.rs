//! Dense row-major heightmap grid.
//!
//! The grid is the single shared data structure every pipeline stage reads
//! and writes. Values are nominally in [0, 1] but stages may push them
//! outside that range; the final `normalize()` call rescales.

use std::marker::PhantomData;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("grid dimensions must be positive (got {width}x{height})")]
    InvalidDimensions { width: usize, height: usize },
}

/// A 2D elevation grid backed by a flat row-major `Vec<f32>`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Grid {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Grid {
    /// Create a grid of the given dimensions, filled with 0.0.
    pub fn new(width: usize, height: usize) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::InvalidDimensions { width, height });
        }
        Ok(Self::with_dims(width, height))
    }

    /// Internal constructor for callers that have already validated dimensions.
    pub(crate) fn with_dims(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Read a cell. Unchecked in release builds: the caller must keep
    /// `x < width` and `y < height`.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        debug_assert!(x < self.width && y < self.height);
        unsafe { *self.data.get_unchecked(self.index(x, y)) }
    }

    /// Write a cell. Unchecked in release builds: the caller must keep
    /// `x < width` and `y < height`.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        debug_assert!(x < self.width && y < self.height);
        let idx = self.index(x, y);
        unsafe {
            *self.data.get_unchecked_mut(idx) = value;
        }
    }

    /// Coordinate-clamping read, safe for any integer input.
    #[inline]
    pub fn sample(&self, x: i64, y: i64) -> f32 {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.data[self.index(x, y)]
    }

    /// Reset every cell to 0.0.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    pub fn min_max(&self) -> (f32, f32) {
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for &h in &self.data {
            if h < min {
                min = h;
            }
            if h > max {
                max = h;
            }
        }
        (min, max)
    }

    /// Rescale so the minimum maps to 0 and the maximum to 1. Near-constant
    /// grids (range below 1e-6) are filled with 0.5 instead of dividing by
    /// a vanishing range.
    pub fn normalize(&mut self) {
        let (min, max) = self.min_max();
        let range = max - min;
        if range < 1e-6 {
            self.fill(0.5);
            return;
        }
        for h in &mut self.data {
            *h = (*h - min) / range;
        }
    }

    pub fn normalize_to_range(&mut self, lo: f32, hi: f32) {
        self.normalize();
        let range = hi - lo;
        for h in &mut self.data {
            *h = lo + *h * range;
        }
    }

    /// Copy cell data from another grid, reallocating if dimensions differ.
    pub fn copy_from(&mut self, other: &Grid) {
        if self.width != other.width || self.height != other.height {
            self.width = other.width;
            self.height = other.height;
            self.data = other.data.clone();
        } else {
            self.data.copy_from_slice(&other.data);
        }
    }

    /// Borrow the raw row-major buffer. Valid only while the grid lives;
    /// bulk consumers (exporters, texture upload) read this view.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Move the contents out, leaving this grid empty (0x0).
    pub fn take(&mut self) -> Grid {
        std::mem::take(self)
    }

    /// Row-disjoint shared-mutable view for row-parallel stages.
    pub fn row_writer(&mut self) -> RowWriter<'_> {
        RowWriter {
            data: self.data.as_mut_ptr(),
            width: self.width,
            height: self.height,
            _lifetime: PhantomData,
        }
    }
}

/// Shared mutable view over a grid used by row-parallel stages.
///
/// Safety contract: during a parallel pass, each cell may only be accessed
/// through the task that owns its row index. The parallel range primitive
/// hands every row to exactly one task, so stages that touch only `(x, y)`
/// for their own `y` uphold this automatically.
pub struct RowWriter<'a> {
    data: *mut f32,
    width: usize,
    height: usize,
    _lifetime: PhantomData<&'a mut f32>,
}

unsafe impl Send for RowWriter<'_> {}
unsafe impl Sync for RowWriter<'_> {}

impl RowWriter<'_> {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        debug_assert!(x < self.width && y < self.height);
        unsafe { *self.data.add(y * self.width + x) }
    }

    #[inline]
    pub fn set(&self, x: usize, y: usize, value: f32) {
        debug_assert!(x < self.width && y < self.height);
        unsafe {
            *self.data.add(y * self.width + x) = value;
        }
    }
}

/// Cache of same-dimension scratch grids shared by the double-buffered
/// stages (thermal erosion, smoothing rounds), so each pass reuses a
/// buffer instead of allocating its own.
pub struct ScratchGrids {
    width: usize,
    height: usize,
    free: Vec<Grid>,
}

impl ScratchGrids {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            free: Vec::new(),
        }
    }

    /// Get a scratch grid of the configured dimensions. Contents are
    /// unspecified; callers overwrite or `copy_from` before reading.
    pub fn acquire(&mut self) -> Grid {
        self.free
            .pop()
            .unwrap_or_else(|| Grid::with_dims(self.width, self.height))
    }

    pub fn release(&mut self, grid: Grid) {
        if grid.width() == self.width && grid.height() == self.height {
            self.free.push(grid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dimensions_rejected() {
        assert_eq!(
            Grid::new(0, 4),
            Err(GridError::InvalidDimensions { width: 0, height: 4 })
        );
        assert_eq!(
            Grid::new(4, 0),
            Err(GridError::InvalidDimensions { width: 4, height: 0 })
        );
        assert!(Grid::new(1, 1).is_ok());
    }

    #[test]
    fn test_normalize_full_range() {
        let mut grid = Grid::new(4, 4).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                grid.set(x, y, (y * 4 + x) as f32);
            }
        }
        grid.normalize();
        let (min, max) = grid.min_max();
        assert!(min.abs() < 1e-6);
        assert!((max - 1.0).abs() < 1e-6);

        // Normalizing again is a no-op.
        let before = grid.clone();
        grid.normalize();
        assert_eq!(before, grid);
    }

    #[test]
    fn test_normalize_constant_grid_fills_half() {
        let mut grid = Grid::new(4, 4).unwrap();
        grid.fill(0.7);
        grid.normalize();
        for &h in grid.as_slice() {
            assert_eq!(h, 0.5);
        }
    }

    #[test]
    fn test_normalize_to_range() {
        let mut grid = Grid::new(2, 2).unwrap();
        grid.set(0, 0, -3.0);
        grid.set(1, 0, 1.0);
        grid.set(0, 1, 5.0);
        grid.set(1, 1, 2.0);
        grid.normalize_to_range(0.25, 0.75);
        let (min, max) = grid.min_max();
        assert!((min - 0.25).abs() < 1e-6);
        assert!((max - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_sample_clamps() {
        let mut grid = Grid::new(3, 3).unwrap();
        grid.set(0, 0, 1.0);
        grid.set(2, 2, 2.0);
        assert_eq!(grid.sample(-5, -5), 1.0);
        assert_eq!(grid.sample(10, 10), 2.0);
        assert_eq!(grid.sample(0, 0), 1.0);
    }

    #[test]
    fn test_take_leaves_empty() {
        let mut grid = Grid::new(2, 2).unwrap();
        grid.fill(1.0);
        let taken = grid.take();
        assert_eq!(taken.width(), 2);
        assert_eq!(grid.width(), 0);
        assert_eq!(grid.height(), 0);
        assert!(grid.as_slice().is_empty());
    }

    #[test]
    fn test_scratch_grids_reuse() {
        let mut scratch = ScratchGrids::new(8, 8);
        let mut a = scratch.acquire();
        a.fill(3.0);
        scratch.release(a);
        let b = scratch.acquire();
        assert_eq!(b.width(), 8);
        assert_eq!(b.height(), 8);
    }
}
