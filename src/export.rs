//! Heightmap exporters.
//!
//! All exporters consume the grid's borrowed buffer view and expect
//! normalized (0.0-1.0) values; out-of-range cells are clamped.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use thiserror::Error;

use crate::grid::Grid;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Export as 8-bit grayscale PNG, black at elevation 0 and white at 1.
pub fn export_grayscale(grid: &Grid, path: &Path) -> Result<(), ExportError> {
    let mut img: GrayImage = ImageBuffer::new(grid.width() as u32, grid.height() as u32);

    for y in 0..grid.height() {
        for x in 0..grid.width() {
            let v = (grid.get(x, y).clamp(0.0, 1.0) * 255.0) as u8;
            img.put_pixel(x as u32, y as u32, Luma([v]));
        }
    }

    img.save(path)?;
    Ok(())
}

/// Export using the spectral colormap.
pub fn export_colormap(grid: &Grid, path: &Path) -> Result<(), ExportError> {
    let mut img: RgbImage = ImageBuffer::new(grid.width() as u32, grid.height() as u32);

    for y in 0..grid.height() {
        for x in 0..grid.width() {
            let color = spectral_colormap(grid.get(x, y).clamp(0.0, 1.0));
            img.put_pixel(x as u32, y as u32, Rgb(color));
        }
    }

    img.save(path)?;
    Ok(())
}

/// Dump the raw buffer as little-endian f32, row-major.
pub fn export_raw(grid: &Grid, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for &h in grid.as_slice() {
        writer.write_all(&h.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Spectral colormap (matplotlib style): dark blue -> cyan -> green -> yellow -> orange -> red
fn spectral_colormap(t: f32) -> [u8; 3] {
    let colors: [[f32; 3]; 11] = [
        [0.37, 0.31, 0.64], // Dark blue/purple (low)
        [0.20, 0.53, 0.74], // Blue
        [0.40, 0.76, 0.65], // Teal
        [0.67, 0.87, 0.64], // Light green
        [0.90, 0.96, 0.60], // Yellow-green
        [1.00, 1.00, 0.75], // Light yellow / white
        [1.00, 0.88, 0.55], // Yellow
        [0.99, 0.68, 0.38], // Light orange
        [0.96, 0.43, 0.26], // Orange
        [0.84, 0.24, 0.31], // Red
        [0.62, 0.00, 0.26], // Dark red (high)
    ];

    let t_scaled = t * 10.0;
    let idx = (t_scaled as usize).min(9);
    let frac = t_scaled - idx as f32;

    let c1 = colors[idx];
    let c2 = colors[idx + 1];

    [
        ((c1[0] + (c2[0] - c1[0]) * frac) * 255.0) as u8,
        ((c1[1] + (c2[1] - c1[1]) * frac) * 255.0) as u8,
        ((c1[2] + (c2[2] - c1[2]) * frac) * 255.0) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spectral_endpoints() {
        let low = spectral_colormap(0.0);
        let high = spectral_colormap(1.0);
        // Low is blue-ish, high is red-ish.
        assert!(low[2] > low[0]);
        assert!(high[0] > high[2]);
    }

    #[test]
    fn test_raw_export_roundtrip() {
        let mut grid = Grid::new(4, 2).unwrap();
        for (i, h) in grid.as_mut_slice().iter_mut().enumerate() {
            *h = i as f32 / 8.0;
        }

        let dir = std::env::temp_dir().join("terraforge_export_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dump.f32");

        export_raw(&grid, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 4 * 2 * 4);

        let first = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(first, 0.0);
        let last = f32::from_le_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]);
        assert_eq!(last, 7.0 / 8.0);

        std::fs::remove_file(&path).ok();
    }
}
