//! Loading single-band raster files into arrays.
//!
//! Each file contributes the first band of its first image. Grids are
//! stacked along a new leading axis, so loading K files of H rows by W
//! columns yields an `Array3<f64>` of shape (K, H, W).

use std::fs::{self, File};
use std::path::Path;

use log::{debug, info};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;

use crate::error::{Error, Result};

/// Reads the first band of one raster file into an H x W grid of `f64`.
///
/// Multi-sample pixel formats (RGB, RGBA, gray+alpha, CMYK) contribute the
/// first sample of each pixel. Palette and other exotic formats are rejected
/// with [`Error::UnsupportedPixelFormat`].
///
/// # Errors
///
/// Returns an error if the file cannot be opened or decoded.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Array2<f64>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut decoder = Decoder::new(file)?;
    let (width, height) = decoder.dimensions()?;
    let channels = samples_per_pixel(decoder.colortype()?)?;

    let grid = match decoder.read_image()? {
        DecodingResult::U8(buf) => first_band(buf, height as usize, width as usize, channels)?,
        DecodingResult::U16(buf) => first_band(buf, height as usize, width as usize, channels)?,
        DecodingResult::U32(buf) => first_band(buf, height as usize, width as usize, channels)?,
        DecodingResult::F32(buf) => first_band(buf, height as usize, width as usize, channels)?,
        DecodingResult::F64(buf) => first_band(buf, height as usize, width as usize, channels)?,
        _ => return Err(Error::UnsupportedPixelFormat),
    };

    debug!("read {}x{} grid from {}", height, width, path.display());
    Ok(grid)
}

/// Reads the first band of each path and stacks the grids in the given order.
///
/// # Errors
///
/// Fails if any path fails to load or if the grids do not all share the same
/// dimensions.
pub fn load_from_list<P: AsRef<Path>>(paths: &[P]) -> Result<Array3<f64>> {
    let grids = paths
        .iter()
        .map(load_from_path)
        .collect::<Result<Vec<_>>>()?;
    if grids.is_empty() {
        return Err(Error::EmptyStack);
    }
    stack_grids(&grids)
}

/// Loads every entry of a directory as a raster and stacks the grids.
///
/// Entries are visited in directory-listing order, which is not guaranteed
/// to be sorted. No filtering is applied: an entry that is not a readable
/// raster file fails the whole load.
///
/// # Errors
///
/// Fails if the directory cannot be read, is empty, or contains an entry
/// that cannot be decoded.
pub fn load_from_folder<P: AsRef<Path>>(dir: P) -> Result<Array3<f64>> {
    let dir = dir.as_ref();
    let mut grids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        grids.push(load_from_path(entry.path())?);
    }
    if grids.is_empty() {
        return Err(Error::EmptyDirectory(dir.display().to_string()));
    }
    let stack = stack_grids(&grids)?;
    info!(
        "loaded {} raster layers of {}x{} from {}",
        stack.dim().0,
        stack.dim().1,
        stack.dim().2,
        dir.display()
    );
    Ok(stack)
}

fn stack_grids(grids: &[Array2<f64>]) -> Result<Array3<f64>> {
    let (rows, cols) = grids[0].dim();
    for grid in &grids[1..] {
        let (r, c) = grid.dim();
        if (r, c) != (rows, cols) {
            return Err(Error::SizeMismatch {
                expected_rows: rows,
                expected_cols: cols,
                actual_rows: r,
                actual_cols: c,
            });
        }
    }
    let views: Vec<ArrayView2<f64>> = grids.iter().map(|g| g.view()).collect();
    Ok(ndarray::stack(Axis(0), &views)?)
}

fn first_band<T>(buf: Vec<T>, height: usize, width: usize, channels: usize) -> Result<Array2<f64>>
where
    T: Copy,
    f64: From<T>,
{
    let data: Vec<f64> = buf.iter().step_by(channels).map(|&v| f64::from(v)).collect();
    Ok(Array2::from_shape_vec((height, width), data)?)
}

fn samples_per_pixel(color: ColorType) -> Result<usize> {
    match color {
        ColorType::Gray(_) => Ok(1),
        ColorType::GrayA(_) => Ok(2),
        ColorType::RGB(_) => Ok(3),
        ColorType::RGBA(_) | ColorType::CMYK(_) => Ok(4),
        _ => Err(Error::UnsupportedPixelFormat),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tiff::encoder::{colortype, TiffEncoder};

    fn write_gray_f32(dir: &Path, name: &str, rows: u32, cols: u32, fill: f32) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        let mut encoder = TiffEncoder::new(file).unwrap();
        let data = vec![fill; (rows * cols) as usize];
        encoder
            .write_image::<colortype::Gray32Float>(cols, rows, &data)
            .unwrap();
        path
    }

    fn write_gray_u16(dir: &Path, name: &str, rows: u32, cols: u32, values: &[u16]) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        let mut encoder = TiffEncoder::new(file).unwrap();
        encoder
            .write_image::<colortype::Gray16>(cols, rows, values)
            .unwrap();
        path
    }

    #[test]
    fn load_from_path_reads_grid_values() {
        let dir = TempDir::new().unwrap();
        let values: Vec<u16> = (0..12).collect();
        let path = write_gray_u16(dir.path(), "band.tif", 3, 4, &values);

        let grid = load_from_path(&path).unwrap();
        assert_eq!(grid.dim(), (3, 4));
        assert_eq!(grid[[0, 0]], 0.0);
        assert_eq!(grid[[1, 0]], 4.0);
        assert_eq!(grid[[2, 3]], 11.0);
    }

    #[test]
    fn load_from_path_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_from_path(dir.path().join("absent.tif")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn load_from_list_preserves_given_order() {
        let dir = TempDir::new().unwrap();
        let a = write_gray_f32(dir.path(), "a.tif", 2, 3, 1.0);
        let b = write_gray_f32(dir.path(), "b.tif", 2, 3, 2.0);

        let stack = load_from_list(&[&b, &a]).unwrap();
        assert_eq!(stack.dim(), (2, 2, 3));
        assert_eq!(stack[[0, 0, 0]], 2.0);
        assert_eq!(stack[[1, 0, 0]], 1.0);
    }

    #[test]
    fn load_from_list_rejects_mismatched_grids() {
        let dir = TempDir::new().unwrap();
        let a = write_gray_f32(dir.path(), "a.tif", 2, 3, 1.0);
        let b = write_gray_f32(dir.path(), "b.tif", 3, 3, 2.0);

        let err = load_from_list(&[&a, &b]).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));
    }

    #[test]
    fn load_from_folder_stacks_every_entry() {
        let dir = TempDir::new().unwrap();
        write_gray_f32(dir.path(), "b02.tif", 4, 5, 1.0);
        write_gray_f32(dir.path(), "b03.tif", 4, 5, 2.0);
        write_gray_f32(dir.path(), "b04.tif", 4, 5, 3.0);

        let stack = load_from_folder(dir.path()).unwrap();
        assert_eq!(stack.dim(), (3, 4, 5));

        // Directory listing order is unspecified; compare as a set.
        let mut firsts: Vec<f64> = (0..3).map(|i| stack[[i, 0, 0]]).collect();
        firsts.sort_by(|x, y| x.partial_cmp(y).unwrap());
        assert_eq!(firsts, vec![1.0, 2.0, 3.0]);

        // Each layer matches the individually loaded grid with the same value.
        for i in 0..3 {
            assert!(stack.index_axis(Axis(0), i).iter().all(|&v| v == stack[[i, 0, 0]]));
        }
    }

    #[test]
    fn load_from_folder_empty_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load_from_folder(dir.path()).unwrap_err();
        assert!(matches!(err, Error::EmptyDirectory(_)));
    }
}
