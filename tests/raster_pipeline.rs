//! End-to-end pipeline: raster files on disk -> stack -> fitted PCA.

use std::fs::File;
use std::path::{Path, PathBuf};

use ndarray::Axis;
use raster_pca::{raster, Pca};
use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};

fn write_band(dir: &Path, name: &str, rows: u32, cols: u32, data: &[f32]) -> PathBuf {
    let path = dir.join(name);
    let file = File::create(&path).unwrap();
    let mut encoder = TiffEncoder::new(file).unwrap();
    encoder
        .write_image::<colortype::Gray32Float>(cols, rows, data)
        .unwrap();
    path
}

#[test]
fn folder_of_bands_fits_and_measures_error() {
    let dir = TempDir::new().unwrap();
    for (i, name) in ["b02.tif", "b03.tif", "b04.tif"].iter().enumerate() {
        let scale = i as f32 + 1.0;
        let data: Vec<f32> = (0..30)
            .map(|j| scale * (j % 7) as f32 - 2.0 * (j % 3) as f32)
            .collect();
        write_band(dir.path(), name, 6, 5, &data);
    }

    let stack = raster::load_from_folder(dir.path()).unwrap();
    assert_eq!(stack.dim(), (3, 6, 5));

    let mut pca = Pca::new(2, stack).unwrap();
    let scores = pca.fit_transform().unwrap();
    assert_eq!(scores.dim(), (18, 2));

    let mse = pca.calculate_error().unwrap();
    assert!(mse.is_finite() && mse >= 0.0);

    let ratio = pca.explained_variance_ratio().unwrap();
    assert_eq!(ratio.len(), 5);
}

#[test]
fn list_load_matches_individually_loaded_grids() {
    let dir = TempDir::new().unwrap();
    let a_data: Vec<f32> = (0..12).map(|j| j as f32).collect();
    let b_data: Vec<f32> = (0..12).map(|j| 100.0 - j as f32).collect();
    let a = write_band(dir.path(), "a.tif", 3, 4, &a_data);
    let b = write_band(dir.path(), "b.tif", 3, 4, &b_data);

    let grid_a = raster::load_from_path(&a).unwrap();
    let grid_b = raster::load_from_path(&b).unwrap();
    let stack = raster::load_from_list(&[&a, &b]).unwrap();

    assert_eq!(stack.dim(), (2, 3, 4));
    assert_eq!(stack.index_axis(Axis(0), 0).to_owned(), grid_a);
    assert_eq!(stack.index_axis(Axis(0), 1).to_owned(), grid_b);
}
