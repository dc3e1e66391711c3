// Principal component analysis over raster stacks

#![doc = include_str!("../README.md")]

pub mod error;
pub mod pca;
pub mod raster;

pub use error::{Error, Result};
pub use pca::Pca;
