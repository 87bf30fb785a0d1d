//! Builders for images and archives used across the unit tests.

mod archive;
mod image;

pub(crate) use archive::ArchiveBuilder;
pub(crate) use image::ImageBuilder;
