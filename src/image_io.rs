use std::path::{Path, PathBuf};
use std::fs;
use image::{GrayImage, ImageFormat};

use crate::errors::{GrainSizeError, Result};
use crate::image_utils::GrainImage;

/// File extensions recognised as sediment photographs
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "tif", "tiff", "png"];

/// Represents an input image with its metadata
pub struct InputImage {
    pub image: GrainImage,
    pub path: PathBuf,
    pub filename: String,
}

/// Get all supported image files from a directory (recursively), sorted by path
pub fn get_image_files_in_dir<P: AsRef<Path>>(dir_path: P) -> Result<Vec<PathBuf>> {
    let dir_path = dir_path.as_ref();

    if !dir_path.exists() {
        return Err(GrainSizeError::InvalidPath(dir_path.to_path_buf()));
    }

    if !dir_path.is_dir() {
        return Err(GrainSizeError::Config(format!(
            "{} is not a directory", dir_path.display()
        )));
    }

    let mut image_files = Vec::new();
    find_image_files_recursive(dir_path, &mut image_files)?;
    image_files.sort();

    Ok(image_files)
}

/// Whether the path carries one of the supported image extensions
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn find_image_files_recursive(dir_path: &Path, result: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir_path)? {
        let path = entry?.path();

        if path.is_dir() {
            find_image_files_recursive(&path, result)?;
        } else if path.is_file() && is_supported_image(&path) {
            result.push(path);
        }
    }

    Ok(())
}

/// Load an image as a single-channel field with the long axis horizontal
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<InputImage> {
    let path = path.as_ref();

    let filename = path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| GrainSizeError::InvalidPath(path.to_path_buf()))?
        .to_string();

    let decoded = image::open(path)?;
    let image = GrainImage::from_dynamic(&decoded)?;

    Ok(InputImage {
        image,
        path: path.to_path_buf(),
        filename,
    })
}

/// Save a greyscale image as PNG
pub fn save_gray_image<P: AsRef<Path>>(image: &GrayImage, path: P) -> Result<()> {
    image.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn finds_supported_images_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("site_b");
        fs::create_dir_all(&nested).unwrap();

        fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
        let a = dir.path().join("a.PNG");
        let b = nested.join("b.png");
        GrayImage::new(4, 4).save_with_format(&a, ImageFormat::Png).unwrap();
        GrayImage::new(4, 4).save_with_format(&b, ImageFormat::Png).unwrap();

        let found = get_image_files_in_dir(dir.path()).unwrap();
        assert_eq!(found, vec![a, b]);
    }

    #[test]
    fn loads_rgb_as_transposed_luminance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tall.png");

        // 3 wide, 5 tall: long axis vertical, so the field is transposed
        let mut rgb = RgbImage::new(3, 5);
        rgb.put_pixel(1, 4, Rgb([255, 255, 255]));
        rgb.save_with_format(&path, ImageFormat::Png).unwrap();

        let input = load_image(&path).unwrap();
        assert_eq!(input.filename, "tall");
        assert!(input.image.was_transposed());
        assert_eq!(input.image.field().dim(), (3, 5));
        assert!((input.image.field()[[1, 4]] - 255.0).abs() < 1e-3);
        assert_eq!(input.image.field()[[0, 0]], 0.0);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_image("/definitely/not/here.png").is_err());
    }
}
