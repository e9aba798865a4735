use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::equalize_histogram;
use ndarray::{Array2, Array3, Axis};

use crate::errors::{GrainSizeError, Result};

/// Luminance weights applied to R, G and B
pub const LUMA_WEIGHTS: [f64; 3] = [0.299, 0.587, 0.114];

/// Single-channel intensity field with the long axis horizontal
///
/// Rows are the analysed 1-D signals, so an image taller than it is wide
/// is transposed on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct GrainImage {
    field: Array2<f64>,
    transposed: bool,
}

impl GrainImage {
    /// Wrap a 2-D intensity field, reorienting it if needed
    pub fn from_field(field: Array2<f64>) -> Result<Self> {
        let (rows, cols) = field.dim();
        if rows == 0 || cols == 0 {
            return Err(GrainSizeError::Input(format!(
                "image has an empty dimension ({}x{})",
                rows, cols
            )));
        }

        if field.iter().any(|v| !v.is_finite()) {
            return Err(GrainSizeError::Input(
                "image contains non-finite intensity values".to_string(),
            ));
        }

        if rows > cols {
            Ok(Self {
                field: field.reversed_axes().as_standard_layout().to_owned(),
                transposed: true,
            })
        } else {
            Ok(Self {
                field,
                transposed: false,
            })
        }
    }

    /// Reduce a (rows, cols, channels) array to luminance first
    pub fn from_channels(data: Array3<f64>) -> Result<Self> {
        let channels = data.len_of(Axis(2));
        let field = match channels {
            0 => {
                return Err(GrainSizeError::Input(
                    "image has zero channels".to_string(),
                ))
            }
            // Grey, or grey plus alpha
            1 | 2 => data.index_axis(Axis(2), 0).to_owned(),
            // Extra bands beyond RGB are ignored
            _ => {
                let r = data.index_axis(Axis(2), 0);
                let g = data.index_axis(Axis(2), 1);
                let b = data.index_axis(Axis(2), 2);
                &r * LUMA_WEIGHTS[0] + &g * LUMA_WEIGHTS[1] + &b * LUMA_WEIGHTS[2]
            }
        };

        Self::from_field(field)
    }

    /// Decoded image of any pixel type, reduced to luminance on a 0-255 scale
    pub fn from_dynamic(image: &DynamicImage) -> Result<Self> {
        let rgb = image.to_rgb32f();
        let (width, height) = rgb.dimensions();

        let field = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            let pixel = rgb.get_pixel(x as u32, y as u32);
            255.0
                * (LUMA_WEIGHTS[0] * pixel[0] as f64
                    + LUMA_WEIGHTS[1] * pixel[1] as f64
                    + LUMA_WEIGHTS[2] * pixel[2] as f64)
        });

        Self::from_field(field)
    }

    pub fn field(&self) -> &Array2<f64> {
        &self.field
    }

    pub fn into_field(self) -> Array2<f64> {
        self.field
    }

    /// Whether the source was transposed to put the long axis horizontal
    pub fn was_transposed(&self) -> bool {
        self.transposed
    }

    pub fn rows(&self) -> usize {
        self.field.nrows()
    }

    /// Length of each analysed row
    pub fn row_length(&self) -> usize {
        self.field.ncols()
    }
}

/// Render a field as an 8-bit greyscale image spanning its min..max range
pub fn field_to_gray_image(field: &Array2<f64>) -> GrayImage {
    let (rows, cols) = field.dim();
    let (lo, hi) = field
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = hi - lo;

    GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        let value = field[[y as usize, x as usize]];
        let scaled = if span > 0.0 { 255.0 * (value - lo) / span } else { 0.0 };
        Luma([scaled.round().clamp(0.0, 255.0) as u8])
    })
}

/// Histogram-equalised preview of a texture field for debug output
pub fn texture_preview(field: &Array2<f64>) -> GrayImage {
    equalize_histogram(&field_to_gray_image(field))
}
