//! Pixel conversions applied before an image hits the disk.
//!
//! Every converter produces tightly packed RGBA8.

use contracts::{ColorConverter, ImageData, ImageFormat};

/// Far plane of the depth camera, meters
pub const DEPTH_FAR_PLANE_M: f64 = 1000.0;

/// 256^3 - 1, the largest 24-bit depth code
const DEPTH_CODE_MAX: f64 = 16_777_215.0;

/// Normalized depths below `e^-LOG_DEPTH_SCALE` map to black
const LOG_DEPTH_SCALE: f64 = 5.70378;

/// CityScapes colours indexed by semantic tag
const CITYSCAPES_PALETTE: [[u8; 3]; 23] = [
    [0, 0, 0],       // unlabeled
    [70, 70, 70],    // building
    [100, 40, 40],   // fence
    [55, 90, 80],    // other
    [220, 20, 60],   // pedestrian
    [153, 153, 153], // pole
    [157, 234, 50],  // road line
    [128, 64, 128],  // road
    [244, 35, 232],  // sidewalk
    [107, 142, 35],  // vegetation
    [0, 0, 142],     // vehicles
    [102, 102, 156], // wall
    [220, 220, 0],   // traffic sign
    [70, 130, 180],  // sky
    [81, 0, 81],     // ground
    [150, 100, 100], // bridge
    [230, 150, 140], // rail track
    [180, 165, 180], // guard rail
    [250, 170, 30],  // traffic light
    [110, 190, 160], // static
    [170, 120, 50],  // dynamic
    [45, 60, 150],   // water
    [145, 170, 100], // terrain
];

/// Channel offsets of (r, g, b, a) inside one pixel
fn channels(format: ImageFormat) -> [usize; 4] {
    match format {
        ImageFormat::Bgra8 => [2, 1, 0, 3],
        ImageFormat::Rgba8 => [0, 1, 2, 3],
    }
}

/// Normalized depth in `[0, 1]` from a 24-bit encoded pixel
#[inline]
pub fn normalized_depth(r: u8, g: u8, b: u8) -> f64 {
    (f64::from(r) + f64::from(g) * 256.0 + f64::from(b) * 65_536.0) / DEPTH_CODE_MAX
}

/// Depth in meters from a 24-bit encoded pixel
#[inline]
pub fn depth_meters(r: u8, g: u8, b: u8) -> f64 {
    normalized_depth(r, g, b) * DEPTH_FAR_PLANE_M
}

fn gray(value: f64) -> [u8; 4] {
    let v = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
    [v, v, v, 255]
}

/// Convert `image` into an RGBA8 buffer of the same size.
///
/// Trailing bytes past `width * height` pixels are ignored; a short payload
/// yields only the pixels it contains.
pub fn convert(converter: ColorConverter, image: &ImageData) -> Vec<u8> {
    let [ri, gi, bi, ai] = channels(image.format);
    let pixels = image
        .data
        .chunks_exact(image.format.bytes_per_pixel())
        .take(image.width as usize * image.height as usize);

    let mut out = Vec::with_capacity(image.expected_len());
    for px in pixels {
        let (r, g, b, a) = (px[ri], px[gi], px[bi], px[ai]);
        let rgba = match converter {
            ColorConverter::Raw => [r, g, b, a],
            ColorConverter::Depth => gray(normalized_depth(r, g, b)),
            ColorConverter::LogarithmicDepth => {
                let depth = normalized_depth(r, g, b);
                if depth <= 0.0 {
                    gray(0.0)
                } else {
                    gray(1.0 + depth.ln() / LOG_DEPTH_SCALE)
                }
            }
            ColorConverter::CityScapesPalette => {
                // the tag lives in the red channel
                let [r, g, b] = CITYSCAPES_PALETTE
                    .get(usize::from(r))
                    .copied()
                    .unwrap_or_default();
                [r, g, b, 255]
            }
        };
        out.extend_from_slice(&rgba);
    }
    out
}
