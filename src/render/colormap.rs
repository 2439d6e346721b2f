//! Piecewise-linear colormaps used for scan previews and density maps.
//!
//! Both maps are sampled through a 256-entry lookup, the value `v ∈ [0, 1]`
//! selecting entry `min(⌊256·v⌋, 255)`, and channels are quantized to `u8` by
//! truncation.
use image::Rgb;

/// Control points `(x, y)` of one channel, `x` increasing from 0 to 1.
type Segment = &'static [(f64, f64)];

const BONE_R: Segment = &[(0.0, 0.0), (0.746032, 0.652778), (1.0, 1.0)];
const BONE_G: Segment = &[
    (0.0, 0.0),
    (0.365079, 0.319444),
    (0.746032, 0.777778),
    (1.0, 1.0),
];
const BONE_B: Segment = &[(0.0, 0.0), (0.365079, 0.444444), (1.0, 1.0)];

const LUT_SIZE: f64 = 256.0;

fn lut_position(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    let index = (value * LUT_SIZE).floor().clamp(0.0, LUT_SIZE - 1.0);
    index / (LUT_SIZE - 1.0)
}

fn interpolate(segment: Segment, x: f64) -> f64 {
    for pair in segment.windows(2) {
        let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
        if x < x1 {
            return y0 + (x - x0) / (x1 - x0) * (y1 - y0);
        }
    }
    segment.last().map_or(0.0, |&(_, y)| y)
}

fn quantize(channel: f64) -> u8 {
    (channel.clamp(0.0, 1.0) * 255.0) as u8
}

/// "afmhot": black → red → yellow → white, the usual palette for AFM height maps.
pub fn afmhot(value: f64) -> Rgb<u8> {
    let x = lut_position(value);
    Rgb([
        quantize(2.0 * x),
        quantize(2.0 * x - 0.5),
        quantize(2.0 * x - 1.0),
    ])
}

/// "bone": grayscale with a blue tint, used for density contour maps.
pub fn bone(value: f64) -> Rgb<u8> {
    let x = lut_position(value);
    Rgb([
        quantize(interpolate(BONE_R, x)),
        quantize(interpolate(BONE_G, x)),
        quantize(interpolate(BONE_B, x)),
    ])
}
