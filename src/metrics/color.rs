//! Color space conversions used by FLIP.
//!
//! FLIP works in three spaces besides linear RGB:
//!
//! - **YCxCz**: a linearized CIELab variant (no cube root) in which the
//!   contrast sensitivity filters are applied.
//! - **CIELab**: where the filtered colors are compared.
//! - **Hunt-adjusted Lab**: chroma scaled by lightness, so dark colors with
//!   large chroma do not dominate the difference.
//!
//! All conversions assume linear sRGB primaries with a D65 white point.
//! The reference white is the XYZ value of linear RGB (1, 1, 1).

/// Three-component color value.
pub type Tristimulus = [f32; 3];

// Linear sRGB to CIE XYZ (D65).
const RGB_TO_XYZ: [f32; 9] = [
    0.412_456_4, 0.357_576_1, 0.180_437_5, // X
    0.212_672_9, 0.715_152_2, 0.072_175_0, // Y
    0.019_333_9, 0.119_192_0, 0.950_304_1, // Z
];

// CIE XYZ (D65) to linear sRGB.
const XYZ_TO_RGB: [f32; 9] = [
    3.240_454_2, -1.537_138_5, -0.498_531_4,
    -0.969_266_0, 1.876_010_8, 0.041_556_0,
    0.055_643_4, -0.204_025_9, 1.057_225_2,
];

/// sRGB gamma decoding (sRGB to linear RGB).
#[inline]
pub fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB gamma encoding (linear RGB to sRGB).
#[inline]
pub fn linear_to_srgb(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

#[inline]
fn mat3(m: &[f32; 9], v: Tristimulus) -> Tristimulus {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] * v[2],
        m[3] * v[0] + m[4] * v[1] + m[5] * v[2],
        m[6] * v[0] + m[7] * v[1] + m[8] * v[2],
    ]
}

/// Convert linear RGB to CIE XYZ.
#[inline]
pub fn linear_rgb_to_xyz(rgb: Tristimulus) -> Tristimulus {
    mat3(&RGB_TO_XYZ, rgb)
}

/// Convert CIE XYZ to linear RGB.
#[inline]
pub fn xyz_to_linear_rgb(xyz: Tristimulus) -> Tristimulus {
    mat3(&XYZ_TO_RGB, xyz)
}

/// XYZ of linear RGB white.
#[inline]
pub fn reference_white() -> Tristimulus {
    linear_rgb_to_xyz([1.0, 1.0, 1.0])
}

/// Convert XYZ to YCxCz relative to `white`.
#[inline]
pub fn xyz_to_ycxcz(xyz: Tristimulus, white: Tristimulus) -> Tristimulus {
    let x = xyz[0] / white[0];
    let y = xyz[1] / white[1];
    let z = xyz[2] / white[2];
    [116.0 * y - 16.0, 500.0 * (x - y), 200.0 * (y - z)]
}

/// Convert YCxCz back to XYZ relative to `white`.
#[inline]
pub fn ycxcz_to_xyz(ycxcz: Tristimulus, white: Tristimulus) -> Tristimulus {
    let y = (ycxcz[0] + 16.0) / 116.0;
    let x = ycxcz[1] / 500.0 + y;
    let z = y - ycxcz[2] / 200.0;
    [x * white[0], y * white[1], z * white[2]]
}

/// CIELab companding function.
#[inline]
fn lab_f(t: f32) -> f32 {
    const DELTA: f32 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

/// Convert XYZ to CIELab relative to `white`.
#[inline]
pub fn xyz_to_lab(xyz: Tristimulus, white: Tristimulus) -> Tristimulus {
    let fx = lab_f(xyz[0] / white[0]);
    let fy = lab_f(xyz[1] / white[1]);
    let fz = lab_f(xyz[2] / white[2]);
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// Hunt effect: scale chroma by lightness.
#[inline]
pub fn hunt_adjust(lab: Tristimulus) -> Tristimulus {
    let l = lab[0];
    [l, 0.01 * l * lab[1], 0.01 * l * lab[2]]
}

/// HyAB distance: city-block on lightness, Euclidean on chroma.
#[inline]
pub fn hyab(a: Tristimulus, b: Tristimulus) -> f32 {
    let dl = a[0] - b[0];
    let da = a[1] - b[1];
    let db = a[2] - b[2];
    dl.abs() + (da * da + db * db).sqrt()
}

/// Hunt-adjusted Lab of a linear RGB color, clamped to [0, 1] first.
#[inline]
pub fn linear_rgb_to_hunt_lab(rgb: Tristimulus, white: Tristimulus) -> Tristimulus {
    let clamped = rgb.map(|c| c.clamp(0.0, 1.0));
    hunt_adjust(xyz_to_lab(linear_rgb_to_xyz(clamped), white))
}

/// Luminance (CIE Y) of linear RGB.
#[inline]
pub fn luminance(rgb: Tristimulus) -> f32 {
    RGB_TO_XYZ[3] * rgb[0] + RGB_TO_XYZ[4] * rgb[1] + RGB_TO_XYZ[5] * rgb[2]
}
