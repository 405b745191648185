//! 8-bit sRGB ↔ CIE L*a*b* conversion (D65 white point).
//!
//! Uses the common 8-bit Lab encoding: `L * 255 / 100`, `a + 128`, `b + 128`,
//! so each channel fits a `u8` plane and can be histogram-equalized directly.

const XN: f32 = 0.950_456;
const ZN: f32 = 1.088_754;

const LAB_EPSILON: f32 = 0.008_856;
const LAB_KAPPA: f32 = 903.3;

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(f: f32) -> f32 {
    let cube = f * f * f;
    if cube > LAB_EPSILON {
        cube
    } else {
        (f - 16.0 / 116.0) / 7.787
    }
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Convert one 8-bit RGB pixel to 8-bit Lab.
pub fn rgb_to_lab([r, g, b]: [u8; 3]) -> [u8; 3] {
    let r = srgb_to_linear(f32::from(r) / 255.0);
    let g = srgb_to_linear(f32::from(g) / 255.0);
    let b = srgb_to_linear(f32::from(b) / 255.0);

    let x = (0.412_453 * r + 0.357_580 * g + 0.180_423 * b) / XN;
    let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * b;
    let z = (0.019_334 * r + 0.119_193 * g + 0.950_227 * b) / ZN;

    let fx = lab_f(x);
    let fy = lab_f(y);
    let fz = lab_f(z);

    let l = if y > LAB_EPSILON {
        116.0 * fy - 16.0
    } else {
        LAB_KAPPA * y
    };
    let a = 500.0 * (fx - fy);
    let bb = 200.0 * (fy - fz);

    [to_u8(l * 255.0 / 100.0), to_u8(a + 128.0), to_u8(bb + 128.0)]
}

/// Convert one 8-bit Lab pixel back to 8-bit RGB.
pub fn lab_to_rgb([l, a, b]: [u8; 3]) -> [u8; 3] {
    let l = f32::from(l) * 100.0 / 255.0;
    let a = f32::from(a) - 128.0;
    let b = f32::from(b) - 128.0;

    let y = if l > LAB_KAPPA * LAB_EPSILON {
        ((l + 16.0) / 116.0).powi(3)
    } else {
        l / LAB_KAPPA
    };
    let fy = lab_f(y);
    let x = lab_f_inv(fy + a / 500.0) * XN;
    let z = lab_f_inv(fy - b / 200.0) * ZN;

    let r = 3.240_479 * x - 1.537_150 * y - 0.498_535 * z;
    let g = -0.969_256 * x + 1.875_992 * y + 0.041_556 * z;
    let bl = 0.055_648 * x - 0.204_043 * y + 1.057_311 * z;

    [
        to_u8(linear_to_srgb(r.clamp(0.0, 1.0)) * 255.0),
        to_u8(linear_to_srgb(g.clamp(0.0, 1.0)) * 255.0),
        to_u8(linear_to_srgb(bl.clamp(0.0, 1.0)) * 255.0),
    ]
}
