//! Contrast-limited adaptive histogram equalization on a single 8-bit plane.
//!
//! # Algorithm
//!
//! 1. Pad the plane (reflect-101) so it divides evenly into the tile grid.
//! 2. Per tile: build a 256-bin histogram, clip each bin at
//!    `max(1, clip_limit * tile_area / 256)`, and spread the clipped excess
//!    evenly over all bins (any remainder goes to every `256 / residual`-th bin).
//! 3. Per tile: cumulative histogram scaled by `255 / tile_area` becomes a LUT.
//! 4. Each output pixel bilinearly blends the LUTs of the four nearest tile
//!    centres.

/// CLAHE parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clahe {
    /// Contrast limit relative to a flat histogram. `0` disables clipping.
    pub clip_limit: f32,
    pub tiles_x: usize,
    pub tiles_y: usize,
}

const BINS: usize = 256;

impl Clahe {
    pub fn new(clip_limit: f32, tiles_x: usize, tiles_y: usize) -> Self {
        Self {
            clip_limit,
            tiles_x: tiles_x.max(1),
            tiles_y: tiles_y.max(1),
        }
    }

    /// Equalize a row-major `width × height` plane, returning a new plane.
    pub fn apply(&self, plane: &[u8], width: usize, height: usize) -> Vec<u8> {
        debug_assert_eq!(plane.len(), width * height);
        if width == 0 || height == 0 {
            return plane.to_vec();
        }

        let tiles_x = self.tiles_x.max(1);
        let tiles_y = self.tiles_y.max(1);
        let padded_w = round_up(width, tiles_x);
        let padded_h = round_up(height, tiles_y);
        let tile_w = padded_w / tiles_x;
        let tile_h = padded_h / tiles_y;
        let tile_area = tile_w * tile_h;

        let clip = if self.clip_limit > 0.0 {
            ((self.clip_limit * tile_area as f32 / BINS as f32) as usize).max(1)
        } else {
            0
        };
        let lut_scale = 255.0 / tile_area as f32;

        let mut luts = vec![[0u8; BINS]; tiles_x * tiles_y];
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let mut hist = [0usize; BINS];
                for py in ty * tile_h..(ty + 1) * tile_h {
                    let sy = reflect_101(py, height);
                    for px in tx * tile_w..(tx + 1) * tile_w {
                        let sx = reflect_101(px, width);
                        hist[plane[sy * width + sx] as usize] += 1;
                    }
                }
                if clip > 0 {
                    clip_histogram(&mut hist, clip);
                }
                luts[ty * tiles_x + tx] = build_lut(&hist, lut_scale);
            }
        }

        let x_weights: Vec<Neighbours> = (0..width)
            .map(|x| Neighbours::new(x, tile_w, tiles_x))
            .collect();

        let mut out = vec![0u8; plane.len()];
        for y in 0..height {
            let ny = Neighbours::new(y, tile_h, tiles_y);
            let row1 = ny.lo * tiles_x;
            let row2 = ny.hi * tiles_x;
            for (x, nx) in x_weights.iter().enumerate() {
                let v = plane[y * width + x] as usize;
                let top = f32::from(luts[row1 + nx.lo][v]) * (1.0 - nx.frac)
                    + f32::from(luts[row1 + nx.hi][v]) * nx.frac;
                let bottom = f32::from(luts[row2 + nx.lo][v]) * (1.0 - nx.frac)
                    + f32::from(luts[row2 + nx.hi][v]) * nx.frac;
                let blended = top * (1.0 - ny.frac) + bottom * ny.frac;
                out[y * width + x] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }
}

/// The two tile indices bracketing a coordinate and the weight of the upper one.
struct Neighbours {
    lo: usize,
    hi: usize,
    frac: f32,
}

impl Neighbours {
    fn new(pos: usize, tile_len: usize, tiles: usize) -> Self {
        let t = pos as f32 / tile_len as f32 - 0.5;
        let base = t.floor();
        let frac = t - base;
        let lo = base as isize;
        Self {
            lo: lo.max(0) as usize,
            hi: ((lo + 1) as usize).min(tiles - 1),
            frac,
        }
    }
}

fn clip_histogram(hist: &mut [usize; BINS], clip: usize) {
    let mut excess = 0;
    for h in hist.iter_mut() {
        if *h > clip {
            excess += *h - clip;
            *h = clip;
        }
    }

    let per_bin = excess / BINS;
    let mut residual = excess - per_bin * BINS;
    for h in hist.iter_mut() {
        *h += per_bin;
    }

    if residual > 0 {
        let step = (BINS / residual).max(1);
        let mut i = 0;
        while i < BINS && residual > 0 {
            hist[i] += 1;
            residual -= 1;
            i += step;
        }
    }
}

fn build_lut(hist: &[usize; BINS], scale: f32) -> [u8; BINS] {
    let mut lut = [0u8; BINS];
    let mut sum = 0usize;
    for (entry, &count) in lut.iter_mut().zip(hist) {
        sum += count;
        *entry = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

fn round_up(len: usize, tiles: usize) -> usize {
    len.div_ceil(tiles) * tiles
}

/// Mirror an out-of-range index back into `0..len` without repeating the edge.
fn reflect_101(mut i: usize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    i %= period;
    if i >= len { period - i } else { i }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect_101_mirrors_without_edge_repeat() {
        assert_eq!(reflect_101(0, 5), 0);
        assert_eq!(reflect_101(4, 5), 4);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(9, 5), 1);
        assert_eq!(reflect_101(3, 1), 0);
    }

    #[test]
    fn output_has_input_dimensions() {
        let plane: Vec<u8> = (0..50 * 37).map(|i| (i % 256) as u8).collect();
        let out = Clahe::new(2.0, 8, 8).apply(&plane, 50, 37);
        assert_eq!(out.len(), plane.len());
    }

    #[test]
    fn uniform_plane_stays_uniform() {
        let plane = vec![90u8; 64 * 64];
        let out = Clahe::new(2.0, 8, 8).apply(&plane, 64, 64);
        assert!(out.iter().all(|&v| v == out[0]), "uniform input gave varied output");
    }

    #[test]
    fn single_tile_without_clipping_is_plain_equalization() {
        // Half the pixels at 100, half at 110.
        let plane: Vec<u8> = (0..64 * 64)
            .map(|i| if i < 32 * 64 { 100 } else { 110 })
            .collect();
        let out = Clahe::new(0.0, 1, 1).apply(&plane, 64, 64);
        assert_eq!(out[0], 128);
        assert_eq!(out[64 * 64 - 1], 255);
    }

    #[test]
    fn single_tile_preserves_ordering() {
        let plane: Vec<u8> = (0..32 * 32).map(|i| ((i * 37) % 251) as u8).collect();
        let out = Clahe::new(2.0, 1, 1).apply(&plane, 32, 32);
        for i in 0..plane.len() {
            for j in 0..plane.len() {
                if plane[i] < plane[j] {
                    assert!(out[i] <= out[j], "ordering broken at {i}, {j}");
                }
            }
        }
    }

    #[test]
    fn high_clip_limit_stretches_narrow_histogram() {
        let plane: Vec<u8> = (0..64)
            .flat_map(|y| (0..64).map(move |x| 100 + ((x * 7 + y * 13) % 11) as u8))
            .collect();
        let out = Clahe::new(40.0, 2, 2).apply(&plane, 64, 64);
        let lo = *out.iter().min().unwrap();
        let hi = *out.iter().max().unwrap();
        assert!(hi - lo > 150, "range only {lo}..{hi}");
    }

    #[test]
    fn clipping_redistributes_all_mass() {
        let mut hist = [0usize; BINS];
        hist[10] = 1000;
        hist[20] = 24;
        clip_histogram(&mut hist, 8);
        assert_eq!(hist.iter().sum::<usize>(), 1024);
        assert!(hist.iter().all(|&h| h <= 8 + 1000 / BINS + 1));
    }

    #[test]
    fn lut_ends_at_full_scale() {
        let mut hist = [0usize; BINS];
        hist[0] = 16;
        hist[255] = 48;
        let lut = build_lut(&hist, 255.0 / 64.0);
        assert_eq!(lut[255], 255);
        assert_eq!(lut[0], 64);
    }
}
