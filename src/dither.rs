use crate::palette::Palette;

/// How much of the Floyd-Steinberg kernel receives diffused error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DitherLevel {
    /// Empty kernel: error is computed but goes nowhere. Output matches
    /// plain nearest mapping; the level survives so configurations
    /// round-trip unchanged.
    None,
    /// Right and below neighbors only.
    Partial,
    /// The full kernel: right 7/16, below-left 3/16, below 5/16,
    /// below-right 1/16.
    Full,
}

/// Pixel-mapping mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DitherMode {
    /// Nearest palette entry per pixel.
    Nearest,
    /// Single-pass error diffusion in raster order.
    Diffusion(DitherLevel),
}

impl Default for DitherMode {
    fn default() -> Self {
        DitherMode::Diffusion(DitherLevel::Full)
    }
}

/// Kernel taps as (dx, dy, weight) over not-yet-visited neighbors.
fn kernel(level: DitherLevel) -> &'static [(isize, isize, f32)] {
    match level {
        DitherLevel::None => &[],
        DitherLevel::Partial => &[(1, 0, 7.0 / 16.0), (0, 1, 5.0 / 16.0)],
        DitherLevel::Full => &[
            (1, 0, 7.0 / 16.0),
            (-1, 1, 3.0 / 16.0),
            (0, 1, 5.0 / 16.0),
            (1, 1, 1.0 / 16.0),
        ],
    }
}

/// Map each pixel to a palette index.
///
/// Fully transparent pixels take the palette's transparent index (index 0
/// when none is declared) and neither receive nor emit diffused error.
/// Deterministic and single-pass; the error buffer is allocated fresh per
/// call, so no state leaks between frames.
pub fn map_indices(
    pixels: &[rgb::RGBA<u8>],
    width: usize,
    height: usize,
    palette: &Palette,
    mode: DitherMode,
) -> Vec<u8> {
    let transparent_idx = palette.transparent_index().unwrap_or(0);

    let level = match mode {
        DitherMode::Nearest => return nearest_remap(pixels, palette, transparent_idx),
        DitherMode::Diffusion(level) => level,
    };
    let taps = kernel(level);

    // Working copy of the raster; diffused error accumulates here.
    let mut buf: Vec<[f32; 3]> = pixels
        .iter()
        .map(|p| [p.r as f32, p.g as f32, p.b as f32])
        .collect();

    let mut indices = vec![0u8; pixels.len()];

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;

            if pixels[idx].a == 0 {
                indices[idx] = transparent_idx;
                continue;
            }

            // Clamp accumulated error to the channel range before it can
            // influence the lookup.
            let current = [
                buf[idx][0].clamp(0.0, 255.0),
                buf[idx][1].clamp(0.0, 255.0),
                buf[idx][2].clamp(0.0, 255.0),
            ];
            let chosen = palette.nearest_f32(current);
            indices[idx] = chosen;

            let c = palette.color(chosen);
            let err = [
                current[0] - c[0] as f32,
                current[1] - c[1] as f32,
                current[2] - c[2] as f32,
            ];

            for &(dx, dy, weight) in taps {
                let tx = x as isize + dx;
                let ty = y as isize + dy;
                if tx < 0 || tx >= width as isize || ty >= height as isize {
                    continue;
                }
                let ti = ty as usize * width + tx as usize;
                if pixels[ti].a == 0 {
                    continue;
                }
                buf[ti][0] += err[0] * weight;
                buf[ti][1] += err[1] * weight;
                buf[ti][2] += err[2] * weight;
            }
        }
    }

    indices
}

/// Plain nearest-color remap without diffusion.
fn nearest_remap(pixels: &[rgb::RGBA<u8>], palette: &Palette, transparent_idx: u8) -> Vec<u8> {
    pixels
        .iter()
        .map(|p| {
            if p.a == 0 {
                transparent_idx
            } else {
                palette.nearest(p.r, p.g, p.b)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(r: u8, g: u8, b: u8, a: u8) -> rgb::RGBA<u8> {
        rgb::RGBA { r, g, b, a }
    }

    fn gray_palette() -> Palette {
        Palette::from_entries(
            vec![[0, 0, 0], [85, 85, 85], [170, 170, 170], [255, 255, 255]],
            None,
        )
    }

    fn gradient(width: usize, height: usize) -> Vec<rgb::RGBA<u8>> {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let v = ((x + y) * 255 / (width + height - 2).max(1)) as u8;
                pixels.push(px(v, v, v, 255));
            }
        }
        pixels
    }

    #[test]
    fn all_modes_produce_valid_indices() {
        let palette = gray_palette();
        let pixels = gradient(16, 16);
        for mode in [
            DitherMode::Nearest,
            DitherMode::Diffusion(DitherLevel::None),
            DitherMode::Diffusion(DitherLevel::Partial),
            DitherMode::Diffusion(DitherLevel::Full),
        ] {
            let indices = map_indices(&pixels, 16, 16, &palette, mode);
            assert_eq!(indices.len(), 256);
            for &idx in &indices {
                assert!((idx as usize) < palette.len(), "mode {mode:?}");
            }
        }
    }

    #[test]
    fn empty_kernel_matches_nearest() {
        let palette = gray_palette();
        let pixels = gradient(16, 16);
        let nearest = map_indices(&pixels, 16, 16, &palette, DitherMode::Nearest);
        let diffused = map_indices(
            &pixels,
            16,
            16,
            &palette,
            DitherMode::Diffusion(DitherLevel::None),
        );
        assert_eq!(nearest, diffused);
    }

    #[test]
    fn full_diffusion_mixes_indices_on_midtone() {
        // A flat midtone between two palette entries: nearest mapping
        // collapses to one index, diffusion must alternate to average out.
        let palette = Palette::from_entries(vec![[0, 0, 0], [255, 255, 255]], None);
        let pixels = vec![px(128, 128, 128, 255); 64];

        let nearest = map_indices(&pixels, 8, 8, &palette, DitherMode::Nearest);
        let mut uniq = nearest.clone();
        uniq.dedup();
        assert_eq!(uniq.len(), 1);

        let full = map_indices(
            &pixels,
            8,
            8,
            &palette,
            DitherMode::Diffusion(DitherLevel::Full),
        );
        assert!(full.contains(&0));
        assert!(full.contains(&1));
    }

    #[test]
    fn transparent_pixels_map_to_transparent_index() {
        let palette = Palette::new(vec![[0, 0, 0], [255, 255, 255]], true);
        let ti = palette.transparent_index().unwrap();
        let mut pixels = vec![px(255, 255, 255, 255); 16];
        pixels[5] = px(0, 0, 0, 0);
        for mode in [
            DitherMode::Nearest,
            DitherMode::Diffusion(DitherLevel::Full),
        ] {
            let indices = map_indices(&pixels, 4, 4, &palette, mode);
            assert_eq!(indices[5], ti, "mode {mode:?}");
        }
    }

    #[test]
    fn diffusion_is_deterministic() {
        let palette = gray_palette();
        let pixels = gradient(32, 32);
        let a = map_indices(
            &pixels,
            32,
            32,
            &palette,
            DitherMode::Diffusion(DitherLevel::Full),
        );
        let b = map_indices(
            &pixels,
            32,
            32,
            &palette,
            DitherMode::Diffusion(DitherLevel::Full),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn error_stays_clamped_on_extreme_input() {
        // A palette far from the input drives large errors; indices must
        // stay valid because accumulated error is clamped per channel.
        let palette = Palette::from_entries(vec![[250, 250, 250], [255, 255, 255]], None);
        let pixels = vec![px(0, 0, 0, 255); 256];
        let indices = map_indices(
            &pixels,
            16,
            16,
            &palette,
            DitherMode::Diffusion(DitherLevel::Full),
        );
        for &idx in &indices {
            assert!((idx as usize) < 2);
        }
    }
}
