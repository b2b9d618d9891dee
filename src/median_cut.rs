use crate::error::EncodeError;
use crate::histogram::ColorSet;

/// Where a color box is cut along its widest axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitPolicy {
    /// Cut at the entry midpoint, ignoring frequency counts.
    Median,
    /// Cut at the cumulative-count midpoint, so heavily used colors get
    /// more palette entries.
    WeightedMedian,
    /// Weighted cut shifted to the given cumulative fraction (0 < f < 1).
    /// Values below 0.5 keep more entries on the bright/rare side of each
    /// split. A tuning knob, not a correctness requirement; out-of-range
    /// fractions are clamped.
    Biased(f32),
}

impl Default for SplitPolicy {
    fn default() -> Self {
        SplitPolicy::WeightedMedian
    }
}

/// A box of (color, count) entries for median cut subdivision.
#[derive(Debug, Clone)]
struct ColorBox {
    entries: Vec<([u8; 3], u32)>,
}

impl ColorBox {
    fn new(entries: Vec<([u8; 3], u32)>) -> Self {
        Self { entries }
    }

    fn total_count(&self) -> u64 {
        self.entries.iter().map(|&(_, n)| n as u64).sum()
    }

    /// Range (max - min) along each RGB channel.
    fn ranges(&self) -> [u8; 3] {
        let mut min = [u8::MAX; 3];
        let mut max = [u8::MIN; 3];
        for (c, _) in &self.entries {
            for ch in 0..3 {
                min[ch] = min[ch].min(c[ch]);
                max[ch] = max[ch].max(c[ch]);
            }
        }
        [max[0] - min[0], max[1] - min[1], max[2] - min[2]]
    }

    /// The most-varying channel and its extent.
    fn widest_axis(&self) -> (usize, u8) {
        let r = self.ranges();
        let mut axis = 0;
        for ch in 1..3 {
            if r[ch] > r[axis] {
                axis = ch;
            }
        }
        (axis, r[axis])
    }

    /// Count-weighted centroid of all entries.
    fn centroid(&self) -> [u8; 3] {
        let mut sums = [0u64; 3];
        let mut total = 0u64;
        for &(c, n) in &self.entries {
            let n = n as u64;
            for ch in 0..3 {
                sums[ch] += c[ch] as u64 * n;
            }
            total += n;
        }
        if total == 0 {
            return [0, 0, 0];
        }
        let mut out = [0u8; 3];
        for ch in 0..3 {
            out[ch] = ((sums[ch] + total / 2) / total) as u8;
        }
        out
    }

    /// Split along the widest axis at the point the policy selects.
    /// At least one entry stays on each side.
    fn split(mut self, policy: SplitPolicy) -> (ColorBox, ColorBox) {
        let (axis, _) = self.widest_axis();
        self.entries.sort_unstable_by_key(|&(c, _)| c[axis]);

        let split_idx = match policy {
            SplitPolicy::Median => self.entries.len() / 2,
            SplitPolicy::WeightedMedian => self.weighted_split_index(0.5),
            SplitPolicy::Biased(f) => self.weighted_split_index(f.clamp(0.01, 0.99)),
        };
        let split_idx = split_idx.clamp(1, self.entries.len() - 1);

        let right = self.entries.split_off(split_idx);
        (ColorBox::new(self.entries), ColorBox::new(right))
    }

    /// First index whose cumulative count reaches `fraction` of the total.
    fn weighted_split_index(&self, fraction: f32) -> usize {
        let target = (self.total_count() as f64 * fraction as f64).max(1.0) as u64;
        let mut accumulated = 0u64;
        for (i, &(_, n)) in self.entries.iter().enumerate() {
            accumulated += n as u64;
            if accumulated >= target {
                return i + 1;
            }
        }
        self.entries.len() - 1
    }
}

/// Reduce a color set to at most `max_colors` representative colors.
///
/// Recursively splits the RGB space: the box with the largest extent along
/// its most-varying channel is cut per the split policy, until `max_colors`
/// boxes exist or nothing is splittable. Each box contributes its
/// count-weighted centroid.
///
/// A set with fewer distinct colors than `max_colors` comes back verbatim,
/// one entry per distinct color; no synthetic colors are invented.
pub fn median_cut(
    set: ColorSet,
    max_colors: usize,
    policy: SplitPolicy,
) -> Result<Vec<[u8; 3]>, EncodeError> {
    if max_colors == 0 || max_colors > 256 {
        return Err(EncodeError::UnsupportedColorCount(max_colors));
    }
    if set.is_empty() {
        return Err(EncodeError::EmptyInput);
    }

    let entries = set.into_entries();
    if entries.len() <= max_colors {
        return Ok(entries.into_iter().map(|(c, _)| c).collect());
    }

    let mut boxes = Vec::with_capacity(max_colors);
    boxes.push(ColorBox::new(entries));

    while boxes.len() < max_colors {
        let best_idx = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.entries.len() >= 2)
            .max_by_key(|(_, b)| b.widest_axis().1)
            .map(|(i, _)| i);

        let Some(idx) = best_idx else {
            break;
        };

        let to_split = boxes.swap_remove(idx);
        let (left, right) = to_split.split(policy);
        boxes.push(left);
        boxes.push(right);
    }

    Ok(boxes.iter().map(|b| b.centroid()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::ColorSet;

    fn px(r: u8, g: u8, b: u8) -> rgb::RGBA<u8> {
        rgb::RGBA { r, g, b, a: 255 }
    }

    fn gray_ramp(n: usize, copies_of_first: usize) -> ColorSet {
        let mut pixels = Vec::new();
        for i in 0..n {
            let v = (i * 255 / (n - 1)) as u8;
            pixels.push(px(v, v, v));
        }
        for _ in 0..copies_of_first {
            pixels.push(px(0, 0, 0));
        }
        ColorSet::build(&pixels)
    }

    #[test]
    fn empty_set_is_an_error() {
        let set = ColorSet::build(&[]);
        assert!(matches!(
            median_cut(set, 16, SplitPolicy::Median),
            Err(EncodeError::EmptyInput)
        ));
    }

    #[test]
    fn rejects_bad_color_counts() {
        let set = ColorSet::build(&[px(1, 2, 3)]);
        assert!(matches!(
            median_cut(set.clone(), 0, SplitPolicy::Median),
            Err(EncodeError::UnsupportedColorCount(0))
        ));
        assert!(matches!(
            median_cut(set, 257, SplitPolicy::Median),
            Err(EncodeError::UnsupportedColorCount(257))
        ));
    }

    #[test]
    fn fewer_distinct_colors_come_back_verbatim() {
        let set = ColorSet::build(&[px(10, 0, 0), px(0, 20, 0), px(10, 0, 0)]);
        let colors = median_cut(set, 16, SplitPolicy::WeightedMedian).unwrap();
        assert_eq!(colors.len(), 2);
        assert!(colors.contains(&[10, 0, 0]));
        assert!(colors.contains(&[0, 20, 0]));
    }

    #[test]
    fn produces_requested_count() {
        let set = gray_ramp(100, 0);
        let colors = median_cut(set, 8, SplitPolicy::Median).unwrap();
        assert_eq!(colors.len(), 8);
    }

    #[test]
    fn cardinality_never_exceeds_distinct_or_requested() {
        for n in [1usize, 2, 3, 7, 64] {
            let set = gray_ramp(n.max(2), 0);
            let distinct = set.len();
            let colors = median_cut(set, 16, SplitPolicy::WeightedMedian).unwrap();
            assert!(colors.len() <= 16);
            assert!(colors.len() <= distinct, "n={n}");
        }
    }

    #[test]
    fn weighted_split_favors_heavy_cluster() {
        // 16 grays plus a 500-count spike at black: the weighted cut should
        // spend more boxes near the heavy end than the plain median does.
        let set = gray_ramp(16, 500);
        let weighted = median_cut(set, 4, SplitPolicy::WeightedMedian).unwrap();
        let dark = weighted.iter().filter(|c| c[0] < 128).count();
        let light = weighted.len() - dark;
        assert!(
            dark >= light,
            "expected the heavy dark cluster to dominate: dark={dark}, light={light}"
        );
    }

    #[test]
    fn biased_split_still_covers_extremes() {
        let set = gray_ramp(64, 2000);
        let colors = median_cut(set, 8, SplitPolicy::Biased(0.25)).unwrap();
        assert_eq!(colors.len(), 8);
        // The bright tail must survive the bias toward the heavy end.
        assert!(colors.iter().any(|c| c[0] > 180));
    }

    #[test]
    fn centroid_is_count_weighted() {
        let mut pixels = vec![px(0, 0, 0); 3];
        pixels.push(px(100, 100, 100));
        let set = ColorSet::build(&pixels);
        let colors = median_cut(set, 1, SplitPolicy::WeightedMedian).unwrap();
        assert_eq!(colors.len(), 1);
        assert_eq!(colors[0], [25, 25, 25]);
    }
}
