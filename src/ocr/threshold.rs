//! Otsu threshold selection.
//!
//! Picks the global cut point `t` that maximizes the between-class variance
//! of `{v <= t}` versus `{v > t}` over a 256-bin histogram.

use image::GrayImage;

pub type Histogram = [u32; 256];

/// Counts occurrences of every intensity in a single-channel image.
pub fn histogram(img: &GrayImage) -> Histogram {
    let mut hist = [0u32; 256];
    for &v in img.as_raw() {
        hist[v as usize] += 1;
    }
    hist
}

/// Otsu threshold of an image.
pub fn otsu_threshold(img: &GrayImage) -> u8 {
    otsu_threshold_from_histogram(&histogram(img))
}

/// Otsu threshold of a histogram.
///
/// Scans `t` upwards keeping running background weight and sum. Cut points
/// with an empty background are skipped and the scan stops once the
/// foreground is empty. Only a strictly greater variance replaces the best
/// so far, so ties resolve to the lowest `t`. A uniform (or empty) histogram
/// yields 0.
pub fn otsu_threshold_from_histogram(hist: &Histogram) -> u8 {
    let total: u64 = hist.iter().map(|&c| c as u64).sum();
    let total_sum: f64 = hist
        .iter()
        .enumerate()
        .map(|(v, &c)| v as f64 * c as f64)
        .sum();

    let mut w_b: u64 = 0;
    let mut sum_b = 0.0;
    let mut best_variance = 0.0;
    let mut threshold = 0u8;

    for (t, &count) in hist.iter().enumerate() {
        w_b += count as u64;
        if w_b == 0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f == 0 {
            break;
        }

        sum_b += t as f64 * count as f64;
        let m_b = sum_b / w_b as f64;
        let m_f = (total_sum - sum_b) / w_f as f64;
        let variance = w_b as f64 * w_f as f64 * (m_b - m_f) * (m_b - m_f);

        if variance > best_variance {
            best_variance = variance;
            threshold = t as u8;
        }
    }

    threshold
}

/// Between-class variance of cutting `hist` at `t`, computed directly.
/// Zero when either side of the cut is empty.
pub fn between_class_variance(hist: &Histogram, t: u8) -> f64 {
    let (low, high) = hist.split_at(t as usize + 1);

    let weight = |part: &[u32]| part.iter().map(|&c| c as u64).sum::<u64>();
    let w_b = weight(low);
    let w_f = weight(high);
    if w_b == 0 || w_f == 0 {
        return 0.0;
    }

    let sum_b: f64 = low.iter().enumerate().map(|(v, &c)| v as f64 * c as f64).sum();
    let sum_f: f64 = high
        .iter()
        .enumerate()
        .map(|(i, &c)| (i + t as usize + 1) as f64 * c as f64)
        .sum();

    let m_b = sum_b / w_b as f64;
    let m_f = sum_f / w_f as f64;
    w_b as f64 * w_f as f64 * (m_b - m_f) * (m_b - m_f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use proptest::prelude::*;

    fn hist_of(values: &[(u8, u32)]) -> Histogram {
        let mut hist = [0u32; 256];
        for &(v, c) in values {
            hist[v as usize] = c;
        }
        hist
    }

    #[test]
    fn test_histogram_counts_every_pixel() {
        let img = GrayImage::from_fn(17, 9, |x, y| Luma([((x * y) % 256) as u8]));
        let hist = histogram(&img);

        assert_eq!(hist.iter().map(|&c| c as u64).sum::<u64>(), 17 * 9);
        assert_eq!(hist[0], 17 + 9 - 1);
    }

    #[test]
    fn test_uniform_image_thresholds_at_zero() {
        let img = GrayImage::from_pixel(30, 10, Luma([173]));
        assert_eq!(otsu_threshold(&img), 0);
        assert_eq!(otsu_threshold_from_histogram(&[0u32; 256]), 0);
    }

    #[test]
    fn test_two_populations_are_separated() {
        let hist = hist_of(&[(20, 8100), (230, 2700)]);
        let t = otsu_threshold_from_histogram(&hist);

        // Every cut in 20..230 splits the same way; the lowest wins
        assert_eq!(t, 20);
    }

    #[test]
    fn test_bimodal_noisy_populations() {
        let img = GrayImage::from_fn(100, 40, |x, y| {
            let jitter = ((x * 31 + y * 17) % 11) as u8;
            if x < 60 { Luma([40 + jitter]) } else { Luma([190 + jitter]) }
        });
        let t = otsu_threshold(&img);

        assert!((40..190).contains(&t), "threshold {} does not split the modes", t);
    }

    #[test]
    fn test_tie_resolves_to_lowest_threshold() {
        // {0} | {100, 200} and {0, 100} | {200} both give 2 * 150^2
        let hist = hist_of(&[(0, 1), (100, 1), (200, 1)]);

        assert_eq!(between_class_variance(&hist, 0), between_class_variance(&hist, 100));
        assert_eq!(otsu_threshold_from_histogram(&hist), 0);
    }

    #[test]
    fn test_between_class_variance_of_degenerate_cuts() {
        let hist = hist_of(&[(50, 3), (60, 3)]);
        assert_eq!(between_class_variance(&hist, 10), 0.0);
        assert_eq!(between_class_variance(&hist, 60), 0.0);
        assert_eq!(between_class_variance(&hist, 255), 0.0);
        assert!(between_class_variance(&hist, 50) > 0.0);
    }

    proptest! {
        #[test]
        fn test_otsu_threshold_maximizes_variance(counts in prop::collection::vec(0u32..200, 256)) {
            let mut hist = [0u32; 256];
            hist.copy_from_slice(&counts);

            let chosen = otsu_threshold_from_histogram(&hist);
            let best = between_class_variance(&hist, chosen);

            for t in 0..=255u8 {
                let variance = between_class_variance(&hist, t);
                prop_assert!(
                    variance <= best * (1.0 + 1e-9) + 1e-9,
                    "t={} beats chosen t={} ({} > {})", t, chosen, variance, best
                );
            }
        }

        #[test]
        fn test_otsu_threshold_on_sparse_histograms(values in prop::collection::vec((0u8..=255, 1u32..50), 1..6)) {
            let mut hist = [0u32; 256];
            for (v, c) in values {
                hist[v as usize] += c;
            }

            let chosen = otsu_threshold_from_histogram(&hist);
            let best = between_class_variance(&hist, chosen);

            for t in 0..chosen {
                // Anything below the chosen cut must be strictly worse
                prop_assert!(between_class_variance(&hist, t) < best || best == 0.0);
            }
        }
    }
}
