//! Test data generators for synthetic lossyear rasters.
//!
//! These generators create predictable, verifiable value patterns. All
//! grids are row-major `Vec<u8>` (row 0 first), matching how raster
//! windows are laid out.

/// Largest valid lossyear code in the GFC-2023 release.
pub const MAX_TEST_LOSS_CODE: u8 = 23;

/// Creates a grid with every pixel set to `value`.
///
/// # Example
///
/// ```
/// use test_utils::create_constant_lossyear_grid;
///
/// let grid = create_constant_lossyear_grid(4, 3, 7);
/// assert_eq!(grid.len(), 12);
/// assert!(grid.iter().all(|&v| v == 7));
/// ```
pub fn create_constant_lossyear_grid(width: usize, height: usize, value: u8) -> Vec<u8> {
    vec![value; width * height]
}

/// Creates a grid where each row carries a single lossyear code.
///
/// Row `r` holds code `(r % 23) + 1`, so every value is a valid code and
/// the expected per-year totals are easy to compute by hand.
pub fn create_year_band_grid(width: usize, height: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        let code = (row % MAX_TEST_LOSS_CODE as usize) as u8 + 1;
        data.extend(std::iter::repeat(code).take(width));
    }
    data
}

/// Creates a grid where each pixel value is `(row * width + col) % modulus`.
///
/// With `modulus` above 24 this mixes no-loss, valid and out-of-range
/// values in a fixed, reproducible order.
pub fn create_cycling_grid(width: usize, height: usize, modulus: u8) -> Vec<u8> {
    let modulus = modulus.max(1) as usize;
    (0..width * height).map(|i| (i % modulus) as u8).collect()
}

/// Creates a sparse, scattered loss pattern.
///
/// Roughly half of the pixels are 0. The rest carry codes 1-27, so a small
/// share lands above the valid range (24-27) and must be filtered out.
/// The same `seed` always yields the same grid.
pub fn create_scattered_loss_grid(width: usize, height: usize, seed: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let h = mix(row as u64, col as u64, seed);
            let value = if h % 100 < 50 { 0 } else { (h % 27) as u8 + 1 };
            data.push(value);
        }
    }
    data
}

/// Counts pixels carrying a valid lossyear code (1-23).
pub fn count_valid_loss(data: &[u8]) -> usize {
    data.iter()
        .filter(|&&v| (1..=MAX_TEST_LOSS_CODE).contains(&v))
        .count()
}

/// Counts valid pixels at every `stride`-th row and column, starting at 0.
pub fn count_valid_loss_sampled(data: &[u8], width: usize, height: usize, stride: usize) -> usize {
    let stride = stride.max(1);
    let mut count = 0;
    for row in (0..height).step_by(stride) {
        for col in (0..width).step_by(stride) {
            let v = data[row * width + col];
            if (1..=MAX_TEST_LOSS_CODE).contains(&v) {
                count += 1;
            }
        }
    }
    count
}

// SplitMix64-style finalizer over the pixel position
fn mix(row: u64, col: u64, seed: u64) -> u64 {
    let mut z = row
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(col.wrapping_mul(0xBF58_476D_1CE4_E5B9))
        .wrapping_add(seed);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_band_grid() {
        let grid = create_year_band_grid(3, 25);
        assert_eq!(&grid[0..3], &[1, 1, 1]);
        assert_eq!(grid[22 * 3], 23);
        assert_eq!(grid[23 * 3], 1);
        assert_eq!(count_valid_loss(&grid), 75);
    }

    #[test]
    fn test_cycling_grid() {
        let grid = create_cycling_grid(5, 6, 26);
        assert_eq!(grid[0], 0);
        assert_eq!(grid[25], 25);
        assert_eq!(grid[26], 0);
        // 1..=23 valid in the first cycle, 1..=3 in the tail (26..30 -> 0..3)
        assert_eq!(count_valid_loss(&grid), 23 + 3);
    }

    #[test]
    fn test_scattered_grid_is_deterministic() {
        let a = create_scattered_loss_grid(64, 48, 7);
        let b = create_scattered_loss_grid(64, 48, 7);
        let c = create_scattered_loss_grid(64, 48, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|&v| v <= 27));
        assert!(a.iter().any(|&v| v == 0));
        assert!(a.iter().any(|&v| v > MAX_TEST_LOSS_CODE));
    }

    #[test]
    fn test_count_valid_loss_sampled() {
        let grid = create_constant_lossyear_grid(5, 5, 4);
        assert_eq!(count_valid_loss_sampled(&grid, 5, 5, 1), 25);
        assert_eq!(count_valid_loss_sampled(&grid, 5, 5, 2), 9);
        assert_eq!(count_valid_loss_sampled(&grid, 5, 5, 10), 1);
    }
}
