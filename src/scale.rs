//! Output size computation for captured frames.

/// Pixel dimensions of a rasterization surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Maps a source size and optional desired width/height to the output size.
///
/// - no constraint: source size
/// - width only: aspect-preserving, height floored
/// - height only: aspect-preserving, width floored
/// - both: `{ width: desired_height, height: desired_width }`
///
/// The last branch swaps the two constraints. Callers relying on the exact
/// output of earlier releases depend on it, so it stays.
///
/// Zero constraints count as absent.
pub fn scale(
    source_width: u32,
    source_height: u32,
    desired_width: Option<u32>,
    desired_height: Option<u32>,
) -> Size {
    let desired_width = desired_width.filter(|&w| w > 0);
    let desired_height = desired_height.filter(|&h| h > 0);
    match (desired_width, desired_height) {
        (None, None) => Size::new(source_width, source_height),
        (Some(w), None) => Size::new(w, floor_ratio(w, source_width, source_height)),
        (None, Some(h)) => Size::new(floor_ratio(h, source_height, source_width), h),
        (Some(w), Some(h)) => Size::new(h, w),
    }
}

/// `floor(desired / source * other)`, saturating at the u32 range.
fn floor_ratio(desired: u32, source: u32, other: u32) -> u32 {
    if source == 0 {
        return 0;
    }
    let value = (desired as f64 / source as f64 * other as f64).floor();
    if value.is_finite() { value as u32 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::{Size, scale};

    #[test]
    fn identity_without_constraints() {
        assert_eq!(scale(100, 50, None, None), Size::new(100, 50));
    }

    #[test]
    fn width_only_preserves_aspect() {
        assert_eq!(scale(100, 50, Some(200), None), Size::new(200, 100));
    }

    #[test]
    fn height_only_preserves_aspect() {
        assert_eq!(scale(100, 50, None, Some(25)), Size::new(50, 25));
    }

    #[test]
    fn both_constraints_are_swapped() {
        assert_eq!(scale(100, 50, Some(200), Some(40)), Size::new(40, 200));
    }

    #[test]
    fn fractional_results_are_floored() {
        // 160 / 1920 * 1080 = 90, 161 / 1920 * 1080 = 90.5625
        assert_eq!(scale(1920, 1080, Some(160), None), Size::new(160, 90));
        assert_eq!(scale(1920, 1080, Some(161), None), Size::new(161, 90));
    }

    #[test]
    fn zero_constraint_counts_as_absent() {
        assert_eq!(scale(640, 360, Some(0), None), Size::new(640, 360));
        assert_eq!(scale(640, 360, Some(0), Some(90)), Size::new(160, 90));
    }

    #[test]
    fn zero_source_yields_empty_size() {
        let size = scale(0, 0, Some(120), None);
        assert!(size.is_empty());
    }
}
