//! Pure calculation functions for backend execution.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate dimensions that fit inside a bounding box (best-fit resize).
///
/// Preserves the source aspect ratio. One dimension matches the box
/// exactly, the other is equal or smaller. Enlarges when the source is
/// smaller than the box.
///
/// # Arguments
/// * `source` - Image dimensions before resizing (width, height)
/// * `bounds` - Bounding box (width, height)
///
/// # Returns
/// * `(width, height)` - Fit dimensions, never below 1x1
pub fn calculate_fit_dimensions(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (box_w, box_h) = bounds;

    let src_aspect = src_w as f64 / src_h as f64;
    let box_aspect = box_w as f64 / box_h as f64;

    if src_aspect > box_aspect {
        // Source is wider: width matches, height shrinks
        let w = box_w;
        let h = (w as f64 / src_aspect).round() as u32;
        (w, h.max(1))
    } else {
        // Source is taller: height matches, width shrinks
        let h = box_h;
        let w = (h as f64 * src_aspect).round() as u32;
        (w.max(1), h)
    }
}

/// Map an angle in degrees onto clockwise quarter turns (0–3).
///
/// Returns `None` when the angle is not a multiple of 90.
///
/// # Examples
/// ```
/// # use iiif_image::imaging::quarter_turns;
/// assert_eq!(quarter_turns(270.0), Some(3));
/// assert_eq!(quarter_turns(-90.0), Some(3));
/// assert_eq!(quarter_turns(450.0), Some(1));
/// assert_eq!(quarter_turns(45.0), None);
/// ```
pub fn quarter_turns(angle: f64) -> Option<u8> {
    let normalized = angle.rem_euclid(360.0);
    if normalized % 90.0 != 0.0 {
        return None;
    }
    Some((normalized / 90.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // calculate_fit_dimensions tests
    // =========================================================================

    #[test]
    fn fit_wider_source_into_square() {
        // 1000x500 (2:1) into 300x300 → width matches
        assert_eq!(calculate_fit_dimensions((1000, 500), (300, 300)), (300, 150));
    }

    #[test]
    fn fit_taller_source_into_square() {
        // 500x1000 (1:2) into 300x300 → height matches
        assert_eq!(calculate_fit_dimensions((500, 1000), (300, 300)), (150, 300));
    }

    #[test]
    fn fit_enlarges_small_source() {
        // 100x50 into 400x400 → 400x200
        assert_eq!(calculate_fit_dimensions((100, 50), (400, 400)), (400, 200));
    }

    #[test]
    fn fit_same_aspect_ratio() {
        assert_eq!(calculate_fit_dimensions((800, 600), (400, 300)), (400, 300));
    }

    #[test]
    fn fit_never_collapses_to_zero() {
        assert_eq!(calculate_fit_dimensions((10000, 1), (10, 10)), (10, 1));
    }

    // =========================================================================
    // quarter_turns tests
    // =========================================================================

    #[test]
    fn quarter_turns_for_right_angles() {
        assert_eq!(quarter_turns(0.0), Some(0));
        assert_eq!(quarter_turns(90.0), Some(1));
        assert_eq!(quarter_turns(180.0), Some(2));
        assert_eq!(quarter_turns(360.0), Some(0));
    }

    #[test]
    fn quarter_turns_normalizes_out_of_range() {
        assert_eq!(quarter_turns(-90.0), Some(3));
        assert_eq!(quarter_turns(720.0), Some(0));
    }

    #[test]
    fn quarter_turns_rejects_arbitrary_angles() {
        assert_eq!(quarter_turns(45.5), None);
        assert_eq!(quarter_turns(89.999), None);
    }
}
