//! Variation-coordinate normalization.
//!
//! Raw design values are mapped through the fvar axis bounds to [-1, 1],
//! bent through the avar piecewise segment maps when present, and stored
//! rounded to 2.14.

use read_fonts::types::{F2Dot14, Fixed};
use read_fonts::{FontRef, TableProvider};

use crate::common::Variation;

/// Maps one design-space value into the normalized [-1, 1] range.
pub(crate) fn normalize_value(value: f32, min: f32, default: f32, max: f32) -> f32 {
    let value = value.clamp(min, max);
    if value < default {
        if default == min {
            return 0.0;
        }
        -((default - value) / (default - min))
    } else if value > default {
        if max == default {
            return 0.0;
        }
        (value - default) / (max - default)
    } else {
        0.0
    }
}

pub(crate) fn normalize_coords(font: &FontRef, variations: &[Variation]) -> Vec<F2Dot14> {
    let Ok(fvar) = font.fvar() else {
        return Vec::new();
    };
    let Ok(axes) = fvar.axes() else {
        return Vec::new();
    };

    let avar = font.avar().ok();

    let mut coords = vec![F2Dot14::ZERO; axes.len()];
    for (i, axis) in axes.iter().enumerate() {
        let tag = axis.axis_tag();
        let Some(variation) = variations.iter().find(|v| v.tag == tag) else {
            continue;
        };

        let normalized = normalize_value(
            variation.value,
            axis.min_value().to_f64() as f32,
            axis.default_value().to_f64() as f32,
            axis.max_value().to_f64() as f32,
        );
        let mut fixed = Fixed::from_f64(normalized as f64);

        if let Some(avar) = avar.as_ref() {
            if let Some(Ok(map)) = avar.axis_segment_maps().iter().nth(i) {
                fixed = map.apply(fixed);
            }
        }

        coords[i] = F2Dot14::from_f32(fixed.to_f64() as f32);
    }

    coords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_within_bounds() {
        assert_eq!(normalize_value(400.0, 100.0, 400.0, 900.0), 0.0);
        assert_eq!(normalize_value(900.0, 100.0, 400.0, 900.0), 1.0);
        assert_eq!(normalize_value(100.0, 100.0, 400.0, 900.0), -1.0);
        assert_eq!(normalize_value(650.0, 100.0, 400.0, 900.0), 0.5);
    }

    #[test]
    fn normalize_clamps() {
        assert_eq!(normalize_value(1200.0, 100.0, 400.0, 900.0), 1.0);
        assert_eq!(normalize_value(-50.0, 100.0, 400.0, 900.0), -1.0);
    }

    #[test]
    fn normalize_degenerate_axis() {
        // min == default == max: everything maps to zero.
        assert_eq!(normalize_value(42.0, 42.0, 42.0, 42.0), 0.0);
    }

    #[test]
    fn round_trip_in_range() {
        // denormalize(normalize(c)) == c for linear axes.
        for c in [-1.0f32, -0.5, 0.0, 0.25, 1.0] {
            let design = 400.0 + c * if c < 0.0 { 300.0 } else { 500.0 };
            let n = normalize_value(design, 100.0, 400.0, 900.0);
            assert!((n - c).abs() < 1e-6);
        }
    }
}
