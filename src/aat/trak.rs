//! Tracking: uniform advance adjustment from the `trak` table, scaled by
//! the requested point size.

use read_fonts::tables::trak::TrackData;
use read_fonts::types::Fixed;
use read_fonts::FontData;

use crate::buffer::Buffer;
use crate::face::Face;
use crate::ot_shape_plan::ShapePlan;

fn interpolate_at(sizes: &[Fixed], values: &[i16], ptem: f32) -> f32 {
    debug_assert!(!sizes.is_empty());
    let size = Fixed::from_f64(ptem as f64);

    if sizes.len() == 1 {
        return values[0] as f32;
    }

    // Piecewise linear between the size runs, clamped at the ends.
    if size <= sizes[0] {
        return values[0] as f32;
    }
    if size >= sizes[sizes.len() - 1] {
        return values[values.len() - 1] as f32;
    }

    let mut i = 0;
    while i + 1 < sizes.len() && sizes[i + 1] < size {
        i += 1;
    }

    let s0 = sizes[i].to_f64() as f32;
    let s1 = sizes[i + 1].to_f64() as f32;
    let t = if s1 != s0 {
        (ptem - s0) / (s1 - s0)
    } else {
        0.0
    };
    values[i] as f32 + t * (values[i + 1] as f32 - values[i] as f32)
}

fn get_tracking(track_data: &TrackData, offset_data: FontData, ptem: f32) -> Option<f32> {
    // Tracking is applied at track value 0 (the "normal" track).
    let entry = track_data
        .track_table()
        .iter()
        .find(|t| t.track() == Fixed::ZERO)?;

    let sizes: Vec<Fixed> = track_data
        .size_table(offset_data)
        .ok()?
        .iter()
        .map(|v| v.get())
        .collect();
    let values: Vec<i16> = entry
        .per_size_values(offset_data, track_data.n_sizes())
        .ok()?
        .iter()
        .map(|v| v.get())
        .collect();

    if sizes.is_empty() || values.len() < sizes.len() {
        return None;
    }

    Some(interpolate_at(&sizes, &values, ptem))
}

pub(crate) fn apply(plan: &ShapePlan, face: &Face, buffer: &mut Buffer) {
    // Tracking is meaningless without a point size.
    let Some(ptem) = face.ptem.filter(|ptem| *ptem > 0.0) else {
        return;
    };

    let Some(trak) = face.aat.trak.as_ref() else {
        return;
    };

    let horizontal = buffer.direction.is_horizontal();
    let track_data = if horizontal {
        trak.horiz()
    } else {
        trak.vert()
    };
    let Some(Ok(track_data)) = track_data else {
        return;
    };

    let Some(tracking) = get_tracking(&track_data, trak.offset_data(), ptem) else {
        return;
    };

    // Scale from points to design units.
    let tracking = (tracking * face.units_per_em as f32 / ptem).round() as i32;
    let advance_to_add = tracking;
    let offset_to_add = tracking / 2;

    let len = buffer.len;
    for i in 0..len {
        if buffer.info[i].mask & plan.trak_mask == 0 {
            continue;
        }
        if horizontal {
            buffer.pos[i].x_advance += advance_to_add;
            buffer.pos[i].x_offset += offset_to_add;
        } else {
            buffer.pos[i].y_advance += advance_to_add;
            buffer.pos[i].y_offset += offset_to_add;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolation() {
        let sizes = [Fixed::from_i32(12), Fixed::from_i32(24)];
        let values = [-15i16, -7];
        assert_eq!(interpolate_at(&sizes, &values, 12.0), -15.0);
        assert_eq!(interpolate_at(&sizes, &values, 24.0), -7.0);
        assert_eq!(interpolate_at(&sizes, &values, 18.0), -11.0);
        // Clamped outside the table.
        assert_eq!(interpolate_at(&sizes, &values, 6.0), -15.0);
        assert_eq!(interpolate_at(&sizes, &values, 60.0), -7.0);
    }
}
