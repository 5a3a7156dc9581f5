//! Shared helpers for the syllable-based shapers.

use crate::buffer::{scratch_flags, Buffer, GlyphInfo};
use crate::face::Face;
use crate::ot_shape_plan::ShapePlan;

/// Inserts a dotted-circle glyph at the start of every broken syllable.
pub(crate) fn insert_dotted_circles(
    face: &Face,
    buffer: &mut Buffer,
    broken_syllable_type: u8,
    dottedcircle_category: u8,
    repha_category: Option<u8>,
    dottedcircle_position: Option<u8>,
) -> bool {
    if buffer
        .flags
        .contains(crate::buffer::BufferFlags::DO_NOT_INSERT_DOTTED_CIRCLE)
    {
        return false;
    }

    if buffer.scratch_flags & scratch_flags::HAS_BROKEN_SYLLABLE == 0 {
        return false;
    }

    let Some(dottedcircle_glyph) = face.nominal_glyph('\u{25CC}') else {
        return false;
    };

    let mut dottedcircle = GlyphInfo {
        glyph_id: dottedcircle_glyph.to_u32(),
        ..GlyphInfo::default()
    };
    dottedcircle.shaper_category = dottedcircle_category;
    if let Some(position) = dottedcircle_position {
        dottedcircle.shaper_aux = position;
    }

    buffer.clear_output();

    buffer.idx = 0;
    let mut last_syllable = 0;
    while buffer.idx < buffer.len {
        let syllable = buffer.cur(0).syllable;
        if last_syllable != syllable && (syllable & 0x0F) == broken_syllable_type {
            last_syllable = syllable;

            let mut ginfo = dottedcircle;
            ginfo.cluster = buffer.cur(0).cluster;
            ginfo.mask = buffer.cur(0).mask;
            ginfo.syllable = buffer.cur(0).syllable;

            // Insert the dotted circle after a possible repha.
            if let Some(repha_category) = repha_category {
                while buffer.idx < buffer.len
                    && last_syllable == buffer.cur(0).syllable
                    && buffer.cur(0).shaper_category == repha_category
                {
                    buffer.next_glyph();
                }
            }

            buffer.output_info(ginfo);
        } else {
            buffer.next_glyph();
        }
    }

    buffer.sync();
    true
}

pub(crate) fn clear_syllables(_: &ShapePlan, _: &Face, buffer: &mut Buffer) -> bool {
    for info in &mut buffer.info {
        info.syllable = 0;
    }
    false
}

/// Tags each glyph of `[start, end)` with a fresh syllable serial and type.
pub(crate) fn found_syllable(
    buffer: &mut Buffer,
    start: usize,
    end: usize,
    syllable_serial: &mut u8,
    syllable_type: u8,
) {
    for info in &mut buffer.info[start..end] {
        info.syllable = (*syllable_serial << 4) | syllable_type;
    }
    *syllable_serial += 1;
    if *syllable_serial == 16 {
        *syllable_serial = 1;
    }
}
