//! Fallbacks for fonts without positioning tables: mark placement by
//! combining class and synthesized space advances.

use crate::buffer::Buffer;
use crate::face::Face;
use crate::ot_shape_plan::ShapePlan;
use crate::unicode::{combining_class as cc, space};

/// Maps a canonical combining class onto the positional class the fallback
/// positioner works with.
fn recategorize_combining_class(u: char, class: u8) -> u8 {
    if class >= 200 {
        // Attached classes position like their detached counterparts.
        return match class {
            cc::ATTACHED_BELOW_LEFT => cc::BELOW_LEFT,
            cc::ATTACHED_BELOW => cc::BELOW,
            cc::ATTACHED_ABOVE => cc::ABOVE,
            cc::ATTACHED_ABOVE_RIGHT => cc::ABOVE_RIGHT,
            _ => class,
        };
    }

    match class {
        // Thai and Lao.
        103 => cc::BELOW_RIGHT,  // sara u / sara uu
        107 => cc::ABOVE_RIGHT,  // mai
        118 => cc::BELOW,        // sign u
        122 => cc::ABOVE,        // mai

        // Tibetan.
        129 | 132 => cc::BELOW,
        130 => cc::ABOVE,

        // Arabic vowel marks.
        27 | 28 | 30 | 31 | 33 | 34 | 35 => cc::ABOVE,
        29 | 32 => cc::BELOW,

        // Hebrew points: mostly below, a few above.
        10..=22 | 24..=26 => {
            if matches!(u, '\u{05C1}' | '\u{05C2}' | '\u{05C4}' | '\u{05AF}') {
                cc::ABOVE
            } else {
                cc::BELOW
            }
        }
        23 => cc::ATTACHED_ABOVE, // rafe

        // Syriac.
        36 => cc::ABOVE,

        _ => class,
    }
}

pub(crate) fn recategorize_marks(buffer: &mut Buffer) {
    let len = buffer.len;
    for info in &mut buffer.info[..len] {
        if info.general_category() == crate::unicode::GeneralCategory::NON_SPACING_MARK {
            let class = info.modified_combining_class();
            let class = recategorize_combining_class(info.as_char(), class);
            info.set_modified_combining_class(class);
        }
    }
}

/// Stacks marks over their base by combining class. Outline extents live
/// outside the core, so placement works from advances alone: horizontal
/// centering plus pure advance-zeroing in the vertical direction.
pub(crate) fn position_marks(
    _plan: &ShapePlan,
    _face: &Face,
    buffer: &mut Buffer,
    adjust_offsets_when_zeroing: bool,
) {
    let len = buffer.len;
    let mut base = None;

    for i in 0..len {
        if !buffer.info[i].is_unicode_mark() {
            base = Some(i);
            continue;
        }

        let Some(base) = base else { continue };
        if buffer.info[i].modified_combining_class() == 0 {
            continue;
        }

        let base_advance = buffer.pos[base].x_advance;
        let mark_advance = buffer.pos[i].x_advance;

        // Center the mark over its base.
        let mut x_offset = 0;
        for pos in &buffer.pos[base..i] {
            x_offset -= pos.x_advance;
        }
        x_offset += (base_advance - mark_advance) / 2;

        let class = buffer.info[i].modified_combining_class();
        match class {
            cc::BELOW_LEFT | cc::ABOVE_LEFT => x_offset -= (base_advance - mark_advance) / 2,
            cc::BELOW_RIGHT | cc::ABOVE_RIGHT => x_offset += (base_advance - mark_advance) / 2,
            _ => {}
        }

        buffer.pos[i].x_offset += x_offset;
        if adjust_offsets_when_zeroing {
            buffer.pos[i].y_offset -= buffer.pos[i].y_advance;
        }
        buffer.pos[i].x_advance = 0;
        buffer.pos[i].y_advance = 0;
        buffer.unsafe_to_break(Some(base), Some(i + 1));
    }
}

/// Kerning fallback: with no kern-capable table at all there is nothing to
/// fall back on; the hook exists so the pipeline order matches the design.
pub(crate) fn kern(_plan: &ShapePlan, _face: &Face, _buffer: &mut Buffer) {}

/// Synthesizes advances for spaces the font has no glyphs for.
pub(crate) fn adjust_spaces(_plan: &ShapePlan, face: &Face, buffer: &mut Buffer) {
    let len = buffer.len;
    let horizontal = buffer.direction.is_horizontal();
    let upem = face.units_per_em as i32;

    for i in 0..len {
        let space_type = buffer.info[i].space_fallback();
        if space_type == space::NOT_SPACE {
            continue;
        }

        let advance = if horizontal {
            &mut buffer.pos[i].x_advance
        } else {
            &mut buffer.pos[i].y_advance
        };

        match space_type {
            space::SPACE => {} // The space glyph's own advance is correct.
            space::EM => *advance = upem,
            space::EM_2 => *advance = upem / 2,
            space::EM_3 => *advance = upem / 3,
            space::EM_4 => *advance = upem / 4,
            space::EM_5 => *advance = upem / 5,
            space::EM_6 => *advance = upem / 6,
            space::EM_16 => *advance = upem / 16,
            space::EM_4_18 => *advance = upem * 4 / 18,
            space::FIGURE => {
                if let Some(g) = face.nominal_glyph('0') {
                    *advance = face.glyph_h_advance(g.to_u32());
                }
            }
            space::PUNCTUATION => {
                let g = face
                    .nominal_glyph('.')
                    .or_else(|| face.nominal_glyph(','));
                if let Some(g) = g {
                    *advance = face.glyph_h_advance(g.to_u32());
                }
            }
            space::NARROW => {
                // Guess: a sixth of an em, the rough metal-type convention.
                *advance = upem / 6;
            }
            _ => {}
        }
    }
}
