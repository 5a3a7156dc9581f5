//! Hebrew: presentation-form composition for old fonts and mark reorder
//! quirks around patah/qamats stacking.

use crate::buffer::Buffer;
use crate::common::Tag;
use crate::ot_shape_normalize::{NormalizationMode, NormalizeContext};
use crate::ot_shape_plan::ShapePlan;
use crate::ot_shaper::{ComplexShaper, ZeroWidthMarksMode};
use crate::unicode;

pub const HEBREW_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: None,
    override_features: None,
    create_data: None,
    preprocess_text: None,
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::Auto,
    decompose: None,
    compose: Some(compose),
    setup_masks: None,
    gpos_tag: Some(Tag::new(b"hebr")),
    reorder_marks: Some(reorder_marks),
    zero_width_marks: ZeroWidthMarksMode::ByGdefLate,
    fallback_position: true,
};

fn reorder_marks(_: &ShapePlan, buffer: &mut Buffer, start: usize, end: usize) {
    // Permuted modified classes, see unicode::modified_combining_class.
    const PATAH: u8 = 20;
    const QAMATS: u8 = 21;
    const SHEVA: u8 = 22;
    const HIRIQ: u8 = 23;
    const METEG: u8 = 25;

    for i in start + 2..end {
        let c0 = buffer.info[i - 2].modified_combining_class();
        let c1 = buffer.info[i - 1].modified_combining_class();
        let c2 = buffer.info[i].modified_combining_class();

        if (c0 == PATAH || c0 == QAMATS)
            && (c1 == SHEVA || c1 == HIRIQ)
            && (c2 == METEG || c2 == unicode::combining_class::BELOW)
        {
            buffer.merge_clusters(i - 1, i + 1);
            buffer.info.swap(i - 1, i);
            break;
        }
    }
}

const S_DAGESH_FORMS: &[u32] = &[
    0xFB30, // ALEF
    0xFB31, // BET
    0xFB32, // GIMEL
    0xFB33, // DALET
    0xFB34, // HE
    0xFB35, // VAV
    0xFB36, // ZAYIN
    0x0000, // HET
    0xFB38, // TET
    0xFB39, // YOD
    0xFB3A, // FINAL KAF
    0xFB3B, // KAF
    0xFB3C, // LAMED
    0x0000, // FINAL MEM
    0xFB3E, // MEM
    0x0000, // FINAL NUN
    0xFB40, // NUN
    0xFB41, // SAMEKH
    0x0000, // AYIN
    0xFB43, // FINAL PE
    0xFB44, // PE
    0x0000, // FINAL TSADI
    0xFB46, // TSADI
    0xFB47, // QOF
    0xFB48, // RESH
    0xFB49, // SHIN
    0xFB4A, // TAV
];

fn compose(ctx: &NormalizeContext, a: char, b: char) -> Option<char> {
    if let Some(c) = unicode::compose(a, b) {
        return Some(c);
    }

    // Hebrew presentation forms are excluded from standard normalization
    // but wanted for old fonts that carry only the presentation block;
    // fonts with real mark positioning don't need them.
    if ctx.plan.has_gpos_mark {
        return None;
    }

    let a = a as u32;
    let composed = match b {
        // HIRIQ
        '\u{05B4}' => match a {
            0x05D9 => 0xFB1D, // YOD
            _ => 0,
        },
        // PATAH
        '\u{05B7}' => match a {
            0x05D9 => 0xFB1F, // YOD
            0x05D0 => 0xFB2E, // ALEF
            _ => 0,
        },
        // QAMATS
        '\u{05B8}' => match a {
            0x05D0 => 0xFB2F, // ALEF
            _ => 0,
        },
        // HOLAM
        '\u{05B9}' => match a {
            0x05D5 => 0xFB4B, // VAV
            _ => 0,
        },
        // DAGESH
        '\u{05BC}' => match a {
            0x05D0..=0x05EA => S_DAGESH_FORMS[a as usize - 0x05D0],
            0xFB2A => 0xFB2C, // SHIN WITH SHIN DOT
            0xFB2B => 0xFB2D, // SHIN WITH SIN DOT
            _ => 0,
        },
        // RAFE
        '\u{05BF}' => match a {
            0x05D1 => 0xFB4C, // BET
            0x05DB => 0xFB4D, // KAF
            0x05E4 => 0xFB4E, // PE
            _ => 0,
        },
        // SHIN DOT
        '\u{05C1}' => match a {
            0x05E9 => 0xFB2A, // SHIN
            0xFB49 => 0xFB2C, // SHIN WITH DAGESH
            _ => 0,
        },
        // SIN DOT
        '\u{05C2}' => match a {
            0x05E9 => 0xFB2B, // SHIN
            0xFB49 => 0xFB2D, // SHIN WITH DAGESH
            _ => 0,
        },
        _ => 0,
    };

    char::from_u32(composed).filter(|c| *c != '\u{0}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dagesh_forms_cover_the_letter_block() {
        assert_eq!(S_DAGESH_FORMS.len(), 0x05EA - 0x05D0 + 1);
        // HET has no presentation form with dagesh.
        assert_eq!(S_DAGESH_FORMS[0x05D7 - 0x05D0], 0);
    }
}
