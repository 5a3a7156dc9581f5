//! Thai and Lao: SARA AM decomposition with nikhahit reordering.
//!
//! Everything else in these scripts is plain mark attachment handled by
//! GPOS (or the mark fallback); marks are zeroed late, by GDEF.

use crate::buffer::Buffer;
use crate::face::Face;
use crate::ot_shape_normalize::NormalizationMode;
use crate::ot_shape_plan::ShapePlan;
use crate::ot_shaper::{ComplexShaper, ZeroWidthMarksMode};

pub const THAI_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: None,
    override_features: None,
    create_data: None,
    preprocess_text: Some(preprocess_text),
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::Auto,
    decompose: None,
    compose: None,
    setup_masks: None,
    gpos_tag: None,
    reorder_marks: None,
    zero_width_marks: ZeroWidthMarksMode::ByGdefLate,
    fallback_position: false,
};

fn is_sara_am(u: u32) -> bool {
    u == 0x0E33 || u == 0x0EB3
}

fn nikhahit_from_sara_am(u: u32) -> u32 {
    // Thai NIKHAHIT / Lao NIGGAHITA
    u - 0x0E33 + 0x0E4D
}

fn sara_aa_from_sara_am(u: u32) -> u32 {
    u - 1
}

fn is_tone_mark(u: u32) -> bool {
    matches!(
        u,
        0x0E31 | 0x0E34..=0x0E37 | 0x0E47..=0x0E4E | 0x0EB1 | 0x0EB4..=0x0EB7 | 0x0EBB
            | 0x0EC8..=0x0ECD
    )
}

fn preprocess_text(_: &ShapePlan, _: &Face, buffer: &mut Buffer) {
    preprocess(buffer)
}

/// SARA AM is decomposed into NIKHAHIT + SARA AA, and the NIKHAHIT part is
/// reordered before any tone marks preceding the SARA AM.
fn preprocess(buffer: &mut Buffer) {
    buffer.clear_output();
    buffer.idx = 0;
    while buffer.idx < buffer.len && buffer.successful {
        let u = buffer.cur(0).glyph_id;
        if !is_sara_am(u) {
            buffer.next_glyph();
            continue;
        }

        // Decompose.
        let nikhahit = nikhahit_from_sara_am(u);
        let sara_aa = sara_aa_from_sara_am(u);
        buffer.replace_glyphs(1, &[nikhahit, sara_aa]);

        // Refresh the character properties of the two new glyphs.
        let out_len = buffer.out_len();
        let mut scratch = buffer.scratch_flags;
        buffer.out_info_mut()[out_len - 2].init_unicode_props(&mut scratch);
        buffer.out_info_mut()[out_len - 1].init_unicode_props(&mut scratch);
        buffer.scratch_flags = scratch;

        // Move the NIKHAHIT backwards over any tone marks.
        let end = out_len;
        let mut start = end - 2;
        while start > 0 && is_tone_mark(buffer.out_info()[start - 1].glyph_id) {
            start -= 1;
        }

        if start + 2 < end {
            buffer.merge_out_clusters(start, end);
            let t = buffer.out_info()[end - 2];
            let out = buffer.out_info_mut();
            out.copy_within(start..end - 2, start + 1);
            out[start] = t;
        } else if start > 0 {
            // Nothing to reorder over, but NIKHAHIT is combining, so merge
            // the cluster with the preceding character.
            buffer.merge_out_clusters(start - 1, end);
        }
    }
    buffer.sync();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sara_am_decomposition_pair() {
        assert_eq!(nikhahit_from_sara_am(0x0E33), 0x0E4D);
        assert_eq!(sara_aa_from_sara_am(0x0E33), 0x0E32);
        assert_eq!(nikhahit_from_sara_am(0x0EB3), 0x0ECD);
        assert_eq!(sara_aa_from_sara_am(0x0EB3), 0x0EB2);
    }

    #[test]
    fn sara_am_reorders_over_tone_marks() {
        let mut buffer = Buffer::new();
        // KO KAI, MAI EK (tone mark), SARA AM
        for (i, u) in [0x0E01u32, 0x0E48, 0x0E33].iter().enumerate() {
            buffer.add(*u, i as u32);
        }
        buffer.set_unicode_props();
        preprocess(&mut buffer);

        let glyphs: Vec<_> = buffer.info.iter().map(|i| i.glyph_id).collect();
        // NIKHAHIT moves before the tone mark; SARA AA trails.
        assert_eq!(glyphs, [0x0E01, 0x0E4D, 0x0E48, 0x0E32]);
    }

    #[test]
    fn plain_text_is_unchanged() {
        let mut buffer = Buffer::new();
        for (i, u) in [0x0E01u32, 0x0E35].iter().enumerate() {
            buffer.add(*u, i as u32);
        }
        buffer.set_unicode_props();
        preprocess(&mut buffer);
        let glyphs: Vec<_> = buffer.info.iter().map(|i| i.glyph_id).collect();
        assert_eq!(glyphs, [0x0E01, 0x0E35]);
    }
}
