//! The Khmer shaper: Coeng+Ro prepending and left-matra reordering.

use alloc::boxed::Box;
use core::any::Any;

use crate::buffer::{Buffer, GlyphInfo};
use crate::common::Tag;
use crate::face::Face;
use crate::ot_map::{FeatureFlags, F_GLOBAL, F_GLOBAL_MANUAL_JOINERS, F_MANUAL_JOINERS, F_PER_SYLLABLE};
use crate::ot_shape_normalize::{NormalizationMode, NormalizeContext};
use crate::ot_shape_plan::{ShapePlan, ShapePlanner};
use crate::ot_shaper::{ComplexShaper, ZeroWidthMarksMode};
use crate::ot_shaper_indic_table::{category as cat, get_categories};
use crate::ot_shaper_syllabic::found_syllable;
use crate::unicode::GeneralCategory;
use crate::{unicode, Mask};

pub const KHMER_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: Some(collect_features),
    override_features: Some(override_features),
    create_data: Some(|plan| Box::new(KhmerShapePlan::new(plan)) as Box<dyn Any + Send + Sync>),
    preprocess_text: None,
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::ComposedDiacriticsNoShortCircuit,
    decompose: Some(decompose),
    compose: Some(compose),
    setup_masks: Some(setup_masks),
    gpos_tag: None,
    reorder_marks: None,
    zero_width_marks: ZeroWidthMarksMode::None,
    fallback_position: false,
};

const KHMER_FEATURES: &[(&[u8; 4], FeatureFlags)] = &[
    // Basic features, applied in order, one at a time, after reordering.
    (b"pref", F_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"blwf", F_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"abvf", F_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"pstf", F_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"cfar", F_MANUAL_JOINERS | F_PER_SYLLABLE),
    // Other features, applied all at once after clearing syllables.
    (b"pres", F_GLOBAL_MANUAL_JOINERS),
    (b"abvs", F_GLOBAL_MANUAL_JOINERS),
    (b"blws", F_GLOBAL_MANUAL_JOINERS),
    (b"psts", F_GLOBAL_MANUAL_JOINERS),
];

mod khmer_feature {
    pub const PREF: usize = 0;
    pub const CFAR: usize = 4;
    pub const BASIC_COUNT: usize = 5;
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum SyllableType {
    ConsonantSyllable = 0,
    BrokenCluster = 1,
    NonKhmerCluster = 2,
}

struct KhmerShapePlan {
    mask_array: [Mask; KHMER_FEATURES.len()],
}

impl KhmerShapePlan {
    fn new(plan: &ShapePlan) -> Self {
        let mut mask_array = [0; KHMER_FEATURES.len()];
        for (mask, (tag, flags)) in mask_array.iter_mut().zip(KHMER_FEATURES) {
            *mask = if flags & F_GLOBAL != 0 {
                0
            } else {
                plan.ot_map.one_mask(Tag::new(tag))
            };
        }
        KhmerShapePlan { mask_array }
    }
}

fn collect_features(planner: &mut ShapePlanner) {
    // Do this before any lookups have been applied.
    planner.ot_map.add_gsub_pause(Some(setup_syllables));
    planner.ot_map.add_gsub_pause(Some(reorder_khmer));

    // Testing suggests the dominant engine does NOT pause between the
    // basic features.
    planner
        .ot_map
        .enable_feature(Tag::new(b"locl"), F_PER_SYLLABLE, 1);
    planner
        .ot_map
        .enable_feature(Tag::new(b"ccmp"), F_PER_SYLLABLE, 1);

    for (tag, flags) in KHMER_FEATURES.iter().take(khmer_feature::BASIC_COUNT) {
        planner.ot_map.add_feature(Tag::new(tag), *flags, 1);
    }

    planner
        .ot_map
        .add_gsub_pause(Some(crate::ot_shaper_syllabic::clear_syllables));

    for (tag, flags) in KHMER_FEATURES.iter().skip(khmer_feature::BASIC_COUNT) {
        planner.ot_map.add_feature(Tag::new(tag), *flags, 1);
    }
}

fn override_features(planner: &mut ShapePlanner) {
    // The Khmer spec lists 'clig' as part of the required shaping features.
    planner.ot_map.enable_feature(Tag::new(b"clig"), 0, 1);
    planner.ot_map.disable_feature(Tag::new(b"liga"));
}

fn decompose(_: &NormalizeContext, ab: char) -> Option<(char, char)> {
    // Decompose the split matras that have no Unicode decompositions.
    match ab {
        '\u{17BE}' => Some(('\u{17C1}', '\u{17BE}')),
        '\u{17BF}' => Some(('\u{17C1}', '\u{17BF}')),
        '\u{17C0}' => Some(('\u{17C1}', '\u{17C0}')),
        '\u{17C4}' => Some(('\u{17C1}', '\u{17C4}')),
        '\u{17C5}' => Some(('\u{17C1}', '\u{17C5}')),
        _ => unicode::decompose(ab),
    }
}

fn compose(_: &NormalizeContext, a: char, b: char) -> Option<char> {
    // Avoid recomposing split matras.
    if GeneralCategory::of(a).is_mark() {
        return None;
    }
    unicode::compose(a, b)
}

fn setup_masks(_: &ShapePlan, _: &Face, buffer: &mut Buffer) {
    // Masks are set in the reordering pause; record categories here.
    for info in &mut buffer.info {
        let (c, _) = get_categories(info.glyph_id);
        info.shaper_category = c;
    }
}

impl GlyphInfo {
    fn khmer_category(&self) -> u8 {
        self.shaper_category
    }
}

// consonant_syllable: (cn | PLACEHOLDER | DOTTEDCIRCLE) (Coeng cn)* tail
// where cn is a consonant with an optional robatic group, and the tail is
// matra and sign groups.
fn find_syllables_khmer(buffer: &mut Buffer) {
    let cats: Vec<u8> = buffer.info[..buffer.len]
        .iter()
        .map(|info| info.shaper_category)
        .collect();

    let eat = |pos: &mut usize, category: u8| -> bool {
        if cats.get(*pos) == Some(&category) {
            *pos += 1;
            true
        } else {
            false
        }
    };
    let eat_joiner = |pos: &mut usize| -> bool {
        matches!(cats.get(*pos), Some(&cat::ZWJ) | Some(&cat::ZWNJ)) && {
            *pos += 1;
            true
        }
    };
    let eat_cn = |pos: &mut usize| -> bool {
        if !matches!(cats.get(*pos), Some(&cat::C) | Some(&cat::RA) | Some(&cat::V)) {
            return false;
        }
        *pos += 1;
        let save = *pos;
        eat_joiner(pos);
        if !eat(pos, cat::ROBATIC) {
            *pos = save;
        }
        true
    };
    // xgroup: (joiner* Xgroup)*
    let eat_xgroup = |pos: &mut usize| {
        loop {
            let save = *pos;
            while eat_joiner(pos) {}
            if !eat(pos, cat::X_GROUP) {
                *pos = save;
                break;
            }
        }
    };
    let eat_syllable_tail = |pos: &mut usize| {
        eat_xgroup(pos);
        // matra_group: VPre? xgroup VBlw? xgroup (VAbv | VPst)?
        eat(pos, cat::V_PRE);
        eat_xgroup(pos);
        eat(pos, cat::V_BLW);
        eat_xgroup(pos);
        if !eat(pos, cat::V_ABV) {
            eat(pos, cat::V_PST);
        }
        eat_xgroup(pos);
        // (Coeng cn)?
        let save = *pos;
        if eat(pos, cat::H) && !eat_cn(pos) {
            *pos = save;
        }
        while eat(pos, cat::Y_GROUP) {}
    };

    let mut serial = 1u8;
    let mut has_broken = false;
    let mut pos = 0;
    while pos < cats.len() {
        let start = pos;

        let kind = if eat_cn(&mut pos) || eat(&mut pos, cat::PLACEHOLDER) || eat(&mut pos, cat::DOTTED_CIRCLE)
        {
            loop {
                let save = pos;
                if eat(&mut pos, cat::H) && eat_cn(&mut pos) {
                    continue;
                }
                pos = save;
                break;
            }
            eat_syllable_tail(&mut pos);
            SyllableType::ConsonantSyllable
        } else {
            // broken_cluster: Coeng? syllable_tail, when non-empty.
            eat(&mut pos, cat::H);
            eat_syllable_tail(&mut pos);
            if pos > start {
                has_broken = true;
                SyllableType::BrokenCluster
            } else {
                pos = start + 1;
                SyllableType::NonKhmerCluster
            }
        };

        found_syllable(buffer, start, pos, &mut serial, kind as u8);
    }

    if has_broken {
        buffer.scratch_flags |= crate::buffer::scratch_flags::HAS_BROKEN_SYLLABLE;
    }
}

fn setup_syllables(_: &ShapePlan, _: &Face, buffer: &mut Buffer) -> bool {
    find_syllables_khmer(buffer);
    let mut start = 0;
    while start < buffer.len {
        let end = buffer.next_syllable(start);
        buffer.unsafe_to_break(Some(start), Some(end));
        start = end;
    }
    false
}

fn reorder_khmer(plan: &ShapePlan, face: &Face, buffer: &mut Buffer) -> bool {
    let ret = crate::ot_shaper_syllabic::insert_dotted_circles(
        face,
        buffer,
        SyllableType::BrokenCluster as u8,
        cat::DOTTED_CIRCLE,
        None,
        None,
    );

    let khmer_plan = plan.data::<KhmerShapePlan>();
    let mut start = 0;
    while start < buffer.len {
        let end = buffer.next_syllable(start);
        let syllable_type = buffer.info[start].syllable & 0x0F;
        // Broken clusters got their dotted circles; the consonant logic
        // handles them from here.
        if syllable_type == SyllableType::ConsonantSyllable as u8
            || syllable_type == SyllableType::BrokenCluster as u8
        {
            reorder_consonant_syllable(khmer_plan, buffer, start, end);
        }
        start = end;
    }
    ret
}

/// Rules from the Khmer section of the Microsoft script development spec.
fn reorder_consonant_syllable(plan: &KhmerShapePlan, buffer: &mut Buffer, start: usize, end: usize) {
    // Setup masks.
    {
        // Post-base.
        let mask = plan.mask_array[1] | plan.mask_array[2] | plan.mask_array[3];
        for info in &mut buffer.info[start + 1..end] {
            info.mask |= mask;
        }
    }

    let mut num_coengs = 0;
    let mut i = start + 1;
    while i < end {
        // When a Coeng + consonant combination is found (and the subscript
        // count is less than two), the combination is handled by the
        // subscript type of the following character: a Coeng + Ro pair is
        // reordered to immediately before the base glyph and tagged with
        // 'pref'.
        if buffer.info[i].khmer_category() == cat::H && num_coengs <= 2 && i + 1 < end {
            num_coengs += 1;

            if buffer.info[i + 1].khmer_category() == cat::RA {
                for j in 0..2 {
                    buffer.info[i + j].mask |= plan.mask_array[khmer_feature::PREF];
                }

                // Move the Coeng,Ro sequence to the start.
                buffer.merge_clusters(start, i + 2);
                let t0 = buffer.info[i];
                let t1 = buffer.info[i + 1];
                buffer.info.copy_within(start..i, start + 2);
                buffer.info[start] = t0;
                buffer.info[start + 1] = t1;

                // Mark the subsequent stuff with 'cfar'; this distinguishes
                // Coeng Ro from Coeng+consonant+Coeng Ro sequences.
                if plan.mask_array[khmer_feature::CFAR] != 0 {
                    for info in &mut buffer.info[i + 2..end] {
                        info.mask |= plan.mask_array[khmer_feature::CFAR];
                    }
                }

                num_coengs = 2; // Done.
            }
        } else if buffer.info[i].khmer_category() == cat::V_PRE {
            // Reorder the left matra piece to the start.
            buffer.merge_clusters(start, i + 1);
            let t = buffer.info[i];
            buffer.info.copy_within(start..i, start + 1);
            buffer.info[start] = t;
        }

        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reordered(text: &str) -> Vec<u32> {
        let mut buffer = Buffer::new();
        for (i, c) in text.chars().enumerate() {
            buffer.add(c as u32, i as u32);
        }
        buffer.set_unicode_props();
        for info in &mut buffer.info {
            let (c, _) = get_categories(info.glyph_id);
            info.shaper_category = c;
        }
        find_syllables_khmer(&mut buffer);

        let plan = KhmerShapePlan {
            // Fake non-zero masks so the tagging paths run.
            mask_array: [2, 4, 8, 16, 32, 0, 0, 0, 0],
        };
        let mut start = 0;
        while start < buffer.len {
            let end = buffer.next_syllable(start);
            reorder_consonant_syllable(&plan, &mut buffer, start, end);
            start = end;
        }
        buffer.info.iter().map(|info| info.glyph_id).collect()
    }

    #[test]
    fn coeng_ro_moves_to_front() {
        // KA, COENG, RO -> COENG, RO, KA
        let glyphs = reordered("\u{1780}\u{17D2}\u{179A}");
        assert_eq!(glyphs, [0x17D2, 0x179A, 0x1780]);
    }

    #[test]
    fn left_matra_moves_to_front() {
        // KA, VOWEL SIGN E -> E, KA
        let glyphs = reordered("\u{1780}\u{17C1}");
        assert_eq!(glyphs, [0x17C1, 0x1780]);
    }

    #[test]
    fn coeng_non_ro_stays() {
        // KA, COENG, KHA stays in logical order.
        let glyphs = reordered("\u{1780}\u{17D2}\u{1781}");
        assert_eq!(glyphs, [0x1780, 0x17D2, 0x1781]);
    }

    #[test]
    fn khmer_syllable_is_one_unit() {
        let mut buffer = Buffer::new();
        for (i, c) in "\u{1780}\u{17D2}\u{179A}".chars().enumerate() {
            buffer.add(c as u32, i as u32);
        }
        for info in &mut buffer.info {
            let (c, _) = get_categories(info.glyph_id);
            info.shaper_category = c;
        }
        find_syllables_khmer(&mut buffer);
        assert_eq!(buffer.next_syllable(0), 3);
        assert_eq!(
            buffer.info[0].syllable & 0x0F,
            SyllableType::ConsonantSyllable as u8
        );
    }
}
