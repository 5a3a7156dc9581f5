//! Arabic and Syriac: joining-form state machine, stretch marks and mark
//! reordering. Also reused as a sub-plan by the universal shaper for other
//! joining scripts.

use alloc::boxed::Box;
use core::any::Any;

use unicode_joining_type::{get_joining_group, get_joining_type, JoiningGroup, JoiningType};

use crate::buffer::Buffer;
use crate::common::{Script, Tag};
use crate::face::Face;
use crate::ot_map::{F_HAS_FALLBACK, F_MANUAL_ZWJ, F_NONE};
use crate::ot_shape_normalize::NormalizationMode;
use crate::ot_shape_plan::{ShapePlan, ShapePlanner};
use crate::ot_shaper::{ComplexShaper, ZeroWidthMarksMode};
use crate::{script, Mask};

pub const ARABIC_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: Some(collect_features),
    override_features: None,
    create_data: Some(|plan| Box::new(ArabicShapePlan::new(plan)) as Box<dyn Any + Send + Sync>),
    preprocess_text: None,
    postprocess_glyphs: Some(postprocess_glyphs),
    normalization_mode: NormalizationMode::Auto,
    decompose: None,
    compose: None,
    setup_masks: Some(setup_masks),
    gpos_tag: None,
    reorder_marks: Some(reorder_marks),
    zero_width_marks: ZeroWidthMarksMode::ByGdefLate,
    fallback_position: true,
};

// Joining-form actions, in feature order. NONE allocates no feature.
pub(crate) mod action {
    pub const NONE: u8 = 0;
    pub const ISOL: u8 = 1;
    pub const FINA: u8 = 2;
    pub const FIN2: u8 = 3;
    pub const FIN3: u8 = 4;
    pub const MEDI: u8 = 5;
    pub const MED2: u8 = 6;
    pub const INIT: u8 = 7;
    pub const NUM_FEATURES: usize = 8;
}

const FEATURE_TAGS: [&[u8; 4]; 7] = [
    b"isol", b"fina", b"fin2", b"fin3", b"medi", b"med2", b"init",
];

// Internal joining classes: the table columns.
mod joining {
    pub const U: u8 = 0;
    pub const L: u8 = 1;
    pub const R: u8 = 2;
    pub const D: u8 = 3;
    pub const ALAPH: u8 = 4;
    pub const DALATH_RISH: u8 = 5;
    pub const NUM_COLUMNS: usize = 6;
    // Not columns:
    pub const T: u8 = 6;
    pub const C: u8 = D;
}

#[derive(Clone, Copy)]
struct StateEntry {
    prev_action: u8,
    curr_action: u8,
    next_state: u8,
}

const fn entry(prev_action: u8, curr_action: u8, next_state: u8) -> StateEntry {
    StateEntry {
        prev_action,
        curr_action,
        next_state,
    }
}

use action::{FIN2, FIN3, FINA, INIT, ISOL, MED2, MEDI, NONE};

#[rustfmt::skip]
const STATE_TABLE: [[StateEntry; joining::NUM_COLUMNS]; 7] = [
    // Columns: U, L, R, D, ALAPH, DALATH_RISH.

    // State 0: prev was U, not willing to join.
    [entry(NONE, NONE, 0), entry(NONE, ISOL, 2), entry(NONE, ISOL, 1),
     entry(NONE, ISOL, 2), entry(NONE, ISOL, 1), entry(NONE, ISOL, 6)],

    // State 1: prev was R or ISOL ALAPH, not willing to join.
    [entry(NONE, NONE, 0), entry(NONE, ISOL, 2), entry(NONE, ISOL, 1),
     entry(NONE, ISOL, 2), entry(NONE, FIN2, 5), entry(NONE, ISOL, 6)],

    // State 2: prev was D or L in ISOL form, willing to join.
    [entry(NONE, NONE, 0), entry(NONE, ISOL, 2), entry(INIT, FINA, 1),
     entry(INIT, FINA, 3), entry(INIT, FINA, 4), entry(INIT, FINA, 6)],

    // State 3: prev was D in FINA form, willing to join.
    [entry(NONE, NONE, 0), entry(NONE, ISOL, 2), entry(MEDI, FINA, 1),
     entry(MEDI, FINA, 3), entry(MEDI, FINA, 4), entry(MEDI, FINA, 6)],

    // State 4: prev was FINA ALAPH, not willing to join.
    [entry(NONE, NONE, 0), entry(NONE, ISOL, 2), entry(MED2, ISOL, 1),
     entry(MED2, ISOL, 2), entry(MED2, FIN2, 5), entry(MED2, ISOL, 6)],

    // State 5: prev was FIN2/FIN3 ALAPH, not willing to join.
    [entry(NONE, NONE, 0), entry(NONE, ISOL, 2), entry(ISOL, ISOL, 1),
     entry(ISOL, ISOL, 2), entry(ISOL, FIN2, 5), entry(ISOL, ISOL, 6)],

    // State 6: prev was DALATH/RISH, not willing to join.
    [entry(NONE, NONE, 0), entry(NONE, ISOL, 2), entry(NONE, ISOL, 1),
     entry(NONE, ISOL, 2), entry(NONE, FIN3, 5), entry(NONE, ISOL, 6)],
];

fn joining_class(u: char) -> u8 {
    // Syriac joining groups override the plain joining type.
    match get_joining_group(u) {
        JoiningGroup::Alaph => return joining::ALAPH,
        JoiningGroup::DalathRish => return joining::DALATH_RISH,
        _ => {}
    }

    match get_joining_type(u) {
        JoiningType::NonJoining => joining::U,
        JoiningType::LeftJoining => joining::L,
        JoiningType::RightJoining => joining::R,
        JoiningType::DualJoining => joining::D,
        JoiningType::JoinCausing => joining::C,
        JoiningType::Transparent => joining::T,
    }
}

pub(crate) struct ArabicShapePlan {
    mask_array: [Mask; action::NUM_FEATURES],
    has_stch: bool,
}

impl ArabicShapePlan {
    pub(crate) fn new(plan: &ShapePlan) -> Self {
        let mut mask_array = [0; action::NUM_FEATURES];
        for (i, tag) in FEATURE_TAGS.iter().enumerate() {
            mask_array[i + 1] = plan.ot_map.one_mask(Tag::new(tag));
        }
        ArabicShapePlan {
            mask_array,
            has_stch: plan.ot_map.one_mask(Tag::new(b"stch")) != 0,
        }
    }
}

pub(crate) fn has_arabic_joining(script: Option<Script>) -> bool {
    matches!(
        script,
        Some(s) if s == script::ARABIC
            || s == script::SYRIAC
            || s == script::MONGOLIAN
            || s == script::NKO
            || s == script::PHAGS_PA
            || s == script::MANDAIC
            || s == script::PSALTER_PAHLAVI
            || s == script::ADLAM
            || s == script::HANIFI_ROHINGYA
            || s == script::SOGDIAN
            || s == script::OLD_UYGHUR
            || s == script::CHORASMIAN
    )
}

fn collect_features(planner: &mut ShapePlanner) {
    let map = &mut planner.ot_map;

    // Pauses between the joining features: fonts match against the results
    // of earlier features, one at a time.
    map.enable_feature(Tag::new(b"stch"), F_NONE, 1);
    map.add_gsub_pause(Some(record_stch));

    map.enable_feature(Tag::new(b"ccmp"), F_NONE, 1);
    map.enable_feature(Tag::new(b"locl"), F_NONE, 1);
    map.add_gsub_pause(None);

    for tag in FEATURE_TAGS {
        map.add_feature(Tag::new(tag), F_MANUAL_ZWJ | F_HAS_FALLBACK, 1);
        map.add_gsub_pause(None);
    }

    map.enable_feature(Tag::new(b"rlig"), F_MANUAL_ZWJ | F_HAS_FALLBACK, 1);
    map.add_gsub_pause(None);

    map.enable_feature(Tag::new(b"calt"), F_MANUAL_ZWJ, 1);
    map.add_gsub_pause(None);

    map.enable_feature(Tag::new(b"mset"), F_NONE, 1);
}

/// Runs the joining state machine and tags every glyph with its form.
pub(crate) fn arabic_joining(buffer: &mut Buffer) {
    let mut prev: Option<usize> = None;
    let mut state = 0usize;

    let len = buffer.len;
    for i in 0..len {
        let class = joining_class(buffer.info[i].as_char());
        if class == joining::T {
            buffer.info[i].shaper_category = action::NONE;
            continue;
        }

        let entry = &STATE_TABLE[state][class as usize];

        if entry.prev_action != action::NONE {
            if let Some(prev) = prev {
                buffer.info[prev].shaper_category = entry.prev_action;
                buffer.unsafe_to_break(Some(prev), Some(i + 1));
            }
        } else if let Some(prev) = prev {
            // No join between prev and this glyph: a tatweel can slip in
            // between without changing the result.
            buffer.safe_to_insert_tatweel(Some(prev), Some(i + 1));
        }

        buffer.info[i].shaper_category = entry.curr_action;

        prev = Some(i);
        state = entry.next_state as usize;
    }
}

pub(crate) fn setup_masks_arabic_plan(
    arabic_plan: &ArabicShapePlan,
    buffer: &mut Buffer,
    _script: Option<Script>,
) {
    arabic_joining(buffer);
    for info in &mut buffer.info {
        info.mask |= arabic_plan.mask_array[info.shaper_category as usize];
    }
}

fn setup_masks(plan: &ShapePlan, _: &Face, buffer: &mut Buffer) {
    let arabic_plan = plan.data::<ArabicShapePlan>();
    setup_masks_arabic_plan(arabic_plan, buffer, plan.script);
}

// Stretch categories recorded in the aux byte during the stch pause.
const STCH_NONE: u8 = 0;
const STCH_FIXED: u8 = 1;
const STCH_REPEATING: u8 = 2;

fn record_stch(plan: &ShapePlan, _: &Face, buffer: &mut Buffer) -> bool {
    let arabic_plan = plan.data::<ArabicShapePlan>();
    if !arabic_plan.has_stch {
        return false;
    }

    // 'stch' feature was just applied. Record "stretching" glyphs for the
    // positioning pass in postprocess.
    let (stch_mask, _) = plan.ot_map.mask(Tag::new(b"stch"));
    let len = buffer.len;
    for info in &mut buffer.info[..len] {
        if info.substituted() && info.mask & stch_mask != 0 {
            info.shaper_aux = if info.is_unicode_mark() {
                STCH_FIXED
            } else {
                STCH_REPEATING
            };
        } else {
            info.shaper_aux = STCH_NONE;
        }
    }
    false
}

/// Lays stretched connector glyphs out within the advance of the character
/// they stretch under (the Syriac Abbreviation Mark).
fn postprocess_glyphs(plan: &ShapePlan, face: &Face, buffer: &mut Buffer) {
    let arabic_plan = plan.data::<ArabicShapePlan>();
    if !arabic_plan.has_stch {
        return;
    }

    let len = buffer.len;
    let mut i = 0;
    while i < len {
        if buffer.info[i].shaper_aux == STCH_NONE {
            i += 1;
            continue;
        }

        // A run of stretch glyphs.
        let start = i;
        let mut w_fixed = 0i32;
        let mut w_repeating = 0i32;
        let mut n_repeating = 0i32;
        while i < len && buffer.info[i].shaper_aux != STCH_NONE {
            let advance = face.glyph_h_advance(buffer.info[i].glyph_id);
            if buffer.info[i].shaper_aux == STCH_FIXED {
                w_fixed += advance;
            } else {
                w_repeating += advance;
                n_repeating += 1;
            }
            i += 1;
        }

        // The glyph after the run carries the space being stretched into.
        if i >= len || n_repeating == 0 {
            continue;
        }
        let w_total: i32 = buffer.pos[i].x_advance;

        // Overlap the repeating glyphs evenly over the leftover width.
        let leftover = (w_total - w_fixed).max(0);
        let step = leftover / n_repeating;
        let mut x = 0;
        for j in start..i {
            buffer.pos[j].x_advance = 0;
            buffer.pos[j].x_offset = x;
            if buffer.info[j].shaper_aux == STCH_REPEATING {
                x += step;
            } else {
                x += face.glyph_h_advance(buffer.info[j].glyph_id);
            }
        }
    }
}

// Marks that must reorder in front of others of the same combining class.
fn is_modifier_combining_mark(u: u32) -> bool {
    matches!(
        u,
        0x0654 | 0x0655 | 0x0658 | 0x06DC | 0x06E3 | 0x06E7 | 0x06E8 | 0x08CA | 0x08CB | 0x08CD
            | 0x08CE | 0x08D3 | 0x08F3
    )
}

fn reorder_marks(_: &ShapePlan, buffer: &mut Buffer, start: usize, end: usize) {
    let mut i = start;
    for cc in [220u8, 230] {
        while i < end && buffer.info[i].modified_combining_class() < cc {
            i += 1;
        }
        if i == end {
            break;
        }
        if buffer.info[i].modified_combining_class() > cc {
            continue;
        }

        let mut j = i;
        while j < end
            && buffer.info[j].modified_combining_class() == cc
            && is_modifier_combining_mark(buffer.info[j].glyph_id)
        {
            j += 1;
        }

        if i == j {
            continue;
        }

        // Shift the MCM run to the front of the class run.
        buffer.merge_clusters(start, j);
        let mut temp = [crate::buffer::GlyphInfo::default(); crate::ot_layout::MAX_CONTEXT_LENGTH];
        let shift_len = j - i;
        if shift_len > temp.len() || i - start > temp.len() {
            break;
        }
        temp[..shift_len].copy_from_slice(&buffer.info[i..j]);
        buffer.info.copy_within(start..i, start + shift_len);
        buffer.info[start..start + shift_len].copy_from_slice(&temp[..shift_len]);

        // Renumber combining classes so the reordering sticks through any
        // later normalization round.
        let new_cc = cc - 1;
        for info in &mut buffer.info[start..start + shift_len] {
            info.set_modified_combining_class(new_cc);
        }

        i = j;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joining_actions(text: &str) -> Vec<u8> {
        let mut buffer = Buffer::new();
        for (i, c) in text.chars().enumerate() {
            buffer.add(c as u32, i as u32);
        }
        buffer.set_unicode_props();
        arabic_joining(&mut buffer);
        buffer.info.iter().map(|info| info.shaper_category).collect()
    }

    #[test]
    fn lam_alef_forms() {
        // LAM is dual-joining, ALEF is right-joining: LAM gets init, ALEF
        // gets fina.
        let actions = joining_actions("\u{0644}\u{0627}");
        assert_eq!(actions, [action::INIT, action::FINA]);
    }

    #[test]
    fn three_letter_word() {
        // BEH (D), BEH (D), BEH (D) -> init, medi, fina.
        let actions = joining_actions("\u{0628}\u{0628}\u{0628}");
        assert_eq!(actions, [action::INIT, action::MEDI, action::FINA]);
    }

    #[test]
    fn isolated_letter() {
        let actions = joining_actions("\u{0627}");
        assert_eq!(actions, [action::ISOL]);
    }

    #[test]
    fn marks_are_transparent() {
        // BEH, FATHA (mark), BEH: the mark does not interrupt joining.
        let actions = joining_actions("\u{0628}\u{064E}\u{0628}");
        assert_eq!(actions, [action::INIT, action::NONE, action::FINA]);
    }
}
