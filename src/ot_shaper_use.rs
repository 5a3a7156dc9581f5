//! The Universal Shaping Engine: a single pipeline for every complex
//! script without a dedicated shaper.

use alloc::boxed::Box;
use core::any::Any;

use crate::buffer::{Buffer, GlyphInfo};
use crate::common::Tag;
use crate::face::Face;
use crate::ot_map::{F_MANUAL_ZWJ, F_NONE, F_PER_SYLLABLE};
use crate::ot_shape_normalize::{NormalizationMode, NormalizeContext};
use crate::ot_shape_plan::{ShapePlan, ShapePlanner};
use crate::ot_shaper::{ComplexShaper, ZeroWidthMarksMode};
use crate::ot_shaper_arabic::{has_arabic_joining, setup_masks_arabic_plan, ArabicShapePlan};
use crate::ot_shaper_syllabic::found_syllable;
use crate::ot_shaper_use_table::{category as cat, get_category};
use crate::unicode::GeneralCategory;
use crate::{unicode, Mask};

pub const USE_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: Some(collect_features),
    override_features: None,
    create_data: Some(|plan| Box::new(UseShapePlan::new(plan)) as Box<dyn Any + Send + Sync>),
    preprocess_text: None,
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::ComposedDiacriticsNoShortCircuit,
    decompose: None,
    compose: Some(compose),
    setup_masks: Some(setup_masks),
    gpos_tag: None,
    reorder_marks: None,
    zero_width_marks: ZeroWidthMarksMode::ByGdefEarly,
    fallback_position: false,
};

/// Basic features, applied all at once, before reordering.
const BASIC_FEATURES: &[&[u8; 4]] = &[
    b"rkrf", b"abvf", b"blwf", b"half", b"pstf", b"vatu", b"cjct",
];

const TOPOGRAPHICAL_FEATURES: &[&[u8; 4]] = &[b"isol", b"init", b"medi", b"fina"];

// In TOPOGRAPHICAL_FEATURES order.
#[derive(Clone, Copy, PartialEq)]
enum JoiningForm {
    Isol = 0,
    Init,
    Medi,
    Fina,
    None,
}

/// Other features, applied all at once, after reordering and clearing
/// syllables.
const OTHER_FEATURES: &[&[u8; 4]] = &[b"abvs", b"blws", b"haln", b"pres", b"psts"];

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum SyllableType {
    ViramaTerminatedCluster = 0,
    SakotTerminatedCluster = 1,
    StandardCluster = 2,
    NumberJoinerTerminatedCluster = 3,
    NumeralCluster = 4,
    SymbolCluster = 5,
    HieroglyphCluster = 6,
    BrokenCluster = 7,
    NonCluster = 8,
}

struct UseShapePlan {
    rphf_mask: Mask,
    arabic_plan: Option<ArabicShapePlan>,
}

impl UseShapePlan {
    fn new(plan: &ShapePlan) -> Self {
        UseShapePlan {
            rphf_mask: plan.ot_map.one_mask(Tag::new(b"rphf")),
            arabic_plan: if has_arabic_joining(plan.script) {
                Some(ArabicShapePlan::new(plan))
            } else {
                None
            },
        }
    }
}

fn collect_features(planner: &mut ShapePlanner) {
    let map = &mut planner.ot_map;

    // Do this before any lookups have been applied.
    map.add_gsub_pause(Some(setup_syllables));

    // Default glyph pre-processing group.
    map.enable_feature(Tag::new(b"locl"), F_PER_SYLLABLE, 1);
    map.enable_feature(Tag::new(b"ccmp"), F_PER_SYLLABLE, 1);
    map.enable_feature(Tag::new(b"nukt"), F_PER_SYLLABLE, 1);
    map.enable_feature(Tag::new(b"akhn"), F_MANUAL_ZWJ | F_PER_SYLLABLE, 1);

    // Reordering group.
    map.add_gsub_pause(Some(crate::ot_layout::clear_substitution_flags));
    map.add_feature(Tag::new(b"rphf"), F_MANUAL_ZWJ | F_PER_SYLLABLE, 1);
    map.add_gsub_pause(Some(record_rphf));
    map.add_gsub_pause(Some(crate::ot_layout::clear_substitution_flags));
    map.enable_feature(Tag::new(b"pref"), F_MANUAL_ZWJ | F_PER_SYLLABLE, 1);
    map.add_gsub_pause(Some(record_pref));

    // Orthographic unit shaping group.
    for feature in BASIC_FEATURES {
        map.enable_feature(Tag::new(feature), F_MANUAL_ZWJ | F_PER_SYLLABLE, 1);
    }

    map.add_gsub_pause(Some(reorder_use));
    map.add_gsub_pause(Some(crate::ot_shaper_syllabic::clear_syllables));

    // Topographical features.
    for feature in TOPOGRAPHICAL_FEATURES {
        map.add_feature(Tag::new(feature), F_NONE, 1);
    }
    map.add_gsub_pause(None);

    // Standard typographic presentation.
    for feature in OTHER_FEATURES {
        map.enable_feature(Tag::new(feature), F_MANUAL_ZWJ, 1);
    }
}

fn compose(_: &NormalizeContext, a: char, b: char) -> Option<char> {
    // Avoid recomposing split matras.
    if GeneralCategory::of(a).is_mark() {
        return None;
    }
    unicode::compose(a, b)
}

impl GlyphInfo {
    fn use_category(&self) -> u8 {
        self.shaper_category
    }

    fn set_use_category(&mut self, c: u8) {
        self.shaper_category = c;
    }
}

fn setup_masks(plan: &ShapePlan, _: &Face, buffer: &mut Buffer) {
    let use_plan = plan.data::<UseShapePlan>();

    // Do this first: the joining machine writes the category byte too.
    if let Some(arabic_plan) = &use_plan.arabic_plan {
        setup_masks_arabic_plan(arabic_plan, buffer, plan.script);
    }

    // Masks are set later, in the syllable pause; record categories now.
    for info in &mut buffer.info {
        let category = get_category(info.glyph_id);
        info.set_use_category(category);
    }
}

fn setup_rphf_mask(plan: &ShapePlan, buffer: &mut Buffer) {
    let use_plan = plan.data::<UseShapePlan>();
    let mask = use_plan.rphf_mask;
    if mask == 0 {
        return;
    }

    let mut start = 0;
    while start < buffer.len {
        let end = buffer.next_syllable(start);
        // The repha candidate is the first character, or up to three when
        // the prefix is an R+halant sequence.
        let limit = if buffer.info[start].use_category() == cat::R {
            1
        } else {
            3.min(end - start)
        };
        for info in &mut buffer.info[start..start + limit] {
            info.mask |= mask;
        }
        start = end;
    }
}

fn setup_topographical_masks(plan: &ShapePlan, buffer: &mut Buffer) {
    let use_plan = plan.data::<UseShapePlan>();
    if use_plan.arabic_plan.is_some() {
        return;
    }

    let mut masks = [0 as Mask; 4];
    let mut all_masks = 0;
    for (mask, feature) in masks.iter_mut().zip(TOPOGRAPHICAL_FEATURES) {
        *mask = plan.ot_map.one_mask(Tag::new(feature));
        if *mask == plan.ot_map.global_mask() {
            *mask = 0;
        }
        all_masks |= *mask;
    }
    if all_masks == 0 {
        return;
    }
    let other_masks = !all_masks;

    let mut last_start = 0;
    let mut last_form = JoiningForm::None;
    let mut start = 0;
    while start < buffer.len {
        let end = buffer.next_syllable(start);
        let syllable_type = buffer.info[start].syllable & 0x0F;

        if syllable_type == SyllableType::HieroglyphCluster as u8
            || syllable_type == SyllableType::NonCluster as u8
        {
            // These don't join.
            last_form = JoiningForm::None;
        } else {
            let join = last_form == JoiningForm::Fina || last_form == JoiningForm::Isol;
            if join {
                // Fix up the previous syllable's form.
                last_form = if last_form == JoiningForm::Fina {
                    JoiningForm::Medi
                } else {
                    JoiningForm::Init
                };
                for info in &mut buffer.info[last_start..start] {
                    info.mask = (info.mask & other_masks) | masks[last_form as usize];
                }
            }

            // Form for this syllable.
            last_form = if join {
                JoiningForm::Fina
            } else {
                JoiningForm::Isol
            };
            for info in &mut buffer.info[start..end] {
                info.mask = (info.mask & other_masks) | masks[last_form as usize];
            }
        }

        last_start = start;
        start = end;
    }
}

fn setup_syllables(plan: &ShapePlan, _: &Face, buffer: &mut Buffer) -> bool {
    find_syllables_use(buffer);

    let mut start = 0;
    while start < buffer.len {
        let end = buffer.next_syllable(start);
        buffer.unsafe_to_break(Some(start), Some(end));
        start = end;
    }

    setup_rphf_mask(plan, buffer);
    setup_topographical_masks(plan, buffer);
    false
}

fn record_rphf(plan: &ShapePlan, _: &Face, buffer: &mut Buffer) -> bool {
    let use_plan = plan.data::<UseShapePlan>();
    let mask = use_plan.rphf_mask;
    if mask == 0 {
        return false;
    }

    let mut start = 0;
    while start < buffer.len {
        let end = buffer.next_syllable(start);
        // Mark a substituted repha as the repha category.
        for info in &mut buffer.info[start..end] {
            if info.mask & mask == 0 {
                break;
            }
            if info.substituted() {
                info.set_use_category(cat::R);
                break;
            }
        }
        start = end;
    }
    false
}

fn record_pref(_: &ShapePlan, _: &Face, buffer: &mut Buffer) -> bool {
    let mut start = 0;
    while start < buffer.len {
        let end = buffer.next_syllable(start);
        // Mark a substituted pref as a pre-base vowel; they reorder the
        // same way.
        for info in &mut buffer.info[start..end] {
            if info.substituted() {
                info.set_use_category(cat::V_PRE);
                break;
            }
        }
        start = end;
    }
    false
}

fn is_halant_use(info: &GlyphInfo) -> bool {
    matches!(info.use_category(), cat::H | cat::HN | cat::IS) && !info.ligated()
}

const POST_BASE_FLAGS: u64 = (1 << cat::F_ABV)
    | (1 << cat::F_BLW)
    | (1 << cat::F_PST)
    | (1 << cat::M_ABV)
    | (1 << cat::M_BLW)
    | (1 << cat::M_PST)
    | (1 << cat::M_PRE)
    | (1 << cat::V_ABV)
    | (1 << cat::V_BLW)
    | (1 << cat::V_PST)
    | (1 << cat::V_PRE)
    | (1 << cat::VM_ABV)
    | (1 << cat::VM_BLW)
    | (1 << cat::VM_PST)
    | (1 << cat::VM_PRE);

fn reorder_syllable_use(buffer: &mut Buffer, start: usize, end: usize) {
    let syllable_type = buffer.info[start].syllable & 0x0F;

    // Only a few syllable types need reordering.
    const REORDERING_TYPES: u16 = (1 << SyllableType::ViramaTerminatedCluster as u16)
        | (1 << SyllableType::SakotTerminatedCluster as u16)
        | (1 << SyllableType::StandardCluster as u16)
        | (1 << SyllableType::SymbolCluster as u16)
        | (1 << SyllableType::BrokenCluster as u16);
    if (1 << syllable_type as u16) & REORDERING_TYPES == 0 {
        return;
    }

    // Move things forward: a repha reorders towards the end, to just
    // before the first post-base glyph.
    if buffer.info[start].use_category() == cat::R && end - start > 1 {
        for i in start + 1..end {
            let is_post_base = (1u64 << buffer.info[i].use_category()) & POST_BASE_FLAGS != 0
                || is_halant_use(&buffer.info[i]);
            if is_post_base || i == end - 1 {
                // Land before the post-base glyph, or at the very end.
                let mut i = i;
                if is_post_base {
                    i -= 1;
                }

                buffer.merge_clusters(start, i + 1);
                let t = buffer.info[start];
                buffer.info.copy_within(start + 1..i + 1, start);
                buffer.info[i] = t;
                break;
            }
        }
    }

    // Move things back: pre-base vowels move to just after the last
    // halant, or to the very beginning.
    let mut j = start;
    for i in start..end {
        let category = buffer.info[i].use_category();
        if is_halant_use(&buffer.info[i]) {
            // Landing site is after the halant.
            j = i + 1;
        } else if matches!(category, cat::V_PRE | cat::VM_PRE)
            // Only the first component of a multiple substitution moves.
            && buffer.info[i].lig_comp() == 0
            && j < i
        {
            buffer.merge_clusters(j, i + 1);
            let t = buffer.info[i];
            buffer.info.copy_within(j..i, j + 1);
            buffer.info[j] = t;
        }
    }
}

fn reorder_use(_: &ShapePlan, face: &Face, buffer: &mut Buffer) -> bool {
    let ret = crate::ot_shaper_syllabic::insert_dotted_circles(
        face,
        buffer,
        SyllableType::BrokenCluster as u8,
        cat::B,
        Some(cat::R),
        None,
    );

    let mut start = 0;
    while start < buffer.len {
        let end = buffer.next_syllable(start);
        reorder_syllable_use(buffer, start, end);
        start = end;
    }
    ret
}

// Cluster identification: a pragmatic rendition of the USE cluster model.
fn find_syllables_use(buffer: &mut Buffer) {
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
    let eat_any = |pos: &mut usize, set: &[u8]| -> bool {
        if let Some(c) = cats.get(*pos) {
            if set.contains(c) {
                *pos += 1;
                return true;
            }
        }
        false
    };
    // The tail of marks, vowels and modifiers after the last base.
    let eat_cluster_tail = |pos: &mut usize| {
        while eat_any(
            pos,
            &[
                cat::CM_ABV,
                cat::CM_BLW,
                cat::M_PRE,
                cat::M_ABV,
                cat::M_BLW,
                cat::M_PST,
            ],
        ) {}
        while eat_any(pos, &[cat::V_PRE, cat::V_ABV, cat::V_BLW, cat::V_PST, cat::ZWJ, cat::ZWNJ]) {
        }
        while eat_any(pos, &[cat::VM_PRE, cat::VM_ABV, cat::VM_BLW, cat::VM_PST]) {}
        while eat_any(pos, &[cat::F_ABV, cat::F_BLW, cat::F_PST, cat::SM_ABV, cat::SM_BLW]) {}
    };

    let mut serial = 1u8;
    let mut has_broken = false;
    let mut pos = 0;
    while pos < cats.len() {
        let start = pos;

        let kind = 'kind: {
            // (R | CS)? (B | GB | N) ...
            let save = pos;
            eat_any(&mut pos, &[cat::R, cat::CS]);
            if eat_any(&mut pos, &[cat::B, cat::GB, cat::N]) {
                // Halant-joined base chains; a trailing halant terminates
                // the cluster as a virama- or sakot-terminated one.
                let mut terminated = None;
                loop {
                    eat(&mut pos, cat::VS);
                    while eat_any(&mut pos, &[cat::CM_ABV, cat::CM_BLW]) {}
                    let save2 = pos;
                    let is_sakot = cats.get(pos) == Some(&cat::IS);
                    if eat_any(&mut pos, &[cat::H, cat::HN, cat::IS]) {
                        eat_any(&mut pos, &[cat::ZWJ, cat::ZWNJ]);
                        if eat_any(&mut pos, &[cat::B, cat::GB, cat::N]) {
                            continue;
                        }
                        // Trailing halant.
                        if pos == save2 + 1 || cats.get(pos).is_none() {
                            terminated = Some(if is_sakot {
                                SyllableType::SakotTerminatedCluster
                            } else {
                                SyllableType::ViramaTerminatedCluster
                            });
                        }
                        break;
                    }
                    pos = save2;
                    break;
                }

                if let Some(terminated) = terminated {
                    break 'kind terminated;
                }
                eat_cluster_tail(&mut pos);
                break 'kind SyllableType::StandardCluster;
            }
            pos = save;

            // A lone symbol with its tail.
            if eat(&mut pos, cat::S) {
                eat_cluster_tail(&mut pos);
                break 'kind SyllableType::SymbolCluster;
            }

            // Marks with no base: a broken cluster.
            let save = pos;
            eat_any(&mut pos, &[cat::R]);
            eat_cluster_tail(&mut pos);
            if eat_any(&mut pos, &[cat::H, cat::HN, cat::IS]) {
                eat_cluster_tail(&mut pos);
            }
            if pos > save {
                has_broken = true;
                break 'kind SyllableType::BrokenCluster;
            }

            pos = start + 1;
            SyllableType::NonCluster
        };

        found_syllable(buffer, start, pos, &mut serial, kind as u8);
    }

    if has_broken {
        buffer.scratch_flags |= crate::buffer::scratch_flags::HAS_BROKEN_SYLLABLE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_buffer(codepoints: &[u32]) -> Buffer {
        let mut buffer = Buffer::new();
        for (i, &u) in codepoints.iter().enumerate() {
            buffer.add(u, i as u32);
        }
        for info in &mut buffer.info {
            info.shaper_category = get_category(info.glyph_id);
        }
        find_syllables_use(&mut buffer);
        buffer
    }

    #[test]
    fn repha_moves_toward_end() {
        // Javanese: cecak (repha), base, base.
        let mut buffer = make_buffer(&[0xA982, 0xA9A0, 0xA9A1]);
        // Force single-syllable treatment for the reorder.
        for info in &mut buffer.info {
            info.syllable = (1 << 4) | SyllableType::StandardCluster as u8;
        }
        reorder_syllable_use(&mut buffer, 0, 3);
        let glyphs: Vec<_> = buffer.info.iter().map(|i| i.glyph_id).collect();
        assert_eq!(glyphs, [0xA9A0, 0xA9A1, 0xA982]);
    }

    #[test]
    fn pre_base_vowel_moves_to_front() {
        // Javanese: base, taling (pre-base vowel).
        let mut buffer = make_buffer(&[0xA9A0, 0xA9BA]);
        for info in &mut buffer.info {
            info.syllable = (1 << 4) | SyllableType::StandardCluster as u8;
        }
        reorder_syllable_use(&mut buffer, 0, 2);
        let glyphs: Vec<_> = buffer.info.iter().map(|i| i.glyph_id).collect();
        assert_eq!(glyphs, [0xA9BA, 0xA9A0]);
    }

    #[test]
    fn base_and_vowel_form_one_cluster() {
        let buffer = make_buffer(&[0xA9A0, 0xA9BA]);
        assert_eq!(buffer.next_syllable(0), 2);
    }
}
