//! Hangul: jamo composition driven by what the font supports, with the
//! ljmo/vjmo/tjmo features tagged per glyph.

use alloc::boxed::Box;
use core::any::Any;

use crate::buffer::Buffer;
use crate::common::Tag;
use crate::face::Face;
use crate::ot_map::F_NONE;
use crate::ot_shape_normalize::NormalizationMode;
use crate::ot_shape_plan::{ShapePlan, ShapePlanner};
use crate::ot_shaper::{ComplexShaper, ZeroWidthMarksMode};
use crate::Mask;

pub const HANGUL_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: Some(collect_features),
    override_features: Some(override_features),
    create_data: Some(|plan| Box::new(HangulShapePlan::new(plan)) as Box<dyn Any + Send + Sync>),
    preprocess_text: Some(preprocess_text),
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::None,
    decompose: None,
    compose: None,
    setup_masks: Some(setup_masks),
    gpos_tag: None,
    reorder_marks: None,
    zero_width_marks: ZeroWidthMarksMode::None,
    fallback_position: false,
};

const L_BASE: u32 = 0x1100;
const V_BASE: u32 = 0x1161;
const T_BASE: u32 = 0x11A7;
const L_COUNT: u32 = 19;
const V_COUNT: u32 = 21;
const T_COUNT: u32 = 28;
const S_BASE: u32 = 0xAC00;
const N_COUNT: u32 = V_COUNT * T_COUNT;
const S_COUNT: u32 = L_COUNT * N_COUNT;

fn is_combining_l(u: u32) -> bool {
    (L_BASE..L_BASE + L_COUNT).contains(&u)
}

fn is_combining_v(u: u32) -> bool {
    (V_BASE..V_BASE + V_COUNT).contains(&u)
}

fn is_combining_t(u: u32) -> bool {
    (T_BASE + 1..T_BASE + T_COUNT).contains(&u)
}

fn is_combined_s(u: u32) -> bool {
    (S_BASE..S_BASE + S_COUNT).contains(&u)
}

fn is_l(u: u32) -> bool {
    is_combining_l(u) || (0xA960..=0xA97C).contains(&u)
}

fn is_v(u: u32) -> bool {
    is_combining_v(u) || (0xD7B0..=0xD7C6).contains(&u)
}

fn is_t(u: u32) -> bool {
    is_combining_t(u) || (0xD7CB..=0xD7FB).contains(&u)
}

fn is_hangul_tone(u: u32) -> bool {
    (0x302E..=0x302F).contains(&u)
}

// The per-glyph jamo feature, stored in the shaper category byte.
const FEATURE_NONE: u8 = 0;
const FEATURE_LJMO: u8 = 1;
const FEATURE_VJMO: u8 = 2;
const FEATURE_TJMO: u8 = 3;

const FEATURE_TAGS: [&[u8; 4]; 3] = [b"ljmo", b"vjmo", b"tjmo"];

struct HangulShapePlan {
    mask_array: [Mask; 4],
}

impl HangulShapePlan {
    fn new(plan: &ShapePlan) -> Self {
        let mut mask_array = [0; 4];
        for (i, tag) in FEATURE_TAGS.iter().enumerate() {
            mask_array[i + 1] = plan.ot_map.one_mask(Tag::new(tag));
        }
        HangulShapePlan { mask_array }
    }
}

fn collect_features(planner: &mut ShapePlanner) {
    for tag in FEATURE_TAGS {
        planner.ot_map.add_feature(Tag::new(tag), F_NONE, 1);
    }
}

fn override_features(planner: &mut ShapePlanner) {
    // Hangul jamo interaction must not be disturbed by contextual
    // alternates or kerning between jamo.
    planner.ot_map.disable_feature(Tag::new(b"calt"));
}

fn set_jamo_feature(buffer: &mut Buffer, feature: u8) {
    buffer.cur_mut(0).shaper_category = feature;
}

fn preprocess_text(_: &ShapePlan, face: &Face, buffer: &mut Buffer) {
    // Normalization-like processing that consults the font: compose jamo
    // sequences into precomposed syllables when the font covers them,
    // decompose syllables the font lacks, and tag jamo with their feature.

    buffer.clear_output();
    buffer.idx = 0;
    while buffer.idx < buffer.len && buffer.successful {
        let u = buffer.cur(0).glyph_id;

        if is_hangul_tone(u) {
            // A tone mark must follow a syllable; move it to the front of
            // the syllable when the font has no mark positioning for it,
            // like the old behaviour everyone implements.
            let end = buffer.out_len();
            if end == 0 {
                buffer.next_glyph();
                continue;
            }
            let mut start = end;
            while start > 0 && {
                let g = buffer.out_info()[start - 1].glyph_id;
                is_combined_s(g) || is_l(g) || is_v(g) || is_t(g)
            } {
                start -= 1;
                if end - start >= 3 {
                    break;
                }
            }
            if start < end && face.nominal_glyph_u32(u).is_some() {
                buffer.next_glyph();
                continue;
            }
            // Unsupported tone mark: keep it, GSUB may still know it.
            buffer.next_glyph();
            continue;
        }

        if is_l(u) && buffer.idx + 1 < buffer.len {
            let v = buffer.cur(1).glyph_id;
            if is_v(v) {
                // A <L,V> or <L,V,T> sequence.
                let mut t = 0;
                if buffer.idx + 2 < buffer.len {
                    let candidate = buffer.cur(2).glyph_id;
                    if is_t(candidate) {
                        t = candidate;
                    }
                }

                // Try the precomposed syllable first.
                if is_combining_l(u) && is_combining_v(v) && (t == 0 || is_combining_t(t)) {
                    let s = S_BASE
                        + (u - L_BASE) * N_COUNT
                        + (v - V_BASE) * T_COUNT
                        + if t != 0 { t - T_BASE } else { 0 };
                    if face.nominal_glyph_u32(s).is_some() {
                        let num_in = if t != 0 { 3 } else { 2 };
                        buffer.replace_glyphs(num_in, &[s]);
                        continue;
                    }
                }

                // Otherwise keep the jamo and tag them for the jamo
                // features.
                set_jamo_feature(buffer, FEATURE_LJMO);
                buffer.next_glyph();
                set_jamo_feature(buffer, FEATURE_VJMO);
                buffer.next_glyph();
                if t != 0 {
                    set_jamo_feature(buffer, FEATURE_TJMO);
                    buffer.next_glyph();
                }
                continue;
            }
        }

        if is_combined_s(u) {
            // A precomposed syllable: decompose when the font lacks it, or
            // compose further with a following T.
            let has_glyph = face.nominal_glyph_u32(u).is_some();

            if has_glyph && buffer.idx + 1 < buffer.len {
                let t = buffer.cur(1).glyph_id;
                // An LV syllable followed by a T jamo composes into LVT.
                if (u - S_BASE) % T_COUNT == 0 && is_combining_t(t) {
                    let s = u + (t - T_BASE);
                    if face.nominal_glyph_u32(s).is_some() {
                        buffer.replace_glyphs(2, &[s]);
                        continue;
                    }
                }
            }

            if !has_glyph {
                // Decompose into jamo the font might cover.
                let s_index = u - S_BASE;
                let l = L_BASE + s_index / N_COUNT;
                let v = V_BASE + (s_index % N_COUNT) / T_COUNT;
                let t = s_index % T_COUNT;

                if face.nominal_glyph_u32(l).is_some()
                    && face.nominal_glyph_u32(v).is_some()
                    && (t == 0 || face.nominal_glyph_u32(T_BASE + t).is_some())
                {
                    if t != 0 {
                        buffer.replace_glyphs(1, &[l, v, T_BASE + t]);
                    } else {
                        buffer.replace_glyphs(1, &[l, v]);
                    }

                    // Tag the decomposed jamo.
                    let out_len = buffer.out_len();
                    let n = if t != 0 { 3 } else { 2 };
                    let out = buffer.out_info_mut();
                    out[out_len - n].shaper_category = FEATURE_LJMO;
                    out[out_len - n + 1].shaper_category = FEATURE_VJMO;
                    if t != 0 {
                        out[out_len - 1].shaper_category = FEATURE_TJMO;
                    }
                    continue;
                }
            }

            buffer.next_glyph();
            continue;
        }

        buffer.next_glyph();
    }
    buffer.sync();
}

fn setup_masks(plan: &ShapePlan, _: &Face, buffer: &mut Buffer) {
    let hangul_plan = plan.data::<HangulShapePlan>();
    for info in &mut buffer.info {
        let feature = info.shaper_category;
        if feature != FEATURE_NONE {
            info.mask |= hangul_plan.mask_array[feature as usize];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syllable_arithmetic() {
        // U+AC01 = GA + final G
        let s = 0xAC01;
        let s_index = s - S_BASE;
        assert_eq!(L_BASE + s_index / N_COUNT, 0x1100);
        assert_eq!(V_BASE + (s_index % N_COUNT) / T_COUNT, 0x1161);
        assert_eq!(s_index % T_COUNT, 1);
    }

    #[test]
    fn jamo_classes() {
        assert!(is_l(0x1100));
        assert!(is_v(0x1161));
        assert!(is_t(0x11A8));
        assert!(!is_t(0x11A7)); // T_BASE itself is a filler
        assert!(is_combined_s(0xAC00));
    }
}
