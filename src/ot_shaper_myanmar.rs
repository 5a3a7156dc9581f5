//! The Myanmar shaper: kinzi handling, medial reordering, and the
//! visual-order sort shared with the Indic model.

use crate::buffer::{Buffer, GlyphInfo};
use crate::common::Tag;
use crate::face::Face;
use crate::ot_map::{F_MANUAL_ZWJ, F_PER_SYLLABLE};
use crate::ot_shape_normalize::{NormalizationMode, NormalizeContext};
use crate::ot_shape_plan::{ShapePlan, ShapePlanner};
use crate::ot_shaper::{ComplexShaper, ZeroWidthMarksMode};
use crate::ot_shaper_indic_table::position as pos;
use crate::ot_shaper_syllabic::found_syllable;
use crate::unicode;
use crate::unicode::GeneralCategory;

pub const MYANMAR_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: Some(collect_features),
    override_features: None,
    create_data: None,
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

// Myanmar-specific categories, stored in the shaper category byte.
mod cat {
    pub const O: u8 = 0;
    pub const C: u8 = 1; // consonant
    pub const IV: u8 = 2; // independent vowel
    pub const DC: u8 = 3; // dotted circle
    pub const H: u8 = 4; // virama / invisible stacker
    pub const ZWNJ: u8 = 5;
    pub const ZWJ: u8 = 6;
    pub const SM: u8 = 8; // visarga and shan tones
    pub const GB: u8 = 10; // generic base
    pub const AS: u8 = 18; // asat
    pub const RA: u8 = 15;
    pub const MH: u8 = 21; // medial ha
    pub const MR: u8 = 22; // medial ra
    pub const MW: u8 = 23; // medial wa
    pub const MY: u8 = 24; // medial ya
    pub const PT: u8 = 25; // pwo and other tones
    pub const VS: u8 = 26; // variation selector
    pub const V_PRE: u8 = 30;
    pub const V_ABV: u8 = 31;
    pub const V_BLW: u8 = 32;
    pub const V_PST: u8 = 33;
    pub const A: u8 = 34; // anusvara / dot below
    pub const D: u8 = 35; // digit
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum SyllableType {
    ConsonantSyllable = 0,
    BrokenCluster = 1,
    NonMyanmarCluster = 2,
}

fn myanmar_category(u: u32) -> u8 {
    match u {
        0x200C => cat::ZWNJ,
        0x200D => cat::ZWJ,
        0x25CC => cat::DC,
        0x00A0 | 0x00D7 | 0x2012..=0x2014 | 0x2022 | 0x25FB..=0x25FE => cat::GB,
        0xFE00..=0xFE0F => cat::VS,

        0x1000..=0x1020 => {
            if u == 0x101B {
                cat::RA
            } else {
                cat::C
            }
        }
        0x1021..=0x102A | 0x103F | 0x104E => cat::IV,
        0x102B..=0x102C => cat::V_PST,
        0x102D..=0x102E | 0x1032..=0x1035 => cat::V_ABV,
        0x102F..=0x1030 => cat::V_BLW,
        0x1031 => cat::V_PRE,
        0x1036 => cat::A,
        0x1037 => cat::A, // dot below
        0x1038 => cat::SM,
        0x1039 => cat::H,
        0x103A => cat::AS,
        0x103B => cat::MY,
        0x103C => cat::MR,
        0x103D => cat::MW,
        0x103E => cat::MH,
        0x1040..=0x1049 | 0x1090..=0x1099 => cat::D,
        0x104A..=0x104F => cat::O, // punctuation
        0x1050..=0x1055 => cat::C, // Pali/Sanskrit extensions
        0x1056..=0x1057 => cat::V_PST,
        0x1058..=0x1059 => cat::V_BLW,
        0x105A..=0x105D | 0x1061 | 0x1065..=0x1066 | 0x106E..=0x1070 | 0x1075..=0x1081 | 0x108E => {
            cat::C
        }
        0x105E..=0x1060 => cat::MY, // Mon medials
        0x1062..=0x1064 | 0x1067..=0x106D | 0x1083 => cat::PT,
        0x1071..=0x1074 | 0x1085..=0x1086 => cat::V_ABV,
        0x1082 => cat::MH,
        0x1084 => cat::V_PRE,
        0x1087..=0x108D | 0x108F | 0x109A..=0x109C => cat::PT,
        0x109D => cat::V_ABV,
        0xAA60..=0xAA6F | 0xAA71..=0xAA7A => cat::C, // Khamti
        0xAA70 | 0xAA7B..=0xAA7D => cat::PT,
        _ => cat::O,
    }
}

impl GlyphInfo {
    fn myanmar_category(&self) -> u8 {
        self.shaper_category
    }

    fn is_myanmar_consonant(&self) -> bool {
        if self.ligated() {
            return false;
        }
        matches!(
            self.myanmar_category(),
            cat::C | cat::IV | cat::RA | cat::GB | cat::DC
        )
    }
}

fn collect_features(planner: &mut ShapePlanner) {
    let map = &mut planner.ot_map;

    // Do this before any lookups have been applied.
    map.add_gsub_pause(Some(setup_syllables));

    map.enable_feature(Tag::new(b"locl"), F_PER_SYLLABLE, 1);
    // The Indic specs do not require ccmp, but if a font uses it, it is
    // typically at the beginning.
    map.enable_feature(Tag::new(b"ccmp"), F_PER_SYLLABLE, 1);

    map.add_gsub_pause(Some(reorder_myanmar));

    for tag in [b"rphf", b"pref", b"blwf", b"pstf"] {
        map.enable_feature(Tag::new(tag), F_MANUAL_ZWJ | F_PER_SYLLABLE, 1);
        map.add_gsub_pause(None);
    }

    map.add_gsub_pause(Some(crate::ot_shaper_syllabic::clear_syllables));

    for tag in [b"pres", b"abvs", b"blws", b"psts"] {
        map.enable_feature(Tag::new(tag), F_MANUAL_ZWJ, 1);
    }
}

fn compose(_: &NormalizeContext, a: char, b: char) -> Option<char> {
    // Avoid recomposing split vowels.
    if GeneralCategory::of(a).is_mark() {
        return None;
    }
    unicode::compose(a, b)
}

fn setup_masks(_: &ShapePlan, _: &Face, buffer: &mut Buffer) {
    // No masks: Myanmar spec flows run on the syllable structure alone.
    for info in &mut buffer.info {
        info.shaper_category = myanmar_category(info.glyph_id);
        info.shaper_aux = pos::END;
    }
}

fn find_syllables_myanmar(buffer: &mut Buffer) {
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

    // The post-base tail: asat, medials, vowels, tones and signs in their
    // accepted order, loosely.
    let eat_tail = |p: &mut usize| {
        loop {
            let save = *p;
            if eat(p, cat::AS)
                || eat_any(p, &[cat::MY, cat::MR, cat::MW, cat::MH])
                || eat_any(p, &[cat::V_PRE, cat::V_ABV, cat::V_BLW, cat::V_PST])
                || eat_any(p, &[cat::A, cat::PT, cat::SM, cat::VS])
                || eat_any(p, &[cat::ZWJ, cat::ZWNJ])
            {
                continue;
            }
            *p = save;
            break;
        }
    };

    let mut serial = 1u8;
    let mut has_broken = false;
    let mut p = 0;
    while p < cats.len() {
        let start = p;

        // Optional kinzi: Ra + asat + halant.
        {
            let save = p;
            if !(eat(&mut p, cat::RA) && eat(&mut p, cat::AS) && eat(&mut p, cat::H)) {
                p = save;
            }
        }

        let kind = if eat_any(&mut p, &[cat::C, cat::IV, cat::RA, cat::GB, cat::DC, cat::D]) {
            // Halant-joined consonant chain.
            loop {
                let save = p;
                if eat(&mut p, cat::H)
                    && eat_any(&mut p, &[cat::C, cat::IV, cat::RA])
                {
                    continue;
                }
                p = save;
                break;
            }
            eat_tail(&mut p);
            SyllableType::ConsonantSyllable
        } else {
            eat_tail(&mut p);
            if p > start {
                has_broken = true;
                SyllableType::BrokenCluster
            } else {
                p = start + 1;
                SyllableType::NonMyanmarCluster
            }
        };

        found_syllable(buffer, start, p, &mut serial, kind as u8);
    }

    if has_broken {
        buffer.scratch_flags |= crate::buffer::scratch_flags::HAS_BROKEN_SYLLABLE;
    }
}

fn setup_syllables(_: &ShapePlan, _: &Face, buffer: &mut Buffer) -> bool {
    find_syllables_myanmar(buffer);
    let mut start = 0;
    while start < buffer.len {
        let end = buffer.next_syllable(start);
        buffer.unsafe_to_break(Some(start), Some(end));
        start = end;
    }
    false
}

fn reorder_myanmar(_: &ShapePlan, face: &Face, buffer: &mut Buffer) -> bool {
    let ret = crate::ot_shaper_syllabic::insert_dotted_circles(
        face,
        buffer,
        SyllableType::BrokenCluster as u8,
        cat::DC,
        None,
        None,
    );

    let mut start = 0;
    while start < buffer.len {
        let end = buffer.next_syllable(start);
        let syllable_type = buffer.info[start].syllable & 0x0F;
        if syllable_type == SyllableType::ConsonantSyllable as u8
            || syllable_type == SyllableType::BrokenCluster as u8
        {
            reorder_syllable_myanmar(buffer, start, end);
        }
        start = end;
    }
    ret
}

fn reorder_syllable_myanmar(buffer: &mut Buffer, start: usize, end: usize) {
    let mut base = end;
    let mut has_kinzi = false;

    {
        let mut limit = start;
        if start + 3 <= end
            && buffer.info[start].myanmar_category() == cat::RA
            && buffer.info[start + 1].myanmar_category() == cat::AS
            && buffer.info[start + 2].myanmar_category() == cat::H
        {
            limit += 3;
            base = start;
            has_kinzi = true;
        }

        if !has_kinzi {
            base = limit;
        }
        for i in limit..end {
            if buffer.info[i].is_myanmar_consonant() {
                base = i;
                break;
            }
        }
    }

    // Assign positions, then sort into visual order.
    let mut i = start;
    let kinzi_end = if has_kinzi { start + 3 } else { start };
    while i < kinzi_end {
        buffer.info[i].shaper_aux = pos::AFTER_MAIN;
        i += 1;
    }
    while i < base {
        buffer.info[i].shaper_aux = pos::PRE_C;
        i += 1;
    }
    if i < end {
        buffer.info[i].shaper_aux = pos::BASE_C;
        i += 1;
    }

    let mut current_pos = pos::AFTER_MAIN;
    while i < end {
        let category = buffer.info[i].myanmar_category();

        if category == cat::MR {
            // Medial Ra is visually pre-base.
            buffer.info[i].shaper_aux = pos::PRE_C;
            i += 1;
            continue;
        }
        if category == cat::V_PRE {
            buffer.info[i].shaper_aux = pos::PRE_M;
            i += 1;
            continue;
        }
        if category == cat::VS {
            // A variation selector sticks to what it selects.
            buffer.info[i].shaper_aux = buffer.info[i - 1].shaper_aux;
            i += 1;
            continue;
        }

        if current_pos == pos::AFTER_MAIN && category == cat::V_BLW {
            current_pos = pos::BELOW_C;
            buffer.info[i].shaper_aux = current_pos;
            i += 1;
            continue;
        }
        if current_pos == pos::BELOW_C && category == cat::A {
            buffer.info[i].shaper_aux = pos::BEFORE_SUB;
            i += 1;
            continue;
        }
        if current_pos == pos::BELOW_C && category == cat::V_BLW {
            buffer.info[i].shaper_aux = current_pos;
            i += 1;
            continue;
        }
        if current_pos == pos::BELOW_C && category != cat::A {
            current_pos = pos::AFTER_SUB;
            buffer.info[i].shaper_aux = current_pos;
            i += 1;
            continue;
        }

        buffer.info[i].shaper_aux = current_pos;
        i += 1;
    }

    buffer.sort(start, end, |a, b| a.shaper_aux.cmp(&b.shaper_aux));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medial_ra_reorders_before_base() {
        // KA + MEDIAL RA: medial ra becomes visually pre-base.
        let mut buffer = Buffer::new();
        for (i, u) in [0x1000u32, 0x103C].iter().enumerate() {
            buffer.add(*u, i as u32);
        }
        for info in &mut buffer.info {
            info.shaper_category = myanmar_category(info.glyph_id);
            info.shaper_aux = pos::END;
        }
        find_syllables_myanmar(&mut buffer);
        reorder_syllable_myanmar(&mut buffer, 0, 2);

        let glyphs: Vec<_> = buffer.info.iter().map(|i| i.glyph_id).collect();
        assert_eq!(glyphs, [0x103C, 0x1000]);
    }

    #[test]
    fn kinzi_is_one_syllable() {
        // NGA + ASAT + VIRAMA + GA: the kinzi joins the syllable.
        let mut buffer = Buffer::new();
        for (i, u) in [0x1004u32, 0x103A, 0x1039, 0x1002].iter().enumerate() {
            buffer.add(*u, i as u32);
        }
        for info in &mut buffer.info {
            info.shaper_category = myanmar_category(info.glyph_id);
        }
        find_syllables_myanmar(&mut buffer);
        assert_eq!(buffer.next_syllable(0), 4);
    }

    #[test]
    fn categories() {
        assert_eq!(myanmar_category(0x101B), cat::RA);
        assert_eq!(myanmar_category(0x1031), cat::V_PRE);
        assert_eq!(myanmar_category(0x103A), cat::AS);
        assert_eq!(myanmar_category(0x1039), cat::H);
    }
}
