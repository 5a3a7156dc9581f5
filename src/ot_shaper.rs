//! The pluggable complex-shaper set and script categorization.
//!
//! The set is closed and known at build time, so shapers are static
//! dispatch tables.

use alloc::boxed::Box;
use core::any::Any;

use crate::buffer::Buffer;
use crate::common::{Direction, Script, Tag};
use crate::face::Face;
use crate::ot_shape_normalize::{NormalizationMode, NormalizeContext};
use crate::ot_shape_plan::{ShapePlan, ShapePlanner};
use crate::script;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ZeroWidthMarksMode {
    None,
    ByGdefEarly,
    ByGdefLate,
}

pub struct ComplexShaper {
    /// Inject script features and GSUB/GPOS pauses, called during planning.
    pub collect_features: Option<fn(&mut ShapePlanner)>,
    /// Disable features unsuitable for the script, called after user
    /// features are collected.
    pub override_features: Option<fn(&mut ShapePlanner)>,
    /// Allocate per-plan data (mask arrays, sub-plans).
    pub create_data: Option<fn(&ShapePlan) -> Box<dyn Any + Send + Sync>>,
    /// Runs before the normalizer.
    pub preprocess_text: Option<fn(&ShapePlan, &Face, &mut Buffer)>,
    /// Runs at the very end of shaping.
    pub postprocess_glyphs: Option<fn(&ShapePlan, &Face, &mut Buffer)>,
    pub normalization_mode: NormalizationMode,
    pub decompose: Option<fn(&NormalizeContext, char) -> Option<(char, char)>>,
    pub compose: Option<fn(&NormalizeContext, char, char) -> Option<char>>,
    /// Tag each glyph with the category byte the syllable finder reads.
    pub setup_masks: Option<fn(&ShapePlan, &Face, &mut Buffer)>,
    /// Overrides the script tag used for GPOS selection.
    pub gpos_tag: Option<Tag>,
    pub reorder_marks: Option<fn(&ShapePlan, &mut Buffer, usize, usize)>,
    pub zero_width_marks: ZeroWidthMarksMode,
    pub fallback_position: bool,
}

pub const DEFAULT_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: None,
    override_features: None,
    create_data: None,
    preprocess_text: None,
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::Auto,
    decompose: None,
    compose: None,
    setup_masks: None,
    gpos_tag: None,
    reorder_marks: None,
    zero_width_marks: ZeroWidthMarksMode::ByGdefLate,
    fallback_position: true,
};

/// Used when applying morx: shaping rules stay out of the way entirely.
pub const DUMBER_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: None,
    override_features: None,
    create_data: None,
    preprocess_text: None,
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::None,
    decompose: None,
    compose: None,
    setup_masks: None,
    gpos_tag: None,
    reorder_marks: None,
    zero_width_marks: ZeroWidthMarksMode::None,
    fallback_position: false,
};

/// Selects the shaper for a script, taking the chosen GSUB script tag and
/// direction into account.
pub fn categorize(
    script: Option<Script>,
    direction: Direction,
    chosen_gsub_script: Option<Tag>,
) -> &'static ComplexShaper {
    let Some(script) = script else {
        return &DEFAULT_SHAPER;
    };

    let dflt = Tag::new(b"DFLT");
    let latn = Tag::new(b"latn");

    // If the font was designed for the default script, or we arbitrarily
    // picked latn, the font does not intend complex treatment.
    let generic_font =
        chosen_gsub_script == Some(dflt) || chosen_gsub_script == Some(latn) || chosen_gsub_script.is_none();

    match script {
        // Arabic shaping has a fallback implementation, so the Arabic shaper
        // runs even without an OT script tag; but only horizontally.
        script::ARABIC | script::SYRIAC => {
            if (script == script::ARABIC || !generic_font) && direction.is_horizontal() {
                &crate::ot_shaper_arabic::ARABIC_SHAPER
            } else {
                &DEFAULT_SHAPER
            }
        }

        script::THAI | script::LAO => &crate::ot_shaper_thai::THAI_SHAPER,
        script::HANGUL => &crate::ot_shaper_hangul::HANGUL_SHAPER,
        script::HEBREW => &crate::ot_shaper_hebrew::HEBREW_SHAPER,

        script::BENGALI
        | script::DEVANAGARI
        | script::GUJARATI
        | script::GURMUKHI
        | script::KANNADA
        | script::MALAYALAM
        | script::ORIYA
        | script::TAMIL
        | script::TELUGU
        | script::SINHALA => {
            if generic_font {
                &DEFAULT_SHAPER
            } else {
                &crate::ot_shaper_indic::INDIC_SHAPER
            }
        }

        script::KHMER => {
            if generic_font {
                &DEFAULT_SHAPER
            } else {
                &crate::ot_shaper_khmer::KHMER_SHAPER
            }
        }

        script::MYANMAR => {
            // Only the second-generation spec tag gets the Myanmar shaper;
            // fonts designed for the original 'mymr' tag predate the spec.
            if chosen_gsub_script == Some(Tag::new(b"mym2")) {
                &crate::ot_shaper_myanmar::MYANMAR_SHAPER
            } else {
                &DEFAULT_SHAPER
            }
        }

        // Tibetan has no dedicated reordering; the default shaper with
        // Unicode normalization is the specified behaviour.
        script::TIBETAN => &DEFAULT_SHAPER,

        // Everything else with complex cluster behaviour goes through the
        // Universal Shaping Engine.
        script::BUHID
        | script::HANUNOO
        | script::TAGALOG
        | script::TAGBANWA
        | script::LIMBU
        | script::TAI_LE
        | script::BUGINESE
        | script::KHAROSHTHI
        | script::NEW_TAI_LUE
        | script::BALINESE
        | script::MONGOLIAN
        | script::NKO
        | script::PHAGS_PA
        | script::CHAM
        | script::KAYAH_LI
        | script::LEPCHA
        | script::REJANG
        | script::SAURASHTRA
        | script::SUNDANESE
        | script::JAVANESE
        | script::KAITHI
        | script::MEETEI_MAYEK
        | script::TAI_THAM
        | script::TAI_VIET
        | script::BATAK
        | script::BRAHMI
        | script::MANDAIC
        | script::CHAKMA
        | script::SHARADA
        | script::TAKRI
        | script::DUPLOYAN
        | script::GRANTHA
        | script::KHOJKI
        | script::KHUDAWADI
        | script::MAHAJANI
        | script::MODI
        | script::PAHAWH_HMONG
        | script::PSALTER_PAHLAVI
        | script::SIDDHAM
        | script::TIRHUTA
        | script::AHOM
        | script::MULTANI
        | script::ADLAM
        | script::BHAIKSUKI
        | script::MARCHEN
        | script::NEWA
        | script::MASARAM_GONDI
        | script::SOYOMBO
        | script::ZANABAZAR_SQUARE
        | script::DOGRA
        | script::GUNJALA_GONDI
        | script::HANIFI_ROHINGYA
        | script::MAKASAR
        | script::MEDEFAIDRIN
        | script::OLD_SOGDIAN
        | script::SOGDIAN
        | script::ELYMAIC
        | script::NANDINAGARI
        | script::NYIAKENG_PUACHUE_HMONG
        | script::WANCHO
        | script::CHORASMIAN
        | script::DIVES_AKURU
        | script::KHITAN_SMALL_SCRIPT
        | script::YEZIDI
        | script::CYPRO_MINOAN
        | script::OLD_UYGHUR
        | script::TANGSA
        | script::TOTO
        | script::VITHKUQI
        | script::KAWI
        | script::NAG_MUNDARI
        | script::GARAY
        | script::TODHRI
        | script::TULU_TIGALARI => {
            if generic_font {
                &DEFAULT_SHAPER
            } else {
                &crate::ot_shaper_use::USE_SHAPER
            }
        }

        _ => &DEFAULT_SHAPER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorize_picks_specific_shapers() {
        let dev2 = Some(Tag::new(b"dev2"));
        let shaper = categorize(
            Some(script::DEVANAGARI),
            Direction::LeftToRight,
            dev2,
        );
        assert!(core::ptr::eq(shaper, &crate::ot_shaper_indic::INDIC_SHAPER));

        // A DFLT-designed font gets the default shaper even for Devanagari.
        let shaper = categorize(
            Some(script::DEVANAGARI),
            Direction::LeftToRight,
            Some(Tag::new(b"DFLT")),
        );
        assert!(core::ptr::eq(shaper, &DEFAULT_SHAPER));
    }

    #[test]
    fn arabic_is_horizontal_only() {
        let arab = Some(Tag::new(b"arab"));
        let shaper = categorize(Some(script::ARABIC), Direction::RightToLeft, arab);
        assert!(core::ptr::eq(
            shaper,
            &crate::ot_shaper_arabic::ARABIC_SHAPER
        ));

        let shaper = categorize(Some(script::ARABIC), Direction::TopToBottom, arab);
        assert!(core::ptr::eq(shaper, &DEFAULT_SHAPER));
    }

    #[test]
    fn myanmar_requires_second_generation_tag() {
        let shaper = categorize(
            Some(script::MYANMAR),
            Direction::LeftToRight,
            Some(Tag::new(b"mymr")),
        );
        assert!(core::ptr::eq(shaper, &DEFAULT_SHAPER));

        let shaper = categorize(
            Some(script::MYANMAR),
            Direction::LeftToRight,
            Some(Tag::new(b"mym2")),
        );
        assert!(core::ptr::eq(
            shaper,
            &crate::ot_shaper_myanmar::MYANMAR_SHAPER
        ));
    }
}
