//! Character categories for the Universal Shaping Engine, computed from
//! general category, combining class and per-script vowel data.

use crate::unicode::{canonical_combining_class, GeneralCategory};

pub type Category = u8;

#[allow(dead_code)]
pub mod category {
    pub const O: u8 = 0; // other
    pub const B: u8 = 1; // base
    pub const N: u8 = 4; // base with built-in virama
    pub const GB: u8 = 5; // generic base (placeholder)
    pub const CGJ: u8 = 6;
    pub const SUB: u8 = 11; // consonant subjoined
    pub const H: u8 = 12; // halant
    pub const HN: u8 = 13; // halant with built-in nukta
    pub const IS: u8 = 44; // invisible stacker
    pub const ZWNJ: u8 = 14;
    pub const ZWJ: u8 = 15;
    pub const R: u8 = 18; // repha
    pub const S: u8 = 19; // symbol
    pub const CS: u8 = 43; // consonant with stacker

    pub const V_ABV: u8 = 26;
    pub const V_BLW: u8 = 27;
    pub const V_PRE: u8 = 28;
    pub const V_PST: u8 = 29;
    pub const VM_ABV: u8 = 30;
    pub const VM_BLW: u8 = 31;
    pub const VM_PRE: u8 = 32;
    pub const VM_PST: u8 = 33;
    pub const F_ABV: u8 = 34;
    pub const F_BLW: u8 = 35;
    pub const F_PST: u8 = 36;
    pub const M_ABV: u8 = 37;
    pub const M_BLW: u8 = 38;
    pub const M_PRE: u8 = 39;
    pub const M_PST: u8 = 40;
    pub const CM_ABV: u8 = 41;
    pub const CM_BLW: u8 = 42;
    pub const SM_ABV: u8 = 45;
    pub const SM_BLW: u8 = 46;
    pub const VS: u8 = 47;
    pub const DOTTED_CIRCLE: u8 = 49;
}

/// Pre-base (visually left) dependent vowels outside the Indic blocks.
fn is_pre_base_vowel(u: u32) -> bool {
    matches!(
        u,
        // Balinese
        0x1B3E..=0x1B3F
        // Buginese
        | 0x1A19
        // Cham
        | 0xAA2F..=0xAA30
        // Javanese
        | 0xA9BA..=0xA9BB
        // Lepcha
        | 0x1C27..=0x1C28
        // Sundanese
        | 0x1BA6
        // Tai Tham
        | 0x1A55 | 0x1A6E..=0x1A72
        // Kaithi
        | 0x110B1
        // Sharada
        | 0x111B4
        // Khojki
        | 0x1122C
        // Grantha
        | 0x11347..=0x11348
        // Newa
        | 0x11437
        // Tirhuta
        | 0x114B1 | 0x114B9
        // Siddham
        | 0x115B0..=0x115B1
        // Modi
        | 0x11635
        // Takri
        | 0x116AE
    )
}

/// Invisible stackers: control characters that subjoin the next consonant.
fn is_invisible_stacker(u: u32) -> bool {
    matches!(
        u,
        0x1039  // Myanmar virama
        | 0x17D2 // Khmer coeng
        | 0x1A60 // Tai Tham sakot
        | 0x1BAB // Sundanese virama
        | 0xAAF6 // Meetei Mayek virama
        | 0x10A3F // Kharoshthi virama
        | 0x11133 // Chakma virama
        | 0x1193E // Dives Akuru virama
        | 0x11D45 // Masaram Gondi virama
        | 0x11D97 // Gunjala Gondi virama
    )
}

/// Repha characters: atomically encoded pre-base Ra forms.
fn is_repha(u: u32) -> bool {
    matches!(
        u,
        // Javanese
        0xA982
        // Balinese
        | 0x1B03
        // Sundanese
        | 0x1B80
        // Batak
        | 0x1BF2..=0x1BF3
        // Masaram Gondi
        | 0x11D46
        // Dives Akuru
        | 0x1193F
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_categories() {
        assert_eq!(get_category(0x200D), category::ZWJ);
        assert_eq!(get_category(0xA9A0), category::B); // Javanese letter
        assert_eq!(get_category(0xA9BA), category::V_PRE); // Javanese taling
        assert_eq!(get_category(0xA982), category::R); // Javanese cecak
        assert_eq!(get_category(0x1A60), category::IS); // Tai Tham sakot
    }
}

pub fn get_category(u: u32) -> Category {
    use category::*;

    match u {
        0x200C => return ZWNJ,
        0x200D => return ZWJ,
        0x034F => return CGJ,
        0x25CC => return DOTTED_CIRCLE,
        0x00A0 | 0x00D7 | 0x2012..=0x2014 | 0x2022 | 0x25FB..=0x25FE => return GB,
        0xFE00..=0xFE0F => return VS,
        _ => {}
    }

    if is_invisible_stacker(u) {
        return IS;
    }
    if is_repha(u) {
        return R;
    }

    let Some(c) = char::from_u32(u) else {
        return O;
    };
    let gc = GeneralCategory::of(c);
    let ccc = canonical_combining_class(c);

    if ccc == 9 {
        return H;
    }

    if gc.is_letter() {
        return B;
    }
    if gc == GeneralCategory::DECIMAL_NUMBER || gc == GeneralCategory::OTHER_NUMBER {
        return B;
    }
    if gc == GeneralCategory::OTHER_SYMBOL || gc == GeneralCategory::MODIFIER_SYMBOL {
        return O;
    }

    if gc == GeneralCategory::NON_SPACING_MARK {
        if is_pre_base_vowel(u) {
            return V_PRE;
        }
        return match ccc {
            220 => V_BLW,
            230 => V_ABV,
            0 => V_ABV,
            _ => V_ABV,
        };
    }

    if gc == GeneralCategory::SPACING_MARK {
        if is_pre_base_vowel(u) {
            return V_PRE;
        }
        return V_PST;
    }

    O
}
