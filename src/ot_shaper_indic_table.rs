//! Syllabic category and position classification for the Indic scripts and
//! Khmer. Computed from general category, combining class and per-script
//! vowel-sign data.

use crate::unicode::{canonical_combining_class, GeneralCategory};

pub type Category = u8;
pub type Position = u8;

#[allow(dead_code)]
pub mod category {
    pub const X: u8 = 0;
    pub const C: u8 = 1;
    pub const V: u8 = 2;
    pub const N: u8 = 3;
    pub const H: u8 = 4;
    pub const ZWNJ: u8 = 5;
    pub const ZWJ: u8 = 6;
    pub const M: u8 = 7;
    pub const SM: u8 = 8;
    /// Vedic signs and other post-syllable modifiers.
    pub const A: u8 = 9;
    pub const PLACEHOLDER: u8 = 10;
    pub const DOTTED_CIRCLE: u8 = 11;
    /// Register shifter, used in the Khmer OT spec.
    pub const RS: u8 = 12;
    /// Atomically-encoded logical or visual repha.
    pub const REPHA: u8 = 14;
    pub const RA: u8 = 15;
    /// Consonant medial.
    pub const CM: u8 = 16;
    /// Avagraha etc. that take marks.
    pub const SYMBOL: u8 = 17;
    pub const CS: u8 = 18;

    // Khmer.
    pub const V_ABV: u8 = 20;
    pub const V_BLW: u8 = 21;
    pub const V_PRE: u8 = 22;
    pub const V_PST: u8 = 23;
    pub const ROBATIC: u8 = 25;
    pub const X_GROUP: u8 = 26;
    pub const Y_GROUP: u8 = 27;
}

#[allow(dead_code)]
pub mod position {
    pub const START: u8 = 0;
    pub const RA_TO_BECOME_REPH: u8 = 1;
    pub const PRE_M: u8 = 2;
    pub const PRE_C: u8 = 3;
    pub const BASE_C: u8 = 4;
    pub const AFTER_MAIN: u8 = 5;
    pub const ABOVE_C: u8 = 6;
    pub const BEFORE_SUB: u8 = 7;
    pub const BELOW_C: u8 = 8;
    pub const AFTER_SUB: u8 = 9;
    pub const BEFORE_POST: u8 = 10;
    pub const POST_C: u8 = 11;
    pub const AFTER_POST: u8 = 12;
    pub const SMVD: u8 = 13;
    pub const END: u8 = 14;
}

#[derive(Clone, Copy, PartialEq)]
enum Side {
    Left,
    Top,
    Bottom,
    Right,
}

#[derive(Clone, Copy, PartialEq)]
enum Block {
    Deva,
    Beng,
    Guru,
    Gujr,
    Orya,
    Taml,
    Telu,
    Knda,
    Mlym,
    Sinh,
    Other,
}

fn block(u: u32) -> Block {
    match u {
        0x0900..=0x097F => Block::Deva,
        0x0980..=0x09FF => Block::Beng,
        0x0A00..=0x0A7F => Block::Guru,
        0x0A80..=0x0AFF => Block::Gujr,
        0x0B00..=0x0B7F => Block::Orya,
        0x0B80..=0x0BFF => Block::Taml,
        0x0C00..=0x0C7F => Block::Telu,
        0x0C80..=0x0CFF => Block::Knda,
        0x0D00..=0x0D7F => Block::Mlym,
        0x0D80..=0x0DFF => Block::Sinh,
        _ => Block::Other,
    }
}

/// Vowel-sign side, for signs that survive decomposition. Split matras are
/// decomposed by the normalizer before classification matters.
fn matra_side(u: u32) -> Side {
    match u {
        // Devanagari.
        0x093F | 0x094E => Side::Left,
        0x093A | 0x0945..=0x0948 | 0x0955 => Side::Top,
        0x0941..=0x0944 | 0x0956..=0x0957 | 0x0962..=0x0963 => Side::Bottom,

        // Bengali.
        0x09BF | 0x09C7..=0x09C8 => Side::Left,
        0x09C1..=0x09C4 | 0x09E2..=0x09E3 => Side::Bottom,

        // Gurmukhi.
        0x0A3F => Side::Left,
        0x0A47..=0x0A48 | 0x0A4B..=0x0A4C => Side::Top,
        0x0A41..=0x0A42 => Side::Bottom,

        // Gujarati.
        0x0ABF => Side::Left,
        0x0AC5 | 0x0AC7..=0x0AC8 => Side::Top,
        0x0AC1..=0x0AC4 | 0x0AE2..=0x0AE3 => Side::Bottom,

        // Oriya.
        0x0B47 => Side::Left,
        0x0B3F | 0x0B55..=0x0B56 => Side::Top,
        0x0B41..=0x0B44 | 0x0B62..=0x0B63 => Side::Bottom,

        // Tamil.
        0x0BC6..=0x0BC8 => Side::Left,
        0x0BC0 => Side::Top,

        // Telugu.
        0x0C3E..=0x0C40 | 0x0C46..=0x0C47 | 0x0C4A..=0x0C4C | 0x0C55 => Side::Top,
        0x0C56 | 0x0C62..=0x0C63 => Side::Bottom,

        // Kannada.
        0x0CBF | 0x0CC6 => Side::Top,
        0x0CCC | 0x0CE2..=0x0CE3 => Side::Bottom,

        // Malayalam.
        0x0D46..=0x0D48 => Side::Left,
        0x0D62..=0x0D63 => Side::Bottom,

        // Sinhala.
        0x0DD9..=0x0DDB => Side::Left,
        0x0DD2..=0x0DD3 => Side::Top,
        0x0DD4 | 0x0DD6 => Side::Bottom,

        _ => Side::Right,
    }
}

/// Where a vowel sign of a given visual side reorders to, per script.
fn matra_position(u: u32, side: Side) -> Position {
    use position::*;
    match side {
        Side::Left => PRE_M,
        Side::Top => match block(u) {
            Block::Deva => AFTER_SUB,
            Block::Guru => AFTER_POST, // deviate from the spec
            Block::Gujr => AFTER_SUB,
            Block::Orya => AFTER_MAIN,
            Block::Taml => AFTER_SUB,
            Block::Telu => BEFORE_SUB,
            Block::Knda => BEFORE_SUB,
            Block::Sinh => AFTER_SUB,
            _ => AFTER_SUB,
        },
        Side::Bottom => match block(u) {
            Block::Deva => AFTER_SUB,
            Block::Beng => AFTER_SUB,
            Block::Guru => AFTER_POST,
            Block::Gujr => AFTER_POST,
            Block::Orya => AFTER_SUB,
            Block::Taml => AFTER_POST,
            Block::Telu | Block::Knda => BEFORE_SUB,
            Block::Mlym => AFTER_POST,
            Block::Sinh => AFTER_SUB,
            _ => AFTER_SUB,
        },
        Side::Right => match block(u) {
            Block::Deva => AFTER_SUB,
            Block::Beng => AFTER_POST,
            Block::Guru => AFTER_POST,
            Block::Gujr => AFTER_POST,
            Block::Orya => AFTER_POST,
            Block::Taml => AFTER_POST,
            Block::Telu => {
                if u <= 0x0C42 {
                    BEFORE_SUB
                } else {
                    AFTER_SUB
                }
            }
            Block::Knda => {
                if !(0x0CC3..=0x0CD6).contains(&u) {
                    BEFORE_SUB
                } else {
                    AFTER_SUB
                }
            }
            Block::Mlym => AFTER_POST,
            Block::Sinh => AFTER_SUB,
            _ => AFTER_SUB,
        },
    }
}

fn is_ra(u: u32) -> bool {
    matches!(
        u,
        0x0930 | 0x09B0 | 0x09F0 | 0x0A30 | 0x0AB0 | 0x0B30 | 0x0BB0 | 0x0C30 | 0x0CB0 | 0x0D30
            | 0x0DBB | 0x179A
    )
}

fn khmer_categories(u: u32) -> (Category, Position) {
    use category::*;
    use position::*;

    let (cat, pos) = match u {
        0x1780..=0x17A2 => {
            if is_ra(u) {
                (RA, BASE_C)
            } else {
                (C, BASE_C)
            }
        }
        0x17A3..=0x17B3 => (V, BASE_C), // independent vowels
        0x17B6 => (V_PST, AFTER_POST),
        0x17B7..=0x17BA => (V_ABV, ABOVE_C),
        0x17BB..=0x17BD => (V_BLW, BELOW_C),
        0x17BE..=0x17C0 | 0x17C4..=0x17C5 => (V_PST, AFTER_POST), // splits, decomposed
        0x17C1..=0x17C3 => (V_PRE, PRE_M),
        0x17C6 => (X_GROUP, ABOVE_C), // nikahit
        0x17C7..=0x17C8 => (Y_GROUP, AFTER_POST),
        0x17C9..=0x17CA => (ROBATIC, ABOVE_C), // register shifters
        0x17CB | 0x17CD..=0x17D1 | 0x17DD => (X_GROUP, ABOVE_C),
        0x17CC => (ROBATIC, ABOVE_C),
        0x17D2 => (H, BASE_C), // coeng
        0x17D3 => (X_GROUP, ABOVE_C),
        0x17DC => (SYMBOL, SMVD),
        0x17E0..=0x17E9 => (PLACEHOLDER, BASE_C), // digits
        _ => (X, END),
    };
    (cat, pos)
}

/// Returns `(category, position)` for a scalar value.
pub fn get_categories(u: u32) -> (Category, Position) {
    use category::*;
    use position::*;

    // Joiners and generic placeholders first.
    match u {
        0x200C => return (ZWNJ, END),
        0x200D => return (ZWJ, END),
        0x25CC => return (DOTTED_CIRCLE, BASE_C),
        0x00A0 | 0x00D7 | 0x2010..=0x2014 | 0x2022 | 0x25FB..=0x25FE => {
            return (PLACEHOLDER, BASE_C)
        }
        _ => {}
    }

    if (0x1780..=0x17FF).contains(&u) {
        return khmer_categories(u);
    }

    if !(0x0900..=0x0DFF).contains(&u) {
        // Vedic extensions attach to syllables of the main blocks.
        if (0x1CD0..=0x1CFF).contains(&u) || (0xA8E0..=0xA8FF).contains(&u) {
            return (A, SMVD);
        }
        return (X, END);
    }

    let c = char::from_u32(u).unwrap_or('\u{0}');
    let gc = GeneralCategory::of(c);
    let ccc = canonical_combining_class(c);

    // Nukta and virama have stable combining classes across all scripts.
    if ccc == 7 {
        return (N, END);
    }
    if ccc == 9 {
        return (H, BASE_C);
    }

    let low = u & 0x7F;

    // Syllable modifiers: bindus and visarga sit in the x00..x03 columns;
    // the Vedic tone marks follow the OM sign.
    if low <= 0x03 && gc.is_mark() {
        return (SM, SMVD);
    }
    match u {
        0x0951..=0x0954 => return (A, SMVD),
        0x093D | 0x09BD | 0x0ABD | 0x0B3D | 0x0C3D | 0x0CBD | 0x0D3D => return (SYMBOL, SMVD),
        // Consonants with nukta that don't decompose (Dravidian zha etc.)
        // still behave as consonants; handled by the letter check below.
        _ => {}
    }

    // Digits and fillers act as placeholders so marks can attach to them.
    if gc == GeneralCategory::DECIMAL_NUMBER {
        return (PLACEHOLDER, BASE_C);
    }

    if gc.is_letter() {
        // Independent vowels occupy the columns before the consonants in
        // every Brahmic block.
        let is_vowel = matches!(
            low,
            0x04..=0x14
        ) || matches!(u, 0x0960..=0x0961 | 0x09E0..=0x09E1 | 0x0A60..=0x0A61
            | 0x0AE0..=0x0AE1 | 0x0B60..=0x0B61 | 0x0C60..=0x0C61 | 0x0CE0..=0x0CE1
            | 0x0D60..=0x0D61 | 0x0972..=0x0977);

        if is_vowel {
            return (V, BASE_C);
        }
        if is_ra(u) {
            return (RA, BASE_C);
        }
        // Malayalam chillus are consonants that carry their own virama.
        return (C, BASE_C);
    }

    if gc.is_mark() {
        // Everything left is a dependent vowel sign.
        let side = matra_side(u);
        return (M, matra_position(u, side));
    }

    (X, END)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devanagari_basics() {
        assert_eq!(get_categories(0x0915).0, category::C); // KA
        assert_eq!(get_categories(0x0930).0, category::RA); // RA
        assert_eq!(get_categories(0x094D), (category::H, position::BASE_C)); // virama
        assert_eq!(get_categories(0x093C).0, category::N); // nukta
        assert_eq!(get_categories(0x0905).0, category::V); // A
        assert_eq!(get_categories(0x0902).0, category::SM); // anusvara
    }

    #[test]
    fn devanagari_left_matra() {
        // Vowel sign I reorders to the left of the base.
        let (cat, pos) = get_categories(0x093F);
        assert_eq!(cat, category::M);
        assert_eq!(pos, position::PRE_M);
    }

    #[test]
    fn devanagari_right_matra() {
        let (cat, pos) = get_categories(0x093E);
        assert_eq!(cat, category::M);
        assert_eq!(pos, position::AFTER_SUB);
    }

    #[test]
    fn khmer_coeng_and_ro() {
        assert_eq!(get_categories(0x17D2).0, category::H);
        assert_eq!(get_categories(0x179A).0, category::RA);
        assert_eq!(get_categories(0x17C1).0, category::V_PRE);
        assert_eq!(get_categories(0x17B6).0, category::V_PST);
    }

    #[test]
    fn joiners() {
        assert_eq!(get_categories(0x200C).0, category::ZWNJ);
        assert_eq!(get_categories(0x200D).0, category::ZWJ);
    }
}
