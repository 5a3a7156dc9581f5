//! Character properties as the shaper consumes them.
//!
//! The Unicode database itself comes from the unicode-* crates; this module
//! folds it into the compact per-glyph property encoding and adds the
//! shaping-specific reinterpretations (modified combining classes, space
//! fallback types, default-ignorable handling).

use unicode_general_category::{get_general_category, GeneralCategory as Gc};

/// A Unicode general category, in the order the glyph-property byte encodes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct GeneralCategory(pub u8);

#[allow(unused)]
impl GeneralCategory {
    pub const CONTROL: Self = Self(0);
    pub const FORMAT: Self = Self(1);
    pub const UNASSIGNED: Self = Self(2);
    pub const PRIVATE_USE: Self = Self(3);
    pub const SURROGATE: Self = Self(4);
    pub const LOWERCASE_LETTER: Self = Self(5);
    pub const MODIFIER_LETTER: Self = Self(6);
    pub const OTHER_LETTER: Self = Self(7);
    pub const TITLECASE_LETTER: Self = Self(8);
    pub const UPPERCASE_LETTER: Self = Self(9);
    pub const SPACING_MARK: Self = Self(10);
    pub const ENCLOSING_MARK: Self = Self(11);
    pub const NON_SPACING_MARK: Self = Self(12);
    pub const DECIMAL_NUMBER: Self = Self(13);
    pub const LETTER_NUMBER: Self = Self(14);
    pub const OTHER_NUMBER: Self = Self(15);
    pub const CONNECT_PUNCTUATION: Self = Self(16);
    pub const DASH_PUNCTUATION: Self = Self(17);
    pub const CLOSE_PUNCTUATION: Self = Self(18);
    pub const FINAL_PUNCTUATION: Self = Self(19);
    pub const INITIAL_PUNCTUATION: Self = Self(20);
    pub const OTHER_PUNCTUATION: Self = Self(21);
    pub const OPEN_PUNCTUATION: Self = Self(22);
    pub const CURRENCY_SYMBOL: Self = Self(23);
    pub const MODIFIER_SYMBOL: Self = Self(24);
    pub const MATH_SYMBOL: Self = Self(25);
    pub const OTHER_SYMBOL: Self = Self(26);
    pub const LINE_SEPARATOR: Self = Self(27);
    pub const PARAGRAPH_SEPARATOR: Self = Self(28);
    pub const SPACE_SEPARATOR: Self = Self(29);
}

impl GeneralCategory {
    pub fn of(c: char) -> Self {
        match get_general_category(c) {
            Gc::Control => Self::CONTROL,
            Gc::Format => Self::FORMAT,
            Gc::Unassigned => Self::UNASSIGNED,
            Gc::PrivateUse => Self::PRIVATE_USE,
            Gc::Surrogate => Self::SURROGATE,
            Gc::LowercaseLetter => Self::LOWERCASE_LETTER,
            Gc::ModifierLetter => Self::MODIFIER_LETTER,
            Gc::OtherLetter => Self::OTHER_LETTER,
            Gc::TitlecaseLetter => Self::TITLECASE_LETTER,
            Gc::UppercaseLetter => Self::UPPERCASE_LETTER,
            Gc::SpacingMark => Self::SPACING_MARK,
            Gc::EnclosingMark => Self::ENCLOSING_MARK,
            Gc::NonspacingMark => Self::NON_SPACING_MARK,
            Gc::DecimalNumber => Self::DECIMAL_NUMBER,
            Gc::LetterNumber => Self::LETTER_NUMBER,
            Gc::OtherNumber => Self::OTHER_NUMBER,
            Gc::ConnectorPunctuation => Self::CONNECT_PUNCTUATION,
            Gc::DashPunctuation => Self::DASH_PUNCTUATION,
            Gc::ClosePunctuation => Self::CLOSE_PUNCTUATION,
            Gc::FinalPunctuation => Self::FINAL_PUNCTUATION,
            Gc::InitialPunctuation => Self::INITIAL_PUNCTUATION,
            Gc::OtherPunctuation => Self::OTHER_PUNCTUATION,
            Gc::OpenPunctuation => Self::OPEN_PUNCTUATION,
            Gc::CurrencySymbol => Self::CURRENCY_SYMBOL,
            Gc::ModifierSymbol => Self::MODIFIER_SYMBOL,
            Gc::MathSymbol => Self::MATH_SYMBOL,
            Gc::OtherSymbol => Self::OTHER_SYMBOL,
            Gc::LineSeparator => Self::LINE_SEPARATOR,
            Gc::ParagraphSeparator => Self::PARAGRAPH_SEPARATOR,
            Gc::SpaceSeparator => Self::SPACE_SEPARATOR,
        }
    }

    #[inline]
    pub fn to_u8(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn is_mark(self) -> bool {
        matches!(
            self,
            Self::SPACING_MARK | Self::ENCLOSING_MARK | Self::NON_SPACING_MARK
        )
    }

    #[inline]
    pub fn is_letter(self) -> bool {
        matches!(
            self,
            Self::LOWERCASE_LETTER
                | Self::MODIFIER_LETTER
                | Self::OTHER_LETTER
                | Self::TITLECASE_LETTER
                | Self::UPPERCASE_LETTER
        )
    }
}

#[allow(unused)]
pub mod combining_class {
    pub const NOT_REORDERED: u8 = 0;
    pub const OVERLAY: u8 = 1;
    pub const NUKTA: u8 = 7;
    pub const KANA_VOICING: u8 = 8;
    pub const VIRAMA: u8 = 9;
    pub const ATTACHED_BELOW_LEFT: u8 = 200;
    pub const ATTACHED_BELOW: u8 = 202;
    pub const ATTACHED_ABOVE: u8 = 214;
    pub const ATTACHED_ABOVE_RIGHT: u8 = 216;
    pub const BELOW_LEFT: u8 = 218;
    pub const BELOW: u8 = 220;
    pub const BELOW_RIGHT: u8 = 222;
    pub const LEFT: u8 = 224;
    pub const RIGHT: u8 = 226;
    pub const ABOVE_LEFT: u8 = 228;
    pub const ABOVE: u8 = 230;
    pub const ABOVE_RIGHT: u8 = 232;
    pub const DOUBLE_BELOW: u8 = 233;
    pub const DOUBLE_ABOVE: u8 = 234;
    pub const IOTA_SUBSCRIPT: u8 = 240;
    pub const INVALID: u8 = 255;
}

pub fn canonical_combining_class(c: char) -> u8 {
    unicode_ccc::get_canonical_combining_class(c) as u8
}

/// Modified combining class.
///
/// The fixed-position classes of Hebrew, Arabic, Syriac, Telugu, Thai, Lao
/// and Tibetan are permuted so that sorting by this value yields the mark
/// order shaping wants, not the Unicode canonical order.
pub fn modified_combining_class(c: char) -> u8 {
    let mut cc = canonical_combining_class(c);

    // Thai SARA AM decomposes into NIKHAHIT + SARA AA and the NIKHAHIT part
    // needs to reorder before tone marks, which it can't with ccc=0.
    if c == '\u{0E33}' || c == '\u{0EB3}' {
        cc = 3;
    }

    match cc {
        // Hebrew, in the SBL manual order.
        10 => 22, // sheva
        11 => 15, // hataf segol
        12 => 16, // hataf patah
        13 => 17, // hataf qamats
        14 => 23, // hiriq
        15 => 18, // tsere
        16 => 19, // segol
        17 => 20, // patah
        18 => 21, // qamats
        19 => 14, // holam
        20 => 24, // qubuts
        21 => 12, // dagesh
        22 => 25, // meteg
        23 => 13, // rafe
        24 => 10, // shin dot
        25 => 11, // sin dot
        26 => 26, // point varika

        // Arabic: shadda before vowel marks.
        27 => 28, // fathatan
        28 => 29, // dammatan
        29 => 30, // kasratan
        30 => 31, // fatha
        31 => 32, // damma
        32 => 33, // kasra
        33 => 27, // shadda
        34 => 34, // sukun
        35 => 35, // superscript alef
        36 => 36, // superscript alaph

        // Telugu length marks, feared to be buggy in fonts; don't reorder.
        84 => 0,
        91 => 0,

        // Thai and Lao: sara u / sara u below tone marks.
        103 => 3,
        107 => 107,
        118 => 3,
        122 => 122,

        // Tibetan.
        129 => 129,
        130 => 132,
        132 => 131,

        other => other,
    }
}

pub fn mirror_char(c: char) -> Option<char> {
    unicode_bidi_mirroring::get_mirrored(c)
}

pub fn compose(a: char, b: char) -> Option<char> {
    unicode_normalization::char::compose(a, b)
}

/// Single canonical decomposition step, `ab -> (a, b)`.
pub fn decompose(ab: char) -> Option<(char, char)> {
    let mut parts = smallvec::SmallVec::<[char; 4]>::new();
    unicode_normalization::char::decompose_canonical(ab, |c| parts.push(c));
    match parts.as_slice() {
        [] | [_] => None,
        [a, b] => {
            if *a == ab {
                None
            } else {
                Some((*a, *b))
            }
        }
        [head @ .., last] => {
            // The canonical decomposition always recurses through the first
            // character, so recomposing the head recovers the one-step pair.
            let mut a = head[0];
            for c in &head[1..] {
                a = compose(a, *c)?;
            }
            Some((a, *last))
        }
    }
}

pub mod space {
    pub type Type = u8;
    pub const NOT_SPACE: u8 = 0;
    pub const EM: u8 = 1;
    pub const EM_2: u8 = 2;
    pub const EM_3: u8 = 3;
    pub const EM_4: u8 = 4;
    pub const EM_5: u8 = 5;
    pub const EM_6: u8 = 6;
    pub const EM_16: u8 = 16;
    pub const EM_4_18: u8 = 17; // 4/18th of an EM
    pub const SPACE: u8 = 18;
    pub const FIGURE: u8 = 19;
    pub const PUNCTUATION: u8 = 20;
    pub const NARROW: u8 = 21;
}

/// Classifies a space separator for advance synthesis when the font has no
/// glyph for it.
pub fn space_fallback(c: char) -> space::Type {
    match c {
        '\u{2000}' | '\u{2002}' => space::EM_2, // EN QUAD, EN SPACE
        '\u{2001}' | '\u{2003}' => space::EM,   // EM QUAD, EM SPACE
        '\u{2004}' => space::EM_3,
        '\u{2005}' => space::EM_4,
        '\u{2006}' => space::EM_6,
        '\u{2007}' => space::FIGURE,
        '\u{2008}' => space::PUNCTUATION,
        '\u{2009}' => space::EM_5, // THIN SPACE
        '\u{200A}' => space::EM_16, // HAIR SPACE
        '\u{202F}' => space::NARROW,
        '\u{205F}' => space::EM_4_18, // MEDIUM MATHEMATICAL SPACE
        '\u{3000}' => space::EM,
        '\u{0020}' | '\u{00A0}' | '\u{1680}' => space::SPACE,
        _ => space::NOT_SPACE,
    }
}

pub fn is_default_ignorable(c: char) -> bool {
    let c = c as u32;
    match c >> 16 {
        0 => matches!(
            c,
            0x00AD
                | 0x034F
                | 0x061C
                | 0x115F..=0x1160
                | 0x17B4..=0x17B5
                | 0x180B..=0x180F
                | 0x200B..=0x200F
                | 0x202A..=0x202E
                | 0x2060..=0x206F
                | 0x3164
                | 0xFE00..=0xFE0F
                | 0xFEFF
                | 0xFFA0
                | 0xFFF0..=0xFFF8
        ),
        1 => matches!(c, 0x1BCA0..=0x1BCA3 | 0x1D173..=0x1D17A),
        14 => (0xE0000..=0xE0FFF).contains(&c),
        _ => false,
    }
}

pub fn is_zwnj(c: char) -> bool {
    c == '\u{200C}'
}

pub fn is_zwj(c: char) -> bool {
    c == '\u{200D}'
}

/// Regional indicators and emoji modifiers extend the preceding cluster.
pub fn is_emoji_extended_pictographic(c: char) -> bool {
    // Keep the check narrow: only what cluster forming consults.
    matches!(c as u32, 0x1F3FB..=0x1F3FF | 0xFE0F | 0x200D)
}

/// The vertical presentation form of a character, when there is one.
pub fn vert_char_for(u: char) -> char {
    match u {
        '\u{2013}' => '\u{FE32}', // EN DASH
        '\u{2014}' => '\u{FE31}', // EM DASH
        '\u{2025}' => '\u{FE30}', // TWO DOT LEADER
        '\u{2026}' => '\u{FE19}', // HORIZONTAL ELLIPSIS
        '\u{3001}' => '\u{FE11}', // IDEOGRAPHIC COMMA
        '\u{3002}' => '\u{FE12}', // IDEOGRAPHIC FULL STOP
        '\u{3008}' => '\u{FE3F}', // LEFT ANGLE BRACKET
        '\u{3009}' => '\u{FE40}', // RIGHT ANGLE BRACKET
        '\u{300A}' => '\u{FE3D}', // LEFT DOUBLE ANGLE BRACKET
        '\u{300B}' => '\u{FE3E}', // RIGHT DOUBLE ANGLE BRACKET
        '\u{300C}' => '\u{FE41}', // LEFT CORNER BRACKET
        '\u{300D}' => '\u{FE42}', // RIGHT CORNER BRACKET
        '\u{300E}' => '\u{FE43}', // LEFT WHITE CORNER BRACKET
        '\u{300F}' => '\u{FE44}', // RIGHT WHITE CORNER BRACKET
        '\u{3010}' => '\u{FE3B}', // LEFT BLACK LENTICULAR BRACKET
        '\u{3011}' => '\u{FE3C}', // RIGHT BLACK LENTICULAR BRACKET
        '\u{3014}' => '\u{FE39}', // LEFT TORTOISE SHELL BRACKET
        '\u{3015}' => '\u{FE3A}', // RIGHT TORTOISE SHELL BRACKET
        '\u{3016}' => '\u{FE17}', // LEFT WHITE LENTICULAR BRACKET
        '\u{3017}' => '\u{FE18}', // RIGHT WHITE LENTICULAR BRACKET
        '\u{FE4F}' => '\u{FE34}', // WAVY LOW LINE
        '\u{FF01}' => '\u{FE15}', // FULLWIDTH EXCLAMATION MARK
        '\u{FF08}' => '\u{FE35}', // FULLWIDTH LEFT PARENTHESIS
        '\u{FF09}' => '\u{FE36}', // FULLWIDTH RIGHT PARENTHESIS
        '\u{FF0C}' => '\u{FE10}', // FULLWIDTH COMMA
        '\u{FF1A}' => '\u{FE13}', // FULLWIDTH COLON
        '\u{FF1B}' => '\u{FE14}', // FULLWIDTH SEMICOLON
        '\u{FF1F}' => '\u{FE16}', // FULLWIDTH QUESTION MARK
        '\u{FF3B}' => '\u{FE47}', // FULLWIDTH LEFT SQUARE BRACKET
        '\u{FF3D}' => '\u{FE48}', // FULLWIDTH RIGHT SQUARE BRACKET
        '\u{FF3F}' => '\u{FE33}', // FULLWIDTH LOW LINE
        '\u{FF5B}' => '\u{FE37}', // FULLWIDTH LEFT CURLY BRACKET
        '\u{FF5D}' => '\u{FE38}', // FULLWIDTH RIGHT CURLY BRACKET
        _ => u,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_category() {
        assert_eq!(GeneralCategory::of('a'), GeneralCategory::LOWERCASE_LETTER);
        assert_eq!(GeneralCategory::of('\u{093F}'), GeneralCategory::SPACING_MARK);
        assert_eq!(
            GeneralCategory::of('\u{200D}'),
            GeneralCategory::FORMAT
        );
        assert!(GeneralCategory::of('\u{0301}').is_mark());
    }

    #[test]
    fn decompose_one_step() {
        assert_eq!(decompose('é'), Some(('e', '\u{0301}')));
        // U+01FB LATIN SMALL LETTER A WITH RING ABOVE AND ACUTE
        assert_eq!(decompose('\u{01FB}'), Some(('\u{00E5}', '\u{0301}')));
        assert_eq!(decompose('x'), None);
    }

    #[test]
    fn decompose_compose_idempotent() {
        for c in ['é', 'ĝ', '\u{1E09}'] {
            let (a, b) = decompose(c).unwrap();
            assert_eq!(compose(a, b), Some(c));
        }
    }

    #[test]
    fn hebrew_mcc_permutation() {
        // Shin dot (ccc 24) must sort before sheva (ccc 10).
        let shin_dot = modified_combining_class('\u{05C1}');
        let sheva = modified_combining_class('\u{05B0}');
        assert!(shin_dot < sheva);
    }

    #[test]
    fn spaces() {
        assert_eq!(space_fallback('\u{2003}'), space::EM);
        assert_eq!(space_fallback('\u{2009}'), space::EM_5);
        assert_eq!(space_fallback('q'), space::NOT_SPACE);
    }

    #[test]
    fn ignorables() {
        assert!(is_default_ignorable('\u{200D}'));
        assert!(is_default_ignorable('\u{FE0F}'));
        assert!(!is_default_ignorable('a'));
    }
}
