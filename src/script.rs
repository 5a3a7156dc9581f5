//! Script constants and script-derived properties.

use crate::common::{Direction, Script, Tag};

macro_rules! scripts {
    ($($name:ident => $tag:expr,)+) => {
        $(pub const $name: Script = Script(Tag::new($tag));)+
    };
}

#[rustfmt::skip]
scripts! {
    COMMON => b"Zyyy",
    INHERITED => b"Zinh",
    UNKNOWN => b"Zzzz",

    ARABIC => b"Arab",
    ARMENIAN => b"Armn",
    BENGALI => b"Beng",
    BOPOMOFO => b"Bopo",
    CANADIAN_SYLLABICS => b"Cans",
    CHEROKEE => b"Cher",
    CYRILLIC => b"Cyrl",
    DEVANAGARI => b"Deva",
    ETHIOPIC => b"Ethi",
    GEORGIAN => b"Geor",
    GREEK => b"Grek",
    GUJARATI => b"Gujr",
    GURMUKHI => b"Guru",
    HAN => b"Hani",
    HANGUL => b"Hang",
    HEBREW => b"Hebr",
    HIRAGANA => b"Hira",
    KANNADA => b"Knda",
    KATAKANA => b"Kana",
    KHMER => b"Khmr",
    LAO => b"Laoo",
    LATIN => b"Latn",
    MALAYALAM => b"Mlym",
    MONGOLIAN => b"Mong",
    MYANMAR => b"Mymr",
    OGHAM => b"Ogam",
    ORIYA => b"Orya",
    RUNIC => b"Runr",
    SINHALA => b"Sinh",
    SYRIAC => b"Syrc",
    TAMIL => b"Taml",
    TELUGU => b"Telu",
    THAANA => b"Thaa",
    THAI => b"Thai",
    TIBETAN => b"Tibt",
    YI => b"Yiii",
    TAGALOG => b"Tglg",
    HANUNOO => b"Hano",
    BUHID => b"Buhd",
    TAGBANWA => b"Tagb",
    BRAILLE => b"Brai",
    CYPRIOT => b"Cprt",
    LIMBU => b"Limb",
    OSMANYA => b"Osma",
    SHAVIAN => b"Shaw",
    TAI_LE => b"Tale",
    BUGINESE => b"Bugi",
    KHAROSHTHI => b"Khar",
    NEW_TAI_LUE => b"Talu",
    TIFINAGH => b"Tfng",
    BALINESE => b"Bali",
    NKO => b"Nkoo",
    PHAGS_PA => b"Phag",
    CHAM => b"Cham",
    KAYAH_LI => b"Kali",
    LEPCHA => b"Lepc",
    REJANG => b"Rjng",
    SAURASHTRA => b"Saur",
    SUNDANESE => b"Sund",
    JAVANESE => b"Java",
    KAITHI => b"Kthi",
    MEETEI_MAYEK => b"Mtei",
    TAI_THAM => b"Lana",
    TAI_VIET => b"Tavt",
    BATAK => b"Batk",
    BRAHMI => b"Brah",
    MANDAIC => b"Mand",
    CHAKMA => b"Cakm",
    SHARADA => b"Shrd",
    TAKRI => b"Takr",
    DUPLOYAN => b"Dupl",
    GRANTHA => b"Gran",
    KHOJKI => b"Khoj",
    KHUDAWADI => b"Sind",
    MAHAJANI => b"Mahj",
    MODI => b"Modi",
    PAHAWH_HMONG => b"Hmng",
    PSALTER_PAHLAVI => b"Phlp",
    SIDDHAM => b"Sidd",
    TIRHUTA => b"Tirh",
    AHOM => b"Ahom",
    MULTANI => b"Mult",
    ADLAM => b"Adlm",
    BHAIKSUKI => b"Bhks",
    MARCHEN => b"Marc",
    NEWA => b"Newa",
    MASARAM_GONDI => b"Gonm",
    SOYOMBO => b"Soyo",
    ZANABAZAR_SQUARE => b"Zanb",
    DOGRA => b"Dogr",
    GUNJALA_GONDI => b"Gong",
    HANIFI_ROHINGYA => b"Rohg",
    MAKASAR => b"Maka",
    MEDEFAIDRIN => b"Medf",
    OLD_SOGDIAN => b"Sogo",
    SOGDIAN => b"Sogd",
    ELYMAIC => b"Elym",
    NANDINAGARI => b"Nand",
    NYIAKENG_PUACHUE_HMONG => b"Hmnp",
    WANCHO => b"Wcho",
    CHORASMIAN => b"Chrs",
    DIVES_AKURU => b"Diak",
    KHITAN_SMALL_SCRIPT => b"Kits",
    YEZIDI => b"Yezi",
    CYPRO_MINOAN => b"Cpmn",
    OLD_UYGHUR => b"Ougr",
    TANGSA => b"Tnsa",
    TOTO => b"Toto",
    VITHKUQI => b"Vith",
    KAWI => b"Kawi",
    NAG_MUNDARI => b"Nagm",
    GARAY => b"Gara",
    TODHRI => b"Todr",
    TULU_TIGALARI => b"Tutg",
}

/// Returns the script of a character.
pub(crate) fn from_char(c: char) -> Script {
    use unicode_script::{Script as S, UnicodeScript};
    match c.script() {
        S::Common => COMMON,
        S::Inherited => INHERITED,
        other => {
            // unicode-script exposes the ISO 15924 short name, which is the
            // script tag we carry.
            let name = other.short_name();
            let mut bytes = [b' '; 4];
            for (i, b) in name.bytes().take(4).enumerate() {
                bytes[i] = b;
            }
            Script(Tag::new(&bytes))
        }
    }
}

/// The default direction glyphs of this script are laid out in when the
/// segment is horizontal.
pub(crate) fn horizontal_direction(script: Script) -> Direction {
    match script {
        ARABIC | HEBREW | SYRIAC | THAANA | CYPRIOT | KHAROSHTHI | PHAGS_PA | NKO | MANDAIC
        | PSALTER_PAHLAVI | ADLAM | HANIFI_ROHINGYA | OLD_SOGDIAN | SOGDIAN | ELYMAIC | YEZIDI
        | CHORASMIAN | OLD_UYGHUR | GARAY => Direction::RightToLeft,
        _ => Direction::LeftToRight,
    }
}

/// OpenType script tags for a script, most specific first.
///
/// Indic and Myanmar carry a second-generation tag next to the original one;
/// the map builder probes them in order.
pub(crate) fn ot_tags(script: Script) -> ([Tag; 2], usize) {
    let two = |new: &[u8; 4], old: &[u8; 4]| ([Tag::new(new), Tag::new(old)], 2);
    match script {
        BENGALI => two(b"bng2", b"beng"),
        DEVANAGARI => two(b"dev2", b"deva"),
        GUJARATI => two(b"gjr2", b"gujr"),
        GURMUKHI => two(b"gur2", b"guru"),
        KANNADA => two(b"knd2", b"knda"),
        MALAYALAM => two(b"mlm2", b"mlym"),
        ORIYA => two(b"ory2", b"orya"),
        TAMIL => two(b"tml2", b"taml"),
        TELUGU => two(b"tel2", b"telu"),
        MYANMAR => two(b"mym2", b"mymr"),
        _ => {
            // The OpenType script tag is the lowercased ISO 15924 tag.
            let b = script.0.to_be_bytes();
            (
                [
                    Tag::new(&[
                        b[0].to_ascii_lowercase(),
                        b[1].to_ascii_lowercase(),
                        b[2].to_ascii_lowercase(),
                        b[3].to_ascii_lowercase(),
                    ]),
                    Tag::new(b"DFLT"),
                ],
                1,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_script() {
        assert_eq!(from_char('क'), DEVANAGARI);
        assert_eq!(from_char('ا'), ARABIC);
        assert_eq!(from_char('a'), LATIN);
        assert_eq!(from_char(' '), COMMON);
    }

    #[test]
    fn script_direction() {
        assert_eq!(horizontal_direction(ARABIC), Direction::RightToLeft);
        assert_eq!(horizontal_direction(DEVANAGARI), Direction::LeftToRight);
    }

    #[test]
    fn indic_ot_tags() {
        let (tags, n) = ot_tags(DEVANAGARI);
        assert_eq!(n, 2);
        assert_eq!(tags[0], Tag::new(b"dev2"));
        assert_eq!(tags[1], Tag::new(b"deva"));

        let (tags, n) = ot_tags(LATIN);
        assert_eq!(n, 1);
        assert_eq!(tags[0], Tag::new(b"latn"));
    }
}
