//! Indic syllable identification.
//!
//! A hand-rolled longest-match parser over the character categories,
//! following the syllable grammar of the Microsoft script specs.

use crate::buffer::Buffer;
use crate::ot_shaper_indic_table::category as cat;
use crate::ot_shaper_syllabic::found_syllable;

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum SyllableType {
    ConsonantSyllable = 0,
    VowelSyllable = 1,
    StandaloneCluster = 2,
    SymbolCluster = 3,
    BrokenCluster = 4,
    NonIndicCluster = 5,
}

struct Cursor<'a> {
    cats: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.cats.get(self.pos).copied()
    }

    fn eat(&mut self, category: u8) -> bool {
        if self.peek() == Some(category) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_one_of(&mut self, categories: &[u8]) -> bool {
        if let Some(c) = self.peek() {
            if categories.contains(&c) {
                self.pos += 1;
                return true;
            }
        }
        false
    }

    fn eat_joiner(&mut self) -> bool {
        self.eat_one_of(&[cat::ZWJ, cat::ZWNJ])
    }

    // consonant: C | Ra
    fn eat_consonant(&mut self) -> bool {
        self.eat_one_of(&[cat::C, cat::RA])
    }

    // n: ((ZWNJ? RS)? N N?)?
    fn eat_modifiers(&mut self) {
        let save = self.pos;
        self.eat(cat::ZWNJ);
        if !self.eat(cat::RS) {
            self.pos = save;
        }
        if self.eat(cat::N) {
            self.eat(cat::N);
        }
    }

    // cn: consonant ZWJ? n
    fn eat_cn(&mut self) -> bool {
        if !self.eat_consonant() {
            return false;
        }
        self.eat(cat::ZWJ);
        self.eat_modifiers();
        true
    }

    // reph: Ra H | Repha
    fn eat_reph(&mut self) -> bool {
        let save = self.pos;
        if self.eat(cat::RA) && self.eat(cat::H) {
            return true;
        }
        self.pos = save;
        self.eat(cat::REPHA)
    }

    // forced_rakar: ZWJ H ZWJ Ra
    fn eat_forced_rakar(&mut self) -> bool {
        let save = self.pos;
        if self.eat(cat::ZWJ) && self.eat(cat::H) && self.eat(cat::ZWJ) && self.eat(cat::RA) {
            return true;
        }
        self.pos = save;
        false
    }

    // matra_group: z* M N? (H | forced_rakar)?
    fn eat_matra_group(&mut self) -> bool {
        let save = self.pos;
        while self.eat_joiner() {}
        if !self.eat_one_of(&[cat::M, cat::V_PRE, cat::V_ABV, cat::V_BLW, cat::V_PST]) {
            self.pos = save;
            return false;
        }
        self.eat(cat::N);
        if !self.eat_forced_rakar() {
            self.eat(cat::H);
        }
        true
    }

    // halant_group: z? H (ZWJ N?)?
    fn eat_halant_group(&mut self) -> bool {
        let save = self.pos;
        self.eat_joiner();
        if !self.eat(cat::H) {
            self.pos = save;
            return false;
        }
        let save2 = self.pos;
        if self.eat(cat::ZWJ) {
            self.eat(cat::N);
        } else {
            self.pos = save2;
        }
        true
    }

    // final_halant_group: halant_group | H ZWNJ
    fn eat_final_halant_group(&mut self) -> bool {
        let save = self.pos;
        if self.eat(cat::H) && self.eat(cat::ZWNJ) {
            return true;
        }
        self.pos = save;
        self.eat_halant_group()
    }

    // syllable_tail: (z? SM SM? ZWNJ?)? A*
    fn eat_syllable_tail(&mut self) {
        let save = self.pos;
        self.eat_joiner();
        if self.eat(cat::SM) {
            self.eat(cat::SM);
            self.eat(cat::ZWNJ);
        } else {
            self.pos = save;
        }
        while self.eat(cat::A) {}
    }

    // complex_syllable_tail:
    //   (halant_group cn)* CM? (final_halant_group | matra_group*) syllable_tail
    fn eat_complex_syllable_tail(&mut self) {
        loop {
            let save = self.pos;
            if self.eat_halant_group() && self.eat_cn() {
                continue;
            }
            self.pos = save;
            break;
        }

        self.eat(cat::CM);

        let save = self.pos;
        if !self.eat_final_halant_group() {
            self.pos = save;
            while self.eat_matra_group() {}
        }

        self.eat_syllable_tail();
    }

    // consonant_syllable: (Repha | CS)? cn complex_syllable_tail
    fn eat_consonant_syllable(&mut self) -> bool {
        let save = self.pos;
        self.eat_one_of(&[cat::REPHA, cat::CS]);
        if !self.eat_cn() {
            self.pos = save;
            return false;
        }
        self.eat_complex_syllable_tail();
        true
    }

    // vowel_syllable: reph? V n (ZWJ | complex_syllable_tail)
    fn eat_vowel_syllable(&mut self) -> bool {
        let save = self.pos;
        self.eat_reph();
        if !self.eat(cat::V) {
            self.pos = save;
            return false;
        }
        self.eat_modifiers();
        if !self.eat(cat::ZWJ) {
            self.eat_complex_syllable_tail();
        }
        true
    }

    // standalone_cluster:
    //   ((Repha | CS)? PLACEHOLDER | reph? DOTTEDCIRCLE) n complex_syllable_tail
    fn eat_standalone_cluster(&mut self) -> bool {
        let save = self.pos;

        let mut matched = false;
        self.eat_one_of(&[cat::REPHA, cat::CS]);
        if self.eat(cat::PLACEHOLDER) {
            matched = true;
        } else {
            self.pos = save;
            self.eat_reph();
            if self.eat(cat::DOTTED_CIRCLE) {
                matched = true;
            }
        }
        if !matched {
            self.pos = save;
            return false;
        }

        self.eat_modifiers();
        self.eat_complex_syllable_tail();
        true
    }

    // symbol_cluster: Symbol N? syllable_tail
    fn eat_symbol_cluster(&mut self) -> bool {
        if !self.eat(cat::SYMBOL) {
            return false;
        }
        self.eat(cat::N);
        self.eat_syllable_tail();
        true
    }

    // broken_cluster: reph? n? complex_syllable_tail (non-empty)
    fn eat_broken_cluster(&mut self) -> bool {
        let start = self.pos;
        self.eat_reph();
        self.eat_modifiers();
        self.eat_complex_syllable_tail();
        self.pos > start
    }
}

pub(crate) fn find_syllables_indic(buffer: &mut Buffer) {
    let cats: Vec<u8> = buffer.info[..buffer.len]
        .iter()
        .map(|info| info.shaper_category)
        .collect();

    let mut cursor = Cursor {
        cats: &cats,
        pos: 0,
    };
    let mut serial = 1u8;
    let mut has_broken = false;

    while cursor.pos < cats.len() {
        let start = cursor.pos;

        let kind = if cursor.eat_consonant_syllable() {
            SyllableType::ConsonantSyllable
        } else if cursor.eat_vowel_syllable() {
            SyllableType::VowelSyllable
        } else if cursor.eat_standalone_cluster() {
            SyllableType::StandaloneCluster
        } else if cursor.eat_symbol_cluster() {
            SyllableType::SymbolCluster
        } else if cursor.eat_broken_cluster() {
            has_broken = true;
            SyllableType::BrokenCluster
        } else {
            cursor.pos = start + 1;
            SyllableType::NonIndicCluster
        };

        found_syllable(buffer, start, cursor.pos, &mut serial, kind as u8);
    }

    if has_broken {
        buffer.scratch_flags |= crate::buffer::scratch_flags::HAS_BROKEN_SYLLABLE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ot_shaper_indic_table::get_categories;

    fn syllables_of(text: &str) -> Vec<(u8, usize)> {
        let mut buffer = Buffer::new();
        for (i, c) in text.chars().enumerate() {
            buffer.add(c as u32, i as u32);
        }
        for info in &mut buffer.info {
            let (cat, pos) = get_categories(info.glyph_id);
            info.shaper_category = cat;
            info.shaper_aux = pos;
        }
        find_syllables_indic(&mut buffer);

        let mut out = Vec::new();
        let mut start = 0;
        while start < buffer.len {
            let end = buffer.next_syllable(start);
            out.push((buffer.info[start].syllable & 0x0F, end - start));
            start = end;
        }
        out
    }

    #[test]
    fn ka_with_matra_is_one_syllable() {
        // KA + vowel sign I
        let syllables = syllables_of("\u{0915}\u{093F}");
        assert_eq!(
            syllables,
            [(SyllableType::ConsonantSyllable as u8, 2)]
        );
    }

    #[test]
    fn conjunct_is_one_syllable() {
        // KA + virama + SSA
        let syllables = syllables_of("\u{0915}\u{094D}\u{0937}");
        assert_eq!(
            syllables,
            [(SyllableType::ConsonantSyllable as u8, 3)]
        );
    }

    #[test]
    fn two_syllables_split() {
        // KA KA: two separate syllables.
        let syllables = syllables_of("\u{0915}\u{0915}");
        assert_eq!(syllables.len(), 2);
    }

    #[test]
    fn lone_matra_is_broken() {
        let syllables = syllables_of("\u{093F}");
        assert_eq!(syllables, [(SyllableType::BrokenCluster as u8, 1)]);
    }

    #[test]
    fn latin_is_non_indic() {
        let syllables = syllables_of("a");
        assert_eq!(syllables, [(SyllableType::NonIndicCluster as u8, 1)]);
    }
}
