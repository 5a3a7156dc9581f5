//! Glyph-info property accessors and the shared layout-table plumbing.

use crate::buffer::{Buffer, GlyphInfo, GlyphPropsFlags, UnicodeProps};
use crate::face::Face;
use crate::unicode::{self, GeneralCategory};

pub const MAX_NESTING_LEVEL: usize = 64;
pub const MAX_CONTEXT_LENGTH: usize = 64;

/// Identifies which of the two lookup-bearing layout tables is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableIndex {
    Gsub = 0,
    Gpos = 1,
}

impl TableIndex {
    pub fn iter() -> impl Iterator<Item = TableIndex> {
        [Self::Gsub, Self::Gpos].into_iter()
    }
}

impl<T> core::ops::Index<TableIndex> for [T; 2] {
    type Output = T;

    fn index(&self, table: TableIndex) -> &T {
        &self[table as usize]
    }
}

impl<T> core::ops::IndexMut<TableIndex> for [T; 2] {
    fn index_mut(&mut self, table: TableIndex) -> &mut T {
        &mut self[table as usize]
    }
}

/// Lookup flag bits, as stored in the low word of `lookup_props`.
pub mod lookup_flags {
    pub const RIGHT_TO_LEFT: u16 = 0x0001;
    pub const IGNORE_BASE_GLYPHS: u16 = 0x0002;
    pub const IGNORE_LIGATURES: u16 = 0x0004;
    pub const IGNORE_MARKS: u16 = 0x0008;
    pub const IGNORE_FLAGS: u16 = 0x000E;
    pub const USE_MARK_FILTERING_SET: u16 = 0x0010;
    pub const MARK_ATTACHMENT_TYPE_MASK: u16 = 0xFF00;
}

impl GlyphInfo {
    // unicode_props accessors.

    #[inline]
    pub(crate) fn general_category(&self) -> GeneralCategory {
        GeneralCategory((self.unicode_props() & UnicodeProps::GENERAL_CATEGORY.bits()) as u8)
    }

    #[inline]
    pub(crate) fn set_general_category(&mut self, gc: GeneralCategory) {
        // Clears the top byte.
        let n =
            (gc.to_u8() as u16) | (self.unicode_props() & (0xFF & !UnicodeProps::GENERAL_CATEGORY.bits()));
        self.set_unicode_props(n);
    }

    #[inline]
    pub(crate) fn is_unicode_mark(&self) -> bool {
        self.general_category().is_mark()
    }

    #[inline]
    pub(crate) fn modified_combining_class(&self) -> u8 {
        if self.is_unicode_mark() {
            (self.unicode_props() >> 8) as u8
        } else {
            0
        }
    }

    #[inline]
    pub(crate) fn set_modified_combining_class(&mut self, mcc: u8) {
        if !self.is_unicode_mark() {
            return;
        }
        self.set_unicode_props(((mcc as u16) << 8) | (self.unicode_props() & 0xFF));
    }

    #[inline]
    pub(crate) fn is_unicode_space(&self) -> bool {
        self.general_category() == GeneralCategory::SPACE_SEPARATOR
    }

    #[inline]
    pub(crate) fn set_space_fallback(&mut self, s: unicode::space::Type) {
        if !self.is_unicode_space() {
            return;
        }
        self.set_unicode_props(((s as u16) << 8) | (self.unicode_props() & 0xFF));
    }

    #[inline]
    pub(crate) fn space_fallback(&self) -> unicode::space::Type {
        if self.is_unicode_space() {
            (self.unicode_props() >> 8) as u8
        } else {
            unicode::space::NOT_SPACE
        }
    }

    #[inline]
    pub(crate) fn is_default_ignorable(&self) -> bool {
        self.unicode_props() & UnicodeProps::IGNORABLE.bits() != 0 && !self.substituted()
    }

    #[inline]
    pub(crate) fn is_hidden(&self) -> bool {
        self.unicode_props() & UnicodeProps::HIDDEN.bits() != 0
    }

    #[inline]
    pub(crate) fn set_continuation(&mut self) {
        self.set_unicode_props(self.unicode_props() | UnicodeProps::CONTINUATION.bits());
    }

    #[inline]
    pub(crate) fn clear_continuation(&mut self) {
        self.set_unicode_props(self.unicode_props() & !UnicodeProps::CONTINUATION.bits());
    }

    #[inline]
    pub(crate) fn is_continuation(&self) -> bool {
        self.unicode_props() & UnicodeProps::CONTINUATION.bits() != 0
    }

    #[inline]
    pub(crate) fn is_unicode_format(&self) -> bool {
        self.general_category() == GeneralCategory::FORMAT
    }

    #[inline]
    pub(crate) fn is_zwnj(&self) -> bool {
        self.is_unicode_format() && self.unicode_props() & UnicodeProps::CF_ZWNJ.bits() != 0
    }

    #[inline]
    pub(crate) fn is_zwj(&self) -> bool {
        self.is_unicode_format() && self.unicode_props() & UnicodeProps::CF_ZWJ.bits() != 0
    }

    #[inline]
    pub(crate) fn is_joiner(&self) -> bool {
        self.is_unicode_format()
            && self.unicode_props() & (UnicodeProps::CF_ZWNJ | UnicodeProps::CF_ZWJ).bits() != 0
    }

    #[inline]
    pub(crate) fn is_aat_deleted(&self) -> bool {
        self.is_unicode_format()
            && self.unicode_props() & UnicodeProps::CF_AAT_DELETED.bits() != 0
    }

    #[inline]
    pub(crate) fn set_aat_deleted(&mut self) {
        self.set_general_category(GeneralCategory::FORMAT);
        self.set_unicode_props(
            self.unicode_props() | UnicodeProps::CF_AAT_DELETED.bits() | UnicodeProps::HIDDEN.bits(),
        );
    }

    // lig_props: three bits of ligature id, the is-base flag, four bits of
    // component or component count.

    const IS_LIG_BASE: u8 = 0x10;

    #[inline]
    pub(crate) fn lig_props(&self) -> u8 {
        self.lig_props
    }

    #[inline]
    pub(crate) fn set_lig_props(&mut self, n: u8) {
        self.lig_props = n;
    }

    #[inline]
    pub(crate) fn set_lig_props_for_ligature(&mut self, lig_id: u8, lig_num_comps: u8) {
        self.lig_props = (lig_id << 5) | Self::IS_LIG_BASE | (lig_num_comps & 0x0F);
    }

    #[inline]
    pub(crate) fn set_lig_props_for_mark(&mut self, lig_id: u8, lig_comp: u8) {
        self.lig_props = (lig_id << 5) | (lig_comp & 0x0F);
    }

    #[inline]
    pub(crate) fn set_lig_props_for_component(&mut self, comp: u8) {
        self.set_lig_props_for_mark(0, comp);
    }

    #[inline]
    pub(crate) fn lig_id(&self) -> u8 {
        self.lig_props >> 5
    }

    #[inline]
    pub(crate) fn is_ligated_internal(&self) -> bool {
        self.lig_props & Self::IS_LIG_BASE != 0
    }

    #[inline]
    pub(crate) fn lig_comp(&self) -> u8 {
        if self.is_ligated_internal() {
            0
        } else {
            self.lig_props & 0x0F
        }
    }

    #[inline]
    pub(crate) fn lig_num_comps(&self) -> u8 {
        if self.glyph_props & GlyphPropsFlags::LIGATURE.bits() != 0 && self.is_ligated_internal() {
            self.lig_props & 0x0F
        } else {
            1
        }
    }

    // glyph_props.

    #[inline]
    pub(crate) fn glyph_props(&self) -> u16 {
        self.glyph_props
    }

    #[inline]
    pub(crate) fn set_glyph_props(&mut self, n: u16) {
        self.glyph_props = n;
    }

    #[inline]
    pub(crate) fn is_base_glyph(&self) -> bool {
        self.glyph_props & GlyphPropsFlags::BASE_GLYPH.bits() != 0
    }

    #[inline]
    pub(crate) fn is_ligature(&self) -> bool {
        self.glyph_props & GlyphPropsFlags::LIGATURE.bits() != 0
    }

    #[inline]
    pub(crate) fn is_mark(&self) -> bool {
        self.glyph_props & GlyphPropsFlags::MARK.bits() != 0
    }

    #[inline]
    pub(crate) fn substituted(&self) -> bool {
        self.glyph_props & GlyphPropsFlags::SUBSTITUTED.bits() != 0
    }

    #[inline]
    pub(crate) fn ligated(&self) -> bool {
        self.glyph_props & GlyphPropsFlags::LIGATED.bits() != 0
    }

    #[inline]
    pub(crate) fn multiplied(&self) -> bool {
        self.glyph_props & GlyphPropsFlags::MULTIPLIED.bits() != 0
    }

    #[inline]
    pub(crate) fn ligated_and_didnt_multiply(&self) -> bool {
        self.ligated() && !self.multiplied()
    }

    #[inline]
    pub(crate) fn clear_ligated_and_multiplied(&mut self) {
        self.glyph_props &= !(GlyphPropsFlags::LIGATED | GlyphPropsFlags::MULTIPLIED).bits();
    }

    #[inline]
    pub(crate) fn clear_substituted(&mut self) {
        self.glyph_props &= !GlyphPropsFlags::SUBSTITUTED.bits();
    }
}

pub(crate) fn grapheme_group(_: &GlyphInfo, b: &GlyphInfo) -> bool {
    b.is_continuation()
}

/// Whether a glyph passes the lookup-flag ignore rules.
#[inline]
pub(crate) fn check_glyph_property(face: &Face, info: &GlyphInfo, match_props: u32) -> bool {
    let glyph_props = info.glyph_props();

    if glyph_props & (match_props as u16) & lookup_flags::IGNORE_FLAGS != 0 {
        return false;
    }

    if glyph_props & GlyphPropsFlags::MARK.bits() != 0 {
        // A mark-filtering set carries its set index in the high word.
        if match_props as u16 & lookup_flags::USE_MARK_FILTERING_SET != 0 {
            let set_index = (match_props >> 16) as u16;
            return face.ot.is_mark_glyph(info.glyph_id, set_index);
        }

        if match_props as u16 & lookup_flags::MARK_ATTACHMENT_TYPE_MASK != 0 {
            return (match_props as u16 & lookup_flags::MARK_ATTACHMENT_TYPE_MASK)
                == (glyph_props & lookup_flags::MARK_ATTACHMENT_TYPE_MASK);
        }
    }

    true
}

/// Seeds glyph classes from GDEF before the first substitution.
pub(crate) fn set_glyph_props(face: &Face, buffer: &mut Buffer) {
    let len = buffer.len;
    for info in &mut buffer.info[..len] {
        info.set_glyph_props(face.ot.glyph_props(info.glyph_id));
        info.set_lig_props(0);
    }
}

/// Uses the Unicode general category when the font carries no glyph classes.
pub(crate) fn synthesize_glyph_classes(buffer: &mut Buffer) {
    let len = buffer.len;
    for info in &mut buffer.info[..len] {
        // Default-ignorables are never classified as marks: lookups that
        // skip marks would silently drop them otherwise.
        let class = if info.general_category() == GeneralCategory::NON_SPACING_MARK
            && !info.is_default_ignorable()
        {
            GlyphPropsFlags::MARK
        } else {
            GlyphPropsFlags::BASE_GLYPH
        };
        info.set_glyph_props(class.bits());
    }
}

pub(crate) fn clear_substitution_flags(
    _: &crate::ot_shape_plan::ShapePlan,
    _: &Face,
    buffer: &mut Buffer,
) -> bool {
    let len = buffer.len;
    for info in &mut buffer.info[..len] {
        info.clear_substituted();
    }
    false
}

pub(crate) fn zero_width_default_ignorables(buffer: &mut Buffer) {
    use crate::buffer::{scratch_flags, BufferFlags};

    if buffer.scratch_flags & scratch_flags::HAS_DEFAULT_IGNORABLES == 0
        || buffer.flags.contains(BufferFlags::PRESERVE_DEFAULT_IGNORABLES)
        || buffer.flags.contains(BufferFlags::REMOVE_DEFAULT_IGNORABLES)
    {
        return;
    }

    for i in 0..buffer.len {
        if buffer.info[i].is_default_ignorable() {
            buffer.pos[i] = crate::buffer::GlyphPosition {
                attach_chain: buffer.pos[i].attach_chain,
                attach_type: buffer.pos[i].attach_type,
                ..Default::default()
            };
        }
    }
}

pub(crate) fn hide_default_ignorables(buffer: &mut Buffer, face: &Face) {
    use crate::buffer::{scratch_flags, BufferFlags};

    if buffer.scratch_flags & scratch_flags::HAS_DEFAULT_IGNORABLES == 0
        || buffer.flags.contains(BufferFlags::PRESERVE_DEFAULT_IGNORABLES)
    {
        return;
    }

    if !buffer.flags.contains(BufferFlags::REMOVE_DEFAULT_IGNORABLES) {
        let invisible = buffer
            .invisible
            .or_else(|| face.nominal_glyph(' ').map(|g| g.to_u32()));
        if let Some(invisible) = invisible {
            for info in &mut buffer.info[..buffer.len] {
                if info.is_default_ignorable() {
                    info.glyph_id = invisible;
                }
            }
            return;
        }
    }

    buffer.delete_glyphs_inplace(GlyphInfo::is_default_ignorable);
}
