//! The glyph buffer: input codepoints on the way in, positioned glyphs on
//! the way out.
//!
//! Substitutions that change the glyph count stream from the `info` arena
//! into the `out_info` staging arena and swap once the pass is done; this
//! dual-arena design is what keeps non-in-place lookups correct while the
//! skipping iterator can still look backwards at already-produced glyphs.

use core::fmt;

use crate::common::{Direction, Language, Script};
use crate::set_digest::SetDigest;
use crate::unicode::{self, GeneralCategory};
use crate::{script, Mask};

/// Glyph flags communicated back to the caller through the mask bits.
pub mod glyph_flag {
    /// Breaking the run at the beginning of this cluster changes the shaping
    /// result.
    pub const UNSAFE_TO_BREAK: u32 = 0x0000_0001;
    /// Concatenating runs split at this cluster changes the shaping result.
    pub const UNSAFE_TO_CONCAT: u32 = 0x0000_0002;
    /// A tatweel may be inserted at this cluster without reshaping.
    pub const SAFE_TO_INSERT_TATWEEL: u32 = 0x0000_0004;

    pub const DEFINED: u32 = 0x0000_0007;
}

bitflags::bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
    pub struct UnicodeProps: u16 {
        const GENERAL_CATEGORY  = 0x001F;
        const IGNORABLE         = 0x0020;
        // Mongolian free variation selectors, TAG characters, CGJ: hidden,
        // but not skippable during matching.
        const HIDDEN            = 0x0040;
        const CONTINUATION      = 0x0080;

        // If GENERAL_CATEGORY == Format, the top byte carries:
        const CF_ZWJ            = 0x0100;
        const CF_ZWNJ           = 0x0200;
        const CF_AAT_DELETED    = 0x0400;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
    pub struct GlyphPropsFlags: u16 {
        // The low three match the GDEF glyph classes the lookup flags ignore.
        const BASE_GLYPH    = 0x02;
        const LIGATURE      = 0x04;
        const MARK          = 0x08;
        const CLASS_MASK    = Self::BASE_GLYPH.bits() | Self::LIGATURE.bits() | Self::MARK.bits();

        // Set by the engine, never derived from GDEF.
        const SUBSTITUTED   = 0x10;
        const LIGATED       = 0x20;
        const MULTIPLIED    = 0x40;

        const PRESERVE      = Self::SUBSTITUTED.bits() | Self::LIGATED.bits() | Self::MULTIPLIED.bits();
    }
}

bitflags::bitflags! {
    /// Flags the caller sets on an input buffer.
    #[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
    pub struct BufferFlags: u32 {
        const BEGINNING_OF_TEXT             = 1 << 1;
        const END_OF_TEXT                   = 1 << 2;
        const PRESERVE_DEFAULT_IGNORABLES   = 1 << 3;
        const REMOVE_DEFAULT_IGNORABLES     = 1 << 4;
        const DO_NOT_INSERT_DOTTED_CIRCLE   = 1 << 5;
        const PRODUCE_UNSAFE_TO_CONCAT      = 1 << 6;
        const PRODUCE_SAFE_TO_INSERT_TATWEEL = 1 << 7;
    }
}

pub(crate) mod scratch_flags {
    pub const HAS_NON_ASCII: u32 = 0x0000_0001;
    pub const HAS_DEFAULT_IGNORABLES: u32 = 0x0000_0002;
    pub const HAS_SPACE_FALLBACK: u32 = 0x0000_0004;
    pub const HAS_GPOS_ATTACHMENT: u32 = 0x0000_0008;
    pub const HAS_CGJ: u32 = 0x0000_0010;
    pub const HAS_GLYPH_FLAGS: u32 = 0x0000_0020;
    pub const HAS_BROKEN_SYLLABLE: u32 = 0x0000_0040;

    // Reserved for the active complex shaper.
    pub const SHAPER0: u32 = 0x0100_0000;
}

/// Granularity of cluster merging.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum BufferClusterLevel {
    #[default]
    MonotoneGraphemes,
    MonotoneCharacters,
    Characters,
}

/// One shaped or to-be-shaped item.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
pub struct GlyphInfo {
    /// Unicode scalar value before substitution, glyph id after.
    pub glyph_id: u32,
    /// Index of the first character this glyph was derived from.
    pub cluster: u32,
    pub(crate) mask: Mask,
    pub(crate) unicode_props: u16,
    pub(crate) glyph_props: u16,
    pub(crate) lig_props: u8,
    pub(crate) syllable: u8,
    pub(crate) shaper_category: u8,
    pub(crate) shaper_aux: u8,
}

impl GlyphInfo {
    /// Flags accumulated while shaping, see [`glyph_flag`].
    #[inline]
    pub fn glyph_flags(&self) -> u32 {
        self.mask & glyph_flag::DEFINED
    }

    #[inline]
    pub(crate) fn as_char(&self) -> char {
        char::from_u32(self.glyph_id).unwrap_or('\u{FFFD}')
    }

    #[inline]
    pub(crate) fn as_glyph(&self) -> read_fonts::types::GlyphId {
        read_fonts::types::GlyphId::from(self.glyph_id)
    }

    #[inline]
    pub(crate) fn unicode_props(&self) -> u16 {
        self.unicode_props
    }

    #[inline]
    pub(crate) fn set_unicode_props(&mut self, n: u16) {
        self.unicode_props = n;
    }

    pub(crate) fn init_unicode_props(&mut self, scratch: &mut u32) {
        let u = self.as_char();
        let gc = GeneralCategory::of(u);
        let mut props = gc.to_u8() as u16;

        if u as u32 >= 0x80 {
            *scratch |= scratch_flags::HAS_NON_ASCII;

            if unicode::is_default_ignorable(u) {
                *scratch |= scratch_flags::HAS_DEFAULT_IGNORABLES;
                props |= UnicodeProps::IGNORABLE.bits();

                match u {
                    '\u{200C}' => props |= UnicodeProps::CF_ZWNJ.bits(),
                    '\u{200D}' => props |= UnicodeProps::CF_ZWJ.bits(),
                    // Mongolian free variation selectors and TAG characters
                    // must stay visible to matching.
                    '\u{180B}'..='\u{180D}' | '\u{180F}' | '\u{E0020}'..='\u{E007F}' => {
                        props |= UnicodeProps::HIDDEN.bits();
                    }
                    '\u{034F}' => {
                        *scratch |= scratch_flags::HAS_CGJ;
                        props |= UnicodeProps::HIDDEN.bits();
                    }
                    _ => {}
                }
            }

            if gc.is_mark() {
                props |= UnicodeProps::CONTINUATION.bits();
                props |= (unicode::modified_combining_class(u) as u16) << 8;
            }
        }

        self.unicode_props = props;
    }
}

/// Position of a shaped glyph, in design units.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct GlyphPosition {
    pub x_advance: i32,
    pub y_advance: i32,
    pub x_offset: i32,
    pub y_offset: i32,
    pub(crate) attach_chain: i16,
    pub(crate) attach_type: u8,
}

impl GlyphPosition {
    #[inline]
    pub(crate) fn attach_chain(&self) -> i16 {
        self.attach_chain
    }

    #[inline]
    pub(crate) fn set_attach_chain(&mut self, chain: i16) {
        self.attach_chain = chain;
    }

    #[inline]
    pub(crate) fn attach_type(&self) -> u8 {
        self.attach_type
    }

    #[inline]
    pub(crate) fn set_attach_type(&mut self, kind: u8) {
        self.attach_type = kind;
    }
}

pub(crate) struct Buffer {
    pub flags: BufferFlags,
    pub cluster_level: BufferClusterLevel,
    pub invisible: Option<u32>,
    pub not_found_variation_selector: Option<u32>,

    pub direction: Direction,
    pub script: Option<Script>,
    pub language: Option<Language>,

    pub successful: bool,
    pub have_output: bool,
    pub have_positions: bool,

    pub idx: usize,
    pub len: usize,
    pub info: Vec<GlyphInfo>,
    pub pos: Vec<GlyphPosition>,
    out_info: Vec<GlyphInfo>,

    pub serial: u8,
    lig_id: u8,

    pub scratch_flags: u32,
    pub max_len: usize,
    pub max_ops: i32,

    pub digest: SetDigest,
}

pub(crate) const MAX_LEN_FACTOR: usize = 64;
pub(crate) const MAX_LEN_MIN: usize = 16384;
pub(crate) const MAX_OPS_FACTOR: i32 = 1024;
pub(crate) const MAX_OPS_MIN: i32 = 16384;

impl Buffer {
    pub fn new() -> Self {
        Buffer {
            flags: BufferFlags::default(),
            cluster_level: BufferClusterLevel::default(),
            invisible: None,
            not_found_variation_selector: None,
            direction: Direction::Invalid,
            script: None,
            language: None,
            successful: true,
            have_output: false,
            have_positions: false,
            idx: 0,
            len: 0,
            info: Vec::new(),
            pos: Vec::new(),
            out_info: Vec::new(),
            serial: 0,
            lig_id: 0,
            scratch_flags: 0,
            max_len: MAX_LEN_MIN,
            max_ops: MAX_OPS_MIN,
            digest: SetDigest::new(),
        }
    }

    pub fn clear(&mut self) {
        self.direction = Direction::Invalid;
        self.script = None;
        self.language = None;
        self.successful = true;
        self.have_output = false;
        self.have_positions = false;
        self.idx = 0;
        self.len = 0;
        self.info.clear();
        self.pos.clear();
        self.out_info.clear();
        self.serial = 0;
        self.lig_id = 0;
        self.scratch_flags = 0;
        self.digest.clear();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn add(&mut self, codepoint: u32, cluster: u32) {
        let info = GlyphInfo {
            glyph_id: codepoint,
            cluster,
            ..GlyphInfo::default()
        };
        self.info.push(info);
        self.len += 1;
    }

    #[inline]
    pub fn cur(&self, i: usize) -> &GlyphInfo {
        &self.info[self.idx + i]
    }

    #[inline]
    pub fn cur_mut(&mut self, i: usize) -> &mut GlyphInfo {
        let idx = self.idx + i;
        &mut self.info[idx]
    }

    #[inline]
    pub fn cur_pos_mut(&mut self) -> &mut GlyphPosition {
        let idx = self.idx;
        &mut self.pos[idx]
    }

    #[inline]
    pub fn prev(&self) -> &GlyphInfo {
        let idx = self.out_len().saturating_sub(1);
        &self.out_info()[idx]
    }

    #[inline]
    pub fn out_len(&self) -> usize {
        if self.have_output {
            self.out_info.len()
        } else {
            self.idx
        }
    }

    #[inline]
    pub fn out_info(&self) -> &[GlyphInfo] {
        if self.have_output {
            &self.out_info
        } else {
            &self.info
        }
    }

    #[inline]
    pub fn out_info_mut(&mut self) -> &mut [GlyphInfo] {
        if self.have_output {
            &mut self.out_info
        } else {
            &mut self.info
        }
    }

    #[inline]
    pub fn backtrack_len(&self) -> usize {
        self.out_len()
    }

    #[inline]
    pub fn lookahead_len(&self) -> usize {
        self.len - self.idx
    }

    pub fn next_serial(&mut self) -> u8 {
        self.serial = self.serial.wrapping_add(1);
        if self.serial == 0 {
            self.serial = 1;
        }
        self.serial
    }

    /// Ligature ids live in the top three bits of the lig-props byte and
    /// wrap at 7; tracking degrades gracefully when that happens. Zero is
    /// reserved for "no ligature".
    pub fn allocate_lig_id(&mut self) -> u8 {
        self.lig_id = (self.lig_id + 1) & 0x07;
        if self.lig_id == 0 {
            self.lig_id = 1;
        }
        self.lig_id
    }

    pub fn reset_masks(&mut self, mask: Mask) {
        for info in &mut self.info[..self.len] {
            info.mask = mask;
        }
    }

    pub fn set_masks(&mut self, mut value: Mask, mask: Mask, cluster_start: u32, cluster_end: u32) {
        let not_mask = !mask;
        value &= mask;

        if mask == 0 {
            return;
        }

        for info in &mut self.info[..self.len] {
            if cluster_start <= info.cluster && info.cluster < cluster_end {
                info.mask = (info.mask & not_mask) | value;
            }
        }
    }

    // Output-side operations.

    pub fn clear_output(&mut self) {
        self.have_output = true;
        self.have_positions = false;
        self.idx = 0;
        self.out_info.clear();
    }

    pub fn clear_positions(&mut self) {
        self.have_output = false;
        self.have_positions = true;
        self.pos.clear();
        self.pos.resize(self.len, GlyphPosition::default());
    }

    /// Swaps the output arena back in as the live glyph string.
    pub fn sync(&mut self) {
        debug_assert!(self.have_output);

        if self.successful {
            while self.idx < self.len {
                let info = self.info[self.idx];
                self.out_info.push(info);
                self.idx += 1;
            }
            core::mem::swap(&mut self.info, &mut self.out_info);
            self.len = self.info.len();
        }

        self.have_output = false;
        self.out_info.clear();
        self.idx = 0;
    }

    /// Drops already-output glyphs from the end of the staging arena.
    pub fn truncate_out(&mut self, len: usize) {
        debug_assert!(self.have_output);
        self.out_info.truncate(len);
    }

    /// Repositions the working point so that `out_len() == pos`.
    pub fn move_to(&mut self, pos: usize) -> bool {
        if !self.have_output {
            debug_assert!(pos <= self.len);
            self.idx = pos;
            return true;
        }

        if !self.successful {
            return false;
        }

        let out_len = self.out_info.len();
        if pos <= out_len {
            // Un-output the tail back into the input stream.
            let tail: Vec<_> = self.out_info.drain(pos..).collect();
            let n = tail.len();
            self.info.splice(self.idx..self.idx, tail);
            self.len += n;
        } else {
            while self.out_info.len() < pos {
                if self.idx >= self.len {
                    self.successful = false;
                    return false;
                }
                let info = self.info[self.idx];
                self.out_info.push(info);
                self.idx += 1;
            }
        }

        true
    }

    /// Copies the current glyph to the output and advances.
    pub fn next_glyph(&mut self) {
        if self.have_output {
            let info = self.info[self.idx];
            self.out_info.push(info);
        }
        self.idx += 1;
    }

    pub fn next_glyphs(&mut self, n: usize) {
        for _ in 0..n {
            self.next_glyph();
        }
    }

    /// Advances over the current glyph without copying it out.
    pub fn skip_glyph(&mut self) {
        self.idx += 1;
    }

    /// Copies the current glyph to the output without advancing.
    pub fn copy_glyph(&mut self) {
        debug_assert!(self.have_output);
        let info = self.info[self.idx];
        self.out_info.push(info);
    }

    /// Replaces the current glyph with `glyph_id`, consuming it.
    pub fn replace_glyph(&mut self, glyph_id: u32) {
        self.digest.add(glyph_id);
        if self.have_output {
            let mut info = self.info[self.idx];
            info.glyph_id = glyph_id;
            self.out_info.push(info);
            self.idx += 1;
        } else {
            self.info[self.idx].glyph_id = glyph_id;
            self.idx += 1;
        }
    }

    /// Emits a glyph derived from the current one without consuming input.
    pub fn output_glyph(&mut self, glyph_id: u32) {
        debug_assert!(self.have_output);
        if self.check_len(self.out_info.len() + 1) {
            self.digest.add(glyph_id);
            let mut info = if self.idx < self.len {
                self.info[self.idx]
            } else if let Some(last) = self.out_info.last() {
                *last
            } else {
                return;
            };
            info.glyph_id = glyph_id;
            self.out_info.push(info);
        }
    }

    pub fn output_info(&mut self, info: GlyphInfo) {
        debug_assert!(self.have_output);
        if self.check_len(self.out_info.len() + 1) {
            self.digest.add(info.glyph_id);
            self.out_info.push(info);
        }
    }

    /// Replaces `num_in` glyphs with the given replacement string, merging
    /// their clusters.
    pub fn replace_glyphs(&mut self, num_in: usize, glyphs: &[u32]) {
        if !self.check_len(self.out_info.len() + glyphs.len()) {
            return;
        }

        self.merge_clusters(self.idx, self.idx + num_in);

        let orig = self.info[self.idx];
        for &g in glyphs {
            let mut info = orig;
            info.glyph_id = g;
            self.digest.add(g);
            self.out_info.push(info);
        }

        self.idx += num_in;
    }

    /// Removes the current glyph, spreading its cluster onto a neighbour.
    pub fn delete_glyph(&mut self) {
        let cluster = self.info[self.idx].cluster;

        if self.idx + 1 < self.len && cluster == self.info[self.idx + 1].cluster {
            // Already merged into the next cluster.
            self.skip_glyph();
            return;
        }

        if self.out_len() != 0 {
            // Merge the cluster backward.
            let out_len = self.out_len();
            if cluster < self.out_info()[out_len - 1].cluster {
                let mask = self.info[self.idx].mask;
                let old_cluster = self.out_info()[out_len - 1].cluster;
                let mut i = out_len;
                while i > 0 && self.out_info()[i - 1].cluster == old_cluster {
                    Self::set_cluster(&mut self.out_info_mut()[i - 1], cluster, mask);
                    i -= 1;
                }
            }
            self.skip_glyph();
            return;
        }

        if self.idx + 1 < self.len {
            // Merge cluster forward.
            self.merge_clusters(self.idx, self.idx + 2);
        }

        self.skip_glyph();
    }

    pub fn delete_glyphs_inplace(&mut self, filter: impl Fn(&GlyphInfo) -> bool) {
        debug_assert!(!self.have_output);

        let mut j = 0;
        for i in 0..self.len {
            if filter(&self.info[i]) {
                // Merge clusters. The logic here matches delete_glyph.
                let cluster = self.info[i].cluster;
                if i + 1 < self.len && cluster == self.info[i + 1].cluster {
                    continue;
                }
                if j != 0 {
                    if cluster < self.info[j - 1].cluster {
                        let mask = self.info[i].mask;
                        let old_cluster = self.info[j - 1].cluster;
                        let mut k = j;
                        while k > 0 && self.info[k - 1].cluster == old_cluster {
                            Self::set_cluster(&mut self.info[k - 1], cluster, mask);
                            k -= 1;
                        }
                    }
                    continue;
                }
                if i + 1 < self.len {
                    self.merge_clusters(i, i + 2);
                }
                continue;
            }

            if j != i {
                self.info[j] = self.info[i];
                if self.have_positions {
                    self.pos[j] = self.pos[i];
                }
            }
            j += 1;
        }

        self.len = j;
        self.info.truncate(j);
        if self.have_positions {
            self.pos.truncate(j);
        }
    }

    // Cluster discipline.

    pub(crate) fn set_cluster(info: &mut GlyphInfo, cluster: u32, mask: Mask) {
        if info.cluster != cluster {
            info.mask = (info.mask & !glyph_flag::DEFINED) | (mask & glyph_flag::DEFINED);
        }
        info.cluster = cluster;
    }

    fn find_min_cluster(infos: &[GlyphInfo], start: usize, end: usize, init: u32) -> u32 {
        infos[start..end]
            .iter()
            .fold(init, |m, info| m.min(info.cluster))
    }

    pub fn merge_clusters(&mut self, start: usize, end: usize) {
        if end - start < 2 {
            return;
        }

        if self.cluster_level == BufferClusterLevel::Characters {
            self.unsafe_to_break(Some(start), Some(end));
            return;
        }

        let mut start = start;
        let mut end = end;
        let cluster = Self::find_min_cluster(&self.info, start, end, u32::MAX);

        // Extend to complete clusters on either side.
        while end < self.len && self.info[end - 1].cluster == self.info[end].cluster {
            end += 1;
        }
        while self.idx < start && self.info[start - 1].cluster == self.info[start].cluster {
            start -= 1;
        }

        // If our start is the start of the live string, continue into the
        // already-output glyphs of the same cluster.
        if self.idx == start {
            let cluster_at_start = self.info[start].cluster;
            let out_len = self.out_len();
            let mut i = out_len;
            while i > 0 && self.out_info()[i - 1].cluster == cluster_at_start {
                Self::set_cluster(&mut self.out_info_mut()[i - 1], cluster, 0);
                i -= 1;
            }
        }

        for i in start..end {
            Self::set_cluster(&mut self.info[i], cluster, 0);
        }
    }

    pub fn merge_out_clusters(&mut self, start: usize, end: usize) {
        if self.cluster_level == BufferClusterLevel::Characters {
            return;
        }
        if end - start < 2 {
            return;
        }

        let mut start = start;
        let mut end = end;
        let cluster = Self::find_min_cluster(self.out_info(), start, end, u32::MAX);

        while end < self.out_len() && self.out_info()[end - 1].cluster == self.out_info()[end].cluster
        {
            end += 1;
        }
        while start > 0 && self.out_info()[start - 1].cluster == self.out_info()[start].cluster {
            start -= 1;
        }

        // If the end is the end of the output, continue into the unread input.
        if end == self.out_len() {
            let cluster_at_end = self.out_info()[end - 1].cluster;
            let mut i = self.idx;
            while i < self.len && self.info[i].cluster == cluster_at_end {
                Self::set_cluster(&mut self.info[i], cluster, 0);
                i += 1;
            }
        }

        for i in start..end {
            Self::set_cluster(&mut self.out_info_mut()[i], cluster, 0);
        }
    }

    // Glyph-flag tracking.

    fn set_glyph_flags(
        &mut self,
        mask: Mask,
        start: Option<usize>,
        end: Option<usize>,
        from_out_buffer: bool,
    ) {
        let start = start.unwrap_or(0);
        let end = end.unwrap_or(self.len).min(self.len);

        if !from_out_buffer && end - start < 2 {
            return;
        }

        self.scratch_flags |= scratch_flags::HAS_GLYPH_FLAGS;

        if !from_out_buffer || !self.have_output {
            let cluster = Self::find_min_cluster(&self.info, start, end, u32::MAX);
            for info in &mut self.info[start..end] {
                if info.cluster != cluster {
                    info.mask |= mask;
                }
            }
        } else {
            debug_assert!(start <= self.out_len());
            debug_assert!(self.idx <= end);

            let mut cluster = Self::find_min_cluster(&self.info, self.idx, end, u32::MAX);
            cluster = Self::find_min_cluster(&self.out_info, start, self.out_info.len(), cluster);

            for info in &mut self.out_info[start..] {
                if info.cluster != cluster {
                    info.mask |= mask;
                }
            }
            for info in &mut self.info[self.idx..end] {
                if info.cluster != cluster {
                    info.mask |= mask;
                }
            }
        }
    }

    pub fn unsafe_to_break(&mut self, start: Option<usize>, end: Option<usize>) {
        self.set_glyph_flags(
            glyph_flag::UNSAFE_TO_BREAK | glyph_flag::UNSAFE_TO_CONCAT,
            start,
            end,
            false,
        );
    }

    pub fn unsafe_to_concat(&mut self, start: Option<usize>, end: Option<usize>) {
        if !self.flags.contains(BufferFlags::PRODUCE_UNSAFE_TO_CONCAT) {
            return;
        }
        self.set_glyph_flags(glyph_flag::UNSAFE_TO_CONCAT, start, end, false);
    }

    pub fn unsafe_to_break_from_outbuffer(&mut self, start: Option<usize>, end: Option<usize>) {
        self.set_glyph_flags(
            glyph_flag::UNSAFE_TO_BREAK | glyph_flag::UNSAFE_TO_CONCAT,
            start,
            end,
            true,
        );
    }

    pub fn unsafe_to_concat_from_outbuffer(&mut self, start: Option<usize>, end: Option<usize>) {
        if !self.flags.contains(BufferFlags::PRODUCE_UNSAFE_TO_CONCAT) {
            return;
        }
        self.set_glyph_flags(glyph_flag::UNSAFE_TO_CONCAT, start, end, true);
    }

    pub fn safe_to_insert_tatweel(&mut self, start: Option<usize>, end: Option<usize>) {
        if !self
            .flags
            .contains(BufferFlags::PRODUCE_SAFE_TO_INSERT_TATWEEL)
        {
            return;
        }
        self.set_glyph_flags(glyph_flag::SAFE_TO_INSERT_TATWEEL, start, end, false);
    }

    // Reversal.

    pub fn reverse(&mut self) {
        if self.is_empty() {
            return;
        }
        self.reverse_range(0, self.len);
    }

    pub fn reverse_range(&mut self, start: usize, end: usize) {
        self.info[start..end].reverse();
        if self.have_positions {
            self.pos[start..end].reverse();
        }
    }

    pub fn reverse_groups(
        &mut self,
        group: impl Fn(&GlyphInfo, &GlyphInfo) -> bool,
        merge_clusters: bool,
    ) {
        if self.is_empty() {
            return;
        }

        let mut start = 0;
        for i in 1..=self.len {
            if i == self.len || !group(&self.info[i - 1], &self.info[i]) {
                if merge_clusters {
                    self.merge_clusters(start, i);
                }
                self.reverse_range(start, i);
                start = i;
            }
        }

        self.reverse();
    }

    pub fn reverse_graphemes(&mut self) {
        let merge = self.cluster_level == BufferClusterLevel::MonotoneCharacters;
        self.reverse_groups(crate::ot_layout::grapheme_group, merge)
    }

    // Syllables.

    pub fn next_syllable(&self, start: usize) -> usize {
        if start >= self.len {
            return start;
        }

        let syllable = self.info[start].syllable;
        let mut end = start + 1;
        while end < self.len && self.info[end].syllable == syllable {
            end += 1;
        }
        end
    }

    /// Stable insertion sort, merging clusters whenever items move.
    pub fn sort(
        &mut self,
        start: usize,
        end: usize,
        cmp: impl Fn(&GlyphInfo, &GlyphInfo) -> core::cmp::Ordering,
    ) {
        debug_assert!(!self.have_positions);
        for i in start + 1..end {
            let mut j = i;
            while j > start && cmp(&self.info[j - 1], &self.info[i]).is_gt() {
                j -= 1;
            }
            if i == j {
                continue;
            }
            self.merge_clusters(j, i + 1);
            let t = self.info[i];
            self.info.copy_within(j..i, j + 1);
            self.info[j] = t;
        }
    }

    // Limits.

    pub fn check_len(&mut self, len: usize) -> bool {
        if len > self.max_len {
            self.successful = false;
            return false;
        }
        true
    }

    pub fn enter(&mut self) {
        self.successful = true;
        self.serial = 0;
        self.scratch_flags = 0;
        self.max_len = (self.len * MAX_LEN_FACTOR).max(MAX_LEN_MIN);
        self.max_ops = (self.len as i32)
            .saturating_mul(MAX_OPS_FACTOR)
            .max(MAX_OPS_MIN);
    }

    pub fn leave(&mut self) {
        self.max_len = MAX_LEN_MIN;
        self.max_ops = MAX_OPS_MIN;
        self.serial = 0;
    }

    /// Rebuilds the content digest from the live glyph string.
    pub fn compute_digest(&self) -> SetDigest {
        let mut digest = SetDigest::new();
        digest.add_array(self.info[..self.len].iter().map(|info| info.glyph_id));
        digest
    }

    // Unicode prep.

    pub fn set_unicode_props(&mut self) {
        // Light-weight grapheme extension: marks, joining circumstances and
        // emoji modifiers stay with their base for cluster purposes.
        let mut scratch = self.scratch_flags;
        let len = self.len;

        let mut i = 0;
        while i < len {
            self.info[i].init_unicode_props(&mut scratch);

            let u = self.info[i].as_char();
            if crate::unicode::is_zwj(u) {
                // Mark ZWJ and any emoji after it as continuations.
                self.info[i].set_unicode_props(
                    self.info[i].unicode_props() | UnicodeProps::CONTINUATION.bits(),
                );
                if i + 1 < len
                    && crate::unicode::is_emoji_extended_pictographic(self.info[i + 1].as_char())
                {
                    i += 1;
                    self.info[i].init_unicode_props(&mut scratch);
                    self.info[i].set_unicode_props(
                        self.info[i].unicode_props() | UnicodeProps::CONTINUATION.bits(),
                    );
                }
            } else if matches!(u as u32, 0x1F3FB..=0x1F3FF | 0xFE0F) {
                // Emoji modifiers and VS16 extend the cluster.
                self.info[i].set_unicode_props(
                    self.info[i].unicode_props() | UnicodeProps::CONTINUATION.bits(),
                );
            }

            i += 1;
        }

        self.scratch_flags = scratch;
    }

    pub fn insert_dotted_circle(&mut self, face: &crate::Face) {
        if self
            .flags
            .contains(BufferFlags::DO_NOT_INSERT_DOTTED_CIRCLE)
        {
            return;
        }

        if !self.flags.contains(BufferFlags::BEGINNING_OF_TEXT)
            || self.len == 0
            || self.info[0].general_category() != GeneralCategory::NON_SPACING_MARK
        {
            return;
        }

        if face.nominal_glyph('\u{25CC}').is_none() {
            return;
        }

        let mut info = GlyphInfo {
            glyph_id: 0x25CC,
            cluster: self.info[0].cluster,
            mask: self.info[0].mask,
            ..GlyphInfo::default()
        };
        let mut scratch = self.scratch_flags;
        info.init_unicode_props(&mut scratch);
        self.scratch_flags = scratch;

        self.info.insert(0, info);
        self.len += 1;
    }

    pub fn form_clusters(&mut self) {
        if self.scratch_flags & scratch_flags::HAS_NON_ASCII == 0 {
            return;
        }

        if self.cluster_level == BufferClusterLevel::MonotoneGraphemes {
            let mut start = 0;
            for i in 1..=self.len {
                if i == self.len || !crate::ot_layout::grapheme_group(&self.info[i - 1], &self.info[i])
                {
                    self.merge_clusters(start, i);
                    start = i;
                }
            }
        } else {
            let mut start = 0;
            for i in 1..=self.len {
                if i == self.len || !crate::ot_layout::grapheme_group(&self.info[i - 1], &self.info[i])
                {
                    self.unsafe_to_break(Some(start), Some(i));
                    start = i;
                }
            }
        }
    }

    pub fn ensure_native_direction(&mut self) {
        let Some(script) = self.script else {
            return;
        };

        let horiz_dir = script::horizontal_direction(script);

        if (self.direction.is_horizontal()
            && horiz_dir != Direction::Invalid
            && self.direction != horiz_dir)
            || (self.direction.is_vertical() && self.direction != Direction::TopToBottom)
        {
            self.reverse_graphemes();
            self.direction = self.direction.reverse();
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len)
            .field("direction", &self.direction)
            .field("script", &self.script)
            .finish()
    }
}

/// A buffer of Unicode text ready for shaping.
pub struct UnicodeBuffer(pub(crate) Buffer);

impl UnicodeBuffer {
    pub fn new() -> Self {
        UnicodeBuffer(Buffer::new())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends a string, assigning each char its char index as cluster.
    pub fn push_str(&mut self, text: &str) {
        let base = self.0.len as u32;
        for (i, c) in text.chars().enumerate() {
            self.0.add(c as u32, base + i as u32);
        }
    }

    pub fn add(&mut self, c: char, cluster: u32) {
        self.0.add(c as u32, cluster);
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.0.direction = direction;
    }

    pub fn direction(&self) -> Direction {
        self.0.direction
    }

    pub fn set_script(&mut self, script: Script) {
        self.0.script = Some(script);
    }

    pub fn script(&self) -> Option<Script> {
        self.0.script
    }

    pub fn set_language(&mut self, language: Language) {
        self.0.language = Some(language);
    }

    pub fn language(&self) -> Option<&Language> {
        self.0.language.as_ref()
    }

    pub fn set_flags(&mut self, flags: BufferFlags) {
        self.0.flags = flags;
    }

    pub fn flags(&self) -> BufferFlags {
        self.0.flags
    }

    pub fn set_cluster_level(&mut self, level: BufferClusterLevel) {
        self.0.cluster_level = level;
    }

    pub fn cluster_level(&self) -> BufferClusterLevel {
        self.0.cluster_level
    }

    /// The glyph that replaces invisible default-ignorable characters.
    pub fn set_invisible_glyph(&mut self, glyph_id: Option<u32>) {
        self.0.invisible = glyph_id;
    }

    /// Renumbers clusters 0..n, useful after pushing multiple strings.
    pub fn reset_clusters(&mut self) {
        for (i, info) in self.0.info.iter_mut().enumerate() {
            info.cluster = i as u32;
        }
    }

    /// Fills in unset segment properties from the buffer content.
    pub fn guess_segment_properties(&mut self) {
        if self.0.script.is_none() {
            for info in &self.0.info {
                let s = script::from_char(info.as_char());
                if s != script::COMMON && s != script::INHERITED && s != script::UNKNOWN {
                    self.0.script = Some(s);
                    break;
                }
            }
        }

        if self.0.direction == Direction::Invalid {
            self.0.direction = match self.0.script {
                Some(s) => script::horizontal_direction(s),
                None => Direction::LeftToRight,
            };
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
        self.0.flags = BufferFlags::default();
    }
}

impl Default for UnicodeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UnicodeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The result of shaping: glyph ids, clusters and positions.
pub struct GlyphBuffer(pub(crate) Buffer);

impl GlyphBuffer {
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn glyph_infos(&self) -> &[GlyphInfo] {
        &self.0.info[..self.0.len]
    }

    pub fn glyph_positions(&self) -> &[GlyphPosition] {
        &self.0.pos[..self.0.len]
    }

    /// Reclaims the allocation for the next shaping call.
    pub fn clear(mut self) -> UnicodeBuffer {
        self.0.clear();
        UnicodeBuffer(self.0)
    }

    /// A compact debug representation: `gid=cluster@x,y+advance|...`.
    pub fn serialize(&self) -> String {
        use core::fmt::Write;

        let mut s = String::new();
        for (info, pos) in self.glyph_infos().iter().zip(self.glyph_positions()) {
            if !s.is_empty() {
                s.push('|');
            }
            write!(&mut s, "{}={}", info.glyph_id, info.cluster).unwrap();
            if pos.x_offset != 0 || pos.y_offset != 0 {
                write!(&mut s, "@{},{}", pos.x_offset, pos.y_offset).unwrap();
            }
            write!(&mut s, "+{}", pos.x_advance).unwrap();
            if pos.y_advance != 0 {
                write!(&mut s, ",{}", pos.y_advance).unwrap();
            }
        }
        s
    }
}

impl fmt::Debug for GlyphBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_from(codepoints: &[u32]) -> Buffer {
        let mut buffer = Buffer::new();
        for (i, &u) in codepoints.iter().enumerate() {
            buffer.add(u, i as u32);
        }
        buffer
    }

    #[test]
    fn merge_clusters_takes_min() {
        let mut buffer = buffer_from(&[65, 66, 67, 68]);
        buffer.merge_clusters(1, 3);
        let clusters: Vec<_> = buffer.info.iter().map(|i| i.cluster).collect();
        assert_eq!(clusters, [0, 1, 1, 3]);
    }

    #[test]
    fn merge_clusters_extends_over_equal_clusters() {
        let mut buffer = buffer_from(&[65, 66, 67, 68]);
        buffer.info[2].cluster = 1;
        buffer.merge_clusters(2, 4);
        let clusters: Vec<_> = buffer.info.iter().map(|i| i.cluster).collect();
        // Glyph 1 shares glyph 2's cluster, so it joins the merge.
        assert_eq!(clusters, [0, 1, 1, 1]);
    }

    #[test]
    fn out_buffer_round_trip() {
        let mut buffer = buffer_from(&[10, 11, 12]);
        buffer.clear_output();
        buffer.next_glyph();
        buffer.replace_glyph(100);
        buffer.output_glyph(200);
        buffer.next_glyph();
        buffer.sync();

        let glyphs: Vec<_> = buffer.info.iter().map(|i| i.glyph_id).collect();
        assert_eq!(glyphs, [10, 100, 200, 12]);
        assert_eq!(buffer.len, 4);
        assert!(!buffer.have_output);
    }

    #[test]
    fn move_to_rewinds_and_replays() {
        let mut buffer = buffer_from(&[1, 2, 3, 4]);
        buffer.clear_output();
        buffer.next_glyphs(3);
        assert_eq!(buffer.out_len(), 3);

        assert!(buffer.move_to(1));
        assert_eq!(buffer.out_len(), 1);
        assert_eq!(buffer.cur(0).glyph_id, 2);

        assert!(buffer.move_to(3));
        assert_eq!(buffer.out_len(), 3);
        buffer.sync();
        let glyphs: Vec<_> = buffer.info.iter().map(|i| i.glyph_id).collect();
        assert_eq!(glyphs, [1, 2, 3, 4]);
    }

    #[test]
    fn unsafe_to_break_skips_first_cluster() {
        let mut buffer = buffer_from(&[1, 2, 3]);
        buffer.flags = BufferFlags::PRODUCE_UNSAFE_TO_CONCAT;
        buffer.unsafe_to_break(Some(0), Some(3));
        assert_eq!(buffer.info[0].glyph_flags(), 0);
        assert_eq!(
            buffer.info[1].glyph_flags(),
            glyph_flag::UNSAFE_TO_BREAK | glyph_flag::UNSAFE_TO_CONCAT
        );
    }

    #[test]
    fn unsafe_to_concat_requires_flag() {
        let mut buffer = buffer_from(&[1, 2, 3]);
        buffer.unsafe_to_concat(Some(0), Some(3));
        assert!(buffer.info.iter().all(|i| i.glyph_flags() == 0));
    }

    #[test]
    fn delete_glyphs_inplace_keeps_neighbours() {
        let mut buffer = buffer_from(&[1, 2, 3]);
        buffer.delete_glyphs_inplace(|info| info.glyph_id == 2);
        assert_eq!(buffer.len, 2);
        let glyphs: Vec<_> = buffer.info.iter().map(|i| i.glyph_id).collect();
        assert_eq!(glyphs, [1, 3]);
        // Cluster values stay monotone; the deleted cluster simply vanishes.
        let clusters: Vec<_> = buffer.info.iter().map(|i| i.cluster).collect();
        assert_eq!(clusters, [0, 2]);
    }

    #[test]
    fn delete_leading_glyph_merges_forward() {
        let mut buffer = buffer_from(&[1, 2]);
        buffer.delete_glyphs_inplace(|info| info.glyph_id == 1);
        assert_eq!(buffer.len, 1);
        // The deleted cluster spreads onto the following glyph.
        assert_eq!(buffer.info[0].cluster, 0);
        assert_eq!(buffer.info[0].glyph_id, 2);
    }

    #[test]
    fn lig_id_wraps() {
        let mut buffer = Buffer::new();
        let mut seen = Vec::new();
        for _ in 0..9 {
            seen.push(buffer.allocate_lig_id());
        }
        assert!(seen.iter().all(|&id| id != 0 && id < 8));
        assert_eq!(seen[0], seen[7]);
    }

    #[test]
    fn sort_merges_clusters() {
        let mut buffer = buffer_from(&[30, 10, 20]);
        buffer.sort(0, 3, |a, b| a.glyph_id.cmp(&b.glyph_id));
        let glyphs: Vec<_> = buffer.info.iter().map(|i| i.glyph_id).collect();
        assert_eq!(glyphs, [10, 20, 30]);
        // Everything moved, so all clusters collapse to the minimum.
        assert!(buffer.info.iter().all(|i| i.cluster == 0));
    }

    #[test]
    fn guess_properties() {
        let mut buffer = UnicodeBuffer::new();
        buffer.push_str("اب");
        buffer.guess_segment_properties();
        assert_eq!(buffer.script(), Some(crate::script::ARABIC));
        assert_eq!(buffer.direction(), Direction::RightToLeft);
    }
}
