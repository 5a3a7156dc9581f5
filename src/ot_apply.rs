//! Matching of glyph patterns: the skipping iterator, the apply context and
//! the shared machinery GSUB and GPOS lookups are built from.

use read_fonts::tables::layout::SequenceLookupRecord;

use crate::buffer::{Buffer, GlyphInfo, GlyphPropsFlags};
use crate::face::Face;
use crate::ot_layout::{
    check_glyph_property, lookup_flags, TableIndex, MAX_CONTEXT_LENGTH, MAX_NESTING_LEVEL,
};
use crate::set_digest::SetDigest;
use crate::unicode::GeneralCategory;
use crate::Mask;

pub(crate) type MatchPositions = smallvec::SmallVec<[u32; 8]>;

/// Value is a glyph id.
pub fn match_glyph(info: &GlyphInfo, value: u16) -> bool {
    info.glyph_id == value as u32
}

pub fn match_always(_info: &GlyphInfo, _value: u16) -> bool {
    true
}

#[derive(PartialEq, Eq, Copy, Clone)]
pub enum Match {
    Match,
    NotMatch,
    Skip,
}

#[derive(PartialEq, Eq, Copy, Clone)]
enum MayMatch {
    No,
    Yes,
    Maybe,
}

#[derive(PartialEq, Eq, Copy, Clone)]
pub enum MaySkip {
    No,
    Yes,
    Maybe,
}

#[derive(Default)]
pub(crate) struct Matcher {
    lookup_props: u32,
    mask: Mask,
    ignore_zwnj: bool,
    ignore_zwj: bool,
    ignore_hidden: bool,
    per_syllable: bool,
}

impl Matcher {
    fn new(ctx: &ApplyContext, context_match: bool) -> Self {
        Matcher {
            lookup_props: ctx.lookup_props,
            // Ignore ZWNJ if we are matching GPOS, or matching GSUB context
            // and asked to.
            ignore_zwnj: ctx.table_index == TableIndex::Gpos || (context_match && ctx.auto_zwnj),
            // Ignore ZWJ if we are matching context, or asked to.
            ignore_zwj: context_match || ctx.auto_zwj,
            // Hidden glyphs (like CGJ) are skippable during GPOS only.
            ignore_hidden: ctx.table_index == TableIndex::Gpos,
            mask: if context_match {
                u32::MAX
            } else {
                ctx.lookup_mask()
            },
            // Per-syllable matching applies to GSUB only.
            per_syllable: ctx.table_index == TableIndex::Gsub && ctx.per_syllable,
        }
    }

    fn may_match(
        &self,
        info: &GlyphInfo,
        glyph_data: u16,
        match_func: Option<&impl Fn(&GlyphInfo, u16) -> bool>,
        syllable: u8,
    ) -> MayMatch {
        if (info.mask & self.mask) == 0
            || (self.per_syllable && syllable != 0 && syllable != info.syllable)
        {
            return MayMatch::No;
        }

        if let Some(match_func) = match_func {
            return if match_func(info, glyph_data) {
                MayMatch::Yes
            } else {
                MayMatch::No
            };
        }

        MayMatch::Maybe
    }

    #[inline(always)]
    fn may_skip(&self, info: &GlyphInfo, face: &Face, lookup_props: u32) -> MaySkip {
        if !check_glyph_property(face, info, lookup_props) {
            return MaySkip::Yes;
        }

        if info.is_default_ignorable()
            && (self.ignore_zwnj || !info.is_zwnj())
            && (self.ignore_zwj || !info.is_zwj())
            && (self.ignore_hidden || !info.is_hidden())
        {
            return MaySkip::Maybe;
        }

        MaySkip::No
    }
}

pub(crate) enum MatchSource {
    Info,
    OutInfo,
}

/// Walks the buffer honouring lookup flags, joiner policy and syllable
/// boundaries.
pub(crate) struct SkippingIterator<'a, 'f, F> {
    pub buffer: &'a mut Buffer,
    face: &'a Face<'f>,
    matcher: &'a Matcher,
    buf_len: usize,
    buf_idx: usize,
    glyph_data: u16,
    match_func: Option<F>,
    lookup_props: u32,
    syllable: u8,
}

impl<'a, 'f> SkippingIterator<'a, 'f, fn(&GlyphInfo, u16) -> bool> {
    pub fn new(ctx: &'a mut ApplyContext<'_, 'f>, context_match: bool) -> Self {
        Self::with_match_fn(ctx, context_match, None)
    }
}

impl<'a, 'f, F> SkippingIterator<'a, 'f, F>
where
    F: Fn(&GlyphInfo, u16) -> bool,
{
    pub fn with_match_fn(
        ctx: &'a mut ApplyContext<'_, 'f>,
        context_match: bool,
        match_func: Option<F>,
    ) -> Self {
        let matcher = if context_match {
            &ctx.context_matcher
        } else {
            &ctx.matcher
        };
        let buf_len = ctx.buffer.len;
        SkippingIterator {
            buffer: ctx.buffer,
            face: ctx.face,
            matcher,
            buf_len,
            buf_idx: 0,
            glyph_data: 0,
            match_func,
            lookup_props: matcher.lookup_props,
            syllable: 0,
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.buf_idx
    }

    pub fn set_glyph_data(&mut self, glyph_data: u16) {
        self.glyph_data = glyph_data;
    }

    pub fn set_lookup_props(&mut self, lookup_props: u32) {
        self.lookup_props = lookup_props;
    }

    pub fn reset(&mut self, start_index: usize) {
        self.buf_idx = start_index;
        self.buf_len = self.buffer.len;
        self.syllable = if self.buffer.idx < self.buffer.len {
            self.buffer.cur(0).syllable
        } else {
            0
        };
    }

    /// Doesn't refresh the syllable; used by GPOS which never changes it.
    pub fn reset_fast(&mut self, start_index: usize) {
        self.buf_idx = start_index;
        self.buf_len = self.buffer.len;
    }

    pub fn may_skip(&self, info: &GlyphInfo) -> MaySkip {
        self.matcher.may_skip(info, self.face, self.lookup_props)
    }

    /// Whether the base glyph of the ligature with the given id, somewhere
    /// in the already-output glyphs, is skippable under the current lookup
    /// flags. Marks of different components may still join a ligature when
    /// their base is.
    fn ligature_base_may_skip(&self, lig_id: u8) -> bool {
        let out = self.buffer.out_info();
        for info in out[..self.buffer.out_len()].iter().rev() {
            if info.lig_id() != lig_id {
                break;
            }
            if info.lig_comp() == 0 {
                return self.may_skip(info) == MaySkip::Yes;
            }
        }
        false
    }

    #[inline]
    pub fn match_at(&self, idx: usize, source: MatchSource) -> Match {
        let info = match source {
            MatchSource::Info => &self.buffer.info[idx],
            MatchSource::OutInfo => &self.buffer.out_info()[idx],
        };

        let skip = self.matcher.may_skip(info, self.face, self.lookup_props);
        if skip == MaySkip::Yes {
            return Match::Skip;
        }

        let matched = self.matcher.may_match(
            info,
            self.glyph_data,
            self.match_func.as_ref(),
            self.syllable,
        );

        if matched == MayMatch::Yes || (matched == MayMatch::Maybe && skip == MaySkip::No) {
            return Match::Match;
        }

        if skip == MaySkip::No {
            return Match::NotMatch;
        }

        Match::Skip
    }

    #[inline]
    pub fn next(&mut self, unsafe_to: Option<&mut usize>) -> bool {
        let stop = self.buf_len as i64 - 1;

        while (self.buf_idx as i64) < stop {
            self.buf_idx += 1;

            match self.match_at(self.buf_idx, MatchSource::Info) {
                Match::Match => {
                    self.glyph_data += 1;
                    return true;
                }
                Match::NotMatch => {
                    if let Some(unsafe_to) = unsafe_to {
                        *unsafe_to = self.buf_idx + 1;
                    }
                    return false;
                }
                Match::Skip => continue,
            }
        }

        if let Some(unsafe_to) = unsafe_to {
            *unsafe_to = self.buf_idx + 1;
        }
        false
    }

    #[inline]
    pub fn prev(&mut self, unsafe_from: Option<&mut usize>) -> bool {
        while self.buf_idx > 0 {
            self.buf_idx -= 1;

            match self.match_at(self.buf_idx, MatchSource::OutInfo) {
                Match::Match => {
                    self.glyph_data += 1;
                    return true;
                }
                Match::NotMatch => {
                    if let Some(unsafe_from) = unsafe_from {
                        *unsafe_from = self.buf_idx.max(1) - 1;
                    }
                    return false;
                }
                Match::Skip => continue,
            }
        }

        if let Some(unsafe_from) = unsafe_from {
            *unsafe_from = 0;
        }
        false
    }
}

/// Per-lookup application state threaded through all subtables.
pub(crate) struct ApplyContext<'a, 'f> {
    pub table_index: TableIndex,
    pub face: &'a Face<'f>,
    pub buffer: &'a mut Buffer,
    lookup_mask: Mask,
    pub per_syllable: bool,
    pub lookup_index: u16,
    pub lookup_props: u32,
    pub nesting_level_left: usize,
    pub auto_zwnj: bool,
    pub auto_zwj: bool,
    pub random: bool,
    pub random_state: u32,
    pub new_syllables: Option<u8>,
    pub last_base: i32,
    pub last_base_until: u32,
    pub digest: SetDigest,
    pub(crate) matcher: Matcher,
    pub(crate) context_matcher: Matcher,
    pub(crate) match_positions: MatchPositions,
    pub(crate) match_positions_len: usize,
}

impl<'a, 'f> ApplyContext<'a, 'f> {
    pub fn new(table_index: TableIndex, face: &'a Face<'f>, buffer: &'a mut Buffer) -> Self {
        let digest = buffer.compute_digest();
        Self {
            table_index,
            face,
            buffer,
            lookup_mask: 1,
            per_syllable: false,
            lookup_index: u16::MAX,
            lookup_props: 0,
            nesting_level_left: MAX_NESTING_LEVEL,
            auto_zwnj: true,
            auto_zwj: true,
            random: false,
            random_state: 1,
            new_syllables: None,
            last_base: -1,
            last_base_until: 0,
            digest,
            matcher: Matcher::default(),
            context_matcher: Matcher::default(),
            match_positions: MatchPositions::from_elem(0, 4),
            match_positions_len: 0,
        }
    }

    pub fn random_number(&mut self) -> u32 {
        // Lehmer LCG, minstd.
        self.random_state = self.random_state.wrapping_mul(48271) % (i32::MAX as u32);
        self.random_state
    }

    #[inline]
    pub fn lookup_mask(&self) -> Mask {
        self.lookup_mask
    }

    pub fn set_lookup_mask(&mut self, mask: Mask) {
        self.lookup_mask = mask;
        self.last_base = -1;
        self.last_base_until = 0;
    }

    pub fn update_matchers(&mut self) {
        self.matcher = Matcher::new(self, false);
        self.context_matcher = Matcher::new(self, true);
    }

    /// Applies a nested lookup at the current position.
    pub fn recurse(&mut self, sub_lookup_index: u16) -> Option<()> {
        if self.nesting_level_left == 0 {
            self.buffer.successful = false;
            return None;
        }

        self.buffer.max_ops -= 1;
        if self.buffer.max_ops < 0 {
            self.buffer.successful = false;
            return None;
        }

        self.nesting_level_left -= 1;
        let saved_props = self.lookup_props;
        let saved_index = self.lookup_index;
        self.match_positions.truncate(self.match_positions_len);
        let saved_positions = self.match_positions.clone();
        let saved_positions_len = self.match_positions_len;

        self.lookup_index = sub_lookup_index;
        let applied = crate::ot_lookup::apply_nested(self, sub_lookup_index);

        self.lookup_props = saved_props;
        self.lookup_index = saved_index;
        self.update_matchers();
        self.match_positions = saved_positions;
        self.match_positions_len = saved_positions_len;
        self.nesting_level_left += 1;
        applied
    }

    fn set_glyph_class(
        &mut self,
        glyph_id: u32,
        class_guess: GlyphPropsFlags,
        ligature: bool,
        component: bool,
    ) {
        self.digest.add(glyph_id);

        if let Some(syllable) = self.new_syllables {
            self.buffer.cur_mut(0).syllable = syllable;
        }

        let has_glyph_classes = self.face.ot.has_glyph_classes();
        let new_props = if has_glyph_classes {
            Some(self.face.ot.glyph_props(glyph_id))
        } else {
            None
        };

        let cur = self.buffer.cur_mut(0);
        let mut props = cur.glyph_props();

        props |= GlyphPropsFlags::SUBSTITUTED.bits();

        if ligature {
            props |= GlyphPropsFlags::LIGATED.bits();
            // Only the last transformation between ligature and multiple
            // substitution matters for mark attachment; ligating again
            // forgives an earlier multiplication.
            props &= !GlyphPropsFlags::MULTIPLIED.bits();
        }

        if component {
            props |= GlyphPropsFlags::MULTIPLIED.bits();
        }

        if let Some(gdef_props) = new_props {
            props &= GlyphPropsFlags::PRESERVE.bits();
            cur.set_glyph_props(props | gdef_props);
        } else if !class_guess.is_empty() {
            props &= GlyphPropsFlags::PRESERVE.bits();
            cur.set_glyph_props(props | class_guess.bits());
        } else {
            cur.set_glyph_props(props);
        }
    }

    pub fn replace_glyph(&mut self, glyph_id: u32) {
        self.set_glyph_class(glyph_id, GlyphPropsFlags::empty(), false, false);
        self.buffer.replace_glyph(glyph_id);
    }

    pub fn replace_glyph_inplace(&mut self, glyph_id: u32) {
        self.set_glyph_class(glyph_id, GlyphPropsFlags::empty(), false, false);
        self.buffer.cur_mut(0).glyph_id = glyph_id;
    }

    pub fn replace_glyph_with_ligature(&mut self, glyph_id: u32, class_guess: GlyphPropsFlags) {
        self.set_glyph_class(glyph_id, class_guess, true, false);
        self.buffer.replace_glyph(glyph_id);
    }

    pub fn output_glyph_for_component(&mut self, glyph_id: u32, class_guess: GlyphPropsFlags) {
        self.set_glyph_class(glyph_id, class_guess, false, true);
        self.buffer.output_glyph(glyph_id);
    }
}

pub(crate) fn match_input(
    ctx: &mut ApplyContext,
    input_len: u16,
    match_func: impl Fn(&GlyphInfo, u16) -> bool,
    end_position: &mut usize,
    total_component_count: Option<&mut u8>,
) -> bool {
    let count = usize::from(input_len) + 1;
    if count > MAX_CONTEXT_LENGTH {
        return false;
    }

    // Ligature-component identity: glyphs attached to different components
    // of a previous ligature must not match together. A glyph is free to
    // match marks attached to itself, though, and two marks of different
    // components still match when their base ligature is skippable under
    // the current lookup flags; that last question is answered lazily,
    // once, below.
    let first = *ctx.buffer.cur(0);
    let anchor = (first.lig_id(), first.lig_comp());
    let mut anchor_base_skippable: Option<bool> = None;

    let mut positions = [0u32; MAX_CONTEXT_LENGTH];
    positions[0] = ctx.buffer.idx as u32;
    let mut components = first.lig_num_comps();
    let mut end = ctx.buffer.idx + 1;

    let mut iter = SkippingIterator::with_match_fn(ctx, false, Some(match_func));
    iter.reset(positions[0] as usize);
    iter.set_glyph_data(0);

    for slot in positions[1..count].iter_mut() {
        let mut unsafe_to = 0;
        if !iter.next(Some(&mut unsafe_to)) {
            *end_position = unsafe_to;
            return false;
        }

        *slot = iter.index() as u32;
        end = iter.index() + 1;

        let this = iter.buffer.info[iter.index()];
        let attachment = (this.lig_id(), this.lig_comp());

        if anchor.0 == 0 || anchor.1 == 0 {
            // Unattached (or base-of-ligature) anchor: later glyphs may
            // only be attached to the anchor's own ligature.
            if attachment.0 != 0 && attachment.1 != 0 && attachment.0 != anchor.0 {
                return false;
            }
        } else if attachment != anchor {
            // The anchor hangs off a previous ligature component and this
            // glyph doesn't hang off the same one; only allowed when that
            // ligature's base is itself ignorable here.
            let skippable = *anchor_base_skippable
                .get_or_insert_with(|| iter.ligature_base_may_skip(anchor.0));
            if !skippable {
                return false;
            }
        }

        components = components.wrapping_add(this.lig_num_comps());
    }

    *end_position = end;
    if let Some(total) = total_component_count {
        *total = components;
    }

    ctx.match_positions_len = count;
    if ctx.match_positions.len() < count {
        ctx.match_positions.resize(count, 0);
    }
    ctx.match_positions[..count].copy_from_slice(&positions[..count]);
    true
}

pub(crate) fn match_backtrack(
    ctx: &mut ApplyContext,
    backtrack_len: u16,
    match_func: impl Fn(&GlyphInfo, u16) -> bool,
    match_start: &mut usize,
) -> bool {
    if backtrack_len == 0 {
        *match_start = ctx.buffer.backtrack_len();
        return true;
    }

    let start = ctx.buffer.backtrack_len();
    let mut iter = SkippingIterator::with_match_fn(ctx, true, Some(match_func));
    iter.reset(start);
    iter.set_glyph_data(0);

    for _ in 0..backtrack_len {
        let mut unsafe_from = 0;
        if !iter.prev(Some(&mut unsafe_from)) {
            *match_start = unsafe_from;
            return false;
        }
    }

    *match_start = iter.index();
    true
}

pub(crate) fn match_lookahead(
    ctx: &mut ApplyContext,
    lookahead_len: u16,
    match_func: impl Fn(&GlyphInfo, u16) -> bool,
    start_index: usize,
    end_index: &mut usize,
) -> bool {
    if lookahead_len == 0 {
        *end_index = start_index;
        return true;
    }

    // Lookahead always starts after a non-empty input match.
    debug_assert!(start_index >= 1);
    let mut iter = SkippingIterator::with_match_fn(ctx, true, Some(match_func));
    iter.reset(start_index - 1);
    iter.set_glyph_data(0);

    for _ in 0..lookahead_len {
        let mut unsafe_to = 0;
        if !iter.next(Some(&mut unsafe_to)) {
            *end_index = unsafe_to;
            return false;
        }
    }

    *end_index = iter.index() + 1;
    true
}

/// Runs the nested lookups of a (chain) context match, shifting the match
/// positions after each recursion that changed the buffer length.
pub(crate) fn apply_lookup(
    ctx: &mut ApplyContext,
    input_len: usize,
    match_end: usize,
    lookups: &[SequenceLookupRecord],
) {
    let mut count = input_len + 1;

    // All positions are distances from the beginning of the output buffer.
    let mut end: isize = {
        let backtrack_len = ctx.buffer.backtrack_len();
        let delta = backtrack_len as isize - ctx.buffer.idx as isize;

        for j in 0..count {
            ctx.match_positions[j] = (ctx.match_positions[j] as isize + delta) as u32;
        }

        backtrack_len as isize + match_end as isize - ctx.buffer.idx as isize
    };

    for record in lookups {
        if !ctx.buffer.successful {
            break;
        }

        let idx = usize::from(record.sequence_index());
        if idx >= count {
            continue;
        }

        let orig_len = ctx.buffer.backtrack_len() + ctx.buffer.lookahead_len();

        // Earlier recursions may have deleted this position entirely.
        if ctx.match_positions[idx] as usize >= orig_len {
            continue;
        }

        if !ctx.buffer.move_to(ctx.match_positions[idx] as usize) {
            break;
        }

        if ctx.buffer.max_ops <= 0 {
            break;
        }

        if ctx.recurse(record.lookup_list_index()).is_none() {
            continue;
        }

        let new_len = ctx.buffer.backtrack_len() + ctx.buffer.lookahead_len();
        let mut delta = new_len as isize - orig_len as isize;
        if delta == 0 {
            continue;
        }

        // The recursed lookup changed the buffer length. Assume growth
        // happened right after the current position and shrinkage consumed
        // positions right after it.
        end += delta;
        if end < ctx.match_positions[idx] as isize {
            // Never rewind past the current position; the recursed lookup
            // could not have touched anything before it.
            delta += ctx.match_positions[idx] as isize - end;
            end = ctx.match_positions[idx] as isize;
        }

        let mut next = idx + 1;

        if delta > 0 {
            if delta as usize + count > MAX_CONTEXT_LENGTH {
                break;
            }
            if delta as usize + count > ctx.match_positions.len() {
                ctx.match_positions.resize(delta as usize + count, 0);
            }
        } else {
            // delta is negative here.
            delta = delta.max(next as isize - count as isize);
            next = (next as isize - delta) as usize;
        }

        // Shift!
        ctx.match_positions
            .copy_within(next..count, (next as isize + delta) as usize);
        next = (next as isize + delta) as usize;
        count = (count as isize + delta) as usize;
        ctx.match_positions_len = count;

        // Fill in new entries.
        for j in idx + 1..next {
            ctx.match_positions[j] = ctx.match_positions[j - 1] + 1;
        }

        // And fix up the rest.
        while next < count {
            ctx.match_positions[next] = (ctx.match_positions[next] as isize + delta) as u32;
            next += 1;
        }
    }

    let _ = ctx.buffer.move_to(end.max(0) as usize);
}

/// Forms a ligature out of the matched positions, reassigning ligature ids
/// and components on any marks caught in between or trailing.
pub(crate) fn ligate_input(
    ctx: &mut ApplyContext,
    // Both counts include the first glyph.
    count: usize,
    match_end: usize,
    total_component_count: u8,
    lig_glyph: u32,
) {
    // A base with marks ligated onto it stays a base so later marks can
    // still attach; an all-marks ligature keeps its old ligature id so it
    // can attach to a base ligature in GPOS. Only true ligatures allocate a
    // fresh id.

    let buffer = &mut ctx.buffer;
    buffer.merge_clusters(buffer.idx, match_end);

    let mut is_base_ligature = buffer.info[ctx.match_positions[0] as usize].is_base_glyph();
    let mut is_mark_ligature = buffer.info[ctx.match_positions[0] as usize].is_mark();
    for i in 1..count {
        if !buffer.info[ctx.match_positions[i] as usize].is_mark() {
            is_base_ligature = false;
            is_mark_ligature = false;
        }
    }

    let is_ligature = !is_base_ligature && !is_mark_ligature;
    let class = if is_ligature {
        GlyphPropsFlags::LIGATURE
    } else {
        GlyphPropsFlags::empty()
    };
    let lig_id = if is_ligature {
        buffer.allocate_lig_id()
    } else {
        0
    };

    let first = buffer.cur_mut(0);
    let mut last_lig_id = first.lig_id();
    let mut last_num_comps = first.lig_num_comps();
    let mut comps_so_far = last_num_comps;

    if is_ligature {
        first.set_lig_props_for_ligature(lig_id, total_component_count);
        if first.general_category() == GeneralCategory::NON_SPACING_MARK {
            first.set_general_category(GeneralCategory::OTHER_LETTER);
        }
    }

    ctx.replace_glyph_with_ligature(lig_glyph, class);
    let buffer = &mut ctx.buffer;

    for i in 1..count {
        while buffer.idx < ctx.match_positions[i] as usize && buffer.successful {
            if is_ligature {
                let cur = buffer.cur_mut(0);
                let mut this_comp = cur.lig_comp();
                if this_comp == 0 {
                    this_comp = last_num_comps;
                }
                debug_assert!(comps_so_far >= last_num_comps);
                let new_lig_comp = comps_so_far - last_num_comps + this_comp.min(last_num_comps);
                cur.set_lig_props_for_mark(lig_id, new_lig_comp);
            }
            buffer.next_glyph();
        }

        let cur = buffer.cur(0);
        last_lig_id = cur.lig_id();
        last_num_comps = cur.lig_num_comps();
        comps_so_far += last_num_comps;

        // Skip the base glyph.
        buffer.idx += 1;
    }

    if !is_mark_ligature && last_lig_id != 0 {
        // Re-component any marks following that were attached to the old
        // trailing ligature.
        for i in buffer.idx..buffer.len {
            let info = &mut buffer.info[i];
            if last_lig_id != info.lig_id() {
                break;
            }

            let this_comp = info.lig_comp();
            if this_comp == 0 {
                break;
            }

            debug_assert!(comps_so_far >= last_num_comps);
            let new_lig_comp = comps_so_far - last_num_comps + this_comp.min(last_num_comps);
            info.set_lig_props_for_mark(lig_id, new_lig_comp);
        }
    }
}

/// Would-apply query used by the Indic shaper to probe substitutions
/// without mutating the buffer.
pub(crate) struct WouldApplyContext<'a> {
    pub glyphs: &'a [u32],
    pub zero_context: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    // An sfnt header with no tables: every lookup fetch comes back empty,
    // which is exactly what the machinery tests want.
    const EMPTY_FONT: &[u8] = &[0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

    fn empty_face() -> Face<'static> {
        let font = read_fonts::FontRef::new(EMPTY_FONT).unwrap();
        Face::new(&font)
    }

    fn buffer_of(count: u32) -> Buffer {
        let mut buffer = Buffer::new();
        for i in 0..count {
            buffer.add(100 + i, i);
        }
        // Give every glyph the default lookup mask so matching fires.
        buffer.reset_masks(1);
        buffer
    }

    /// Ligates the first `n` glyphs of the buffer into `lig_glyph`.
    fn ligate_prefix(face: &Face, buffer: &mut Buffer, n: u16, lig_glyph: u32) {
        buffer.clear_output();
        buffer.idx = 0;

        let mut ctx = ApplyContext::new(TableIndex::Gsub, face, buffer);
        ctx.update_matchers();

        let mut match_end = 0;
        let mut components = 0;
        assert!(match_input(
            &mut ctx,
            n - 1,
            match_always,
            &mut match_end,
            Some(&mut components),
        ));
        ligate_input(&mut ctx, n as usize, match_end, components, lig_glyph);
        drop(ctx);

        buffer.sync();
    }

    #[test]
    fn thirty_two_component_ligature_does_not_overflow() {
        let face = empty_face();
        let mut buffer = buffer_of(33);

        ligate_prefix(&face, &mut buffer, 33, 500);

        assert!(buffer.successful);
        assert_eq!(buffer.len, 1);
        assert_eq!(buffer.info[0].glyph_id, 500);
        // The component count degrades within its four bits rather than
        // erroring out.
        let id = buffer.info[0].lig_id();
        assert!(id != 0 && id < 8);
        assert!(buffer.info[0].lig_num_comps() <= 15);
    }

    #[test]
    fn lig_id_wraps_under_repeated_ligation() {
        let face = empty_face();
        let mut buffer = buffer_of(10);

        // Nine pairwise ligations in one buffer walk the three-bit id
        // allocator past its wrap point.
        let mut seen = Vec::new();
        for pass in 0..9 {
            ligate_prefix(&face, &mut buffer, 2, 900 + pass);
            seen.push(buffer.info[0].lig_id());
        }

        assert!(buffer.successful);
        assert_eq!(buffer.len, 1);
        assert!(seen.iter().all(|id| *id != 0 && *id < 8));
        assert_eq!(seen[0], seen[7]);
    }

    #[test]
    fn nesting_beyond_limit_is_clipped() {
        let face = empty_face();
        let mut buffer = buffer_of(2);

        let mut ctx = ApplyContext::new(TableIndex::Gsub, &face, &mut buffer);
        ctx.update_matchers();
        assert_eq!(ctx.nesting_level_left, MAX_NESTING_LEVEL);

        // An exhausted nesting budget refuses the recursion and gives the
        // rest of the pipeline the unsuccessful signal, without panicking.
        ctx.nesting_level_left = 0;
        assert!(ctx.recurse(0).is_none());
        assert!(!ctx.buffer.successful);
    }

    #[test]
    fn recursion_restores_its_bookkeeping() {
        let face = empty_face();
        let mut buffer = buffer_of(2);

        let mut ctx = ApplyContext::new(TableIndex::Gsub, &face, &mut buffer);
        ctx.update_matchers();
        ctx.lookup_props = 0x1234;

        // The face has no lookup 0, so the recursion is a no-op; the saved
        // state must come back regardless.
        assert!(ctx.recurse(0).is_none());
        assert_eq!(ctx.nesting_level_left, MAX_NESTING_LEVEL);
        assert_eq!(ctx.lookup_props, 0x1234);
        assert!(ctx.buffer.successful);
    }
}
