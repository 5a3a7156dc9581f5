//! Glyph positioning subtables.

use read_fonts::tables::gpos::{
    CursivePosFormat1, MarkArray, MarkBasePosFormat1, MarkLigPosFormat1, MarkMarkPosFormat1,
    PairPos, PairPosFormat1, PairPosFormat2, SinglePos, SinglePosFormat1, SinglePosFormat2,
    ValueRecord,
};
use read_fonts::types::GlyphId16;
use read_fonts::FontData;

use crate::buffer::{scratch_flags, Buffer};
use crate::common::Direction;
use crate::ot_apply::{ApplyContext, MatchSource, SkippingIterator};
use crate::ot_layout::lookup_flags;
use crate::ot_lookup::Apply;

pub(crate) mod attach_type {
    pub const NONE: u8 = 0;
    // An attachment is either a mark or a cursive, never both.
    pub const MARK: u8 = 1;
    pub const CURSIVE: u8 = 2;
}

pub(crate) fn position_start(buffer: &mut Buffer) {
    for pos in &mut buffer.pos {
        pos.set_attach_chain(0);
        pos.set_attach_type(attach_type::NONE);
    }
}

pub(crate) fn position_finish_advances(_buffer: &mut Buffer) {}

pub(crate) fn position_finish_offsets(buffer: &mut Buffer) {
    if buffer.scratch_flags & scratch_flags::HAS_GPOS_ATTACHMENT == 0 {
        return;
    }

    let direction = buffer.direction;
    let len = buffer.len;
    for i in 0..len {
        propagate_attachment_offsets(buffer, i, direction);
    }
}

/// Adds the accumulated offset of the glyph each attachment chains to.
fn propagate_attachment_offsets(buffer: &mut Buffer, i: usize, direction: Direction) {
    let chain = buffer.pos[i].attach_chain();
    let kind = buffer.pos[i].attach_type();
    if chain == 0 {
        return;
    }

    buffer.pos[i].set_attach_chain(0);

    let j = (i as isize + chain as isize) as usize;
    if j >= buffer.len {
        return;
    }

    propagate_attachment_offsets(buffer, j, direction);

    if kind & attach_type::CURSIVE != 0 {
        // Cursive chains only accumulate the cross-stream offset.
        if direction.is_horizontal() {
            buffer.pos[i].y_offset += buffer.pos[j].y_offset;
        } else {
            buffer.pos[i].x_offset += buffer.pos[j].x_offset;
        }
    } else {
        buffer.pos[i].x_offset += buffer.pos[j].x_offset;
        buffer.pos[i].y_offset += buffer.pos[j].y_offset;

        debug_assert!(j < i);
        if direction.is_forward() {
            for k in j..i {
                buffer.pos[i].x_offset -= buffer.pos[k].x_advance;
                buffer.pos[i].y_offset -= buffer.pos[k].y_advance;
            }
        } else {
            for k in j + 1..i + 1 {
                buffer.pos[i].x_offset += buffer.pos[k].x_advance;
                buffer.pos[i].y_offset += buffer.pos[k].y_advance;
            }
        }
    }
}

/// Applies a value record to the position at `idx`; returns whether any
/// non-trivial adjustment was present.
fn apply_value(ctx: &mut ApplyContext, data: FontData, record: &ValueRecord, idx: usize) -> bool {
    let mut ret = false;
    let horizontal = ctx.buffer.direction.is_horizontal();

    let mut x_offset = 0i32;
    let mut y_offset = 0i32;
    let mut x_advance = 0i32;
    let mut y_advance = 0i32;

    if let Some(v) = record.x_placement() {
        x_offset += v as i32;
        ret |= v != 0;
    }
    if let Some(v) = record.y_placement() {
        y_offset += v as i32;
        ret |= v != 0;
    }
    if let Some(v) = record.x_advance() {
        if horizontal {
            x_advance += v as i32;
            ret |= v != 0;
        }
    }
    if let Some(v) = record.y_advance() {
        if !horizontal {
            // y_advance values grow downward but font-space grows upward.
            y_advance -= v as i32;
            ret |= v != 0;
        }
    }

    if ctx.face.has_coords() {
        let ot = &ctx.face.ot;
        x_offset += ot.device_delta(record.x_placement_device(data));
        y_offset += ot.device_delta(record.y_placement_device(data));
        if horizontal {
            x_advance += ot.device_delta(record.x_advance_device(data));
        } else {
            y_advance -= ot.device_delta(record.y_advance_device(data));
        }
    }
    ret |= record
        .format
        .intersects(read_fonts::tables::gpos::ValueFormat::ANY_DEVICE_OR_VARIDX);

    let pos = &mut ctx.buffer.pos[idx];
    pos.x_offset += x_offset;
    pos.y_offset += y_offset;
    pos.x_advance += x_advance;
    pos.y_advance += y_advance;

    ret
}

impl Apply for SinglePos<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        match self {
            Self::Format1(t) => t.apply(ctx),
            Self::Format2(t) => t.apply(ctx),
        }
    }
}

impl Apply for SinglePosFormat1<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let glyph = ctx.buffer.cur(0).as_glyph();
        self.coverage().ok()?.get(glyph)?;
        let record = self.value_record().clone();
        let idx = ctx.buffer.idx;
        apply_value(ctx, self.offset_data(), &record, idx);
        ctx.buffer.idx += 1;
        Some(())
    }
}

impl Apply for SinglePosFormat2<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let glyph = ctx.buffer.cur(0).as_glyph();
        let index = self.coverage().ok()?.get(glyph)? as usize;
        let record = self.value_records().get(index).ok()?;
        let idx = ctx.buffer.idx;
        apply_value(ctx, self.offset_data(), &record, idx);
        ctx.buffer.idx += 1;
        Some(())
    }
}

impl Apply for PairPos<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        match self {
            Self::Format1(t) => t.apply(ctx),
            Self::Format2(t) => t.apply(ctx),
        }
    }
}

impl Apply for PairPosFormat1<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let first_glyph = ctx.buffer.cur(0).as_glyph();
        let index = self.coverage().ok()?.get(first_glyph)? as usize;

        let mut iter = SkippingIterator::new(ctx, false);
        iter.reset(iter.buffer.idx);
        let mut unsafe_to = 0;
        if !iter.next(Some(&mut unsafe_to)) {
            ctx.buffer
                .unsafe_to_concat(Some(ctx.buffer.idx), Some(unsafe_to));
            return None;
        }
        let second_glyph_index = iter.index();
        let second_glyph = ctx.buffer.info[second_glyph_index].as_glyph();

        let set = self.pair_sets().get(index).ok()?;
        let records = set.pair_value_records();
        let mut found = None;
        for record in records.iter().filter_map(Result::ok) {
            if record.second_glyph().to_u32() == second_glyph.to_u32() {
                found = Some(record);
                break;
            }
        }
        let Some(record) = found else {
            ctx.buffer
                .unsafe_to_concat(Some(ctx.buffer.idx), Some(second_glyph_index + 1));
            return None;
        };

        let data = set.offset_data();
        let idx = ctx.buffer.idx;
        let record1 = record.value_record1().clone();
        let record2 = record.value_record2().clone();
        let has_record2 = !record2.format.is_empty();
        let ap1 = apply_value(ctx, data, &record1, idx);
        let ap2 = apply_value(ctx, data, &record2, second_glyph_index);

        let mut next = second_glyph_index;
        if ap1 || ap2 {
            ctx.buffer
                .unsafe_to_break(Some(idx), Some(second_glyph_index + 1));
        } else {
            ctx.buffer
                .unsafe_to_concat(Some(idx), Some(second_glyph_index + 1));
        }

        if has_record2 {
            // When the second record positions too, land past it.
            next += 1;
            ctx.buffer.unsafe_to_break(Some(idx), Some(next + 1));
        }

        ctx.buffer.idx = next;
        Some(())
    }
}

impl Apply for PairPosFormat2<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let first_glyph = ctx.buffer.cur(0).as_glyph();
        self.coverage().ok()?.get(first_glyph)?;

        let mut iter = SkippingIterator::new(ctx, false);
        iter.reset(iter.buffer.idx);
        let mut unsafe_to = 0;
        if !iter.next(Some(&mut unsafe_to)) {
            ctx.buffer
                .unsafe_to_concat(Some(ctx.buffer.idx), Some(unsafe_to));
            return None;
        }
        let second_glyph_index = iter.index();
        let second_glyph = ctx.buffer.info[second_glyph_index].as_glyph();

        let class1 = self
            .class_def1()
            .map(|def| def.get(GlyphId16::new(first_glyph.to_u32() as u16)))
            .unwrap_or(0);
        let class2 = self
            .class_def2()
            .map(|def| def.get(GlyphId16::new(second_glyph.to_u32() as u16)))
            .unwrap_or(0);

        if class1 >= self.class1_count() || class2 >= self.class2_count() {
            ctx.buffer
                .unsafe_to_concat(Some(ctx.buffer.idx), Some(second_glyph_index + 1));
            return None;
        }

        let class1_record = self.class1_records().get(class1 as usize).ok()?;
        let class2_record = class1_record.class2_records().get(class2 as usize).ok()?;

        let data = self.offset_data();
        let idx = ctx.buffer.idx;
        let record1 = class2_record.value_record1().clone();
        let record2 = class2_record.value_record2().clone();
        let has_record2 = !record2.format.is_empty();
        let ap1 = apply_value(ctx, data, &record1, idx);
        let ap2 = apply_value(ctx, data, &record2, second_glyph_index);

        let mut next = second_glyph_index;
        if ap1 || ap2 {
            ctx.buffer
                .unsafe_to_break(Some(idx), Some(second_glyph_index + 1));
        } else {
            ctx.buffer
                .unsafe_to_concat(Some(idx), Some(second_glyph_index + 1));
        }

        if has_record2 {
            next += 1;
            ctx.buffer.unsafe_to_break(Some(idx), Some(next + 1));
        }

        ctx.buffer.idx = next;
        Some(())
    }
}

fn reverse_cursive_minor_offset(
    buffer: &mut Buffer,
    i: usize,
    direction: Direction,
    new_parent: usize,
) {
    let chain = buffer.pos[i].attach_chain();
    let kind = buffer.pos[i].attach_type();
    if chain == 0 || kind & attach_type::CURSIVE == 0 {
        return;
    }

    buffer.pos[i].set_attach_chain(0);

    let j = (i as isize + chain as isize) as usize;
    // Stop if we see the new parent in the chain.
    if j == new_parent {
        return;
    }
    reverse_cursive_minor_offset(buffer, j, direction, new_parent);

    if direction.is_horizontal() {
        buffer.pos[j].y_offset = -buffer.pos[i].y_offset;
    } else {
        buffer.pos[j].x_offset = -buffer.pos[i].x_offset;
    }

    buffer.pos[j].set_attach_chain(-chain);
    buffer.pos[j].set_attach_type(kind);
}

impl Apply for CursivePosFormat1<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let this_glyph = ctx.buffer.cur(0).as_glyph();
        let this_index = self.coverage().ok()?.get(this_glyph)? as usize;

        let records = self.entry_exit_record();
        let data = self.offset_data();

        let this_record = records.get(this_index)?;
        let entry_anchor = this_record.entry_anchor(data)?.ok()?;

        let mut iter = SkippingIterator::new(ctx, false);
        iter.reset_fast(iter.buffer.idx);
        let mut unsafe_from = 0;
        if !iter.prev(Some(&mut unsafe_from)) {
            ctx.buffer
                .unsafe_to_concat_from_outbuffer(Some(unsafe_from), Some(ctx.buffer.idx + 1));
            return None;
        }
        let prev_index_in_buffer = iter.index();

        let prev_glyph = ctx.buffer.info[prev_index_in_buffer].as_glyph();
        let Some(prev_cov_index) = self.coverage().ok()?.get(prev_glyph) else {
            ctx.buffer
                .unsafe_to_concat_from_outbuffer(Some(prev_index_in_buffer), Some(ctx.buffer.idx + 1));
            return None;
        };
        let prev_record = records.get(prev_cov_index as usize)?;
        let Some(Ok(exit_anchor)) = prev_record.exit_anchor(data) else {
            ctx.buffer
                .unsafe_to_concat_from_outbuffer(Some(prev_index_in_buffer), Some(ctx.buffer.idx + 1));
            return None;
        };

        let i = prev_index_in_buffer;
        let j = ctx.buffer.idx;
        ctx.buffer.unsafe_to_break(Some(i), Some(j + 1));

        let (exit_x, exit_y) = ctx.face.ot.resolve_anchor(&exit_anchor);
        let (entry_x, entry_y) = ctx.face.ot.resolve_anchor(&entry_anchor);

        let pos = &mut ctx.buffer.pos;

        // Main-direction adjustment.
        match ctx.buffer.direction {
            Direction::LeftToRight => {
                pos[i].x_advance = exit_x + pos[i].x_offset;
                let d = entry_x + pos[j].x_offset;
                pos[j].x_advance -= d;
                pos[j].x_offset -= d;
            }
            Direction::RightToLeft => {
                let d = exit_x + pos[i].x_offset;
                pos[i].x_advance -= d;
                pos[i].x_offset -= d;
                pos[j].x_advance = entry_x + pos[j].x_offset;
            }
            Direction::TopToBottom => {
                pos[i].y_advance = exit_y + pos[i].y_offset;
                let d = entry_y + pos[j].y_offset;
                pos[j].y_advance -= d;
                pos[j].y_offset -= d;
            }
            Direction::BottomToTop => {
                let d = exit_y + pos[i].y_offset;
                pos[i].y_advance -= d;
                pos[i].y_offset -= d;
                pos[j].y_advance = entry_y;
            }
            Direction::Invalid => {}
        }

        // Cross-direction adjustment: attach child to parent; the root stays
        // on the baseline and each node aligns itself against its parent.
        let mut child = i;
        let mut parent = j;
        let mut x_offset = entry_x - exit_x;
        let mut y_offset = entry_y - exit_y;
        if ctx.lookup_props as u16 & lookup_flags::RIGHT_TO_LEFT == 0 {
            core::mem::swap(&mut child, &mut parent);
            x_offset = -x_offset;
            y_offset = -y_offset;
        }

        // If the child was already connected elsewhere, reverse its old chain
        // so the whole tree attaches to the new parent.
        let direction = ctx.buffer.direction;
        reverse_cursive_minor_offset(ctx.buffer, child, direction, parent);

        ctx.buffer.pos[child].set_attach_type(attach_type::CURSIVE);
        ctx.buffer.pos[child].set_attach_chain((parent as isize - child as isize) as i16);
        ctx.buffer.scratch_flags |= scratch_flags::HAS_GPOS_ATTACHMENT;
        if direction.is_horizontal() {
            ctx.buffer.pos[child].y_offset = y_offset;
        } else {
            ctx.buffer.pos[child].x_offset = x_offset;
        }

        // If the parent was attached to the child, separate them.
        if ctx.buffer.pos[parent].attach_chain() == -ctx.buffer.pos[child].attach_chain() {
            ctx.buffer.pos[parent].set_attach_chain(0);
            if direction.is_horizontal() {
                ctx.buffer.pos[parent].y_offset = 0;
            } else {
                ctx.buffer.pos[parent].x_offset = 0;
            }
        }

        ctx.buffer.idx += 1;
        Some(())
    }
}

fn attach_mark(
    ctx: &mut ApplyContext,
    mark_array: &MarkArray,
    mark_index: usize,
    base_anchor: &read_fonts::tables::gpos::AnchorTable,
    glyph_pos: usize,
) -> Option<()> {
    let mark_record = mark_array.mark_records().get(mark_index)?;
    let mark_anchor = mark_record.mark_anchor(mark_array.offset_data()).ok()?;

    let (base_x, base_y) = ctx.face.ot.resolve_anchor(base_anchor);
    let (mark_x, mark_y) = ctx.face.ot.resolve_anchor(&mark_anchor);

    ctx.buffer
        .unsafe_to_break(Some(glyph_pos), Some(ctx.buffer.idx + 1));

    let idx = ctx.buffer.idx;
    let pos = ctx.buffer.cur_pos_mut();
    pos.x_offset = base_x - mark_x;
    pos.y_offset = base_y - mark_y;
    pos.set_attach_type(attach_type::MARK);
    pos.set_attach_chain((glyph_pos as isize - idx as isize) as i16);

    ctx.buffer.scratch_flags |= scratch_flags::HAS_GPOS_ATTACHMENT;
    ctx.buffer.idx += 1;
    Some(())
}

/// Only attach to the first glyph of a MultipleSubst sequence, unless a mark
/// interrupted it.
fn accept(buffer: &Buffer, idx: usize) -> bool {
    !buffer.info[idx].multiplied()
        || buffer.info[idx].lig_comp() == 0
        || idx == 0
        || buffer.info[idx - 1].is_mark()
        || !buffer.info[idx - 1].multiplied()
        || buffer.info[idx].lig_id() != buffer.info[idx - 1].lig_id()
        || buffer.info[idx].lig_comp() != buffer.info[idx - 1].lig_comp() + 1
}

/// Finds the attachment base for a mark, searching backwards over marks.
///
/// Keeps a memo of the last found base to avoid quadratic re-scans when a
/// run of marks attaches to the same base.
fn find_attach_base(
    ctx: &mut ApplyContext,
    check_base_coverage: Option<&read_fonts::tables::layout::CoverageTable>,
) -> Option<usize> {
    if ctx.last_base_until > ctx.buffer.idx as u32 {
        ctx.last_base_until = 0;
        ctx.last_base = -1;
    }

    let last_base_until = ctx.last_base_until as usize;
    let mut last_base = ctx.last_base;

    {
        let mut iter = SkippingIterator::new(ctx, false);
        iter.set_lookup_props(lookup_flags::IGNORE_MARKS as u32);

        let mut j = iter.buffer.idx;
        while j > last_base_until {
            let mut matched = iter.match_at(j - 1, MatchSource::Info);
            if matched == crate::ot_apply::Match::Match {
                if let Some(base_coverage) = check_base_coverage {
                    if !accept(iter.buffer, j - 1)
                        && base_coverage
                            .get(iter.buffer.info[j - 1].as_glyph())
                            .is_none()
                    {
                        matched = crate::ot_apply::Match::Skip;
                    }
                }
            }
            if matched == crate::ot_apply::Match::Match {
                last_base = j as i32 - 1;
                break;
            }
            j -= 1;
        }
    }

    ctx.last_base_until = ctx.buffer.idx as u32;
    ctx.last_base = last_base;

    if last_base < 0 {
        ctx.buffer
            .unsafe_to_concat_from_outbuffer(Some(0), Some(ctx.buffer.idx + 1));
        return None;
    }

    Some(last_base as usize)
}

impl Apply for MarkBasePosFormat1<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let mark_glyph = ctx.buffer.cur(0).as_glyph();
        let mark_index = self.mark_coverage().ok()?.get(mark_glyph)? as usize;

        let base_coverage = self.base_coverage().ok()?;
        let base_idx = find_attach_base(ctx, Some(&base_coverage))?;

        let base_glyph = ctx.buffer.info[base_idx].as_glyph();
        let Some(base_index) = base_coverage.get(base_glyph) else {
            ctx.buffer
                .unsafe_to_concat_from_outbuffer(Some(base_idx), Some(ctx.buffer.idx + 1));
            return None;
        };

        let mark_array = self.mark_array().ok()?;
        let mark_record = mark_array.mark_records().get(mark_index)?;
        let mark_class = mark_record.mark_class() as usize;

        let base_array = self.base_array().ok()?;
        let base_record = base_array.base_records().get(base_index as usize).ok()?;
        let base_anchor = base_record
            .base_anchors(base_array.offset_data())
            .get(mark_class)?
            .ok()?;

        attach_mark(ctx, &mark_array, mark_index, &base_anchor, base_idx)
    }
}

impl Apply for MarkLigPosFormat1<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let mark_glyph = ctx.buffer.cur(0).as_glyph();
        let mark_index = self.mark_coverage().ok()?.get(mark_glyph)? as usize;

        let lig_idx = find_attach_base(ctx, None)?;

        let lig_glyph = ctx.buffer.info[lig_idx].as_glyph();
        let Some(lig_index) = self.ligature_coverage().ok()?.get(lig_glyph) else {
            ctx.buffer
                .unsafe_to_concat_from_outbuffer(Some(lig_idx), Some(ctx.buffer.idx + 1));
            return None;
        };

        let lig_array = self.ligature_array().ok()?;
        let lig_attach = lig_array
            .ligature_attaches()
            .get(lig_index as usize)
            .ok()?;

        let comp_count = lig_attach.component_count();
        if comp_count == 0 {
            ctx.buffer
                .unsafe_to_concat_from_outbuffer(Some(lig_idx), Some(ctx.buffer.idx + 1));
            return None;
        }

        // If the mark belongs to this ligature, use its component;
        // otherwise attach to the last component.
        let lig_id = ctx.buffer.info[lig_idx].lig_id();
        let mark_id = ctx.buffer.cur(0).lig_id();
        let mark_comp = u16::from(ctx.buffer.cur(0).lig_comp());
        let matches = lig_id != 0 && lig_id == mark_id && mark_comp > 0;
        let comp_index = if matches {
            mark_comp.min(comp_count)
        } else {
            comp_count
        } - 1;

        let mark_array = self.mark_array().ok()?;
        let mark_record = mark_array.mark_records().get(mark_index)?;
        let mark_class = mark_record.mark_class() as usize;

        let component = lig_attach
            .component_records()
            .get(comp_index as usize)
            .ok()?;
        let lig_anchor = component
            .ligature_anchors(lig_attach.offset_data())
            .get(mark_class)?
            .ok()?;

        attach_mark(ctx, &mark_array, mark_index, &lig_anchor, lig_idx)
    }
}

impl Apply for MarkMarkPosFormat1<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let mark1_glyph = ctx.buffer.cur(0).as_glyph();
        let mark1_index = self.mark1_coverage().ok()?.get(mark1_glyph)? as usize;

        let lookup_props = ctx.lookup_props;
        // Search backwards for a suitable second mark, not skipping by class.
        let mark2_idx;
        {
            let mut iter = SkippingIterator::new(ctx, false);
            iter.reset_fast(iter.buffer.idx);
            iter.set_lookup_props(lookup_props & !(lookup_flags::IGNORE_FLAGS as u32));

            let mut unsafe_from = 0;
            if !iter.prev(Some(&mut unsafe_from)) {
                ctx.buffer
                    .unsafe_to_concat_from_outbuffer(Some(unsafe_from), Some(ctx.buffer.idx + 1));
                return None;
            }
            mark2_idx = iter.index();
        }

        if !ctx.buffer.info[mark2_idx].is_mark() {
            ctx.buffer
                .unsafe_to_concat_from_outbuffer(Some(mark2_idx), Some(ctx.buffer.idx + 1));
            return None;
        }

        let id1 = ctx.buffer.cur(0).lig_id();
        let id2 = ctx.buffer.info[mark2_idx].lig_id();
        let comp1 = ctx.buffer.cur(0).lig_comp();
        let comp2 = ctx.buffer.info[mark2_idx].lig_comp();

        let matches = if id1 == id2 {
            // Same base, or same ligature component.
            id1 == 0 || comp1 == comp2
        } else {
            // Different ligature ids match only when one of the marks is
            // itself a ligature.
            (id1 > 0 && comp1 == 0) || (id2 > 0 && comp2 == 0)
        };

        if !matches {
            ctx.buffer
                .unsafe_to_concat_from_outbuffer(Some(mark2_idx), Some(ctx.buffer.idx + 1));
            return None;
        }

        let mark2_glyph = ctx.buffer.info[mark2_idx].as_glyph();
        let mark2_index = self.mark2_coverage().ok()?.get(mark2_glyph)? as usize;

        let mark1_array = self.mark1_array().ok()?;
        let mark1_record = mark1_array.mark_records().get(mark1_index)?;
        let mark_class = mark1_record.mark_class() as usize;

        let mark2_array = self.mark2_array().ok()?;
        let mark2_record = mark2_array.mark2_records().get(mark2_index).ok()?;
        let mark2_anchor = mark2_record
            .mark2_anchors(mark2_array.offset_data())
            .get(mark_class)?
            .ok()?;

        attach_mark(ctx, &mark1_array, mark1_index, &mark2_anchor, mark2_idx)
    }
}
