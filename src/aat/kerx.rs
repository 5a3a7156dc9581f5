//! The extended kerning (kerx) driver: simple pair/class kerning, the
//! kern stack state machine, and mark anchoring.

use read_fonts::tables::aat::{self, ExtendedStateTable, StateEntry};
use read_fonts::tables::kerx::{Subtable, Subtable1, Subtable4, SubtableKind};
use read_fonts::types::{BigEndian, GlyphId};
use read_fonts::FontData;

use crate::buffer::{scratch_flags, Buffer};
use crate::face::Face;
use crate::ot_apply::{ApplyContext, SkippingIterator};
use crate::ot_gpos::attach_type;
use crate::ot_layout::{lookup_flags, TableIndex};
use crate::ot_shape_plan::ShapePlan;

const START_OF_TEXT: u16 = 0;

pub(crate) fn apply(plan: &ShapePlan, face: &Face, buffer: &mut Buffer) {
    buffer.unsafe_to_concat(None, None);

    let Some(kerx) = face.aat.kerx.as_ref() else {
        return;
    };

    let mut seen_cross_stream = false;
    for subtable in kerx.subtables().iter().filter_map(Result::ok) {
        // Variation kerning is not handled.
        if subtable.is_variable() {
            continue;
        }

        if buffer.direction.is_horizontal() != subtable.is_horizontal() {
            continue;
        }

        let Ok(kind) = subtable.kind() else {
            continue;
        };

        if !seen_cross_stream && subtable.is_cross_stream() {
            seen_cross_stream = true;

            // Attach all glyphs into a chain. No GPOS-attachment scratch
            // flag: a zero attachment needs no post-positioning.
            let chain = if buffer.direction.is_forward() { -1 } else { 1 };
            for pos in &mut buffer.pos {
                pos.set_attach_type(attach_type::CURSIVE);
                pos.set_attach_chain(chain);
            }
        }

        let reverse = buffer.direction.is_backward();
        if reverse {
            buffer.reverse();
        }

        match &kind {
            SubtableKind::Format0(format0) => {
                if plan.requested_kerning {
                    apply_simple_kerning(plan, face, buffer, &subtable, |left, right| {
                        format0.kerning(left, right).map(i32::from)
                    });
                }
            }
            SubtableKind::Format1(format1) => {
                let mut driver = KernStackDriver {
                    subtable: format1,
                    cross_stream: subtable.is_cross_stream(),
                    tuple_count: subtable.tuple_count().max(1) as usize,
                    stack: [0; 8],
                    depth: 0,
                };
                drive_kerning(plan, buffer, &format1.state_table, &mut driver);
            }
            SubtableKind::Format2(format2) => {
                if plan.requested_kerning {
                    buffer.unsafe_to_concat(None, None);
                    apply_simple_kerning(plan, face, buffer, &subtable, |left, right| {
                        format2.kerning(left, right).map(i32::from)
                    });
                }
            }
            SubtableKind::Format4(format4) => {
                let mut driver = MarkAnchorDriver {
                    subtable: format4,
                    subtable_data: FontData::new(subtable.data()),
                    face,
                    mark_set: false,
                    mark: 0,
                };
                drive_kerning(plan, buffer, &format4.state_table, &mut driver);
            }
        }

        if reverse {
            buffer.reverse();
        }
    }
}

fn apply_simple_kerning(
    plan: &ShapePlan,
    face: &Face,
    buffer: &mut Buffer,
    subtable: &Subtable,
    kerning: impl Fn(GlyphId, GlyphId) -> Option<i32>,
) {
    let mut ctx = ApplyContext::new(TableIndex::Gpos, face, buffer);
    ctx.set_lookup_mask(plan.kern_mask);
    ctx.lookup_props = lookup_flags::IGNORE_MARKS as u32;
    ctx.update_matchers();

    let horizontal = ctx.buffer.direction.is_horizontal();
    let cross_stream = subtable.is_cross_stream();

    let mut i = 0;
    while i < ctx.buffer.len {
        if ctx.buffer.info[i].mask & plan.kern_mask == 0 {
            i += 1;
            continue;
        }

        let mut iter = SkippingIterator::new(&mut ctx, false);
        iter.reset_fast(i);

        let mut unsafe_to = 0;
        if !iter.next(Some(&mut unsafe_to)) {
            ctx.buffer.unsafe_to_concat(Some(i), Some(unsafe_to));
            i += 1;
            continue;
        }

        let j = iter.index();

        let a = ctx.buffer.info[i].as_glyph();
        let b = ctx.buffer.info[j].as_glyph();
        let kern = kerning(a, b).unwrap_or(0);

        if kern != 0 {
            let pos = &mut ctx.buffer.pos;
            if horizontal {
                if cross_stream {
                    pos[j].y_offset = kern;
                    ctx.buffer.scratch_flags |= scratch_flags::HAS_GPOS_ATTACHMENT;
                } else {
                    let kern1 = kern >> 1;
                    let kern2 = kern - kern1;
                    pos[i].x_advance += kern1;
                    pos[j].x_advance += kern2;
                    pos[j].x_offset += kern2;
                }
            } else if cross_stream {
                pos[j].x_offset = kern;
                ctx.buffer.scratch_flags |= scratch_flags::HAS_GPOS_ATTACHMENT;
            } else {
                let kern1 = kern >> 1;
                let kern2 = kern - kern1;
                pos[i].y_advance += kern1;
                pos[j].y_advance += kern2;
                pos[j].y_offset += kern2;
            }

            ctx.buffer.unsafe_to_break(Some(i), Some(j + 1));
        }

        i = j;
    }
}

trait KerningDriver {
    fn transition(
        &mut self,
        entry: &StateEntry<BigEndian<u16>>,
        plan: &ShapePlan,
        buffer: &mut Buffer,
    );
}

fn entry_is_actionable(entry: &StateEntry<BigEndian<u16>>) -> bool {
    entry.payload.get() != 0xFFFF
}

fn entry_has_advance(entry: &StateEntry<BigEndian<u16>>) -> bool {
    entry.flags & 0x4000 == 0
}

fn drive_kerning(
    plan: &ShapePlan,
    buffer: &mut Buffer,
    state_table: &ExtendedStateTable<BigEndian<u16>>,
    driver: &mut dyn KerningDriver,
) {
    let mut state = START_OF_TEXT;
    buffer.idx = 0;

    loop {
        let class = if buffer.idx < buffer.len {
            state_table
                .class(buffer.cur(0).as_glyph())
                .unwrap_or(aat::class::OUT_OF_BOUNDS as u16)
        } else {
            aat::class::END_OF_TEXT as u16
        };

        let Ok(entry) = state_table.entry(state, class) else {
            break;
        };

        // Unsafe to break before this glyph if not in the start state:
        // starting here could go differently.
        if state != START_OF_TEXT && buffer.backtrack_len() != 0 && buffer.idx < buffer.len {
            // An epsilon transition to the start state with no action stays
            // safe.
            if entry_is_actionable(&entry) || entry.new_state != START_OF_TEXT || entry_has_advance(&entry)
            {
                buffer.unsafe_to_break_from_outbuffer(
                    Some(buffer.backtrack_len() - 1),
                    Some(buffer.idx + 1),
                );
            }
        }

        // Unsafe to break if end-of-text would kick in here.
        if buffer.idx + 2 <= buffer.len {
            let Ok(end_entry) = state_table.entry(state, aat::class::END_OF_TEXT as u16) else {
                break;
            };
            if entry_is_actionable(&end_entry) {
                buffer.unsafe_to_break(Some(buffer.idx), Some(buffer.idx + 2));
            }
        }

        driver.transition(&entry, plan, buffer);

        state = entry.new_state;

        if buffer.idx >= buffer.len {
            break;
        }

        if entry_has_advance(&entry) || buffer.max_ops <= 0 {
            buffer.idx += 1;
        }
        buffer.max_ops -= 1;
    }
}

/// Format 1: a stack of glyph positions, popped and kerned when the value
/// list fires.
struct KernStackDriver<'a, 'b> {
    subtable: &'b Subtable1<'a>,
    cross_stream: bool,
    tuple_count: usize,
    stack: [usize; 8],
    depth: usize,
}

impl KernStackDriver<'_, '_> {
    const PUSH: u16 = 0x8000;
    const RESET: u16 = 0x2000;
}

impl KerningDriver for KernStackDriver<'_, '_> {
    fn transition(
        &mut self,
        entry: &StateEntry<BigEndian<u16>>,
        plan: &ShapePlan,
        buffer: &mut Buffer,
    ) {
        if entry.flags & Self::RESET != 0 {
            self.depth = 0;
        }

        if entry.flags & Self::PUSH != 0 {
            if self.depth < self.stack.len() {
                self.stack[self.depth] = buffer.idx;
                self.depth += 1;
            } else {
                self.depth = 0; // Overflow: give up on the stack.
            }
        }

        if entry_is_actionable(entry) && self.depth != 0 {
            let mut action_index = entry.payload.get() as usize;

            // Each value pops one glyph; the end of the list is flagged by
            // an odd value.
            let mut last = false;
            while !last && self.depth != 0 {
                self.depth -= 1;
                let idx = self.stack[self.depth];
                let Some(value) = self.subtable.values.get(action_index) else {
                    break;
                };
                let mut v = value.get() as i32;
                action_index += self.tuple_count;
                if idx >= buffer.len {
                    continue;
                }

                last = v & 1 != 0;
                v &= !1;

                let glyph_mask = buffer.info[idx].mask;
                let mut has_attachment = false;
                let pos = &mut buffer.pos[idx];

                if buffer.direction.is_horizontal() {
                    if self.cross_stream {
                        // The value -0x8000 resets the cross-stream offset.
                        if v == -0x8000 {
                            pos.set_attach_type(0);
                            pos.set_attach_chain(0);
                            pos.y_offset = 0;
                        } else if pos.attach_type() != 0 {
                            pos.y_offset += v;
                            has_attachment = true;
                        }
                    } else if glyph_mask & plan.kern_mask != 0 {
                        pos.x_advance += v;
                        pos.x_offset += v;
                    }
                } else if self.cross_stream {
                    if v == -0x8000 {
                        pos.set_attach_type(0);
                        pos.set_attach_chain(0);
                        pos.x_offset = 0;
                    } else if pos.attach_type() != 0 {
                        pos.x_offset += v;
                        has_attachment = true;
                    }
                } else if glyph_mask & plan.kern_mask != 0 {
                    if pos.y_offset == 0 {
                        pos.y_advance += v;
                        pos.y_offset += v;
                    }
                }

                if has_attachment {
                    buffer.scratch_flags |= scratch_flags::HAS_GPOS_ATTACHMENT;
                }
            }
        }
    }
}

/// Format 4: anchors a marked glyph to the current one, through ankr-table
/// anchor points or raw coordinates.
struct MarkAnchorDriver<'a, 'b, 'f> {
    subtable: &'b Subtable4<'a>,
    subtable_data: FontData<'a>,
    face: &'b Face<'f>,
    mark_set: bool,
    mark: usize,
}

impl MarkAnchorDriver<'_, '_, '_> {
    const MARK: u16 = 0x8000;

    const ACTION_TYPE_MASK: u32 = 0xC000_0000;
    const ACTION_CONTROL_POINTS: u32 = 0x0000_0000;
    const ACTION_ANCHOR_POINTS: u32 = 0x4000_0000;
    const ACTION_COORDINATES: u32 = 0x8000_0000;
    const OFFSET_MASK: u32 = 0x00FF_FFFF;

    // length, coverage, tuple_count, all 32-bit.
    const HEADER_LEN: usize = 12;
}

impl KerningDriver for MarkAnchorDriver<'_, '_, '_> {
    fn transition(
        &mut self,
        entry: &StateEntry<BigEndian<u16>>,
        _plan: &ShapePlan,
        buffer: &mut Buffer,
    ) {
        if self.mark_set && entry_is_actionable(entry) && buffer.idx < buffer.len {
            let flags = self.subtable.flags;
            let action_type = flags & Self::ACTION_TYPE_MASK;
            let base = (flags & Self::OFFSET_MASK) as usize;
            let base = base.saturating_sub(Self::HEADER_LEN);
            let action = entry.payload.get() as usize;

            let read_i16 = |offset: usize| -> i32 {
                self.subtable_data
                    .read_at::<i16>(offset)
                    .map(i32::from)
                    .unwrap_or(0)
            };

            match action_type {
                Self::ACTION_ANCHOR_POINTS => {
                    // Two anchor-point indices per action.
                    let mark_point = read_i16(base + action * 4) as usize;
                    let curr_point = read_i16(base + action * 4 + 2) as usize;
                    if let Some(ankr) = self.face.aat.ankr.as_ref() {
                        let mark_glyph = buffer.info[self.mark].as_glyph();
                        let mark_anchor = ankr
                            .anchor_points(mark_glyph)
                            .ok()
                            .and_then(|points| points.get(mark_point).map(|p| (p.x(), p.y())))
                            .unwrap_or_default();

                        let curr_glyph = buffer.cur(0).as_glyph();
                        let curr_anchor = ankr
                            .anchor_points(curr_glyph)
                            .ok()
                            .and_then(|points| points.get(curr_point).map(|p| (p.x(), p.y())))
                            .unwrap_or_default();

                        let pos = buffer.cur_pos_mut();
                        pos.x_offset = i32::from(mark_anchor.0 - curr_anchor.0);
                        pos.y_offset = i32::from(mark_anchor.1 - curr_anchor.1);
                    }
                }
                Self::ACTION_CONTROL_POINTS => {
                    // Outline control points live outside the core; nothing
                    // to anchor against.
                }
                Self::ACTION_COORDINATES => {
                    // Four coordinates per action.
                    let mark_x = read_i16(base + action * 8);
                    let mark_y = read_i16(base + action * 8 + 2);
                    let curr_x = read_i16(base + action * 8 + 4);
                    let curr_y = read_i16(base + action * 8 + 6);
                    let pos = buffer.cur_pos_mut();
                    pos.x_offset = mark_x - curr_x;
                    pos.y_offset = mark_y - curr_y;
                }
                _ => {}
            }

            let idx = buffer.idx;
            let chain = self.mark as i16 - idx as i16;
            let pos = buffer.cur_pos_mut();
            pos.set_attach_type(attach_type::MARK);
            pos.set_attach_chain(chain);
            buffer.scratch_flags |= scratch_flags::HAS_GPOS_ATTACHMENT;
        }

        if entry.flags & Self::MARK != 0 {
            self.mark_set = true;
            self.mark = buffer.idx;
        }
    }
}
