//! The classic `kern` table (v0 and Apple v1), including the format-1
//! cross-stream state machine.

use read_fonts::tables::aat::{self, StateEntry, StateTable};
use read_fonts::tables::kern::{Subtable, SubtableKind};
use read_fonts::types::{GlyphId, GlyphId16};
use read_fonts::FontData;

use crate::buffer::{scratch_flags, Buffer};
use crate::face::Face;
use crate::ot_apply::{ApplyContext, SkippingIterator};
use crate::ot_layout::{lookup_flags, TableIndex};
use crate::ot_shape_plan::ShapePlan;

pub(crate) fn has_kerning(face: &Face) -> bool {
    face.aat.kern.is_some()
}

pub(crate) fn has_machine_kerning(face: &Face) -> bool {
    match face.aat.kern.as_ref() {
        Some(kern) => kern
            .subtables()
            .filter_map(Result::ok)
            .any(|s| s.is_state_machine()),
        None => false,
    }
}

pub(crate) fn has_cross_kerning(face: &Face) -> bool {
    match face.aat.kern.as_ref() {
        Some(kern) => kern
            .subtables()
            .filter_map(Result::ok)
            .any(|s| s.is_cross_stream()),
        None => false,
    }
}

pub(crate) fn apply(plan: &ShapePlan, face: &Face, buffer: &mut Buffer) {
    let Some(kern) = face.aat.kern.as_ref() else {
        return;
    };

    for subtable in kern.subtables().filter_map(Result::ok) {
        if subtable.is_variable() {
            continue;
        }

        if buffer.direction.is_horizontal() != subtable.is_horizontal() {
            continue;
        }

        let Ok(kind) = subtable.kind() else {
            continue;
        };

        let reverse = subtable.is_cross_stream() && buffer.direction.is_backward();
        if reverse {
            buffer.reverse();
        }

        match &kind {
            SubtableKind::Format0(format0) => {
                if plan.requested_kerning {
                    apply_simple_kerning(plan, face, buffer, subtable.is_cross_stream(), |a, b| {
                        format0.kerning(a, b)
                    });
                }
            }
            SubtableKind::Format1(machine) => {
                let data = match &subtable {
                    Subtable::Ot(t) => FontData::new(t.data()),
                    Subtable::Aat(t) => FontData::new(t.data()),
                };
                let header_len = match &subtable {
                    Subtable::Ot(_) => 6,
                    Subtable::Aat(_) => 8,
                };
                apply_state_machine_kerning(
                    plan,
                    buffer,
                    machine,
                    data,
                    header_len,
                    subtable.is_cross_stream(),
                );
            }
            SubtableKind::Format2(format2) => {
                if plan.requested_kerning {
                    apply_simple_kerning(plan, face, buffer, subtable.is_cross_stream(), |a, b| {
                        format2.kerning(a, b)
                    });
                }
            }
            SubtableKind::Format3(format3) => {
                if plan.requested_kerning {
                    apply_simple_kerning(plan, face, buffer, subtable.is_cross_stream(), |a, b| {
                        format3.kerning(a, b)
                    });
                }
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
    cross_stream: bool,
    kerning: impl Fn(GlyphId, GlyphId) -> Option<i32>,
) {
    let mut ctx = ApplyContext::new(TableIndex::Gpos, face, buffer);
    ctx.set_lookup_mask(plan.kern_mask);
    ctx.lookup_props = lookup_flags::IGNORE_MARKS as u32;
    ctx.update_matchers();

    let horizontal = ctx.buffer.direction.is_horizontal();

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

// Legacy state-machine entry bits.
const PUSH: u16 = 0x8000;
const DONT_ADVANCE: u16 = 0x4000;
const OFFSET_MASK: u16 = 0x3FFF;

fn entry_is_actionable(entry: &StateEntry) -> bool {
    entry.flags & OFFSET_MASK != 0
}

/// Format 1: kern values driven by a legacy state table. Values are read
/// straight from the subtable data at the offset the entry flags carry.
fn apply_state_machine_kerning(
    plan: &ShapePlan,
    buffer: &mut Buffer,
    machine: &StateTable,
    data: FontData,
    header_len: usize,
    cross_stream: bool,
) {
    buffer.unsafe_to_concat(None, None);

    let mut stack = [0usize; 8];
    let mut depth = 0usize;

    let mut state = 0u16;
    buffer.idx = 0;
    loop {
        let class = if buffer.idx < buffer.len {
            machine
                .class(GlyphId16::new(buffer.cur(0).as_glyph().to_u32() as u16))
                .unwrap_or(aat::class::OUT_OF_BOUNDS)
        } else {
            aat::class::END_OF_TEXT
        };

        let Ok(entry) = machine.entry(state, class) else {
            break;
        };

        if state != 0 && buffer.backtrack_len() != 0 && buffer.idx < buffer.len {
            if entry_is_actionable(&entry) || entry.new_state != 0 || entry.flags & DONT_ADVANCE == 0
            {
                buffer.unsafe_to_break_from_outbuffer(
                    Some(buffer.backtrack_len() - 1),
                    Some(buffer.idx + 1),
                );
            }
        }

        if buffer.idx + 2 <= buffer.len {
            if let Ok(end_entry) = machine.entry(state, aat::class::END_OF_TEXT) {
                if entry_is_actionable(&end_entry) {
                    buffer.unsafe_to_break(Some(buffer.idx), Some(buffer.idx + 2));
                }
            }
        }

        // Transition.
        if entry.flags & PUSH != 0 {
            if depth < stack.len() {
                stack[depth] = buffer.idx;
                depth += 1;
            } else {
                depth = 0;
            }
        }

        if entry_is_actionable(&entry) && depth != 0 {
            let mut offset = ((entry.flags & OFFSET_MASK) as usize).saturating_sub(header_len);

            let mut last = false;
            while !last && depth != 0 {
                depth -= 1;
                let idx = stack[depth];
                let Ok(value) = data.read_at::<i16>(offset) else {
                    break;
                };
                let mut v = value as i32;
                offset += 2;
                if idx >= buffer.len {
                    continue;
                }

                // An odd value terminates the list.
                last = v & 1 != 0;
                v &= !1;

                let glyph_mask = buffer.info[idx].mask;
                let mut has_attachment = false;
                let pos = &mut buffer.pos[idx];

                if buffer.direction.is_horizontal() {
                    if cross_stream {
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
                } else if cross_stream {
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

        state = entry.new_state;

        if buffer.idx >= buffer.len {
            break;
        }

        if entry.flags & DONT_ADVANCE == 0 || buffer.max_ops <= 0 {
            buffer.idx += 1;
        }
        buffer.max_ops -= 1;
    }
}
