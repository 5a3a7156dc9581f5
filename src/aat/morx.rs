//! The morx state-machine driver: rearrangement, contextual substitution,
//! ligature formation, non-contextual substitution and insertion.

use read_fonts::tables::aat::{self, ExtendedStateTable, NoPayload, StateEntry};
use read_fonts::tables::morx::{
    ContextualEntryData, ContextualSubtable, InsertionEntryData, InsertionSubtable,
    LigatureSubtable, SubtableKind,
};
use super::map::RangeFlags;
use crate::buffer::{scratch_flags, Buffer, GlyphInfo, UnicodeProps};
use crate::face::Face;
use crate::ot_layout::MAX_CONTEXT_LENGTH;
use crate::ot_shape_plan::ShapePlan;
use crate::Mask;

pub(crate) const DELETED_GLYPH: u32 = 0xFFFF;
const START_OF_TEXT: u16 = 0;

pub(crate) const SCRATCH_HAS_AAT_DELETED: u32 = scratch_flags::SHAPER0;

pub(crate) struct AatApplyContext<'a, 'b> {
    pub face: &'a Face<'b>,
    pub buffer: &'a mut Buffer,
    pub range_flags: Option<&'a [RangeFlags]>,
    pub subtable_flags: Mask,
    pub has_glyph_classes: bool,
}

impl<'a, 'b> AatApplyContext<'a, 'b> {
    pub fn new(face: &'a Face<'b>, buffer: &'a mut Buffer) -> Self {
        let has_glyph_classes = face.ot.has_glyph_classes();
        Self {
            face,
            buffer,
            range_flags: None,
            subtable_flags: 0,
            has_glyph_classes,
        }
    }

    fn replace_glyph_at(&mut self, index: usize, glyph: u32) {
        if glyph == DELETED_GLYPH {
            self.buffer.scratch_flags |= SCRATCH_HAS_AAT_DELETED;
            self.buffer.info[index].set_aat_deleted();
        }
        self.buffer.info[index].glyph_id = glyph;
        if self.has_glyph_classes {
            let props = self.face.ot.glyph_props(glyph);
            self.buffer.info[index].set_glyph_props(props);
        }
    }
}

/// Computes the per-chain flags the requested features select.
pub(crate) fn compile_flags(
    face: &Face,
    builder: &super::map::AatMapBuilder,
    map: &mut super::map::AatMap,
) -> Option<()> {
    let morx = face.aat.morx.as_ref()?;
    let chain_count = morx.chains().iter().count();
    map.chain_flags.resize(chain_count, Vec::new());

    for (chain, chain_flags) in morx
        .chains()
        .iter()
        .filter_map(Result::ok)
        .zip(map.chain_flags.iter_mut())
    {
        let mut flags = chain.default_flags();
        for feature in chain.features() {
            // Check whether this type/setting pair was requested in the
            // map, and if so apply its flags.
            let kind = feature.feature_type();
            let setting = feature.feature_settings();
            if builder.has_feature(kind, setting) {
                flags &= feature.disable_flags();
                flags |= feature.enable_flags();
            } else if kind == super::map::FEATURE_TYPE_LETTER_CASE
                && setting == super::map::SELECTOR_SMALL_CAPS
            {
                // Deprecated letter-case small caps: honour it when the
                // modern lower-case selector was requested.
                if builder.has_feature(
                    super::map::FEATURE_TYPE_LOWER_CASE,
                    super::map::SELECTOR_LOWER_CASE_SMALL_CAPS,
                ) {
                    flags &= feature.disable_flags();
                    flags |= feature.enable_flags();
                }
            }
        }

        chain_flags.push(RangeFlags {
            flags,
            cluster_first: builder.range_first,
            cluster_last: builder.range_last,
        });
    }

    Some(())
}

/// Applies every enabled subtable of every morx chain.
pub(crate) fn substitute(plan: &ShapePlan, face: &Face, buffer: &mut Buffer) {
    buffer.unsafe_to_concat(None, None);

    let Some(morx) = face.aat.morx.as_ref() else {
        return;
    };

    // The plan is immutable and shared; the per-range state is small, so
    // work on a copy of the chain flags.
    let chain_flags = plan.aat_map.chain_flags.clone();

    for (chain_index, chain) in morx.chains().iter().filter_map(Result::ok).enumerate() {
        let range_flags = chain_flags.get(chain_index).map(|flags| flags.as_slice());

        for subtable in chain.subtables().iter().filter_map(Result::ok) {
            if let Some(range_flags) = range_flags {
                if range_flags.len() == 1 && subtable.sub_feature_flags() & range_flags[0].flags == 0
                {
                    continue;
                }
            }

            if !subtable.is_all_directions()
                && buffer.direction.is_vertical() != subtable.is_vertical()
            {
                continue;
            }

            let Ok(kind) = subtable.kind() else {
                continue;
            };

            // Buffer content is in logical order; reverse it when the
            // subtable processes in the other order, and reverse back
            // after.
            let reverse = if subtable.is_logical() {
                subtable.is_backwards()
            } else {
                subtable.is_backwards() != buffer.direction.is_backward()
            };

            if reverse {
                buffer.reverse();
            }

            let mut ctx = AatApplyContext::new(face, buffer);
            ctx.range_flags = range_flags;
            ctx.subtable_flags = subtable.sub_feature_flags();
            apply_subtable(&kind, &mut ctx);

            if reverse {
                buffer.reverse();
            }
        }
    }
}

trait DriverContext<T> {
    fn in_place(&self) -> bool;
    fn can_advance(&self, entry: &StateEntry<T>) -> bool;
    fn is_actionable(&self, entry: &StateEntry<T>, buffer: &Buffer) -> bool;
    fn transition(&mut self, entry: &StateEntry<T>, ctx: &mut AatApplyContext) -> Option<()>;
}

fn drive<T: bytemuck::AnyBitPattern + read_fonts::types::FixedSize>(
    machine: &ExtendedStateTable<T>,
    driver: &mut dyn DriverContext<T>,
    ctx: &mut AatApplyContext,
) {
    if !driver.in_place() {
        ctx.buffer.clear_output();
    }

    let mut state = START_OF_TEXT;
    let mut last_range: Option<usize> = ctx.range_flags.and_then(|rf| {
        // With a single range the flag was checked before entering.
        if rf.len() > 1 {
            Some(0)
        } else {
            None
        }
    });
    ctx.buffer.idx = 0;

    loop {
        // Check the cluster's feature-range flags.
        if let Some(range_flags) = ctx.range_flags {
            if let Some(last) = last_range.as_mut() {
                let mut range = *last;
                if ctx.buffer.idx < ctx.buffer.len {
                    let cluster = ctx.buffer.cur(0).cluster;
                    while range > 0 && cluster < range_flags[range].cluster_first {
                        range -= 1;
                    }
                    while range + 1 < range_flags.len() && cluster > range_flags[range].cluster_last
                    {
                        range += 1;
                    }
                    *last = range;
                }

                if range_flags[range].flags & ctx.subtable_flags == 0 {
                    if ctx.buffer.idx == ctx.buffer.len || !ctx.buffer.successful {
                        break;
                    }
                    state = START_OF_TEXT;
                    ctx.buffer.next_glyph();
                    continue;
                }
            }
        }

        let class = if ctx.buffer.idx < ctx.buffer.len {
            machine
                .class(ctx.buffer.cur(0).as_glyph())
                .unwrap_or(aat::class::OUT_OF_BOUNDS as u16)
        } else {
            aat::class::END_OF_TEXT as u16
        };

        let Ok(entry) = machine.entry(state, class) else {
            break;
        };
        let next_state = entry.new_state;

        // Safe-to-break iff: no action on this transition; breaking here
        // leads to the same result (we are in start-of-text, or the
        // start-of-text transition for this class matches this one); and
        // there is no end-of-text action pending after the previous glyph.
        // This triples the lookups but buys granular unsafe-to-break.
        let is_safe_to_break_extra = |driver: &mut dyn DriverContext<T>, buffer: &Buffer| {
            let Ok(wouldbe_entry) = machine.entry(START_OF_TEXT, class) else {
                return false;
            };
            if driver.is_actionable(&wouldbe_entry, buffer) {
                return false;
            }
            next_state == wouldbe_entry.new_state
                && driver.can_advance(&entry) == driver.can_advance(&wouldbe_entry)
        };

        let is_safe_to_break = |driver: &mut dyn DriverContext<T>, buffer: &Buffer| {
            if driver.is_actionable(&entry, buffer) {
                return false;
            }

            let ok = state == START_OF_TEXT
                || (!driver.can_advance(&entry) && next_state == START_OF_TEXT)
                || is_safe_to_break_extra(driver, buffer);
            if !ok {
                return false;
            }

            let Ok(end_entry) = machine.entry(state, aat::class::END_OF_TEXT as u16) else {
                return false;
            };
            !driver.is_actionable(&end_entry, buffer)
        };

        if !is_safe_to_break(driver, ctx.buffer)
            && ctx.buffer.backtrack_len() > 0
            && ctx.buffer.idx < ctx.buffer.len
        {
            ctx.buffer.unsafe_to_break_from_outbuffer(
                Some(ctx.buffer.backtrack_len() - 1),
                Some(ctx.buffer.idx + 1),
            );
        }

        driver.transition(&entry, ctx);

        state = next_state;

        if ctx.buffer.idx >= ctx.buffer.len || !ctx.buffer.successful {
            break;
        }

        if driver.can_advance(&entry) {
            ctx.buffer.next_glyph();
        } else {
            if ctx.buffer.max_ops <= 0 {
                ctx.buffer.next_glyph();
            }
            ctx.buffer.max_ops -= 1;
        }
    }

    if !driver.in_place() {
        ctx.buffer.sync();
    }
}

fn apply_subtable(kind: &SubtableKind, ctx: &mut AatApplyContext) {
    match kind {
        SubtableKind::Rearrangement(table) => {
            let mut driver = RearrangementDriver { start: 0, end: 0 };
            drive::<NoPayload>(table, &mut driver, ctx);
        }
        SubtableKind::Contextual(table) => {
            // The glyph-class guard is computed once for the whole subtable
            // here, while the non-contextual path re-derives it per
            // replacement. The asymmetry is observed behaviour of the
            // engines this matches; review before changing either side.
            let mut driver = ContextualDriver {
                table,
                mark_set: false,
                mark: 0,
            };
            drive::<ContextualEntryData>(&table.state_table, &mut driver, ctx);
        }
        SubtableKind::Ligature(table) => {
            let mut driver = LigatureDriver {
                table,
                match_length: 0,
                match_positions: [0; LIGATURE_MAX_MATCHES],
            };
            drive::<read_fonts::types::BigEndian<u16>>(&table.state_table, &mut driver, ctx);
        }
        SubtableKind::NonContextual(lookup) => {
            for i in 0..ctx.buffer.len {
                // Feature-range check, mirroring the state driver loop.
                if let Some(range_flags) = ctx.range_flags {
                    let cluster = ctx.buffer.info[i].cluster;
                    let active = range_flags
                        .iter()
                        .find(|r| cluster >= r.cluster_first && cluster <= r.cluster_last)
                        .map(|r| r.flags & ctx.subtable_flags != 0)
                        .unwrap_or(true);
                    if !active {
                        continue;
                    }
                }

                let glyph = ctx.buffer.info[i].glyph_id;
                if glyph > 0xFFFF {
                    continue;
                }
                if let Ok(replacement) = lookup.value(glyph as u16) {
                    ctx.replace_glyph_at(i, replacement as u32);
                }
            }
        }
        SubtableKind::Insertion(table) => {
            let mut driver = InsertionDriver { table, mark: 0 };
            drive::<InsertionEntryData>(&table.state_table, &mut driver, ctx);
        }
    }
}

// Rearrangement subtable (morx type 0).

struct RearrangementDriver {
    start: usize,
    end: usize,
}

impl RearrangementDriver {
    const MARK_FIRST: u16 = 0x8000;
    const DONT_ADVANCE: u16 = 0x4000;
    const MARK_LAST: u16 = 0x2000;
    const VERB: u16 = 0x000F;
}

/// The sixteen rearrangement verbs, encoded as nibble pairs. Values 0-2
/// move that many glyphs to the other side; 3 moves two and flips them.
#[rustfmt::skip]
pub(crate) const REARRANGEMENT_MAP: [u8; 16] = [
    0x00, // 0  no change
    0x10, // 1  Ax => xA
    0x01, // 2  xD => Dx
    0x11, // 3  AxD => DxA
    0x20, // 4  ABx => xAB
    0x30, // 5  ABx => xBA
    0x02, // 6  xCD => CDx
    0x03, // 7  xCD => DCx
    0x12, // 8  AxCD => CDxA
    0x13, // 9  AxCD => DCxA
    0x21, // 10 ABxD => DxAB
    0x31, // 11 ABxD => DxBA
    0x22, // 12 ABxCD => CDxAB
    0x32, // 13 ABxCD => CDxBA
    0x23, // 14 ABxCD => DCxAB
    0x33, // 15 ABxCD => DCxBA
];

pub(crate) fn rearrange_range(buffer: &mut Buffer, start: usize, end: usize, verb: u16) {
    let m = REARRANGEMENT_MAP[usize::from(verb & 0x0F)];
    let l = 2.min(m >> 4) as usize;
    let r = 2.min(m & 0x0F) as usize;
    let reverse_l = m >> 4 == 3;
    let reverse_r = m & 0x0F == 3;

    if end - start < l + r || end - start > MAX_CONTEXT_LENGTH {
        return;
    }

    buffer.merge_clusters(start, end);

    let mut buf = [GlyphInfo::default(); 4];
    buf[..l].copy_from_slice(&buffer.info[start..start + l]);
    for i in 0..r {
        buf[i + 2] = buffer.info[end - r + i];
    }

    if l > r {
        buffer.info.copy_within(start + l..end - r, start + r);
    } else if l < r {
        for i in (0..end - start - l - r).rev() {
            buffer.info[start + r + i] = buffer.info[start + l + i];
        }
    }

    for i in 0..r {
        buffer.info[start + i] = buf[2 + i];
    }
    for i in 0..l {
        buffer.info[end - l + i] = buf[i];
    }
    if reverse_l {
        buffer.info.swap(end - 1, end - 2);
    }
    if reverse_r {
        buffer.info.swap(start, start + 1);
    }
}

impl DriverContext<NoPayload> for RearrangementDriver {
    fn in_place(&self) -> bool {
        true
    }

    fn can_advance(&self, entry: &StateEntry<()>) -> bool {
        entry.flags & Self::DONT_ADVANCE == 0
    }

    fn is_actionable(&self, entry: &StateEntry<()>, _: &Buffer) -> bool {
        entry.flags & Self::VERB != 0 && self.start < self.end
    }

    fn transition(&mut self, entry: &StateEntry<()>, ctx: &mut AatApplyContext) -> Option<()> {
        let flags = entry.flags;
        let buffer = &mut *ctx.buffer;

        if flags & Self::MARK_FIRST != 0 {
            self.start = buffer.idx;
        }
        if flags & Self::MARK_LAST != 0 {
            self.end = (buffer.idx + 1).min(buffer.len);
        }

        if flags & Self::VERB != 0 && self.start < self.end {
            buffer.merge_clusters(self.start, (buffer.idx + 1).min(buffer.len));
            rearrange_range(buffer, self.start, self.end, flags & Self::VERB);
        }

        Some(())
    }
}

// Contextual substitution subtable (morx type 1).

struct ContextualDriver<'a> {
    table: &'a ContextualSubtable<'a>,
    mark_set: bool,
    mark: usize,
}

impl ContextualDriver<'_> {
    const SET_MARK: u16 = 0x8000;
    const DONT_ADVANCE: u16 = 0x4000;
}

impl DriverContext<ContextualEntryData> for ContextualDriver<'_> {
    fn in_place(&self) -> bool {
        true
    }

    fn can_advance(&self, entry: &StateEntry<ContextualEntryData>) -> bool {
        entry.flags & Self::DONT_ADVANCE == 0
    }

    fn is_actionable(&self, entry: &StateEntry<ContextualEntryData>, buffer: &Buffer) -> bool {
        if buffer.idx == buffer.len && !self.mark_set {
            return false;
        }
        entry.payload.mark_index() != 0xFFFF || entry.payload.current_index() != 0xFFFF
    }

    fn transition(
        &mut self,
        entry: &StateEntry<ContextualEntryData>,
        ctx: &mut AatApplyContext,
    ) -> Option<()> {
        // No mark was set: neither substitution applies at end-of-text.
        if ctx.buffer.idx == ctx.buffer.len && !self.mark_set {
            return Some(());
        }

        if entry.payload.mark_index() != 0xFFFF {
            let lookup = self.table.lookups.get(entry.payload.mark_index() as usize).ok()?;
            let glyph = ctx.buffer.info[self.mark].glyph_id;
            if glyph <= 0xFFFF {
                if let Ok(replacement) = lookup.value(glyph as u16) {
                    let (mark, idx, len) = (self.mark, ctx.buffer.idx, ctx.buffer.len);
                    ctx.buffer
                        .unsafe_to_break(Some(mark), Some((idx + 1).min(len)));
                    ctx.replace_glyph_at(mark, replacement as u32);
                }
            }
        }

        if entry.payload.current_index() != 0xFFFF {
            let idx = ctx.buffer.idx.min(ctx.buffer.len - 1);
            let lookup = self
                .table
                .lookups
                .get(entry.payload.current_index() as usize)
                .ok()?;
            let glyph = ctx.buffer.info[idx].glyph_id;
            if glyph <= 0xFFFF {
                if let Ok(replacement) = lookup.value(glyph as u16) {
                    ctx.replace_glyph_at(idx, replacement as u32);
                }
            }
        }

        if entry.flags & Self::SET_MARK != 0 {
            self.mark_set = true;
            self.mark = ctx.buffer.idx;
        }

        Some(())
    }
}

// Ligature subtable (morx type 2).

const LIGATURE_MAX_MATCHES: usize = 64;

struct LigatureDriver<'a> {
    table: &'a LigatureSubtable<'a>,
    match_length: usize,
    match_positions: [usize; LIGATURE_MAX_MATCHES],
}

impl LigatureDriver<'_> {
    const SET_COMPONENT: u16 = 0x8000;
    const DONT_ADVANCE: u16 = 0x4000;
    const PERFORM_ACTION: u16 = 0x2000;

    const LIG_ACTION_LAST: u32 = 0x8000_0000;
    const LIG_ACTION_STORE: u32 = 0x4000_0000;
    const LIG_ACTION_OFFSET: u32 = 0x3FFF_FFFF;
}

impl DriverContext<read_fonts::types::BigEndian<u16>> for LigatureDriver<'_> {
    fn in_place(&self) -> bool {
        false
    }

    fn can_advance(&self, entry: &StateEntry<read_fonts::types::BigEndian<u16>>) -> bool {
        entry.flags & Self::DONT_ADVANCE == 0
    }

    fn is_actionable(
        &self,
        entry: &StateEntry<read_fonts::types::BigEndian<u16>>,
        _: &Buffer,
    ) -> bool {
        entry.flags & Self::PERFORM_ACTION != 0
    }

    fn transition(
        &mut self,
        entry: &StateEntry<read_fonts::types::BigEndian<u16>>,
        ctx: &mut AatApplyContext,
    ) -> Option<()> {
        let buffer = &mut *ctx.buffer;

        if entry.flags & Self::SET_COMPONENT != 0 {
            // Never mark the same index twice, in case DONT_ADVANCE was
            // used.
            if self.match_length != 0
                && self.match_positions[(self.match_length - 1) % LIGATURE_MAX_MATCHES]
                    == buffer.out_len()
            {
                self.match_length -= 1;
            }

            self.match_positions[self.match_length % LIGATURE_MAX_MATCHES] = buffer.out_len();
            self.match_length += 1;
        }

        if entry.flags & Self::PERFORM_ACTION != 0 {
            let end = buffer.out_len();

            if self.match_length == 0 {
                return Some(());
            }
            if buffer.idx >= buffer.len {
                return Some(());
            }

            let mut cursor = self.match_length;
            let mut action_index = entry.payload.get() as usize;
            let mut ligature_idx = 0u32;

            loop {
                if cursor == 0 {
                    // Stack underflow: clear the stack.
                    self.match_length = 0;
                    break;
                }

                cursor -= 1;
                buffer.move_to(self.match_positions[cursor % LIGATURE_MAX_MATCHES]);

                // Bail out of the loop on bad data, but always restore the
                // working position at the end.
                let Some(action) = self.table.ligature_actions.get(action_index) else {
                    break;
                };
                let action = action.get();

                let mut uoffset = action & Self::LIG_ACTION_OFFSET;
                if uoffset & 0x2000_0000 != 0 {
                    uoffset |= 0xC000_0000; // sign-extend
                }
                let offset = uoffset as i32;
                let component_idx = (buffer.cur(0).glyph_id as i32 + offset) as usize;
                let Some(component) = self.table.components.get(component_idx) else {
                    break;
                };
                ligature_idx += component.get() as u32;

                if action & (Self::LIG_ACTION_STORE | Self::LIG_ACTION_LAST) != 0 {
                    let Some(lig) = self.table.ligatures.get(ligature_idx as usize) else {
                        break;
                    };
                    let lig = lig.get().to_u32();

                    if ctx.has_glyph_classes {
                        let props = ctx.face.ot.glyph_props(lig);
                        buffer.cur_mut(0).set_glyph_props(props);
                    }
                    buffer.replace_glyph(lig);

                    let lig_end =
                        self.match_positions[(self.match_length - 1) % LIGATURE_MAX_MATCHES] + 1;
                    // Now go and delete all subsequent components: they get
                    // the deleted glyph, removed in a later pass.
                    while self.match_length - 1 > cursor {
                        self.match_length -= 1;
                        buffer.move_to(self.match_positions[self.match_length % LIGATURE_MAX_MATCHES]);
                        buffer.scratch_flags |= SCRATCH_HAS_AAT_DELETED;
                        let props = buffer.cur(0).unicode_props();
                        buffer
                            .cur_mut(0)
                            .set_unicode_props(props | UnicodeProps::IGNORABLE.bits());
                        buffer.replace_glyph(DELETED_GLYPH);
                    }

                    buffer.move_to(lig_end);
                    buffer.merge_out_clusters(
                        self.match_positions[cursor % LIGATURE_MAX_MATCHES],
                        buffer.out_len(),
                    );
                }

                action_index += 1;

                if action & Self::LIG_ACTION_LAST != 0 {
                    break;
                }
            }

            buffer.move_to(end);
        }

        Some(())
    }
}

// Insertion subtable (morx type 4).

struct InsertionDriver<'a> {
    table: &'a InsertionSubtable<'a>,
    mark: usize,
}

impl InsertionDriver<'_> {
    const SET_MARK: u16 = 0x8000;
    const DONT_ADVANCE: u16 = 0x4000;
    const CURRENT_INSERT_BEFORE: u16 = 0x0800;
    const MARKED_INSERT_BEFORE: u16 = 0x0400;
    const CURRENT_INSERT_COUNT: u16 = 0x03E0;
    const MARKED_INSERT_COUNT: u16 = 0x001F;
}

impl DriverContext<InsertionEntryData> for InsertionDriver<'_> {
    fn in_place(&self) -> bool {
        false
    }

    fn can_advance(&self, entry: &StateEntry<InsertionEntryData>) -> bool {
        entry.flags & Self::DONT_ADVANCE == 0
    }

    fn is_actionable(&self, entry: &StateEntry<InsertionEntryData>, _: &Buffer) -> bool {
        (entry.flags & (Self::CURRENT_INSERT_COUNT | Self::MARKED_INSERT_COUNT) != 0)
            && (entry.payload.current_insert_index() != 0xFFFF
                || entry.payload.marked_insert_index() != 0xFFFF)
    }

    fn transition(
        &mut self,
        entry: &StateEntry<InsertionEntryData>,
        ctx: &mut AatApplyContext,
    ) -> Option<()> {
        let buffer = &mut *ctx.buffer;
        let flags = entry.flags;
        let mark_loc = buffer.out_len();

        if entry.payload.marked_insert_index() != 0xFFFF {
            let count = (flags & Self::MARKED_INSERT_COUNT) as usize;
            buffer.max_ops -= count as i32;
            if buffer.max_ops <= 0 {
                return Some(());
            }

            let start = entry.payload.marked_insert_index() as usize;
            let before = flags & Self::MARKED_INSERT_BEFORE != 0;

            let end = buffer.out_len();
            buffer.move_to(self.mark);

            if buffer.idx < buffer.len && !before {
                buffer.copy_glyph();
            }

            for i in 0..count {
                let glyph = self.table.glyphs.get(start + i)?.get();
                buffer.output_glyph(glyph.to_u32());
            }

            if buffer.idx < buffer.len && !before {
                buffer.skip_glyph();
            }

            buffer.move_to(end + count);

            let mark = self.mark;
            let (idx, len) = (buffer.idx, buffer.len);
            buffer.unsafe_to_break_from_outbuffer(Some(mark), Some((idx + 1).min(len)));
        }

        if flags & Self::SET_MARK != 0 {
            self.mark = mark_loc;
        }

        if entry.payload.current_insert_index() != 0xFFFF {
            let count = ((flags & Self::CURRENT_INSERT_COUNT) >> 5) as usize;
            buffer.max_ops -= count as i32;
            if buffer.max_ops < 0 {
                return Some(());
            }

            let start = entry.payload.current_insert_index() as usize;
            let before = flags & Self::CURRENT_INSERT_BEFORE != 0;
            let end = buffer.out_len();

            if buffer.idx < buffer.len && !before {
                buffer.copy_glyph();
            }

            for i in 0..count {
                let glyph = self.table.glyphs.get(start + i)?.get();
                buffer.output_glyph(glyph.to_u32());
            }

            if buffer.idx < buffer.len && !before {
                buffer.skip_glyph();
            }

            // When DONT_ADVANCE is set, land on the first inserted glyph so
            // it is processed next; otherwise skip past the insertions.
            buffer.move_to(if flags & Self::DONT_ADVANCE != 0 {
                end
            } else {
                end + count
            });
        }

        Some(())
    }
}

pub(crate) fn remove_deleted_glyphs(buffer: &mut Buffer) {
    if buffer.scratch_flags & SCRATCH_HAS_AAT_DELETED == 0 {
        return;
    }
    buffer.delete_glyphs_inplace(|info| info.glyph_id == DELETED_GLYPH);
}

pub(crate) fn zero_width_deleted_glyphs(buffer: &mut Buffer) {
    if buffer.scratch_flags & SCRATCH_HAS_AAT_DELETED == 0 {
        return;
    }
    for i in 0..buffer.len {
        if buffer.info[i].glyph_id == DELETED_GLYPH {
            buffer.pos[i].x_advance = 0;
            buffer.pos[i].y_advance = 0;
            buffer.pos[i].x_offset = 0;
            buffer.pos[i].y_offset = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_from(glyphs: &[u32]) -> Buffer {
        let mut buffer = Buffer::new();
        for (i, &g) in glyphs.iter().enumerate() {
            buffer.add(g, i as u32);
        }
        buffer
    }

    fn glyphs(buffer: &Buffer) -> Vec<u32> {
        buffer.info.iter().map(|i| i.glyph_id).collect()
    }

    #[test]
    fn rearrangement_verbs() {
        // Verb 1: Ax => xA
        let mut buffer = buffer_from(&[1, 2, 3]);
        rearrange_range(&mut buffer, 0, 3, 1);
        assert_eq!(glyphs(&buffer), [2, 3, 1]);

        // Verb 2: xD => Dx
        let mut buffer = buffer_from(&[1, 2, 3]);
        rearrange_range(&mut buffer, 0, 3, 2);
        assert_eq!(glyphs(&buffer), [3, 1, 2]);

        // Verb 3: AxD => DxA
        let mut buffer = buffer_from(&[1, 2, 3]);
        rearrange_range(&mut buffer, 0, 3, 3);
        assert_eq!(glyphs(&buffer), [3, 2, 1]);

        // Verb 5: ABx => xBA (flipped pair)
        let mut buffer = buffer_from(&[1, 2, 3]);
        rearrange_range(&mut buffer, 0, 3, 5);
        assert_eq!(glyphs(&buffer), [3, 2, 1]);

        // Verb 12: ABxCD => CDxAB
        let mut buffer = buffer_from(&[1, 2, 9, 3, 4]);
        rearrange_range(&mut buffer, 0, 5, 12);
        assert_eq!(glyphs(&buffer), [3, 4, 9, 1, 2]);

        // Verb 15: ABxCD => DCxBA
        let mut buffer = buffer_from(&[1, 2, 9, 3, 4]);
        rearrange_range(&mut buffer, 0, 5, 15);
        assert_eq!(glyphs(&buffer), [4, 3, 9, 2, 1]);
    }

    #[test]
    fn rearrangement_too_short_is_ignored() {
        // Needs l+r glyphs; a two-glyph range cannot do ABxCD.
        let mut buffer = buffer_from(&[1, 2]);
        rearrange_range(&mut buffer, 0, 2, 12);
        assert_eq!(glyphs(&buffer), [1, 2]);
    }

    #[test]
    fn deleted_glyphs_removed() {
        let mut buffer = buffer_from(&[10, DELETED_GLYPH, 11]);
        buffer.scratch_flags |= SCRATCH_HAS_AAT_DELETED;
        remove_deleted_glyphs(&mut buffer);
        assert_eq!(glyphs(&buffer), [10, 11]);
    }
}
