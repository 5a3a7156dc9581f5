//! Contextual and chained-contextual lookups, shared between GSUB and GPOS.
//!
//! Every format boils down to the same plan: match the input sequence at
//! the current position with a format-specific predicate, then hand the
//! matched span to the nested lookups. The chained formats bolt a
//! lookahead and a backtrack check around that core.

use read_fonts::tables::gsub::ClassDef;
use read_fonts::tables::layout::{
    ChainedSequenceContext, ChainedSequenceContextFormat1, ChainedSequenceContextFormat2,
    ChainedSequenceContextFormat3, CoverageTable, SequenceContext, SequenceContextFormat1,
    SequenceContextFormat2, SequenceContextFormat3, SequenceLookupRecord,
};
use read_fonts::types::{BigEndian, GlyphId, GlyphId16, Offset16};
use read_fonts::ArrayOfOffsets;

use crate::buffer::GlyphInfo;
use crate::ot_apply::{
    apply_lookup, match_backtrack, match_input, match_lookahead, ApplyContext, WouldApplyContext,
};
use crate::ot_lookup::{Apply, WouldApply};
use crate::set_digest::SetDigest;

fn class_of(class_def: &Option<ClassDef>, glyph: u32) -> u16 {
    class_def
        .as_ref()
        .map_or(0, |class_def| class_def.get(GlyphId16::new(glyph as u16)))
}

fn covered<'a>(
    coverages: &ArrayOfOffsets<'a, CoverageTable<'a>, Offset16>,
    index: usize,
    glyph: u32,
) -> bool {
    coverages
        .get(index)
        .is_ok_and(move |coverage| coverage.get(GlyphId::from(glyph)).is_some())
}

/// Matches the input sequence at the current position; on success the
/// nested lookups run over the matched span.
fn match_and_recurse(
    ctx: &mut ApplyContext,
    input_len: usize,
    input_fn: impl Fn(&GlyphInfo, u16) -> bool,
    records: &[SequenceLookupRecord],
) -> Option<()> {
    let mut match_end = 0;
    if !match_input(ctx, input_len as u16, input_fn, &mut match_end, None) {
        return None;
    }

    ctx.buffer
        .unsafe_to_break(Some(ctx.buffer.idx), Some(match_end));
    apply_lookup(ctx, input_len, match_end, records);
    Some(())
}

/// The chained variant: input first, then lookahead, then backtrack, so a
/// failing side can be reported with the right unsafe-to range.
fn match_chain_and_recurse(
    ctx: &mut ApplyContext,
    (backtrack_len, input_len, lookahead_len): (usize, usize, usize),
    backtrack_fn: impl Fn(&GlyphInfo, u16) -> bool,
    input_fn: impl Fn(&GlyphInfo, u16) -> bool,
    lookahead_fn: impl Fn(&GlyphInfo, u16) -> bool,
    records: &[SequenceLookupRecord],
) -> Option<()> {
    let mut match_end = 0;
    let mut end_index = ctx.buffer.idx;

    let matched = match_input(ctx, input_len as u16, input_fn, &mut match_end, None) && {
        end_index = match_end;
        match_lookahead(
            ctx,
            lookahead_len as u16,
            lookahead_fn,
            match_end,
            &mut end_index,
        )
    };
    if !matched {
        ctx.buffer
            .unsafe_to_concat(Some(ctx.buffer.idx), Some(end_index));
        return None;
    }

    let mut start_index = ctx.buffer.out_len();
    if !match_backtrack(ctx, backtrack_len as u16, backtrack_fn, &mut start_index) {
        ctx.buffer
            .unsafe_to_concat_from_outbuffer(Some(start_index), Some(end_index));
        return None;
    }

    ctx.buffer
        .unsafe_to_break_from_outbuffer(Some(start_index), Some(end_index));
    apply_lookup(ctx, input_len, match_end, records);
    Some(())
}

// Would-apply probing matches the glyph string directly, with no buffer.

fn would_match_glyphs(glyphs: &[u32], values: &[BigEndian<GlyphId16>]) -> bool {
    glyphs.len() == values.len() + 1
        && values
            .iter()
            .zip(&glyphs[1..])
            .all(|(value, glyph)| value.get().to_u32() == *glyph)
}

fn would_match_classes(
    glyphs: &[u32],
    values: &[BigEndian<u16>],
    class_def: &Option<ClassDef>,
) -> bool {
    glyphs.len() == values.len() + 1
        && values
            .iter()
            .zip(&glyphs[1..])
            .all(|(value, glyph)| class_of(class_def, *glyph) == value.get())
}

impl Apply for SequenceContext<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        match self {
            Self::Format1(t) => t.apply(ctx),
            Self::Format2(t) => t.apply(ctx),
            Self::Format3(t) => t.apply(ctx),
        }
    }
}

impl WouldApply for SequenceContext<'_> {
    fn would_apply(&self, ctx: &WouldApplyContext) -> bool {
        match self {
            Self::Format1(t) => t.would_apply(ctx),
            Self::Format2(t) => t.would_apply(ctx),
            Self::Format3(t) => t.would_apply(ctx),
        }
    }
}

impl Apply for ChainedSequenceContext<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        match self {
            Self::Format1(t) => t.apply(ctx),
            Self::Format2(t) => t.apply(ctx),
            Self::Format3(t) => t.apply(ctx),
        }
    }
}

impl WouldApply for ChainedSequenceContext<'_> {
    fn would_apply(&self, ctx: &WouldApplyContext) -> bool {
        match self {
            Self::Format1(t) => t.would_apply(ctx),
            Self::Format2(t) => t.would_apply(ctx),
            Self::Format3(t) => t.would_apply(ctx),
        }
    }
}

// Format 1: rules keyed by first-glyph coverage, inputs are glyph ids.

impl Apply for SequenceContextFormat1<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let glyph = ctx.buffer.cur(0).as_glyph();
        let index = self.coverage().ok()?.get(glyph)? as usize;
        let set = self.seq_rule_sets().get(index)?.ok()?;

        for rule in set.seq_rules().iter().filter_map(Result::ok) {
            let values = rule.input_sequence();
            let applied = match_and_recurse(
                ctx,
                values.len(),
                |info, i| {
                    values
                        .get(i as usize)
                        .is_some_and(|value| value.get().to_u32() == info.glyph_id)
                },
                rule.seq_lookup_records(),
            );
            if applied.is_some() {
                return Some(());
            }
        }
        None
    }
}

impl WouldApply for SequenceContextFormat1<'_> {
    fn would_apply(&self, ctx: &WouldApplyContext) -> bool {
        let Some(index) = self
            .coverage()
            .ok()
            .and_then(|coverage| coverage.get(GlyphId::from(ctx.glyphs[0])))
        else {
            return false;
        };
        let Some(Ok(set)) = self.seq_rule_sets().get(index as usize) else {
            return false;
        };
        set.seq_rules()
            .iter()
            .filter_map(Result::ok)
            .any(|rule| would_match_glyphs(ctx.glyphs, rule.input_sequence()))
    }
}

// Format 2: rules keyed by the first glyph's class, inputs are classes.

impl Apply for SequenceContextFormat2<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let glyph = ctx.buffer.cur(0).as_glyph();
        self.coverage().ok()?.get(glyph)?;

        let class_def = self.class_def().ok();
        let set = self
            .class_seq_rule_sets()
            .get(class_of(&class_def, glyph.to_u32()) as usize)?
            .ok()?;

        for rule in set.class_seq_rules().iter().filter_map(Result::ok) {
            let values = rule.input_sequence();
            let applied = match_and_recurse(
                ctx,
                values.len(),
                |info, i| {
                    values
                        .get(i as usize)
                        .is_some_and(|value| class_of(&class_def, info.glyph_id) == value.get())
                },
                rule.seq_lookup_records(),
            );
            if applied.is_some() {
                return Some(());
            }
        }
        None
    }
}

impl WouldApply for SequenceContextFormat2<'_> {
    fn would_apply(&self, ctx: &WouldApplyContext) -> bool {
        let class_def = self.class_def().ok();
        let class = class_of(&class_def, ctx.glyphs[0]);
        let Some(Ok(set)) = self.class_seq_rule_sets().get(class as usize) else {
            return false;
        };
        set.class_seq_rules()
            .iter()
            .filter_map(Result::ok)
            .any(|rule| would_match_classes(ctx.glyphs, rule.input_sequence(), &class_def))
    }
}

// Format 3: one rule, every input position has its own coverage.

impl Apply for SequenceContextFormat3<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let glyph = ctx.buffer.cur(0).as_glyph();
        let coverages = self.coverages();
        coverages.get(0).ok()?.get(glyph)?;

        // Unlike the rule-set formats, a failure here is final and must
        // mark the unmatched span.
        let mut match_end = 0;
        if !match_input(
            ctx,
            coverages.len() as u16 - 1,
            |info, i| covered(&coverages, i as usize + 1, info.glyph_id),
            &mut match_end,
            None,
        ) {
            ctx.buffer
                .unsafe_to_concat(Some(ctx.buffer.idx), Some(match_end));
            return None;
        }

        ctx.buffer
            .unsafe_to_break(Some(ctx.buffer.idx), Some(match_end));
        apply_lookup(
            ctx,
            coverages.len() - 1,
            match_end,
            self.seq_lookup_records(),
        );
        Some(())
    }
}

impl WouldApply for SequenceContextFormat3<'_> {
    fn would_apply(&self, ctx: &WouldApplyContext) -> bool {
        let coverages = self.coverages();
        ctx.glyphs.len() == coverages.len()
            && ctx
                .glyphs
                .iter()
                .enumerate()
                .all(|(i, glyph)| covered(&coverages, i, *glyph))
    }
}

// Chained format 1: glyph-id sequences on all three sides.

impl Apply for ChainedSequenceContextFormat1<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let glyph = ctx.buffer.cur(0).as_glyph();
        let index = self.coverage().ok()?.get(glyph)? as usize;
        let set = self.chained_seq_rule_sets().get(index)?.ok()?;

        for rule in set.chained_seq_rules().iter().filter_map(Result::ok) {
            let backtrack = rule.backtrack_sequence();
            let input = rule.input_sequence();
            let lookahead = rule.lookahead_sequence();

            let glyph_at = |values: &[BigEndian<GlyphId16>], info: &GlyphInfo, i: u16| {
                values
                    .get(i as usize)
                    .is_some_and(|value| value.get().to_u32() == info.glyph_id)
            };

            let applied = match_chain_and_recurse(
                ctx,
                (backtrack.len(), input.len(), lookahead.len()),
                |info, i| glyph_at(backtrack, info, i),
                |info, i| glyph_at(input, info, i),
                |info, i| glyph_at(lookahead, info, i),
                rule.seq_lookup_records(),
            );
            if applied.is_some() {
                return Some(());
            }
        }
        None
    }
}

impl WouldApply for ChainedSequenceContextFormat1<'_> {
    fn would_apply(&self, ctx: &WouldApplyContext) -> bool {
        let Some(index) = self
            .coverage()
            .ok()
            .and_then(|coverage| coverage.get(GlyphId::from(ctx.glyphs[0])))
        else {
            return false;
        };
        let Some(Ok(set)) = self.chained_seq_rule_sets().get(index as usize) else {
            return false;
        };
        set.chained_seq_rules()
            .iter()
            .filter_map(Result::ok)
            .any(|rule| {
                (!ctx.zero_context
                    || (rule.backtrack_glyph_count() == 0 && rule.lookahead_glyph_count() == 0))
                    && would_match_glyphs(ctx.glyphs, rule.input_sequence())
            })
    }
}

// Chained format 2: class sequences, one class table per side.

impl Apply for ChainedSequenceContextFormat2<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let glyph = ctx.buffer.cur(0).as_glyph();
        self.coverage().ok()?.get(glyph)?;

        let backtrack_classes = self.backtrack_class_def().ok();
        let input_classes = self.input_class_def().ok();
        let lookahead_classes = self.lookahead_class_def().ok();

        let set = self
            .chained_class_seq_rule_sets()
            .get(class_of(&input_classes, glyph.to_u32()) as usize)?
            .ok()?;

        for rule in set.chained_class_seq_rules().iter().filter_map(Result::ok) {
            let backtrack = rule.backtrack_sequence();
            let input = rule.input_sequence();
            let lookahead = rule.lookahead_sequence();

            let class_at = |classes: &Option<ClassDef>,
                            values: &[BigEndian<u16>],
                            info: &GlyphInfo,
                            i: u16| {
                values
                    .get(i as usize)
                    .is_some_and(|value| class_of(classes, info.glyph_id) == value.get())
            };

            let applied = match_chain_and_recurse(
                ctx,
                (backtrack.len(), input.len(), lookahead.len()),
                |info, i| class_at(&backtrack_classes, backtrack, info, i),
                |info, i| class_at(&input_classes, input, info, i),
                |info, i| class_at(&lookahead_classes, lookahead, info, i),
                rule.seq_lookup_records(),
            );
            if applied.is_some() {
                return Some(());
            }
        }
        None
    }
}

impl WouldApply for ChainedSequenceContextFormat2<'_> {
    fn would_apply(&self, ctx: &WouldApplyContext) -> bool {
        let input_classes = self.input_class_def().ok();
        let class = class_of(&input_classes, ctx.glyphs[0]);
        let Some(Ok(set)) = self.chained_class_seq_rule_sets().get(class as usize) else {
            return false;
        };
        set.chained_class_seq_rules()
            .iter()
            .filter_map(Result::ok)
            .any(|rule| {
                (!ctx.zero_context
                    || (rule.backtrack_glyph_count() == 0 && rule.lookahead_glyph_count() == 0))
                    && would_match_classes(ctx.glyphs, rule.input_sequence(), &input_classes)
            })
    }
}

// Chained format 3: one rule, per-position coverages on all three sides.

impl Apply for ChainedSequenceContextFormat3<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let glyph = ctx.buffer.cur(0).as_glyph();

        let input_coverages = self.input_coverages();
        input_coverages.get(0).ok()?.get(glyph)?;

        let backtrack_coverages = self.backtrack_coverages();
        let lookahead_coverages = self.lookahead_coverages();

        match_chain_and_recurse(
            ctx,
            (
                backtrack_coverages.len(),
                input_coverages.len() - 1,
                lookahead_coverages.len(),
            ),
            |info, i| covered(&backtrack_coverages, i as usize, info.glyph_id),
            |info, i| covered(&input_coverages, i as usize + 1, info.glyph_id),
            |info, i| covered(&lookahead_coverages, i as usize, info.glyph_id),
            self.seq_lookup_records(),
        )
    }
}

impl WouldApply for ChainedSequenceContextFormat3<'_> {
    fn would_apply(&self, ctx: &WouldApplyContext) -> bool {
        if ctx.zero_context
            && !(self.backtrack_coverage_offsets().is_empty()
                && self.lookahead_coverage_offsets().is_empty())
        {
            return false;
        }
        let input_coverages = self.input_coverages();
        ctx.glyphs.len() == input_coverages.len()
            && ctx
                .glyphs
                .iter()
                .enumerate()
                .all(|(i, glyph)| covered(&input_coverages, i, *glyph))
    }
}

// Digest collection: only the first-position coverage matters for the fast
// rejection filter.

pub(crate) fn collect_context_digest(table: &SequenceContext, digest: &mut SetDigest) {
    let coverage = match table {
        SequenceContext::Format1(t) => t.coverage(),
        SequenceContext::Format2(t) => t.coverage(),
        SequenceContext::Format3(t) => match t.coverages().get(0) {
            Ok(coverage) => Ok(coverage),
            Err(_) => {
                *digest = SetDigest::full();
                return;
            }
        },
    };
    match coverage {
        Ok(coverage) => digest.add_coverage(&coverage),
        Err(_) => *digest = SetDigest::full(),
    }
}

pub(crate) fn collect_chain_context_digest(
    table: &ChainedSequenceContext,
    digest: &mut SetDigest,
) {
    let coverage = match table {
        ChainedSequenceContext::Format1(t) => t.coverage(),
        ChainedSequenceContext::Format2(t) => t.coverage(),
        ChainedSequenceContext::Format3(t) => match t.input_coverages().get(0) {
            Ok(coverage) => Ok(coverage),
            Err(_) => {
                *digest = SetDigest::full();
                return;
            }
        },
    };
    match coverage {
        Ok(coverage) => digest.add_coverage(&coverage),
        Err(_) => *digest = SetDigest::full(),
    }
}
