//! Per-lookup acceleration data and subtable dispatch.
//!
//! The GSUB/GPOS subtable set is fixed and small, so application is an
//! exhaustive match over the typed subtable enums the table accessors
//! expose.

use read_fonts::tables::gpos::{Gpos, PositionLookup, PositionSubtables};
use read_fonts::tables::gsub::{Gsub, SubstitutionLookup, SubstitutionSubtables};
use read_fonts::tables::layout::FeatureVariations;
use read_fonts::types::F2Dot14;
use read_fonts::ReadError;

use crate::face::Face;
use crate::ot_apply::{ApplyContext, WouldApplyContext};
use crate::ot_layout::TableIndex;
use crate::set_digest::SetDigest;

/// Precomputed per-lookup facts: flags, reverse orientation and a digest of
/// every subtable coverage for fast rejection.
#[derive(Clone, Default)]
pub(crate) struct LookupInfo {
    pub props: u32,
    pub reverse: bool,
    pub digest: SetDigest,
}

/// Find out whether a lookup would be applied.
pub(crate) trait WouldApply {
    fn would_apply(&self, ctx: &WouldApplyContext) -> bool;
}

/// Apply a lookup's subtable at the current buffer position.
pub(crate) trait Apply {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()>;
}

fn lookup_props(flag: read_fonts::tables::layout::LookupFlag, filter_set: Option<u16>) -> u32 {
    let mut props = flag.to_bits() as u32;
    if flag.use_mark_filtering_set() {
        if let Some(set) = filter_set {
            props |= (set as u32) << 16;
        }
    }
    props
}

pub(crate) fn collect_gsub_lookups(gsub: &Gsub) -> Vec<LookupInfo> {
    let mut infos = Vec::new();
    let Ok(list) = gsub.lookup_list() else {
        return infos;
    };
    let lookups = list.lookups();
    for i in 0..lookups.len() {
        let mut info = LookupInfo::default();
        if let Ok(lookup) = lookups.get(i) {
            info.props = lookup_props(lookup.lookup_flag(), lookup.mark_filtering_set());
            info.reverse = lookup.lookup_type() == 8;
            collect_gsub_digest(&lookup, &mut info.digest);
        }
        infos.push(info);
    }
    infos
}

pub(crate) fn collect_gpos_lookups(gpos: &Gpos) -> Vec<LookupInfo> {
    let mut infos = Vec::new();
    let Ok(list) = gpos.lookup_list() else {
        return infos;
    };
    let lookups = list.lookups();
    for i in 0..lookups.len() {
        let mut info = LookupInfo::default();
        if let Ok(lookup) = lookups.get(i) {
            info.props = lookup_props(lookup.lookup_flag(), lookup.mark_filtering_set());
            collect_gpos_digest(&lookup, &mut info.digest);
        }
        infos.push(info);
    }
    infos
}

macro_rules! add_coverages {
    ($tables:expr, $digest:expr) => {
        for table in $tables.iter().filter_map(Result::ok) {
            match table.coverage() {
                Ok(coverage) => $digest.add_coverage(&coverage),
                Err(_) => *$digest = SetDigest::full(),
            }
        }
    };
}

fn collect_gsub_digest(lookup: &SubstitutionLookup, digest: &mut SetDigest) {
    let Ok(subtables) = lookup.subtables() else {
        *digest = SetDigest::full();
        return;
    };
    match subtables {
        SubstitutionSubtables::Single(tables) => {
            for table in tables.iter().filter_map(Result::ok) {
                let coverage = match &table {
                    read_fonts::tables::gsub::SingleSubst::Format1(t) => t.coverage(),
                    read_fonts::tables::gsub::SingleSubst::Format2(t) => t.coverage(),
                };
                match coverage {
                    Ok(coverage) => digest.add_coverage(&coverage),
                    Err(_) => *digest = SetDigest::full(),
                }
            }
        }
        SubstitutionSubtables::Multiple(tables) => add_coverages!(tables, digest),
        SubstitutionSubtables::Alternate(tables) => add_coverages!(tables, digest),
        SubstitutionSubtables::Ligature(tables) => add_coverages!(tables, digest),
        SubstitutionSubtables::Contextual(tables) => {
            for table in tables.iter().filter_map(Result::ok) {
                crate::ot_context::collect_context_digest(&table, digest);
            }
        }
        SubstitutionSubtables::ChainContextual(tables) => {
            for table in tables.iter().filter_map(Result::ok) {
                crate::ot_context::collect_chain_context_digest(&table, digest);
            }
        }
        SubstitutionSubtables::Reverse(tables) => add_coverages!(tables, digest),
    }
}

fn collect_gpos_digest(lookup: &PositionLookup, digest: &mut SetDigest) {
    let Ok(subtables) = lookup.subtables() else {
        *digest = SetDigest::full();
        return;
    };
    match subtables {
        PositionSubtables::Single(tables) => {
            for table in tables.iter().filter_map(Result::ok) {
                let coverage = match &table {
                    read_fonts::tables::gpos::SinglePos::Format1(t) => t.coverage(),
                    read_fonts::tables::gpos::SinglePos::Format2(t) => t.coverage(),
                };
                match coverage {
                    Ok(coverage) => digest.add_coverage(&coverage),
                    Err(_) => *digest = SetDigest::full(),
                }
            }
        }
        PositionSubtables::Pair(tables) => {
            for table in tables.iter().filter_map(Result::ok) {
                let coverage = match &table {
                    read_fonts::tables::gpos::PairPos::Format1(t) => t.coverage(),
                    read_fonts::tables::gpos::PairPos::Format2(t) => t.coverage(),
                };
                match coverage {
                    Ok(coverage) => digest.add_coverage(&coverage),
                    Err(_) => *digest = SetDigest::full(),
                }
            }
        }
        PositionSubtables::Cursive(tables) => add_coverages!(tables, digest),
        PositionSubtables::MarkToBase(tables) => {
            for table in tables.iter().filter_map(Result::ok) {
                match table.mark_coverage() {
                    Ok(coverage) => digest.add_coverage(&coverage),
                    Err(_) => *digest = SetDigest::full(),
                }
            }
        }
        PositionSubtables::MarkToLig(tables) => {
            for table in tables.iter().filter_map(Result::ok) {
                match table.mark_coverage() {
                    Ok(coverage) => digest.add_coverage(&coverage),
                    Err(_) => *digest = SetDigest::full(),
                }
            }
        }
        PositionSubtables::MarkToMark(tables) => {
            for table in tables.iter().filter_map(Result::ok) {
                match table.mark1_coverage() {
                    Ok(coverage) => digest.add_coverage(&coverage),
                    Err(_) => *digest = SetDigest::full(),
                }
            }
        }
        PositionSubtables::Contextual(tables) => {
            for table in tables.iter().filter_map(Result::ok) {
                crate::ot_context::collect_context_digest(&table, digest);
            }
        }
        PositionSubtables::ChainContextual(tables) => {
            for table in tables.iter().filter_map(Result::ok) {
                crate::ot_context::collect_chain_context_digest(&table, digest);
            }
        }
    }
}

/// Resolves the feature-variations record matching the current coordinates.
pub(crate) fn feature_variation_index(
    feature_variations: Option<Result<FeatureVariations, ReadError>>,
    coords: &[F2Dot14],
) -> Option<u32> {
    if coords.is_empty() {
        return None;
    }
    let feature_variations = feature_variations?.ok()?;
    for (index, rec) in feature_variations
        .feature_variation_records()
        .iter()
        .enumerate()
    {
        // A null condition set is the universal condition.
        let Some(condition_set) = rec.condition_set(feature_variations.offset_data()) else {
            return Some(index as u32);
        };
        let Ok(condition_set) = condition_set else {
            continue;
        };
        let matched = condition_set.conditions().iter().filter_map(Result::ok).all(
            |cond| match cond {
                read_fonts::tables::layout::Condition::Format1AxisRange(format1) => {
                    let coord = coords
                        .get(format1.axis_index() as usize)
                        .copied()
                        .unwrap_or_default();
                    coord >= format1.filter_range_min_value()
                        && coord <= format1.filter_range_max_value()
                }
                _ => false,
            },
        );
        if matched {
            return Some(index as u32);
        }
    }
    None
}

fn fetch_gsub_lookup<'a>(face: &Face<'a>, index: u16) -> Option<SubstitutionLookup<'a>> {
    face.ot
        .gsub
        .as_ref()?
        .lookup_list()
        .ok()?
        .lookups()
        .get(index as usize)
        .ok()
}

fn fetch_gpos_lookup<'a>(face: &Face<'a>, index: u16) -> Option<PositionLookup<'a>> {
    face.ot
        .gpos
        .as_ref()?
        .lookup_list()
        .ok()?
        .lookups()
        .get(index as usize)
        .ok()
}

/// Attempts every subtable of a GSUB lookup at the current position.
fn apply_gsub_subtables(ctx: &mut ApplyContext, lookup: &SubstitutionLookup) -> Option<()> {
    let subtables = lookup.subtables().ok()?;
    macro_rules! try_each {
        ($tables:expr) => {{
            for table in $tables.iter().filter_map(Result::ok) {
                if table.apply(ctx).is_some() {
                    return Some(());
                }
            }
            None
        }};
    }
    match subtables {
        SubstitutionSubtables::Single(tables) => try_each!(tables),
        SubstitutionSubtables::Multiple(tables) => try_each!(tables),
        SubstitutionSubtables::Alternate(tables) => try_each!(tables),
        SubstitutionSubtables::Ligature(tables) => try_each!(tables),
        SubstitutionSubtables::Contextual(tables) => try_each!(tables),
        SubstitutionSubtables::ChainContextual(tables) => try_each!(tables),
        SubstitutionSubtables::Reverse(tables) => try_each!(tables),
    }
}

fn apply_gpos_subtables(ctx: &mut ApplyContext, lookup: &PositionLookup) -> Option<()> {
    let subtables = lookup.subtables().ok()?;
    macro_rules! try_each {
        ($tables:expr) => {{
            for table in $tables.iter().filter_map(Result::ok) {
                if table.apply(ctx).is_some() {
                    return Some(());
                }
            }
            None
        }};
    }
    match subtables {
        PositionSubtables::Single(tables) => try_each!(tables),
        PositionSubtables::Pair(tables) => try_each!(tables),
        PositionSubtables::Cursive(tables) => try_each!(tables),
        PositionSubtables::MarkToBase(tables) => try_each!(tables),
        PositionSubtables::MarkToLig(tables) => try_each!(tables),
        PositionSubtables::MarkToMark(tables) => try_each!(tables),
        PositionSubtables::Contextual(tables) => try_each!(tables),
        PositionSubtables::ChainContextual(tables) => try_each!(tables),
    }
}

/// Entry point for recursed (nested) lookups: apply once at the current
/// position with the nested lookup's own props.
pub(crate) fn apply_nested(ctx: &mut ApplyContext, lookup_index: u16) -> Option<()> {
    let info = ctx.face.ot.lookup(ctx.table_index, lookup_index)?.clone();
    ctx.lookup_props = info.props;
    ctx.update_matchers();
    match ctx.table_index {
        TableIndex::Gsub => {
            let lookup = fetch_gsub_lookup(ctx.face, lookup_index)?;
            apply_gsub_subtables(ctx, &lookup)
        }
        TableIndex::Gpos => {
            let lookup = fetch_gpos_lookup(ctx.face, lookup_index)?;
            apply_gpos_subtables(ctx, &lookup)
        }
    }
}

/// Applies one lookup across the whole buffer.
pub(crate) fn apply_string(ctx: &mut ApplyContext, lookup_index: u16, info: &LookupInfo) {
    if ctx.buffer.is_empty() || ctx.lookup_mask() == 0 {
        return;
    }

    ctx.lookup_index = lookup_index;
    ctx.lookup_props = info.props;
    ctx.update_matchers();

    match ctx.table_index {
        TableIndex::Gsub => {
            let Some(lookup) = fetch_gsub_lookup(ctx.face, lookup_index) else {
                return;
            };
            if !info.reverse {
                ctx.buffer.clear_output();
                ctx.buffer.idx = 0;
                apply_forward(ctx, info, |ctx| apply_gsub_subtables(ctx, &lookup));
                ctx.buffer.sync();
            } else {
                // Reverse chaining substitutions run backwards and in place.
                debug_assert!(!ctx.buffer.have_output);
                if ctx.buffer.len == 0 {
                    return;
                }
                ctx.buffer.idx = ctx.buffer.len - 1;
                apply_backward(ctx, info, |ctx| apply_gsub_subtables(ctx, &lookup));
            }
        }
        TableIndex::Gpos => {
            let Some(lookup) = fetch_gpos_lookup(ctx.face, lookup_index) else {
                return;
            };
            ctx.buffer.idx = 0;
            apply_forward(ctx, info, |ctx| apply_gpos_subtables(ctx, &lookup));
        }
    }
}

fn apply_forward(
    ctx: &mut ApplyContext,
    info: &LookupInfo,
    mut apply: impl FnMut(&mut ApplyContext) -> Option<()>,
) -> bool {
    let mut ret = false;
    while ctx.buffer.idx < ctx.buffer.len && ctx.buffer.successful {
        let cur = ctx.buffer.cur(0);
        if info.digest.may_have(cur.glyph_id)
            && (cur.mask & ctx.lookup_mask()) != 0
            && check_glyph_property_ctx(ctx)
            && apply(ctx).is_some()
        {
            ret = true;
        } else {
            ctx.buffer.next_glyph();
        }
    }
    ret
}

fn apply_backward(
    ctx: &mut ApplyContext,
    info: &LookupInfo,
    mut apply: impl FnMut(&mut ApplyContext) -> Option<()>,
) -> bool {
    let mut ret = false;
    loop {
        let cur = ctx.buffer.cur(0);
        ret |= info.digest.may_have(cur.glyph_id)
            && (cur.mask & ctx.lookup_mask()) != 0
            && check_glyph_property_ctx(ctx)
            && apply(ctx).is_some();

        if ctx.buffer.idx == 0 {
            break;
        }
        ctx.buffer.idx -= 1;
    }
    ret
}

#[inline]
fn check_glyph_property_ctx(ctx: &ApplyContext) -> bool {
    crate::ot_layout::check_glyph_property(ctx.face, ctx.buffer.cur(0), ctx.lookup_props)
}

/// Probes whether a GSUB lookup would apply to the given glyph string.
pub(crate) fn would_apply(
    face: &Face,
    lookup_index: u16,
    ctx: &WouldApplyContext,
) -> bool {
    let Some(lookup) = fetch_gsub_lookup(face, lookup_index) else {
        return false;
    };
    let Ok(subtables) = lookup.subtables() else {
        return false;
    };
    macro_rules! any {
        ($tables:expr) => {
            $tables
                .iter()
                .filter_map(Result::ok)
                .any(|table| table.would_apply(ctx))
        };
    }
    match subtables {
        SubstitutionSubtables::Single(tables) => any!(tables),
        SubstitutionSubtables::Multiple(tables) => any!(tables),
        SubstitutionSubtables::Alternate(tables) => any!(tables),
        SubstitutionSubtables::Ligature(tables) => any!(tables),
        SubstitutionSubtables::Contextual(tables) => any!(tables),
        SubstitutionSubtables::ChainContextual(tables) => any!(tables),
        SubstitutionSubtables::Reverse(_) => false,
    }
}
