//! Glyph substitution subtables.

use read_fonts::tables::gsub::{
    AlternateSubstFormat1, Ligature, LigatureSet, LigatureSubstFormat1, MultipleSubstFormat1,
    ReverseChainSingleSubstFormat1, SingleSubst, SingleSubstFormat1, SingleSubstFormat2,
};
use read_fonts::types::GlyphId;

use crate::buffer::GlyphPropsFlags;
use crate::ot_apply::{
    ligate_input, match_backtrack, match_glyph, match_input, match_lookahead, ApplyContext,
    WouldApplyContext,
};
use crate::ot_lookup::{Apply, WouldApply};

impl WouldApply for SingleSubst<'_> {
    fn would_apply(&self, ctx: &WouldApplyContext) -> bool {
        let gid = GlyphId::from(ctx.glyphs[0]);
        ctx.glyphs.len() == 1
            && match self {
                Self::Format1(t) => t.coverage().is_ok_and(|cov| cov.get(gid).is_some()),
                Self::Format2(t) => t.coverage().is_ok_and(|cov| cov.get(gid).is_some()),
            }
    }
}

impl Apply for SingleSubst<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        match self {
            Self::Format1(t) => t.apply(ctx),
            Self::Format2(t) => t.apply(ctx),
        }
    }
}

impl Apply for SingleSubstFormat1<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let glyph = ctx.buffer.cur(0).as_glyph();
        self.coverage().ok()?.get(glyph)?;
        let subst = (glyph.to_u32() as i32 + self.delta_glyph_id() as i32) as u16;
        ctx.replace_glyph(subst as u32);
        Some(())
    }
}

impl Apply for SingleSubstFormat2<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let glyph = ctx.buffer.cur(0).as_glyph();
        let index = self.coverage().ok()?.get(glyph)? as usize;
        let subst = self.substitute_glyph_ids().get(index)?.get();
        ctx.replace_glyph(subst.to_u32());
        Some(())
    }
}

impl WouldApply for MultipleSubstFormat1<'_> {
    fn would_apply(&self, ctx: &WouldApplyContext) -> bool {
        ctx.glyphs.len() == 1
            && self
                .coverage()
                .is_ok_and(|cov| cov.get(GlyphId::from(ctx.glyphs[0])).is_some())
    }
}

impl Apply for MultipleSubstFormat1<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let glyph = ctx.buffer.cur(0).as_glyph();
        let index = self.coverage().ok()?.get(glyph)? as usize;
        let substs = self.sequences().get(index).ok()?;
        let substs = substs.substitute_glyph_ids();
        match substs.len() {
            // The spec disallows an empty sequence, but the de-facto
            // behaviour is deletion.
            0 => ctx.buffer.delete_glyph(),

            // In-place, and not considered a "multiplied" substitution.
            1 => ctx.replace_glyph(substs.first()?.get().to_u32()),

            _ => {
                let class = if ctx.buffer.cur(0).is_ligature() {
                    GlyphPropsFlags::BASE_GLYPH
                } else {
                    GlyphPropsFlags::empty()
                };
                let lig_id = ctx.buffer.cur(0).lig_id();

                for (i, subst) in substs.iter().enumerate() {
                    // If attached to a ligature, don't disturb that.
                    if lig_id == 0 {
                        ctx.buffer.cur_mut(0).set_lig_props_for_component(i as u8);
                    }
                    ctx.output_glyph_for_component(subst.get().to_u32(), class);
                }

                ctx.buffer.skip_glyph();
            }
        }
        Some(())
    }
}

impl WouldApply for AlternateSubstFormat1<'_> {
    fn would_apply(&self, ctx: &WouldApplyContext) -> bool {
        ctx.glyphs.len() == 1
            && self
                .coverage()
                .is_ok_and(|cov| cov.get(GlyphId::from(ctx.glyphs[0])).is_some())
    }
}

impl Apply for AlternateSubstFormat1<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let glyph = ctx.buffer.cur(0).as_glyph();
        let index = self.coverage().ok()?.get(glyph)? as usize;
        let set = self.alternate_sets().get(index).ok()?;
        let alternates = set.alternate_glyph_ids();
        let count = alternates.len() as u32;
        if count == 0 {
            return None;
        }

        let glyph_mask = ctx.buffer.cur(0).mask;
        let lookup_mask = ctx.lookup_mask();

        // The alternate index is the feature value, taken from the mask
        // bits allocated to the feature that enabled this lookup.
        let shift = lookup_mask.trailing_zeros();
        let mut alt_index = (lookup_mask & glyph_mask) >> shift;

        // A value of MAX means "pick one at random" for the rand feature.
        if alt_index == crate::ot_map::MAX_VALUE && ctx.random {
            alt_index = ctx.random_number() % count + 1;
        }

        if alt_index == 0 || alt_index > count {
            return None;
        }

        let subst = alternates.get(alt_index as usize - 1)?.get();
        ctx.replace_glyph(subst.to_u32());
        Some(())
    }
}

impl WouldApply for Ligature<'_> {
    fn would_apply(&self, ctx: &WouldApplyContext) -> bool {
        let components = self.component_glyph_ids();
        ctx.glyphs.len() == components.len() + 1
            && components
                .iter()
                .enumerate()
                .all(|(i, comp)| ctx.glyphs[i + 1] == comp.get().to_u32())
    }
}

fn apply_ligature(ctx: &mut ApplyContext, ligature: &Ligature) -> Option<()> {
    let components = ligature.component_glyph_ids();

    // A one-glyph "ligature" stays in place and is not tracked as ligated.
    if components.is_empty() {
        ctx.replace_glyph(ligature.ligature_glyph().to_u32());
        return Some(());
    }

    let match_fn = |info: &crate::buffer::GlyphInfo, index: u16| {
        components
            .get(index as usize)
            .is_some_and(|comp| match_glyph(info, comp.get().to_u16()))
    };

    let mut match_end = 0;
    let mut total_component_count = 0;

    if !match_input(
        ctx,
        components.len() as u16,
        match_fn,
        &mut match_end,
        Some(&mut total_component_count),
    ) {
        ctx.buffer
            .unsafe_to_concat(Some(ctx.buffer.idx), Some(match_end));
        return None;
    }

    ligate_input(
        ctx,
        components.len() + 1,
        match_end,
        total_component_count,
        ligature.ligature_glyph().to_u32(),
    );
    Some(())
}

impl WouldApply for LigatureSet<'_> {
    fn would_apply(&self, ctx: &WouldApplyContext) -> bool {
        self.ligatures()
            .iter()
            .filter_map(Result::ok)
            .any(|lig| lig.would_apply(ctx))
    }
}

impl WouldApply for LigatureSubstFormat1<'_> {
    fn would_apply(&self, ctx: &WouldApplyContext) -> bool {
        self.coverage()
            .ok()
            .and_then(|cov| cov.get(GlyphId::from(ctx.glyphs[0])))
            .and_then(|index| self.ligature_sets().get(index as usize).ok())
            .is_some_and(|set| set.would_apply(ctx))
    }
}

impl Apply for LigatureSubstFormat1<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let glyph = ctx.buffer.cur(0).as_glyph();
        let index = self.coverage().ok()?.get(glyph)? as usize;
        let set = self.ligature_sets().get(index).ok()?;
        for lig in set.ligatures().iter().filter_map(Result::ok) {
            if apply_ligature(ctx, &lig).is_some() {
                return Some(());
            }
        }
        None
    }
}

impl Apply for ReverseChainSingleSubstFormat1<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        // No chaining to this type of lookup, so the buffer must be in
        // forward (non-output) mode.
        if ctx.buffer.have_output {
            return None;
        }

        let glyph = ctx.buffer.cur(0).as_glyph();
        let index = self.coverage().ok()?.get(glyph)? as usize;

        let backtrack_coverages = self.backtrack_coverages();
        let lookahead_coverages = self.lookahead_coverages();

        let back = |info: &crate::buffer::GlyphInfo, index: u16| {
            backtrack_coverages
                .get(index as usize)
                .is_ok_and(|cov| cov.get(info.as_glyph()).is_some())
        };
        let ahead = |info: &crate::buffer::GlyphInfo, index: u16| {
            lookahead_coverages
                .get(index as usize)
                .is_ok_and(|cov| cov.get(info.as_glyph()).is_some())
        };

        let mut start_index = 0;
        if !match_backtrack(ctx, backtrack_coverages.len() as u16, back, &mut start_index) {
            ctx.buffer
                .unsafe_to_concat_from_outbuffer(Some(start_index), Some(ctx.buffer.idx + 1));
            return None;
        }

        let mut end_index = 0;
        if !match_lookahead(
            ctx,
            lookahead_coverages.len() as u16,
            ahead,
            ctx.buffer.idx + 1,
            &mut end_index,
        ) {
            ctx.buffer
                .unsafe_to_concat(Some(ctx.buffer.idx), Some(end_index));
            return None;
        }

        ctx.buffer
            .unsafe_to_break_from_outbuffer(Some(start_index), Some(end_index));

        let subst = self.substitute_glyph_ids().get(index)?.get();
        ctx.replace_glyph_inplace(subst.to_u32());

        // Note: we don't advance; a reverse pass moves the cursor itself.
        Some(())
    }
}
