//! The shaping pipeline: substitute, position, post-process.

use crate::buffer::{glyph_flag, scratch_flags, Buffer, BufferFlags, GlyphPosition};
use crate::common::Direction;
use crate::face::Face;
use crate::ot_layout::{self, TableIndex};
use crate::ot_shape_plan::ShapePlan;
use crate::ot_shaper::ZeroWidthMarksMode;
use crate::unicode::{self, GeneralCategory};
use crate::{aat, ot_gpos, ot_shape_fallback, ot_shape_normalize};

struct ShapeContext<'a, 'b> {
    plan: &'a ShapePlan,
    face: &'a Face<'b>,
    buffer: &'a mut Buffer,
    target_direction: Direction,
}

/// Shapes a prepared buffer with a compiled plan. This is the whole engine.
pub(crate) fn shape_internal(plan: &ShapePlan, face: &Face, buffer: &mut Buffer) {
    buffer.enter();

    let target_direction = buffer.direction;
    let mut ctx = ShapeContext {
        plan,
        face,
        buffer,
        target_direction,
    };

    initialize_masks(&mut ctx);
    ctx.buffer.set_unicode_props();
    ctx.buffer.insert_dotted_circle(ctx.face);
    ctx.buffer.form_clusters();
    ctx.buffer.ensure_native_direction();

    if let Some(func) = ctx.plan.shaper.preprocess_text {
        func(ctx.plan, ctx.face, ctx.buffer);
    }

    substitute_before_position(&mut ctx);
    position(&mut ctx);
    substitute_after_position(&mut ctx);

    propagate_flags(ctx.buffer);

    ctx.buffer.direction = target_direction;
    ctx.buffer.leave();
}

fn initialize_masks(ctx: &mut ShapeContext) {
    let global_mask = ctx.plan.ot_map.global_mask();
    ctx.buffer.reset_masks(global_mask);
}

fn setup_masks(ctx: &mut ShapeContext) {
    setup_masks_fraction(ctx);

    if let Some(func) = ctx.plan.shaper.setup_masks {
        func(ctx.plan, ctx.face, ctx.buffer);
    }

    for feature in &ctx.plan.user_features {
        if !feature.is_global() {
            let (mask, shift) = ctx.plan.ot_map.mask(feature.tag);
            ctx.buffer
                .set_masks(feature.value << shift, mask, feature.start, feature.end);
        }
    }
}

fn setup_masks_fraction(ctx: &mut ShapeContext) {
    let buffer = &mut ctx.buffer;
    if buffer.scratch_flags & scratch_flags::HAS_NON_ASCII == 0 || !ctx.plan.has_frac {
        return;
    }

    let (pre_mask, post_mask) = if buffer.direction.is_forward() {
        (
            ctx.plan.numr_mask | ctx.plan.frac_mask,
            ctx.plan.frac_mask | ctx.plan.dnom_mask,
        )
    } else {
        (
            ctx.plan.frac_mask | ctx.plan.dnom_mask,
            ctx.plan.numr_mask | ctx.plan.frac_mask,
        )
    };

    let count = buffer.len;
    let mut i = 0;
    while i < count {
        // FRACTION SLASH
        if buffer.info[i].glyph_id == 0x2044 {
            let mut start = i;
            while start > 0
                && buffer.info[start - 1].general_category() == GeneralCategory::DECIMAL_NUMBER
            {
                start -= 1;
            }
            let mut end = i + 1;
            while end < count
                && buffer.info[end].general_category() == GeneralCategory::DECIMAL_NUMBER
            {
                end += 1;
            }

            buffer.unsafe_to_break(Some(start), Some(end));

            for info in &mut buffer.info[start..i] {
                info.mask |= pre_mask;
            }
            buffer.info[i].mask |= ctx.plan.frac_mask;
            for info in &mut buffer.info[i + 1..end] {
                info.mask |= post_mask;
            }

            i = end;
        } else {
            i += 1;
        }
    }
}

fn rotate_chars(ctx: &mut ShapeContext) {
    let len = ctx.buffer.len;

    if ctx.target_direction.is_backward() {
        let rtlm_mask = ctx.plan.rtlm_mask;
        for info in &mut ctx.buffer.info[..len] {
            if let Some(mirrored) = unicode::mirror_char(info.as_char()) {
                if ctx.face.nominal_glyph(mirrored).is_some() {
                    info.glyph_id = mirrored as u32;
                    continue;
                }
            }
            info.mask |= rtlm_mask;
        }
    }

    if ctx.target_direction.is_vertical() && !ctx.plan.has_vert {
        for info in &mut ctx.buffer.info[..len] {
            let vert = unicode::vert_char_for(info.as_char());
            if vert != info.as_char() && ctx.face.nominal_glyph(vert).is_some() {
                info.glyph_id = vert as u32;
            }
        }
    }
}

fn map_glyphs(ctx: &mut ShapeContext) {
    // The normalizer already mapped most characters while checking font
    // support; this pass fills in whatever is left (including .notdef).
    ot_shape_normalize::map_remaining_glyphs(ctx.face, ctx.buffer);
}

fn substitute_before_position(ctx: &mut ShapeContext) {
    rotate_chars(ctx);

    ot_shape_normalize::normalize(ctx.plan, ctx.buffer, ctx.face);

    setup_masks(ctx);

    // Has to go here, unfortunately: it depends on mark classification
    // before glyph mapping.
    if ctx.plan.fallback_mark_positioning {
        ot_shape_fallback::recategorize_marks(ctx.buffer);
    }

    map_glyphs(ctx);

    ot_layout::set_glyph_props(ctx.face, ctx.buffer);

    if ctx.plan.fallback_glyph_classes {
        ot_layout::synthesize_glyph_classes(ctx.buffer);
    }

    if ctx.plan.apply_morx {
        aat::morx::substitute(ctx.plan, ctx.face, ctx.buffer);
    }

    ctx.plan
        .ot_map
        .apply(TableIndex::Gsub, ctx.plan, ctx.face, ctx.buffer);

    if ctx.plan.apply_morx && ctx.plan.apply_gpos {
        aat::morx::remove_deleted_glyphs(ctx.buffer);
    }
}

fn substitute_after_position(ctx: &mut ShapeContext) {
    if ctx.plan.apply_morx && !ctx.plan.apply_gpos {
        aat::morx::remove_deleted_glyphs(ctx.buffer);
    }

    ot_layout::hide_default_ignorables(ctx.buffer, ctx.face);

    if let Some(func) = ctx.plan.shaper.postprocess_glyphs {
        func(ctx.plan, ctx.face, ctx.buffer);
    }
}

fn zero_mark_widths_by_gdef(buffer: &mut Buffer, adjust_offsets: bool) {
    let len = buffer.len;
    for i in 0..len {
        if buffer.info[i].is_mark() {
            let pos = &mut buffer.pos[i];
            if adjust_offsets {
                pos.x_offset -= pos.x_advance;
                pos.y_offset -= pos.y_advance;
            }
            pos.x_advance = 0;
            pos.y_advance = 0;
        }
    }
}

fn position_default(ctx: &mut ShapeContext) {
    let len = ctx.buffer.len;
    if ctx.buffer.direction.is_horizontal() {
        for i in 0..len {
            let glyph = ctx.buffer.info[i].glyph_id;
            ctx.buffer.pos[i].x_advance = ctx.face.glyph_h_advance(glyph);
            ctx.buffer.pos[i].y_advance = 0;
        }
    } else {
        for i in 0..len {
            let glyph = ctx.buffer.info[i].glyph_id;
            ctx.buffer.pos[i].x_advance = 0;
            ctx.buffer.pos[i].y_advance = ctx.face.glyph_v_advance(glyph);
        }
    }
    if ctx.buffer.scratch_flags & scratch_flags::HAS_SPACE_FALLBACK != 0 {
        ot_shape_fallback::adjust_spaces(ctx.plan, ctx.face, ctx.buffer);
    }
}

fn position_complex(ctx: &mut ShapeContext) {
    // If the font has no GPOS and the direction is forward, zeroing mark
    // widths shifts the mark to hang over the previous glyph; when backward,
    // it ends up over the next glyph after the final reversal. If fallback
    // positioning kicks in later it overrides all of this anyway.
    let adjust_offsets_when_zeroing =
        ctx.plan.adjust_mark_positioning_when_zeroing && ctx.buffer.direction.is_forward();

    ot_gpos::position_start(ctx.buffer);

    if ctx.plan.zero_marks && ctx.plan.shaper.zero_width_marks == ZeroWidthMarksMode::ByGdefEarly {
        zero_mark_widths_by_gdef(ctx.buffer, adjust_offsets_when_zeroing);
    }

    if ctx.plan.apply_gpos {
        ctx.plan
            .ot_map
            .apply(TableIndex::Gpos, ctx.plan, ctx.face, ctx.buffer);
    } else if ctx.plan.apply_kerx {
        aat::kerx::apply(ctx.plan, ctx.face, ctx.buffer);
    }

    if ctx.plan.apply_kern {
        aat::kern::apply(ctx.plan, ctx.face, ctx.buffer);
    } else if ctx.plan.apply_fallback_kern {
        ot_shape_fallback::kern(ctx.plan, ctx.face, ctx.buffer);
    }

    if ctx.plan.zero_marks && ctx.plan.shaper.zero_width_marks == ZeroWidthMarksMode::ByGdefLate {
        zero_mark_widths_by_gdef(ctx.buffer, adjust_offsets_when_zeroing);
    }

    if ctx.plan.apply_trak {
        aat::trak::apply(ctx.plan, ctx.face, ctx.buffer);
    }

    // Finishing off must follow a specific order.
    ot_layout::zero_width_default_ignorables(ctx.buffer);
    if ctx.plan.apply_morx {
        aat::morx::zero_width_deleted_glyphs(ctx.buffer);
    }
    ot_gpos::position_finish_advances(ctx.buffer);
    ot_gpos::position_finish_offsets(ctx.buffer);

    if ctx.plan.fallback_mark_positioning {
        ot_shape_fallback::position_marks(
            ctx.plan,
            ctx.face,
            ctx.buffer,
            adjust_offsets_when_zeroing,
        );
    }
}

fn position(ctx: &mut ShapeContext) {
    ctx.buffer.clear_positions();

    position_default(ctx);
    position_complex(ctx);

    if ctx.buffer.direction.is_backward() {
        ctx.buffer.reverse();
    }
}

/// Propagates cluster-level glyph flags to every glyph of the cluster, and
/// resolves the tatweel/unsafe interaction.
fn propagate_flags(buffer: &mut Buffer) {
    if buffer.scratch_flags & scratch_flags::HAS_GLYPH_FLAGS == 0 {
        return;
    }

    // SAFE_TO_INSERT_TATWEEL loses against UNSAFE_TO_BREAK, and wherever it
    // wins the cluster becomes unsafe for breaking. This interaction can
    // only be resolved here, once both flags have settled.
    let flip_tatweel = buffer
        .flags
        .contains(BufferFlags::PRODUCE_SAFE_TO_INSERT_TATWEEL);
    let clear_concat = !buffer.flags.contains(BufferFlags::PRODUCE_UNSAFE_TO_CONCAT);

    let mut start = 0;
    while start < buffer.len {
        let cluster = buffer.info[start].cluster;
        let mut end = start + 1;
        while end < buffer.len && buffer.info[end].cluster == cluster {
            end += 1;
        }

        let mut mask = 0;
        for info in &buffer.info[start..end] {
            mask |= info.mask & glyph_flag::DEFINED;
        }

        if flip_tatweel {
            if mask & glyph_flag::UNSAFE_TO_BREAK != 0 {
                mask &= !glyph_flag::SAFE_TO_INSERT_TATWEEL;
            }
            if mask & glyph_flag::SAFE_TO_INSERT_TATWEEL != 0 {
                mask |= glyph_flag::UNSAFE_TO_BREAK | glyph_flag::UNSAFE_TO_CONCAT;
            }
        }

        if clear_concat {
            mask &= !glyph_flag::UNSAFE_TO_CONCAT;
        }

        for info in &mut buffer.info[start..end] {
            info.mask = (info.mask & !glyph_flag::DEFINED) | mask;
        }

        start = end;
    }
}

/// Restores a buffer to identity-shaped output after limit exhaustion.
pub(crate) fn reset_to_identity(face: &Face, buffer: &mut Buffer) {
    buffer.successful = true;
    buffer.have_output = false;

    let len = buffer.len;
    for info in &mut buffer.info[..len] {
        info.glyph_id = face
            .nominal_glyph_u32(info.glyph_id)
            .map(|g| g.to_u32())
            .unwrap_or(0);
    }

    buffer.clear_positions();
    let horizontal = buffer.direction.is_horizontal();
    for i in 0..len {
        let glyph = buffer.info[i].glyph_id;
        buffer.pos[i] = GlyphPosition::default();
        if horizontal {
            buffer.pos[i].x_advance = face.glyph_h_advance(glyph);
        } else {
            buffer.pos[i].y_advance = face.glyph_v_advance(glyph);
        }
    }
    if buffer.direction.is_backward() {
        buffer.reverse();
    }
}
