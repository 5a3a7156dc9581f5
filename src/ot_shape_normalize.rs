//! Unicode normalization, driven by what the font can actually render.
//!
//! Three rounds over the buffer: decompose (stopping early when the font
//! covers the precomposed character), reorder marks by modified combining
//! class, and recompose diacritics when the shaper prefers composed forms.

use crate::buffer::{scratch_flags, Buffer};
use crate::face::Face;
use crate::ot_shape_plan::ShapePlan;
use crate::unicode;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum NormalizationMode {
    None,
    Decomposed,
    ComposedDiacritics,
    /// Composed diacritics, but never skip decomposition of a supported
    /// character; split matras rely on this.
    ComposedDiacriticsNoShortCircuit,
    Auto,
}

pub struct NormalizeContext<'a, 'b> {
    pub plan: &'a ShapePlan,
    pub face: &'a Face<'b>,
}

fn decompose_unicode(ctx: &NormalizeContext, ab: char) -> Option<(char, char)> {
    match ctx.plan.shaper.decompose {
        Some(func) => func(ctx, ab),
        None => unicode::decompose(ab),
    }
}

fn compose_unicode(ctx: &NormalizeContext, a: char, b: char) -> Option<char> {
    match ctx.plan.shaper.compose {
        Some(func) => func(ctx, a, b),
        None => unicode::compose(a, b),
    }
}

fn set_glyph(buffer: &mut Buffer, c: char) {
    // Stays a codepoint: actual glyph mapping happens after normalization.
    buffer.cur_mut(0).glyph_id = c as u32;
}

fn output_char(buffer: &mut Buffer, c: char) {
    buffer.output_glyph(c as u32);
    let out_len = buffer.out_len();
    let mut scratch = buffer.scratch_flags;
    buffer.out_info_mut()[out_len - 1].init_unicode_props(&mut scratch);
    buffer.scratch_flags = scratch;
}

/// Recursively decomposes `ab`, emitting the longest sequence the font
/// covers. Returns true if anything was emitted.
fn decompose(ctx: &NormalizeContext, buffer: &mut Buffer, shortest: bool, ab: char) -> bool {
    let Some((a, b)) = decompose_unicode(ctx, ab) else {
        return false;
    };

    // The second character must be supported for the decomposition to be
    // renderable at all.
    if ctx.face.nominal_glyph(b).is_none() {
        return false;
    }

    let a_supported = ctx.face.nominal_glyph(a).is_some();

    if shortest && a_supported {
        output_char(buffer, a);
        output_char(buffer, b);
        return true;
    }

    if decompose(ctx, buffer, shortest, a) {
        output_char(buffer, b);
        return true;
    }

    if a_supported {
        output_char(buffer, a);
        output_char(buffer, b);
        return true;
    }

    false
}

fn decompose_current_character(ctx: &NormalizeContext, buffer: &mut Buffer, shortest: bool) {
    let u = buffer.cur(0).as_char();
    let supported = ctx.face.nominal_glyph(u).is_some();

    if shortest && supported {
        buffer.next_glyph();
        return;
    }

    if decompose(ctx, buffer, shortest, u) {
        buffer.skip_glyph();
        return;
    }

    if supported {
        buffer.next_glyph();
        return;
    }

    // NO-BREAK HYPHEN falls back to HYPHEN.
    if u == '\u{2011}' && ctx.face.nominal_glyph('\u{2010}').is_some() {
        set_glyph(buffer, '\u{2010}');
        buffer.next_glyph();
        return;
    }

    // Spaces with no glyph get synthesized advances later.
    if buffer.cur(0).is_unicode_space() {
        let space_type = unicode::space_fallback(u);
        if space_type != unicode::space::NOT_SPACE && ctx.face.nominal_glyph(' ').is_some() {
            buffer.cur_mut(0).set_space_fallback(space_type);
            buffer.scratch_flags |= scratch_flags::HAS_SPACE_FALLBACK;
            set_glyph(buffer, ' ');
            buffer.next_glyph();
            return;
        }
    }

    // Keep the character; it will map to .notdef.
    buffer.next_glyph();
}

fn decompose_cluster(ctx: &NormalizeContext, buffer: &mut Buffer, end: usize, shortest: bool) {
    while buffer.idx < end && buffer.successful {
        decompose_current_character(ctx, buffer, shortest);
    }
}

pub(crate) fn normalize(plan: &ShapePlan, buffer: &mut Buffer, face: &Face) {
    if buffer.is_empty() {
        return;
    }

    let mut mode = plan.shaper.normalization_mode;
    if mode == NormalizationMode::Auto {
        mode = NormalizationMode::ComposedDiacritics;
    }

    if mode == NormalizationMode::None {
        return;
    }

    let ctx = NormalizeContext { plan, face };

    let might_short_circuit = mode != NormalizationMode::Decomposed
        && mode != NormalizationMode::ComposedDiacriticsNoShortCircuit;

    // First round: decompose.
    {
        buffer.clear_output();
        buffer.idx = 0;
        while buffer.idx < buffer.len && buffer.successful {
            // Decompose cluster by cluster: a base plus its mark run.
            let mut end = buffer.idx + 1;
            while end < buffer.len && buffer.info[end].is_unicode_mark() {
                end += 1;
            }
            decompose_cluster(&ctx, buffer, end, might_short_circuit);
        }
        buffer.sync();
    }

    // Second round: reorder marks by modified combining class.
    if buffer.scratch_flags & scratch_flags::HAS_NON_ASCII != 0 {
        let len = buffer.len;
        let mut i = 0;
        while i < len {
            if buffer.info[i].modified_combining_class() == 0 {
                i += 1;
                continue;
            }

            let start = i;
            let mut end = i + 1;
            while end < len && buffer.info[end].modified_combining_class() != 0 {
                end += 1;
            }

            // Stable sort over the mark run.
            if end - start > 1 {
                buffer.sort(start, end, |a, b| {
                    a.modified_combining_class()
                        .cmp(&b.modified_combining_class())
                });
            }

            if let Some(func) = plan.shaper.reorder_marks {
                func(plan, buffer, start, end);
            }

            i = end + 1;
        }
    }

    // Third round: recompose.
    if matches!(
        mode,
        NormalizationMode::ComposedDiacritics | NormalizationMode::ComposedDiacriticsNoShortCircuit
    ) && buffer.scratch_flags & scratch_flags::HAS_NON_ASCII != 0
    {
        // As noted in the Unicode spec: isolated marks at the start of text
        // count as their own starter.
        buffer.clear_output();
        buffer.idx = 0;
        let mut starter = 0;
        buffer.next_glyph();

        while buffer.idx < buffer.len && buffer.successful {
            // Only marks compose onto a preceding starter, and anything in
            // between must have a smaller combining class.
            if buffer.cur(0).is_unicode_mark()
                && (starter == buffer.out_len() - 1
                    || buffer.prev().modified_combining_class()
                        < buffer.cur(0).modified_combining_class())
            {
                let a = char::from_u32(buffer.out_info()[starter].glyph_id).unwrap_or('\u{0}');
                let b = buffer.cur(0).as_char();
                if let Some(composed) = compose_unicode(&ctx, a, b) {
                    if face.nominal_glyph(composed).is_some() {
                        buffer.next_glyph();
                        buffer.merge_out_clusters(starter, buffer.out_len());
                        let new_out_len = buffer.out_len() - 1;
                        buffer.truncate_out(new_out_len);
                        let mut scratch = buffer.scratch_flags;
                        let info = &mut buffer.out_info_mut()[starter];
                        info.glyph_id = composed as u32;
                        info.init_unicode_props(&mut scratch);
                        buffer.scratch_flags = scratch;
                        continue;
                    }
                }
            }

            // Blocked or doesn't compose.
            buffer.next_glyph();
            if buffer.prev().modified_combining_class() == 0 {
                starter = buffer.out_len() - 1;
            }
        }
        buffer.sync();
    }
}

/// Maps every remaining codepoint to a glyph id, resolving variation
/// sequences through the format-14 cmap subtable when present.
pub(crate) fn map_remaining_glyphs(face: &Face, buffer: &mut Buffer) {
    let len = buffer.len;
    let mut i = 0;
    while i < len {
        let u = buffer.info[i].as_char();

        // A variation selector after a base selects a variant glyph.
        if i + 1 < len {
            let vs = buffer.info[i + 1].as_char();
            if matches!(vs as u32, 0xFE00..=0xFE0F | 0xE0100..=0xE01EF) {
                if let Some(variant) = face.variation_glyph(u, vs) {
                    buffer.info[i].glyph_id = variant.to_u32();
                    // The selector becomes an invisible glyph of its own.
                    buffer.info[i + 1].glyph_id = face
                        .nominal_glyph(vs)
                        .map(|g| g.to_u32())
                        .unwrap_or_default();
                    i += 2;
                    continue;
                }
            }
        }

        buffer.info[i].glyph_id = face
            .nominal_glyph(u)
            .map(|g| g.to_u32())
            .unwrap_or_default();
        i += 1;
    }

    buffer.digest = buffer.compute_digest();
}
