/*!
A complex-script text shaping engine.

`kashida` converts a sequence of Unicode scalar values, decorated with
script, language and direction, into a positioned sequence of font glyphs.
It drives the OpenType layout tables (GSUB/GPOS/GDEF), the Apple extended
layout tables (morx/kerx/kern/trak/ankr) and the script-specific reordering
passes for Arabic, the Indic scripts, Khmer, Myanmar, Thai, Hangul, Hebrew
and the Universal Shaping Engine.

Font table parsing is delegated to [`read-fonts`]; this crate consumes
tables through its typed accessors and never parses font bytes itself.

```no_run
use kashida::{shape, Face, FontRef, UnicodeBuffer};

let data = std::fs::read("font.ttf").unwrap();
let font = FontRef::new(&data).unwrap();
let face = Face::new(&font);

let mut buffer = UnicodeBuffer::new();
buffer.push_str("كتب");
buffer.guess_segment_properties();

let output = shape(&face, &[], buffer);
for (info, pos) in output.glyph_infos().iter().zip(output.glyph_positions()) {
    println!("gid{} @{},{}+{}", info.glyph_id, pos.x_offset, pos.y_offset, pos.x_advance);
}
```

[`read-fonts`]: https://docs.rs/read-fonts
*/

#![allow(clippy::too_many_arguments)]

extern crate alloc;

mod aat;
mod buffer;
mod common;
mod face;
mod ot_apply;
mod ot_context;
mod ot_gpos;
mod ot_gsub;
mod ot_layout;
mod ot_lookup;
mod ot_map;
mod ot_shape;
mod ot_shape_fallback;
mod ot_shape_normalize;
mod ot_shape_plan;
mod ot_shaper;
mod ot_shaper_arabic;
mod ot_shaper_hangul;
mod ot_shaper_hebrew;
mod ot_shaper_indic;
mod ot_shaper_indic_machine;
mod ot_shaper_indic_table;
mod ot_shaper_khmer;
mod ot_shaper_myanmar;
mod ot_shaper_syllabic;
mod ot_shaper_thai;
mod ot_shaper_use;
mod ot_shaper_use_table;
mod ot_var;
pub mod script;
mod set_digest;
mod unicode;

pub use read_fonts::FontRef;

pub use crate::buffer::{
    glyph_flag, BufferClusterLevel, BufferFlags, GlyphBuffer, GlyphInfo, GlyphPosition,
    UnicodeBuffer,
};
pub use crate::common::{
    Direction, Feature, Language, Script, Tag, Variation, FEATURE_GLOBAL_END, FEATURE_GLOBAL_START,
};
pub use crate::face::Face;
pub use crate::ot_shape_plan::ShapePlan;

/// A per-glyph feature-selection bitset.
pub type Mask = u32;

/// Shapes the buffer, compiling a plan for its segment properties.
///
/// Direction must be set (use [`UnicodeBuffer::guess_segment_properties`]
/// when in doubt). The same input always produces the same output.
pub fn shape(face: &Face, features: &[Feature], mut buffer: UnicodeBuffer) -> GlyphBuffer {
    buffer.guess_segment_properties();
    let plan = ShapePlan::new(
        face,
        buffer.0.direction,
        buffer.0.script,
        buffer.0.language.as_ref(),
        features,
    );
    shape_with_plan(face, &plan, buffer)
}

/// Shapes the buffer with a pre-compiled plan.
///
/// The plan must have been built for the same face and the same segment
/// properties the buffer carries; this is debug-asserted.
pub fn shape_with_plan(face: &Face, plan: &ShapePlan, buffer: UnicodeBuffer) -> GlyphBuffer {
    let mut buffer = buffer.0;
    debug_assert_eq!(buffer.direction, plan.direction);

    if !buffer.is_empty() {
        crate::ot_shape::shape_internal(plan, face, &mut buffer);

        if !buffer.successful {
            // Limit exhaustion: throw away partial work and produce the
            // identity mapping instead.
            crate::ot_shape::reset_to_identity(face, &mut buffer);
        }
    } else {
        buffer.clear_positions();
    }

    GlyphBuffer(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_font() -> &'static [u8] {
        // An sfnt header with no tables.
        &[0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
    }

    #[test]
    fn empty_buffer_empty_output() {
        let font = FontRef::new(empty_font()).unwrap();
        let face = Face::new(&font);
        let output = shape(&face, &[], UnicodeBuffer::new());
        assert!(output.is_empty());
    }

    #[test]
    fn shaping_is_deterministic() {
        let font = FontRef::new(empty_font()).unwrap();
        let face = Face::new(&font);

        let run = || {
            let mut buffer = UnicodeBuffer::new();
            buffer.push_str("कि");
            shape(&face, &[], buffer).serialize()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn clusters_are_monotone() {
        let font = FontRef::new(empty_font()).unwrap();
        let face = Face::new(&font);

        let mut buffer = UnicodeBuffer::new();
        buffer.push_str("لا كتب");
        let output = shape(&face, &[], buffer);

        // RTL output: clusters must be monotone after the reversal, which
        // for right-to-left means non-increasing left to right.
        let clusters: Vec<_> = output.glyph_infos().iter().map(|i| i.cluster).collect();
        let mut sorted = clusters.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(clusters, sorted);
    }

    #[test]
    fn unsafe_to_break_implies_unsafe_to_concat() {
        let font = FontRef::new(empty_font()).unwrap();
        let face = Face::new(&font);

        let mut buffer = UnicodeBuffer::new();
        buffer.push_str("कि कि");
        buffer.set_flags(BufferFlags::PRODUCE_UNSAFE_TO_CONCAT);
        let output = shape(&face, &[], buffer);

        for info in output.glyph_infos() {
            let flags = info.glyph_flags();
            if flags & glyph_flag::UNSAFE_TO_BREAK != 0 {
                assert!(flags & glyph_flag::UNSAFE_TO_CONCAT != 0);
            }
        }
    }
}
