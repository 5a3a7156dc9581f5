//! The shape plan: everything that depends only on (face, segment
//! properties, user features), compiled once and reused across buffers.

use alloc::boxed::Box;
use core::any::Any;

use smallvec::SmallVec;

use crate::aat;
use crate::common::{Direction, Feature, Language, Script, Tag};
use crate::face::Face;
use crate::ot_layout::TableIndex;
use crate::ot_map::{OtMap, OtMapBuilder, F_GLOBAL, F_GLOBAL_SEARCH, F_HAS_FALLBACK, F_NONE, F_RANDOM};
use crate::ot_shaper::{categorize, ComplexShaper, ZeroWidthMarksMode, DEFAULT_SHAPER, DUMBER_SHAPER};
use crate::Mask;

/// A reusable plan for shaping buffers with fixed segment properties.
pub struct ShapePlan {
    pub(crate) direction: Direction,
    pub(crate) script: Option<Script>,
    pub(crate) language: Option<Language>,
    pub(crate) shaper: &'static ComplexShaper,
    pub(crate) ot_map: OtMap,
    pub(crate) aat_map: aat::map::AatMap,
    pub(crate) data: Option<Box<dyn Any + Send + Sync>>,

    pub(crate) frac_mask: Mask,
    pub(crate) numr_mask: Mask,
    pub(crate) dnom_mask: Mask,
    pub(crate) rtlm_mask: Mask,
    pub(crate) kern_mask: Mask,
    pub(crate) trak_mask: Mask,

    pub(crate) requested_kerning: bool,
    pub(crate) requested_tracking: bool,
    pub(crate) has_frac: bool,
    pub(crate) has_vert: bool,
    pub(crate) has_gpos_mark: bool,
    pub(crate) zero_marks: bool,
    pub(crate) fallback_glyph_classes: bool,
    pub(crate) fallback_mark_positioning: bool,
    pub(crate) adjust_mark_positioning_when_zeroing: bool,

    pub(crate) apply_gpos: bool,
    pub(crate) apply_fallback_kern: bool,
    pub(crate) apply_kern: bool,
    pub(crate) apply_kerx: bool,
    pub(crate) apply_morx: bool,
    pub(crate) apply_trak: bool,

    pub(crate) user_features: SmallVec<[Feature; 4]>,
}

impl ShapePlan {
    /// Compiles a plan. The direction must be set.
    pub fn new(
        face: &Face,
        direction: Direction,
        script: Option<Script>,
        language: Option<&Language>,
        user_features: &[Feature],
    ) -> Self {
        debug_assert_ne!(direction, Direction::Invalid);
        let mut planner = ShapePlanner::new(face, direction, script, language);
        planner.collect_features(user_features);
        planner.compile(user_features)
    }

    pub(crate) fn data<T: 'static>(&self) -> &T {
        self.data.as_ref().unwrap().downcast_ref().unwrap()
    }
}

pub struct ShapePlanner<'a, 'b> {
    pub face: &'b Face<'a>,
    pub direction: Direction,
    pub script: Option<Script>,
    pub language: Option<Language>,
    pub ot_map: OtMapBuilder<'a, 'b>,
    pub aat_map: aat::map::AatMapBuilder,
    pub apply_morx: bool,
    script_zero_marks: bool,
    script_fallback_mark_positioning: bool,
    pub shaper: &'static ComplexShaper,
}

impl<'a, 'b> ShapePlanner<'a, 'b> {
    pub fn new(
        face: &'b Face<'a>,
        direction: Direction,
        script: Option<Script>,
        language: Option<&Language>,
    ) -> Self {
        let ot_map = OtMapBuilder::new(face, script, language);

        // Only use morx for horizontal text, or when there is no GSUB at
        // all; morx rules assume visual order.
        let apply_morx =
            face.aat.morx.is_some() && (direction.is_horizontal() || face.ot.gsub.is_none());

        let mut shaper = categorize(script, direction, ot_map.chosen_script(TableIndex::Gsub));

        let script_zero_marks = shaper.zero_width_marks != ZeroWidthMarksMode::None;
        let script_fallback_mark_positioning = shaper.fallback_position;

        // A font with morx gets no script-specific treatment.
        if apply_morx && !core::ptr::eq(shaper, &DEFAULT_SHAPER) {
            shaper = &DUMBER_SHAPER;
        }

        ShapePlanner {
            face,
            direction,
            script,
            language: language.cloned(),
            ot_map,
            aat_map: aat::map::AatMapBuilder::default(),
            apply_morx,
            script_zero_marks,
            script_fallback_mark_positioning,
            shaper,
        }
    }

    pub fn collect_features(&mut self, user_features: &[Feature]) {
        const COMMON_FEATURES: &[(&[u8; 4], crate::ot_map::FeatureFlags)] = &[
            (b"abvm", F_GLOBAL),
            (b"blwm", F_GLOBAL),
            (b"ccmp", F_GLOBAL),
            (b"locl", F_GLOBAL),
            (b"mark", crate::ot_map::F_GLOBAL_MANUAL_JOINERS),
            (b"mkmk", crate::ot_map::F_GLOBAL_MANUAL_JOINERS),
            (b"rlig", F_GLOBAL),
        ];

        const HORIZONTAL_FEATURES: &[(&[u8; 4], crate::ot_map::FeatureFlags)] = &[
            (b"calt", F_GLOBAL),
            (b"clig", F_GLOBAL),
            (b"curs", F_GLOBAL),
            (b"dist", F_GLOBAL),
            (b"kern", crate::ot_map::F_GLOBAL_HAS_FALLBACK),
            (b"liga", F_GLOBAL),
            (b"rclt", F_GLOBAL),
        ];

        self.ot_map
            .enable_feature(Tag::new(b"rvrn"), F_NONE, 1);
        self.ot_map.add_gsub_pause(None);

        match self.direction {
            Direction::LeftToRight => {
                self.ot_map.enable_feature(Tag::new(b"ltra"), F_NONE, 1);
                self.ot_map.enable_feature(Tag::new(b"ltrm"), F_NONE, 1);
            }
            Direction::RightToLeft => {
                self.ot_map.enable_feature(Tag::new(b"rtla"), F_NONE, 1);
                self.ot_map.add_feature(Tag::new(b"rtlm"), F_NONE, 1);
            }
            _ => {}
        }

        // Automatic fractions.
        self.ot_map.add_feature(Tag::new(b"frac"), F_NONE, 1);
        self.ot_map.add_feature(Tag::new(b"numr"), F_NONE, 1);
        self.ot_map.add_feature(Tag::new(b"dnom"), F_NONE, 1);

        // Random!
        self.ot_map
            .enable_feature(Tag::new(b"rand"), F_RANDOM, crate::ot_map::MAX_VALUE);

        // A dummy trak feature, so the AAT 'trak' table can be disabled with
        // a -trak user feature.
        self.ot_map
            .enable_feature(Tag::new(b"trak"), F_HAS_FALLBACK, 1);

        if let Some(func) = self.shaper.collect_features {
            func(self);
        }

        for &(tag, flags) in COMMON_FEATURES {
            self.ot_map.add_feature(Tag::new(tag), flags, 1);
        }

        if self.direction.is_horizontal() {
            for &(tag, flags) in HORIZONTAL_FEATURES {
                self.ot_map.add_feature(Tag::new(tag), flags, 1);
            }
        } else {
            // 'vert' is wanted no matter which script/langsys it is listed
            // under, fonts are messy about this.
            self.ot_map
                .enable_feature(Tag::new(b"vert"), F_GLOBAL_SEARCH, 1);
        }

        for feature in user_features {
            let flags = if feature.is_global() { F_GLOBAL } else { F_NONE };
            self.ot_map.add_feature(feature.tag, flags, feature.value);
        }

        if self.apply_morx {
            for feature in user_features {
                let _ = self.aat_map.add_feature(self.face, feature);
            }
        }

        if let Some(func) = self.shaper.override_features {
            func(self);
        }
    }

    pub fn compile(mut self, user_features: &[Feature]) -> ShapePlan {
        let key = self.face.ot.feature_variations;
        let ot_map = self.ot_map.compile(key);

        let mut aat_map = aat::map::AatMap::default();
        if self.apply_morx {
            self.aat_map.compile(self.face, &mut aat_map);
        }

        let frac_mask = ot_map.one_mask(Tag::new(b"frac"));
        let numr_mask = ot_map.one_mask(Tag::new(b"numr"));
        let dnom_mask = ot_map.one_mask(Tag::new(b"dnom"));
        let has_frac = frac_mask != 0 || (numr_mask != 0 && dnom_mask != 0);

        let rtlm_mask = ot_map.one_mask(Tag::new(b"rtlm"));
        let has_vert = ot_map.one_mask(Tag::new(b"vert")) != 0;

        let kern_tag = if self.direction.is_horizontal() {
            Tag::new(b"kern")
        } else {
            Tag::new(b"vkrn")
        };
        let (kern_mask, _) = ot_map.mask(kern_tag);
        let requested_kerning = kern_mask != 0;
        let (trak_mask, _) = ot_map.mask(Tag::new(b"trak"));
        let requested_tracking = trak_mask != 0;

        let has_gpos_kern = ot_map.feature_index(TableIndex::Gpos, kern_tag).is_some();
        let disable_gpos = self.shaper.gpos_tag.is_some()
            && self.shaper.gpos_tag != ot_map.chosen_script(TableIndex::Gpos);

        // Decide who provides glyph classes: GDEF or Unicode.
        let fallback_glyph_classes = !self.face.ot.has_glyph_classes();

        // Decide who does substitutions: GSUB, morx, or fallback.
        let apply_morx = self.apply_morx;

        // Decide who does positioning: GPOS, kerx, kern, or fallback.
        let has_kerx = self.face.aat.kerx.is_some();
        let has_gsub = !apply_morx && self.face.ot.gsub.is_some();
        let has_gpos = !disable_gpos && self.face.ot.gpos.is_some();

        let mut apply_gpos = false;
        let mut apply_kerx = false;
        let mut apply_kern = false;

        // Prefer GPOS over kerx when the font has both halves of OpenType.
        if has_kerx && !(has_gsub && has_gpos) {
            apply_kerx = true;
        } else if has_gpos {
            apply_gpos = true;
        }

        if !apply_kerx && (!has_gpos_kern || !apply_gpos) {
            if has_kerx {
                apply_kerx = true;
            } else if crate::aat::kern::has_kerning(self.face) {
                apply_kern = true;
            }
        }

        let apply_fallback_kern = !(apply_gpos || apply_kerx || apply_kern);

        let zero_marks = self.script_zero_marks
            && !apply_kerx
            && (!apply_kern || !crate::aat::kern::has_machine_kerning(self.face));

        let has_gpos_mark = ot_map.one_mask(Tag::new(b"mark")) != 0;

        let mut adjust_mark_positioning_when_zeroing = !apply_gpos
            && !apply_kerx
            && (!apply_kern || !crate::aat::kern::has_cross_kerning(self.face));

        let fallback_mark_positioning =
            adjust_mark_positioning_when_zeroing && self.script_fallback_mark_positioning;

        // With morx, mark adjustment must stay off: color emoji fonts form
        // sequences assuming it is not done.
        if apply_morx {
            adjust_mark_positioning_when_zeroing = false;
        }

        let apply_trak = requested_tracking && self.face.aat.trak.is_some();

        let mut plan = ShapePlan {
            direction: self.direction,
            script: self.script,
            language: self.language.clone(),
            shaper: self.shaper,
            ot_map,
            aat_map,
            data: None,
            frac_mask,
            numr_mask,
            dnom_mask,
            rtlm_mask,
            kern_mask,
            trak_mask,
            requested_kerning,
            requested_tracking,
            has_frac,
            has_vert,
            has_gpos_mark,
            zero_marks,
            fallback_glyph_classes,
            fallback_mark_positioning,
            adjust_mark_positioning_when_zeroing,
            apply_gpos,
            apply_fallback_kern,
            apply_kern,
            apply_kerx,
            apply_morx,
            apply_trak,
            user_features: SmallVec::from_slice(user_features),
        };

        if let Some(func) = self.shaper.create_data {
            plan.data = Some(func(&plan));
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::ShapePlan;

    #[test]
    fn shape_plan_is_send_and_sync() {
        fn ensure_send_and_sync<T: Send + Sync>() {}
        ensure_send_and_sync::<ShapePlan>();
    }
}
