//! The font wrapper the shaper drives.
//!
//! All table parsing is delegated to read-fonts; this type resolves the
//! tables once, precomputes per-lookup acceleration data and carries the
//! normalized variation coordinates.

use read_fonts::tables::cmap::{Cmap, Cmap14, CmapSubtable, MapVariant};
use read_fonts::tables::gdef::Gdef;
use read_fonts::tables::gpos::{AnchorTable, Gpos};
use read_fonts::tables::gsub::Gsub;
use read_fonts::tables::hmtx::Hmtx;
use read_fonts::tables::layout::{ClassDef, CoverageTable, DeviceOrVariationIndex};
use read_fonts::tables::variations::{DeltaSetIndex, ItemVariationStore};
use read_fonts::tables::vmtx::Vmtx;
use read_fonts::types::{F2Dot14, GlyphId, GlyphId16};
use read_fonts::{FontRef, TableProvider};

use crate::aat::AatTables;
use crate::buffer::GlyphPropsFlags;
use crate::common::Variation;
use crate::ot_lookup::{self, LookupInfo};
use crate::set_digest::SetDigest;

/// A face prepared for shaping.
pub struct Face<'a> {
    pub(crate) font: FontRef<'a>,
    pub(crate) units_per_em: u16,
    pub(crate) num_glyphs: u32,
    cmap: Option<Cmap<'a>>,
    cmap14: Option<Cmap14<'a>>,
    hmtx: Option<Hmtx<'a>>,
    vmtx: Option<Vmtx<'a>>,
    hvar: Option<read_fonts::tables::hvar::Hvar<'a>>,
    vvar: Option<read_fonts::tables::vvar::Vvar<'a>>,
    pub(crate) ot: OtTables<'a>,
    pub(crate) aat: AatTables<'a>,
    pub(crate) coords: Vec<F2Dot14>,
    pub(crate) ptem: Option<f32>,
}

impl<'a> Face<'a> {
    /// Wraps a parsed font for shaping with no variations applied.
    pub fn new(font: &FontRef<'a>) -> Self {
        let units_per_em = font
            .head()
            .map(|head| head.units_per_em())
            .unwrap_or(1000);
        let num_glyphs = font
            .maxp()
            .map(|maxp| maxp.num_glyphs() as u32)
            .unwrap_or_default();

        let cmap = font.cmap().ok();
        let cmap14 = cmap.as_ref().and_then(|cmap| {
            cmap.encoding_records()
                .iter()
                .filter_map(|record| record.subtable(cmap.offset_data()).ok())
                .find_map(|subtable| match subtable {
                    CmapSubtable::Format14(cmap14) => Some(cmap14),
                    _ => None,
                })
        });

        let mut face = Face {
            font: font.clone(),
            units_per_em,
            num_glyphs,
            cmap,
            cmap14,
            hmtx: font.hmtx().ok(),
            vmtx: font.vmtx().ok(),
            hvar: font.hvar().ok(),
            vvar: font.vvar().ok(),
            ot: OtTables::new(font),
            aat: AatTables::new(font),
            coords: Vec::new(),
            ptem: None,
        };
        face.ot.feature_variations = [None, None];
        face
    }

    /// Applies a variation instance; coordinates are normalized through
    /// fvar and avar and rounded to 2.14.
    pub fn set_variations(&mut self, variations: &[Variation]) {
        self.coords = crate::ot_var::normalize_coords(&self.font, variations);
        if self.coords.iter().all(|c| *c == F2Dot14::ZERO) {
            self.coords.clear();
        }
        self.ot.update_for_coords(&self.coords);
    }

    /// Point size, used by AAT tracking. `None` disables tracking.
    pub fn set_points_per_em(&mut self, ptem: Option<f32>) {
        self.ptem = ptem;
    }

    /// Sets pre-normalized coordinates directly.
    pub fn set_normalized_coords(&mut self, coords: &[F2Dot14]) {
        self.coords = coords.to_vec();
        if self.coords.iter().all(|c| *c == F2Dot14::ZERO) {
            self.coords.clear();
        }
        self.ot.update_for_coords(&self.coords);
    }

    #[inline]
    pub(crate) fn has_coords(&self) -> bool {
        !self.coords.is_empty()
    }

    pub(crate) fn nominal_glyph(&self, c: char) -> Option<GlyphId> {
        self.cmap.as_ref()?.map_codepoint(c)
    }

    pub(crate) fn nominal_glyph_u32(&self, c: u32) -> Option<GlyphId> {
        self.cmap.as_ref()?.map_codepoint(c)
    }

    pub(crate) fn variation_glyph(&self, c: char, selector: char) -> Option<GlyphId> {
        match self.cmap14.as_ref()?.map_variant(c, selector)? {
            MapVariant::Variant(glyph) => Some(glyph),
            MapVariant::UseDefault => None,
        }
    }

    pub(crate) fn glyph_h_advance(&self, glyph: u32) -> i32 {
        let mut advance = self
            .hmtx
            .as_ref()
            .map(|hmtx| {
                let metrics = hmtx.h_metrics();
                match metrics.get(glyph as usize) {
                    Some(metric) => metric.advance(),
                    None => metrics.last().map(|m| m.advance()).unwrap_or(0),
                }
            })
            .unwrap_or(0) as f32;

        if !self.coords.is_empty() {
            if let Some(hvar) = self.hvar.as_ref() {
                if let Ok(delta) = hvar.advance_width_delta(GlyphId::from(glyph), &self.coords) {
                    advance += delta.to_f64() as f32;
                }
            }
        }

        advance.round() as i32
    }

    pub(crate) fn glyph_v_advance(&self, glyph: u32) -> i32 {
        let mut advance = match self.vmtx.as_ref() {
            Some(vmtx) => {
                let metrics = vmtx.v_metrics();
                match metrics.get(glyph as usize) {
                    Some(metric) => metric.advance(),
                    None => metrics.last().map(|m| m.advance()).unwrap_or(0),
                }
            }
            None => self.units_per_em,
        } as f32;

        if !self.coords.is_empty() {
            if let Some(vvar) = self.vvar.as_ref() {
                if let Ok(delta) = vvar.advance_height_delta(GlyphId::from(glyph), &self.coords) {
                    advance += delta.to_f64() as f32;
                }
            }
        }

        -(advance.round() as i32)
    }
}

/// Per-lookup data computed once per face.
#[derive(Default)]
pub(crate) struct LayoutCache {
    pub lookups: Vec<LookupInfo>,
}

pub(crate) struct OtTables<'a> {
    pub gsub: Option<Gsub<'a>>,
    pub gpos: Option<Gpos<'a>>,
    pub gsub_cache: LayoutCache,
    pub gpos_cache: LayoutCache,
    gdef_classes: Option<ClassDef<'a>>,
    gdef_mark_classes: Option<ClassDef<'a>>,
    gdef_mark_sets: Vec<(SetDigest, Option<CoverageTable<'a>>)>,
    pub var_store: Option<ItemVariationStore<'a>>,
    pub coords: Vec<F2Dot14>,
    pub feature_variations: [Option<u32>; 2],
}

impl<'a> OtTables<'a> {
    fn new(font: &FontRef<'a>) -> Self {
        let gsub = font.gsub().ok();
        let gpos = font.gpos().ok();
        let gsub_cache = LayoutCache {
            lookups: gsub
                .as_ref()
                .map(ot_lookup::collect_gsub_lookups)
                .unwrap_or_default(),
        };
        let gpos_cache = LayoutCache {
            lookups: gpos
                .as_ref()
                .map(ot_lookup::collect_gpos_lookups)
                .unwrap_or_default(),
        };

        let gdef = font.gdef().ok();
        let (gdef_classes, gdef_mark_classes, gdef_mark_sets) = match gdef.as_ref() {
            Some(gdef) => (
                gdef.glyph_class_def().transpose().ok().flatten(),
                gdef.mark_attach_class_def().transpose().ok().flatten(),
                collect_mark_sets(gdef),
            ),
            None => (None, None, Vec::new()),
        };

        OtTables {
            gsub,
            gpos,
            gsub_cache,
            gpos_cache,
            gdef_classes,
            gdef_mark_classes,
            gdef_mark_sets,
            var_store: gdef
                .as_ref()
                .and_then(|gdef| gdef.item_var_store().transpose().ok().flatten()),
            coords: Vec::new(),
            feature_variations: [None, None],
        }
    }

    fn update_for_coords(&mut self, coords: &[F2Dot14]) {
        self.coords = coords.to_vec();
        self.feature_variations = [
            self.gsub
                .as_ref()
                .and_then(|gsub| ot_lookup::feature_variation_index(gsub.feature_variations(), coords)),
            self.gpos
                .as_ref()
                .and_then(|gpos| ot_lookup::feature_variation_index(gpos.feature_variations(), coords)),
        ];
    }

    pub fn has_glyph_classes(&self) -> bool {
        self.gdef_classes.is_some()
    }

    pub fn glyph_class(&self, glyph: u32) -> u16 {
        self.gdef_classes
            .as_ref()
            .map_or(0, |classes| classes.get(GlyphId16::new(glyph as u16)))
    }

    pub fn glyph_mark_attachment_class(&self, glyph: u32) -> u16 {
        self.gdef_mark_classes
            .as_ref()
            .map_or(0, |classes| classes.get(GlyphId16::new(glyph as u16)))
    }

    pub fn glyph_props(&self, glyph: u32) -> u16 {
        match self.glyph_class(glyph) {
            1 => GlyphPropsFlags::BASE_GLYPH.bits(),
            2 => GlyphPropsFlags::LIGATURE.bits(),
            3 => {
                let class = self.glyph_mark_attachment_class(glyph);
                (class << 8) | GlyphPropsFlags::MARK.bits()
            }
            _ => 0,
        }
    }

    pub fn is_mark_glyph(&self, glyph: u32, set_index: u16) -> bool {
        self.gdef_mark_sets
            .get(set_index as usize)
            .is_some_and(|(digest, coverage)| {
                digest.may_have(glyph)
                    && coverage
                        .as_ref()
                        .is_some_and(|coverage| coverage.get(GlyphId::from(glyph)).is_some())
            })
    }

    pub fn lookup(&self, table: crate::ot_layout::TableIndex, index: u16) -> Option<&LookupInfo> {
        let cache = match table {
            crate::ot_layout::TableIndex::Gsub => &self.gsub_cache,
            crate::ot_layout::TableIndex::Gpos => &self.gpos_cache,
        };
        cache.lookups.get(index as usize)
    }

    /// Evaluates a device or variation-index delta against the current
    /// coordinates.
    pub fn device_delta(
        &self,
        device: Option<Result<DeviceOrVariationIndex<'_>, read_fonts::ReadError>>,
    ) -> i32 {
        if self.coords.is_empty() {
            return 0;
        }
        let Some(var_store) = self.var_store.as_ref() else {
            return 0;
        };
        match device {
            Some(Ok(DeviceOrVariationIndex::VariationIndex(index))) => var_store
                .compute_delta(
                    DeltaSetIndex {
                        outer: index.delta_set_outer_index(),
                        inner: index.delta_set_inner_index(),
                    },
                    &self.coords,
                )
                .unwrap_or_default(),
            _ => 0,
        }
    }

    pub fn resolve_anchor(&self, anchor: &AnchorTable) -> (i32, i32) {
        match anchor {
            AnchorTable::Format1(t) => (t.x_coordinate() as i32, t.y_coordinate() as i32),
            AnchorTable::Format2(t) => {
                // The contour-point refinement needs glyph outlines, which
                // live outside the core; use the design coordinates.
                (t.x_coordinate() as i32, t.y_coordinate() as i32)
            }
            AnchorTable::Format3(t) => {
                let mut x = t.x_coordinate() as i32;
                let mut y = t.y_coordinate() as i32;
                x += self.device_delta(t.x_device());
                y += self.device_delta(t.y_device());
                (x, y)
            }
        }
    }
}

fn collect_mark_sets<'a>(gdef: &Gdef<'a>) -> Vec<(SetDigest, Option<CoverageTable<'a>>)> {
    let mut sets = Vec::new();
    if let Some(Ok(mark_sets)) = gdef.mark_glyph_sets_def() {
        for coverage in mark_sets.coverages().iter() {
            match coverage {
                Ok(coverage) => {
                    sets.push((SetDigest::from_coverage(&coverage), Some(coverage)));
                }
                Err(_) => sets.push((SetDigest::new(), None)),
            }
        }
    }
    sets
}
