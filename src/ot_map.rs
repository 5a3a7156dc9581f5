//! The feature map: allocates mask bits for features and flattens them into
//! an ordered, staged lookup list per table.

use read_fonts::tables::gpos::Gpos;
use read_fonts::tables::gsub::Gsub;
use read_fonts::tables::layout::{FeatureList, LangSys, Script, ScriptList};

use crate::buffer::{glyph_flag, Buffer};
use crate::common::{Language, Tag, TagExt};
use crate::face::Face;
use crate::ot_layout::TableIndex;
use crate::ot_shape_plan::ShapePlan;
use crate::Mask;

pub const MAX_BITS: u32 = 8;
pub const MAX_VALUE: u32 = (1 << MAX_BITS) - 1;

const GLOBAL_BIT_SHIFT: u32 = 8 * 4 - 1;
const GLOBAL_BIT_MASK: Mask = 1 << GLOBAL_BIT_SHIFT;

pub type FeatureFlags = u16;

pub const F_NONE: FeatureFlags = 0;
/// Feature applies to all characters; no mask bit is allocated for it.
pub const F_GLOBAL: FeatureFlags = 1 << 0;
/// Has fallback implementation, so include mask bit even if feature not found.
pub const F_HAS_FALLBACK: FeatureFlags = 1 << 1;
/// Don't skip over ZWNJ when matching context.
pub const F_MANUAL_ZWNJ: FeatureFlags = 1 << 2;
/// Don't skip over ZWJ when matching input.
pub const F_MANUAL_ZWJ: FeatureFlags = 1 << 3;
/// If feature not found in LangSys, look for it in the global feature list.
pub const F_GLOBAL_SEARCH: FeatureFlags = 1 << 4;
/// Randomly select a glyph from an AlternateSubstFormat1 subtable.
pub const F_RANDOM: FeatureFlags = 1 << 5;
/// Contain lookup application within syllables.
pub const F_PER_SYLLABLE: FeatureFlags = 1 << 6;

pub const F_MANUAL_JOINERS: FeatureFlags = F_MANUAL_ZWNJ | F_MANUAL_ZWJ;
pub const F_GLOBAL_MANUAL_JOINERS: FeatureFlags = F_GLOBAL | F_MANUAL_JOINERS;
pub const F_GLOBAL_HAS_FALLBACK: FeatureFlags = F_GLOBAL | F_HAS_FALLBACK;

/// Pause callbacks return true when they may have introduced new glyph ids,
/// so the buffer digest is refreshed.
pub type PauseFunc = fn(&ShapePlan, &Face, &mut Buffer) -> bool;

#[derive(Clone, Copy)]
struct FeatureInfo {
    tag: Tag,
    seq: usize,
    max_value: u32,
    flags: FeatureFlags,
    default_value: u32,
    stage: [usize; 2],
}

#[derive(Clone, Copy)]
struct StageInfo {
    index: usize,
    pause_func: Option<PauseFunc>,
}

#[derive(Clone, Copy, Debug)]
pub struct FeatureMap {
    pub tag: Tag,
    index: [Option<u16>; 2],
    stage: [usize; 2],
    pub shift: u32,
    pub mask: Mask,
    /// Mask for value 1, for quick access.
    pub mask1: Mask,
    pub needs_fallback: bool,
    pub auto_zwnj: bool,
    pub auto_zwj: bool,
    pub random: bool,
    pub per_syllable: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct LookupMap {
    pub index: u16,
    pub mask: Mask,
    pub auto_zwnj: bool,
    pub auto_zwj: bool,
    pub random: bool,
    pub per_syllable: bool,
    pub feature_tag: Tag,
}

#[derive(Clone, Copy)]
pub struct StageMap {
    /// The first lookup of the following stage.
    pub last_lookup: usize,
    pub pause_func: Option<PauseFunc>,
}

#[derive(Default)]
pub struct OtMap {
    features: Vec<FeatureMap>,
    lookups: [Vec<LookupMap>; 2],
    stages: [Vec<StageMap>; 2],
    pub(crate) chosen_script: [Option<Tag>; 2],
    pub(crate) found_script: [bool; 2],
    pub(crate) global_mask: Mask,
}

impl OtMap {
    fn find_feature(&self, tag: Tag) -> Option<&FeatureMap> {
        self.features
            .binary_search_by(|f| f.tag.cmp(&tag))
            .ok()
            .map(|i| &self.features[i])
    }

    pub fn global_mask(&self) -> Mask {
        self.global_mask
    }

    pub fn mask(&self, tag: Tag) -> (Mask, u32) {
        self.find_feature(tag).map_or((0, 0), |f| (f.mask, f.shift))
    }

    pub fn one_mask(&self, tag: Tag) -> Mask {
        self.find_feature(tag).map_or(0, |f| f.mask1)
    }

    pub fn needs_fallback(&self, tag: Tag) -> bool {
        self.find_feature(tag).is_some_and(|f| f.needs_fallback)
    }

    pub fn feature_index(&self, table: TableIndex, tag: Tag) -> Option<u16> {
        self.find_feature(tag).and_then(|f| f.index[table as usize])
    }

    pub fn feature_stage(&self, table: TableIndex, tag: Tag) -> Option<usize> {
        self.find_feature(tag).map(|f| f.stage[table as usize])
    }

    pub fn chosen_script(&self, table: TableIndex) -> Option<Tag> {
        self.chosen_script[table as usize]
    }

    pub fn stages(&self, table: TableIndex) -> &[StageMap] {
        &self.stages[table as usize]
    }

    pub fn lookups(&self, table: TableIndex) -> &[LookupMap] {
        &self.lookups[table as usize]
    }

    pub fn stage_lookup_range(&self, table: TableIndex, stage: usize) -> core::ops::Range<usize> {
        let stages = &self.stages[table as usize];
        let lookups = &self.lookups[table as usize];
        let start = if stage == 0 {
            0
        } else {
            stages[stage - 1].last_lookup
        };
        let end = stages
            .get(stage)
            .map(|s| s.last_lookup)
            .unwrap_or(lookups.len());
        start..end
    }

    pub fn stage_lookups(&self, table: TableIndex, stage: usize) -> &[LookupMap] {
        &self.lookups[table as usize][self.stage_lookup_range(table, stage)]
    }
}

/// A GSUB or GPOS table viewed through its script/feature/lookup lists.
pub(crate) enum LayoutTable<'a, 'b> {
    Gsub(&'b Gsub<'a>),
    Gpos(&'b Gpos<'a>),
}

impl<'a, 'b> LayoutTable<'a, 'b> {
    fn script_list(&self) -> Option<ScriptList<'a>> {
        match self {
            Self::Gsub(t) => t.script_list().ok(),
            Self::Gpos(t) => t.script_list().ok(),
        }
    }

    fn feature_list(&self) -> Option<FeatureList<'a>> {
        match self {
            Self::Gsub(t) => t.feature_list().ok(),
            Self::Gpos(t) => t.feature_list().ok(),
        }
    }

    fn feature_variations(
        &self,
    ) -> Option<read_fonts::tables::layout::FeatureVariations<'a>> {
        match self {
            Self::Gsub(t) => t.feature_variations(),
            Self::Gpos(t) => t.feature_variations(),
        }
        .transpose()
        .ok()
        .flatten()
    }

    fn script(&self, index: u16) -> Option<Script<'a>> {
        let list = self.script_list()?;
        let record = list.script_records().get(index as usize)?;
        record.script(list.offset_data()).ok()
    }

    /// Returns (found, index, tag) for the first matching script tag,
    /// falling back to DFLT/dflt/latn.
    fn select_script(&self, tags: &[Tag]) -> Option<(bool, u16, Tag)> {
        let list = self.script_list()?;
        let records = list.script_records();
        let find = |tag: Tag| {
            records
                .iter()
                .position(|r| r.script_tag() == tag)
                .map(|i| i as u16)
        };

        for &tag in tags {
            if let Some(index) = find(tag) {
                return Some((true, index, tag));
            }
        }

        for tag in [
            Tag::default_script(),
            Tag::new(b"dflt"),
            Tag::new(b"latn"),
        ] {
            if let Some(index) = find(tag) {
                return Some((false, index, tag));
            }
        }

        None
    }

    fn langsys_index(&self, script_index: u16, tag: Tag) -> Option<u16> {
        let script = self.script(script_index)?;
        script
            .lang_sys_records()
            .iter()
            .position(|r| r.lang_sys_tag() == tag)
            .map(|i| i as u16)
    }

    fn langsys(&self, script_index: u16, langsys_index: Option<u16>) -> Option<LangSys<'a>> {
        let script = self.script(script_index)?;
        if let Some(index) = langsys_index {
            let record = script.lang_sys_records().get(index as usize)?;
            record.lang_sys(script.offset_data()).ok()
        } else {
            script.default_lang_sys().transpose().ok().flatten()
        }
    }

    fn select_language(&self, script_index: u16, tags: &[Tag]) -> Option<u16> {
        for &tag in tags {
            if let Some(index) = self.langsys_index(script_index, tag) {
                return Some(index);
            }
        }
        self.langsys_index(script_index, Tag::default_language())
    }

    fn feature_tag(&self, index: u16) -> Option<Tag> {
        let list = self.feature_list()?;
        list.feature_records()
            .get(index as usize)
            .map(|r| r.feature_tag())
    }

    fn required_feature(
        &self,
        script_index: u16,
        lang_index: Option<u16>,
    ) -> Option<(u16, Tag)> {
        let sys = self.langsys(script_index, lang_index)?;
        let index = sys.required_feature_index();
        if index == 0xFFFF {
            return None;
        }
        Some((index, self.feature_tag(index)?))
    }

    fn find_language_feature(
        &self,
        script_index: u16,
        lang_index: Option<u16>,
        tag: Tag,
    ) -> Option<u16> {
        let sys = self.langsys(script_index, lang_index)?;
        let list = self.feature_list()?;
        let records = list.feature_records();
        sys.feature_indices()
            .iter()
            .map(|i| i.get())
            .find(|&i| records.get(i as usize).is_some_and(|r| r.feature_tag() == tag))
    }

    fn find_feature(&self, tag: Tag) -> Option<u16> {
        let list = self.feature_list()?;
        list.feature_records()
            .iter()
            .position(|r| r.feature_tag() == tag)
            .map(|i| i as u16)
    }

    /// The lookup indices of a feature, honouring feature variations.
    fn feature_lookups(&self, feature_index: u16, variations_index: Option<u32>) -> Vec<u16> {
        if let Some(variations_index) = variations_index {
            if let Some(feature) = self.feature_substitution(variations_index, feature_index) {
                return feature
                    .lookup_list_indices()
                    .iter()
                    .map(|i| i.get())
                    .collect();
            }
        }

        let Some(list) = self.feature_list() else {
            return Vec::new();
        };
        let Some(record) = list.feature_records().get(feature_index as usize) else {
            return Vec::new();
        };
        match record.feature(list.offset_data()) {
            Ok(feature) => feature.lookup_list_indices().iter().map(|i| i.get()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn feature_substitution(
        &self,
        variations_index: u32,
        feature_index: u16,
    ) -> Option<read_fonts::tables::layout::Feature<'a>> {
        let feature_variations = self.feature_variations()?;
        let record = feature_variations
            .feature_variation_records()
            .get(variations_index as usize)?;
        let subst_table = record
            .feature_table_substitution(feature_variations.offset_data())?
            .ok()?;
        let subst_records = subst_table.substitutions();
        let ix = subst_records
            .binary_search_by_key(&feature_index, |subst| subst.feature_index())
            .ok()?;
        subst_records
            .get(ix)?
            .alternate_feature(subst_table.offset_data())
            .ok()
    }
}

pub struct OtMapBuilder<'a, 'b> {
    face: &'b Face<'a>,
    script_index: [Option<u16>; 2],
    language_index: [Option<u16>; 2],
    chosen_script: [Option<Tag>; 2],
    found_script: [bool; 2],
    current_stage: [usize; 2],
    feature_infos: Vec<FeatureInfo>,
    stages: [Vec<StageInfo>; 2],
}

impl<'a, 'b> OtMapBuilder<'a, 'b> {
    pub fn new(
        face: &'b Face<'a>,
        script: Option<crate::common::Script>,
        language: Option<&Language>,
    ) -> Self {
        // Fetch script/language indices for GSUB/GPOS; features unavailable
        // in either table don't get precious mask bits wasted on them.
        let script_tags = match script {
            Some(script) => {
                let (tags, n) = crate::script::ot_tags(script);
                tags[..n].to_vec()
            }
            None => Vec::new(),
        };
        let language_tags = language_to_tags(language);

        let mut script_index = [None; 2];
        let mut language_index = [None; 2];
        let mut chosen_script = [None; 2];
        let mut found_script = [false; 2];

        for (i, table) in layout_tables(face).into_iter().enumerate() {
            let Some(table) = table else { continue };
            if let Some((found, index, tag)) = table.select_script(&script_tags) {
                script_index[i] = Some(index);
                chosen_script[i] = Some(tag);
                found_script[i] = found;
                language_index[i] = table.select_language(index, &language_tags);
            }
        }

        OtMapBuilder {
            face,
            script_index,
            language_index,
            chosen_script,
            found_script,
            current_stage: [0, 0],
            feature_infos: Vec::new(),
            stages: [Vec::new(), Vec::new()],
        }
    }

    pub fn chosen_script(&self, table: TableIndex) -> Option<Tag> {
        self.chosen_script[table as usize]
    }

    pub fn add_feature(&mut self, tag: Tag, flags: FeatureFlags, value: u32) {
        let info = FeatureInfo {
            tag,
            seq: self.feature_infos.len(),
            max_value: value,
            flags,
            default_value: if flags & F_GLOBAL != 0 { value } else { 0 },
            stage: self.current_stage,
        };
        self.feature_infos.push(info);
    }

    pub fn enable_feature(&mut self, tag: Tag, flags: FeatureFlags, value: u32) {
        self.add_feature(tag, flags | F_GLOBAL, value);
    }

    pub fn disable_feature(&mut self, tag: Tag) {
        self.add_feature(tag, F_GLOBAL, 0);
    }

    fn add_pause(&mut self, table: TableIndex, pause: Option<PauseFunc>) {
        self.stages[table as usize].push(StageInfo {
            index: self.current_stage[table as usize],
            pause_func: pause,
        });
        self.current_stage[table as usize] += 1;
    }

    pub fn add_gsub_pause(&mut self, pause: Option<PauseFunc>) {
        self.add_pause(TableIndex::Gsub, pause);
    }

    pub fn add_gpos_pause(&mut self, pause: Option<PauseFunc>) {
        self.add_pause(TableIndex::Gpos, pause);
    }

    pub fn has_feature(&self, tag: Tag) -> bool {
        for (i, table) in layout_tables(self.face).into_iter().enumerate() {
            let Some(table) = table else { continue };
            let Some(script_index) = self.script_index[i] else {
                continue;
            };
            if table
                .find_language_feature(script_index, self.language_index[i], tag)
                .is_some()
            {
                return true;
            }
        }
        false
    }

    pub fn compile(mut self, key: [Option<u32>; 2]) -> OtMap {
        let mut map = OtMap {
            global_mask: GLOBAL_BIT_MASK,
            chosen_script: self.chosen_script,
            found_script: self.found_script,
            ..OtMap::default()
        };

        let mut required_index: [Option<u16>; 2] = [None; 2];
        let mut required_tag: [Option<Tag>; 2] = [None; 2];
        // The required feature applies in stage 0 unless its tag is known to
        // the shaper, in which case it runs in that tag's stage.
        let mut required_stage = [0usize; 2];

        for (i, table) in layout_tables(self.face).into_iter().enumerate() {
            let Some(table) = table else { continue };
            let Some(script_index) = self.script_index[i] else {
                continue;
            };
            if let Some((index, tag)) = table.required_feature(script_index, self.language_index[i])
            {
                required_index[i] = Some(index);
                required_tag[i] = Some(tag);
            }
        }

        // Sort features and merge duplicates.
        if !self.feature_infos.is_empty() {
            self.feature_infos
                .sort_by(|a, b| a.tag.cmp(&b.tag).then(a.seq.cmp(&b.seq)));
            let mut j = 0;
            for i in 1..self.feature_infos.len() {
                let feat = self.feature_infos[i];
                if feat.tag != self.feature_infos[j].tag {
                    j += 1;
                    self.feature_infos[j] = feat;
                    continue;
                }
                if feat.flags & F_GLOBAL != 0 {
                    self.feature_infos[j].flags |= F_GLOBAL;
                    self.feature_infos[j].max_value = feat.max_value;
                    self.feature_infos[j].default_value = feat.default_value;
                } else {
                    // A non-global duplicate makes the merged feature
                    // non-global.
                    if self.feature_infos[j].flags & F_GLOBAL != 0 {
                        self.feature_infos[j].flags ^= F_GLOBAL;
                    }
                    self.feature_infos[j].max_value =
                        self.feature_infos[j].max_value.max(feat.max_value);
                    // Inherit default_value from the existing entry.
                }
                self.feature_infos[j].flags |= feat.flags & F_HAS_FALLBACK;
                self.feature_infos[j].stage[0] = self.feature_infos[j].stage[0].min(feat.stage[0]);
                self.feature_infos[j].stage[1] = self.feature_infos[j].stage[1].min(feat.stage[1]);
            }
            self.feature_infos.truncate(j + 1);
        }

        // Allocate bits now.
        let mut next_bit = glyph_flag::DEFINED.count_ones() + 1;

        for info in &self.feature_infos {
            let bits_needed = if info.flags & F_GLOBAL != 0 && info.max_value == 1 {
                // Uses the global bit.
                0
            } else {
                MAX_BITS.min(32 - info.max_value.leading_zeros())
            };

            if info.max_value == 0 || next_bit + bits_needed >= GLOBAL_BIT_SHIFT {
                // Feature disabled, or not enough bits.
                continue;
            }

            let mut found = false;
            let mut feature_index = [None; 2];
            for (i, table) in layout_tables(self.face).into_iter().enumerate() {
                let Some(table) = table else { continue };
                if required_tag[i] == Some(info.tag) {
                    required_stage[i] = info.stage[i];
                }
                if let Some(script_index) = self.script_index[i] {
                    feature_index[i] =
                        table.find_language_feature(script_index, self.language_index[i], info.tag);
                }
                found |= feature_index[i].is_some();
            }
            if !found && info.flags & F_GLOBAL_SEARCH != 0 {
                for (i, table) in layout_tables(self.face).into_iter().enumerate() {
                    let Some(table) = table else { continue };
                    if feature_index[i].is_none() {
                        feature_index[i] = table.find_feature(info.tag);
                    }
                    found |= feature_index[i].is_some();
                }
            }
            if !found && info.flags & F_HAS_FALLBACK == 0 {
                continue;
            }

            let (shift, mask) = if info.flags & F_GLOBAL != 0 && info.max_value == 1 {
                (GLOBAL_BIT_SHIFT, GLOBAL_BIT_MASK)
            } else {
                let shift = next_bit;
                let mask = (1u32 << (next_bit + bits_needed)) - (1 << next_bit);
                next_bit += bits_needed;
                map.global_mask |= (info.default_value << shift) & mask;
                (shift, mask)
            };

            map.features.push(FeatureMap {
                tag: info.tag,
                index: feature_index,
                stage: info.stage,
                shift,
                mask,
                mask1: (1 << shift) & mask,
                needs_fallback: !found,
                auto_zwnj: info.flags & F_MANUAL_ZWNJ == 0,
                auto_zwj: info.flags & F_MANUAL_ZWJ == 0,
                random: info.flags & F_RANDOM != 0,
                per_syllable: info.flags & F_PER_SYLLABLE != 0,
            });
        }
        self.feature_infos.clear();

        self.add_gsub_pause(None);
        self.add_gpos_pause(None);

        // Collect lookup indices for features, stage by stage.
        for (table_idx, table) in layout_tables(self.face).into_iter().enumerate() {
            let table_index = if table_idx == 0 {
                TableIndex::Gsub
            } else {
                TableIndex::Gpos
            };

            let mut stage_index = 0;
            let mut last_num_lookups = 0;
            for stage in 0..self.current_stage[table_idx] {
                if let Some(table) = table.as_ref() {
                    if let Some(required) = required_index[table_idx] {
                        if required_stage[table_idx] == stage {
                            add_lookups(
                                &mut map.lookups[table_idx],
                                table,
                                required,
                                key[table_idx],
                                GLOBAL_BIT_MASK,
                                true,
                                true,
                                false,
                                false,
                                Tag::new(b"    "),
                            );
                        }
                    }

                    for feature in &map.features {
                        if feature.stage[table_idx] == stage {
                            if let Some(index) = feature.index[table_idx] {
                                add_lookups(
                                    &mut map.lookups[table_idx],
                                    table,
                                    index,
                                    key[table_idx],
                                    feature.mask,
                                    feature.auto_zwnj,
                                    feature.auto_zwj,
                                    feature.random,
                                    feature.per_syllable,
                                    feature.tag,
                                );
                            }
                        }
                    }
                }

                // Sort lookups of this stage and merge duplicates.
                let lookups = &mut map.lookups[table_idx];
                if last_num_lookups < lookups.len() {
                    lookups[last_num_lookups..].sort_by_key(|l| l.index);

                    let mut j = last_num_lookups;
                    for i in j + 1..lookups.len() {
                        if lookups[i].index != lookups[j].index {
                            j += 1;
                            lookups[j] = lookups[i];
                        } else {
                            lookups[j].mask |= lookups[i].mask;
                            lookups[j].auto_zwnj &= lookups[i].auto_zwnj;
                            lookups[j].auto_zwj &= lookups[i].auto_zwj;
                        }
                    }
                    lookups.truncate(j + 1);
                }

                last_num_lookups = map.lookups[table_idx].len();

                if let Some(stage_info) = self.stages[table_idx].get(stage_index) {
                    if stage_info.index == stage {
                        map.stages[table_idx].push(StageMap {
                            last_lookup: last_num_lookups,
                            pause_func: stage_info.pause_func,
                        });
                        stage_index += 1;
                    }
                }
            }
        }

        map
    }
}

fn layout_tables<'a, 'b>(face: &'b Face<'a>) -> [Option<LayoutTable<'a, 'b>>; 2] {
    [
        face.ot.gsub.as_ref().map(LayoutTable::Gsub),
        face.ot.gpos.as_ref().map(LayoutTable::Gpos),
    ]
}

#[allow(clippy::too_many_arguments)]
fn add_lookups(
    lookups: &mut Vec<LookupMap>,
    table: &LayoutTable,
    feature_index: u16,
    variations_index: Option<u32>,
    mask: Mask,
    auto_zwnj: bool,
    auto_zwj: bool,
    random: bool,
    per_syllable: bool,
    feature_tag: Tag,
) {
    for index in table.feature_lookups(feature_index, variations_index) {
        lookups.push(LookupMap {
            index,
            mask,
            auto_zwnj,
            auto_zwj,
            random,
            per_syllable,
            feature_tag,
        });
    }
}

fn language_to_tags(language: Option<&Language>) -> Vec<Tag> {
    let Some(language) = language else {
        return Vec::new();
    };
    let primary = language.primary();
    if primary.is_empty() || primary.len() > 4 {
        return Vec::new();
    }
    // The fallback mapping: the primary subtag, uppercased and padded.
    let mut bytes = [b' '; 4];
    for (i, b) in primary.bytes().enumerate() {
        bytes[i] = b.to_ascii_uppercase();
    }
    vec![Tag::new(&bytes)]
}

impl OtMap {
    /// Runs the staged lookup list of one table over the buffer.
    pub(crate) fn apply(
        &self,
        table_index: TableIndex,
        plan: &ShapePlan,
        face: &Face,
        buffer: &mut Buffer,
    ) {
        let mut ctx = crate::ot_apply::ApplyContext::new(table_index, face, buffer);

        let mut i = 0;
        for stage in &self.stages[table_index as usize] {
            while i < stage.last_lookup {
                let lookup = &self.lookups[table_index as usize][i];
                i += 1;

                let Some(info) = face.ot.lookup(table_index, lookup.index) else {
                    continue;
                };

                // Only try applying the lookup if its coverage intersects the
                // buffer content digest.
                if !info.digest.may_intersect(&ctx.digest) {
                    continue;
                }

                if ctx.buffer.len > ctx.buffer.max_len {
                    // Pathological: stop applying more lookups.
                    return;
                }

                ctx.set_lookup_mask(lookup.mask);
                ctx.auto_zwj = lookup.auto_zwj;
                ctx.auto_zwnj = lookup.auto_zwnj;
                ctx.random = lookup.random;
                ctx.per_syllable = lookup.per_syllable;

                crate::ot_lookup::apply_string(&mut ctx, lookup.index, &info.clone());
            }

            if let Some(pause) = stage.pause_func {
                if pause(plan, face, ctx.buffer) {
                    // The pause changed the buffer; refresh the digest.
                    ctx.digest = ctx.buffer.compute_digest();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(s: &[u8; 4]) -> Tag {
        Tag::new(s)
    }

    // A builder over a face with no GSUB/GPOS still allocates bits for
    // features with fallback implementations.
    fn builder<'a, 'b>(face: &'b Face<'a>) -> OtMapBuilder<'a, 'b> {
        OtMapBuilder::new(face, Some(crate::script::LATIN), None)
    }

    fn empty_face() -> Face<'static> {
        // An empty font: every table read fails, which the builder treats as
        // "feature not found".
        static EMPTY: &[u8] = &[0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let font = read_fonts::FontRef::new(EMPTY).unwrap();
        Face::new(&font)
    }

    #[test]
    fn bits_do_not_overlap() {
        let face = empty_face();
        let mut b = builder(&face);
        b.add_feature(tag(b"aaaa"), F_HAS_FALLBACK, 1);
        b.add_feature(tag(b"bbbb"), F_HAS_FALLBACK, 3);
        b.add_feature(tag(b"cccc"), F_HAS_FALLBACK, 1);
        let map = b.compile([None, None]);

        let (mask_a, _) = map.mask(tag(b"aaaa"));
        let (mask_b, _) = map.mask(tag(b"bbbb"));
        let (mask_c, _) = map.mask(tag(b"cccc"));
        assert_ne!(mask_a, 0);
        assert_ne!(mask_b, 0);
        assert_ne!(mask_c, 0);
        assert_eq!(mask_a & mask_b, 0);
        assert_eq!(mask_a & mask_c, 0);
        assert_eq!(mask_b & mask_c, 0);
        // Value 3 needs two bits.
        assert_eq!(mask_b.count_ones(), 2);
    }

    #[test]
    fn global_features_share_the_global_bit() {
        let face = empty_face();
        let mut b = builder(&face);
        b.enable_feature(tag(b"liga"), F_HAS_FALLBACK, 1);
        b.enable_feature(tag(b"kern"), F_HAS_FALLBACK, 1);
        let map = b.compile([None, None]);

        let (mask_liga, shift_liga) = map.mask(tag(b"liga"));
        let (mask_kern, _) = map.mask(tag(b"kern"));
        assert_eq!(mask_liga, GLOBAL_BIT_MASK);
        assert_eq!(mask_kern, GLOBAL_BIT_MASK);
        assert_eq!(shift_liga, GLOBAL_BIT_SHIFT);
        assert!(map.global_mask() & GLOBAL_BIT_MASK != 0);
    }

    #[test]
    fn duplicate_features_merge() {
        let face = empty_face();
        let mut b = builder(&face);
        b.add_feature(tag(b"test"), F_HAS_FALLBACK, 1);
        b.enable_feature(tag(b"test"), F_HAS_FALLBACK, 1);
        let map = b.compile([None, None]);

        // One merged entry; the global duplicate won.
        assert_eq!(map.features.len(), 1);
        assert_eq!(map.mask(tag(b"test")).0, GLOBAL_BIT_MASK);
    }

    #[test]
    fn non_global_default_contributes_nothing_to_global_mask() {
        let face = empty_face();
        let mut b = builder(&face);
        b.add_feature(tag(b"aalt"), F_HAS_FALLBACK, 2);
        let map = b.compile([None, None]);
        let (mask, _) = map.mask(tag(b"aalt"));
        assert_eq!(map.global_mask() & mask, 0);
    }

    #[test]
    fn disabled_feature_gets_no_mask() {
        let face = empty_face();
        let mut b = builder(&face);
        b.disable_feature(tag(b"liga"));
        let map = b.compile([None, None]);
        assert_eq!(map.mask(tag(b"liga")).0, 0);
    }

    #[test]
    fn stages_partition_lookups() {
        let face = empty_face();
        let mut b = builder(&face);
        b.add_gsub_pause(None);
        b.add_gsub_pause(None);
        let map = b.compile([None, None]);
        // Two explicit pauses plus the final implicit one.
        assert_eq!(map.stages(TableIndex::Gsub).len(), 3);
        for stage in 0..map.stages(TableIndex::Gsub).len() {
            assert!(map.stage_lookups(TableIndex::Gsub, stage).is_empty());
        }
    }
}
