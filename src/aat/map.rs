//! Mapping of OpenType feature requests onto AAT (type, selector) pairs
//! and compilation into per-range chain flags.

use crate::common::{Feature, Tag, FEATURE_GLOBAL_END, FEATURE_GLOBAL_START};
use crate::face::Face;
use crate::Mask;

/// Per-range subtable flags: morx subtables apply only where the active
/// feature set enables them.
#[derive(Copy, Clone)]
pub struct RangeFlags {
    pub flags: Mask,
    pub cluster_first: u32,
    /// Inclusive.
    pub cluster_last: u32,
}

#[derive(Default)]
pub struct AatMap {
    pub chain_flags: Vec<Vec<RangeFlags>>,
}

#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct FeatureInfo {
    pub kind: u16,
    pub setting: u16,
    pub is_exclusive: bool,
}

impl Ord for FeatureInfo {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        // Nonexclusive selectors come in on/off pairs; the low bit does not
        // distinguish features.
        if self.kind != other.kind {
            self.kind.cmp(&other.kind)
        } else if !self.is_exclusive && (self.setting & !1) != (other.setting & !1) {
            self.setting.cmp(&other.setting)
        } else {
            core::cmp::Ordering::Equal
        }
    }
}

impl PartialOrd for FeatureInfo {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Copy, Clone)]
pub struct FeatureRange {
    pub info: FeatureInfo,
    pub start: u32,
    pub end: u32,
}

pub struct AatMapBuilder {
    pub current_features: Vec<FeatureInfo>,
    pub features: Vec<FeatureRange>,
    pub range_first: u32,
    pub range_last: u32,
}

impl Default for AatMapBuilder {
    fn default() -> Self {
        Self {
            current_features: Vec::new(),
            features: Vec::new(),
            range_first: FEATURE_GLOBAL_START,
            range_last: FEATURE_GLOBAL_END,
        }
    }
}

struct FeatureMapping {
    ot_tag: &'static [u8; 4],
    aat_type: u16,
    enable: u16,
    disable: u16,
}

const fn mapping(ot_tag: &'static [u8; 4], aat_type: u16, enable: u16, disable: u16) -> FeatureMapping {
    FeatureMapping {
        ot_tag,
        aat_type,
        enable,
        disable,
    }
}

pub(crate) const FEATURE_TYPE_LETTER_CASE: u16 = 3;
pub(crate) const FEATURE_TYPE_CHARACTER_ALTERNATIVES: u16 = 17;
pub(crate) const FEATURE_TYPE_LOWER_CASE: u16 = 37;
pub(crate) const SELECTOR_SMALL_CAPS: u16 = 3;
pub(crate) const SELECTOR_LOWER_CASE_SMALL_CAPS: u16 = 1;

/// OpenType tag to AAT (type, on-selector, off-selector), sorted by tag.
#[rustfmt::skip]
const FEATURE_MAPPINGS: &[FeatureMapping] = &[
    mapping(b"c2pc", 38, 2, 0),   // upper case -> petite caps
    mapping(b"c2sc", 38, 1, 0),   // upper case -> small caps
    mapping(b"calt", 36, 0, 1),   // contextual alternates
    mapping(b"case", 33, 0, 1),   // case-sensitive layout
    mapping(b"clig", 1, 18, 19),  // ligatures -> contextual
    mapping(b"dlig", 1, 4, 5),    // ligatures -> rare
    mapping(b"frac", 11, 2, 0),   // fractions -> diagonal
    mapping(b"hlig", 1, 20, 21),  // ligatures -> historical
    mapping(b"liga", 1, 2, 3),    // ligatures -> common
    mapping(b"lnum", 21, 1, 2),   // number case -> upper
    mapping(b"onum", 21, 0, 2),   // number case -> lower
    mapping(b"ordn", 10, 3, 0),   // vertical position -> ordinals
    mapping(b"pcap", 37, 2, 0),   // lower case -> petite caps
    mapping(b"pnum", 6, 1, 4),    // number spacing -> proportional
    mapping(b"smcp", 37, 1, 0),   // lower case -> small caps
    mapping(b"ss01", 35, 2, 3),
    mapping(b"ss02", 35, 4, 5),
    mapping(b"ss03", 35, 6, 7),
    mapping(b"ss04", 35, 8, 9),
    mapping(b"ss05", 35, 10, 11),
    mapping(b"ss06", 35, 12, 13),
    mapping(b"ss07", 35, 14, 15),
    mapping(b"ss08", 35, 16, 17),
    mapping(b"ss09", 35, 18, 19),
    mapping(b"ss10", 35, 20, 21),
    mapping(b"ss11", 35, 22, 23),
    mapping(b"ss12", 35, 24, 25),
    mapping(b"ss13", 35, 26, 27),
    mapping(b"ss14", 35, 28, 29),
    mapping(b"ss15", 35, 30, 31),
    mapping(b"ss16", 35, 32, 33),
    mapping(b"ss17", 35, 34, 35),
    mapping(b"ss18", 35, 36, 37),
    mapping(b"ss19", 35, 38, 39),
    mapping(b"ss20", 35, 40, 41),
    mapping(b"subs", 10, 2, 0),   // vertical position -> inferiors
    mapping(b"sups", 10, 1, 0),   // vertical position -> superiors
    mapping(b"titl", 19, 4, 0),   // style options -> titling caps
    mapping(b"tnum", 6, 0, 4),    // number spacing -> monospaced
    mapping(b"vert", 4, 0, 1),    // vertical substitution
    mapping(b"zero", 14, 4, 5),   // typographic extras -> slashed zero
];

fn feat_has_feature(face: &Face, kind: u16) -> Option<bool> {
    let feat = face.aat.feat.as_ref()?;
    let names = feat.names();
    let index = names
        .binary_search_by_key(&kind, |name| name.feature())
        .ok()?;
    let name = &names[index];
    Some(name.n_settings() != 0)
}

fn feat_is_exclusive(face: &Face, kind: u16) -> bool {
    let Some(feat) = face.aat.feat.as_ref() else {
        return false;
    };
    let names = feat.names();
    names
        .binary_search_by_key(&kind, |name| name.feature())
        .ok()
        .map(|index| names[index].feature_flags() & 0x8000 != 0)
        .unwrap_or(false)
}

impl AatMapBuilder {
    pub fn add_feature(&mut self, face: &Face, feature: &Feature) -> Option<()> {
        face.aat.feat.as_ref()?;

        if feature.tag == Tag::new(b"aalt") {
            if feat_has_feature(face, FEATURE_TYPE_CHARACTER_ALTERNATIVES) != Some(true) {
                return Some(());
            }
            self.features.push(FeatureRange {
                start: feature.start,
                end: feature.end,
                info: FeatureInfo {
                    kind: FEATURE_TYPE_CHARACTER_ALTERNATIVES,
                    setting: feature.value as u16,
                    is_exclusive: true,
                },
            });
            return Some(());
        }

        let idx = FEATURE_MAPPINGS
            .binary_search_by(|m| Tag::new(m.ot_tag).cmp(&feature.tag))
            .ok()?;
        let mapping = &FEATURE_MAPPINGS[idx];

        let mut kind = mapping.aat_type;
        if feat_has_feature(face, kind) != Some(true) {
            // Chain flag compilation falls back to the deprecated letter-case
            // small caps, so probe for that possibility here too.
            if mapping.aat_type == FEATURE_TYPE_LOWER_CASE
                && mapping.enable == SELECTOR_LOWER_CASE_SMALL_CAPS
                && feat_has_feature(face, FEATURE_TYPE_LETTER_CASE) == Some(true)
            {
                kind = FEATURE_TYPE_LETTER_CASE;
            } else {
                return Some(());
            }
        }

        self.features.push(FeatureRange {
            start: feature.start,
            end: feature.end,
            info: FeatureInfo {
                kind,
                setting: if feature.value != 0 {
                    mapping.enable
                } else {
                    mapping.disable
                },
                is_exclusive: feat_is_exclusive(face, kind),
            },
        });

        Some(())
    }

    pub fn compile(&mut self, face: &Face, map: &mut AatMap) {
        // Compute the active feature set per cluster range by sweeping the
        // start/end events, and compile chain flags for each range.
        #[derive(Copy, Clone, PartialEq, Eq)]
        struct FeatureEvent {
            index: u32,
            start: bool,
            feature: FeatureInfo,
        }

        let mut events = Vec::new();
        for feature in &self.features {
            if feature.start == feature.end {
                continue;
            }
            events.push(FeatureEvent {
                index: feature.start,
                start: true,
                feature: feature.info,
            });
            events.push(FeatureEvent {
                index: feature.end,
                start: false,
                feature: feature.info,
            });
        }
        events.sort_by(|a, b| a.index.cmp(&b.index).then(a.start.cmp(&b.start)));

        // A strategic final event.
        events.push(FeatureEvent {
            index: u32::MAX,
            start: false,
            feature: FeatureInfo::default(),
        });

        let mut active_features: Vec<FeatureInfo> = Vec::new();
        let mut last_index = 0u32;

        for event in &events {
            if event.index != last_index {
                // Snapshot the active features for the range that ended.
                self.current_features.clone_from(&active_features);
                self.range_first = last_index;
                self.range_last = event.index.wrapping_sub(1);

                if !self.current_features.is_empty() {
                    self.current_features.sort();
                    let mut j = 0;
                    for i in 1..self.current_features.len() {
                        // Selectors of nonexclusive features come in on/off
                        // pairs; mask the low bit when deduplicating.
                        let distinct = self.current_features[i].kind != self.current_features[j].kind
                            || (!self.current_features[i].is_exclusive
                                && (self.current_features[i].setting & !1)
                                    != (self.current_features[j].setting & !1));
                        if distinct {
                            j += 1;
                            self.current_features[j] = self.current_features[i];
                        }
                    }
                    self.current_features.truncate(j + 1);
                }

                super::morx::compile_flags(face, self, map);
                last_index = event.index;
            }

            if event.start {
                active_features.push(event.feature);
            } else if let Some(index) = active_features.iter().position(|f| *f == event.feature) {
                active_features.remove(index);
            }
        }

        for chain_flags in &mut map.chain_flags {
            if let Some(last) = chain_flags.last_mut() {
                last.cluster_last = FEATURE_GLOBAL_END;
            }
        }
    }

    pub(crate) fn has_feature(&self, kind: u16, setting: u16) -> bool {
        self.current_features
            .binary_search_by(|probe| {
                probe
                    .kind
                    .cmp(&kind)
                    .then_with(|| probe.setting.cmp(&setting))
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mappings_are_sorted() {
        for pair in FEATURE_MAPPINGS.windows(2) {
            assert!(Tag::new(pair[0].ot_tag) < Tag::new(pair[1].ot_tag));
        }
    }
}
