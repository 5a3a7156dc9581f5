//! The Indic shaper: base-consonant search, matra and reph reordering,
//! per-script feature masks.

use alloc::boxed::Box;
use core::any::Any;
use core::cmp;
use core::ops::Range;

use crate::buffer::{Buffer, GlyphInfo};
use crate::common::{Script, Tag};
use crate::face::Face;
use crate::ot_apply::WouldApplyContext;
use crate::ot_layout::TableIndex;
use crate::ot_map::{
    FeatureFlags, OtMap, F_GLOBAL_MANUAL_JOINERS, F_MANUAL_JOINERS, F_PER_SYLLABLE,
};
use crate::ot_shape_normalize::{NormalizationMode, NormalizeContext};
use crate::ot_shape_plan::{ShapePlan, ShapePlanner};
use crate::ot_shaper::{ComplexShaper, ZeroWidthMarksMode};
use crate::ot_shaper_indic_machine::{find_syllables_indic, SyllableType};
use crate::ot_shaper_indic_table::{category as cat, get_categories, position as pos};
use crate::unicode::GeneralCategory;
use crate::{script, unicode, Mask};

pub const INDIC_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: Some(collect_features),
    override_features: Some(override_features),
    create_data: Some(|plan| Box::new(IndicShapePlan::new(plan)) as Box<dyn Any + Send + Sync>),
    preprocess_text: None,
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::ComposedDiacriticsNoShortCircuit,
    decompose: Some(decompose),
    compose: Some(compose),
    setup_masks: Some(setup_masks),
    gpos_tag: None,
    reorder_marks: None,
    zero_width_marks: ZeroWidthMarksMode::None,
    fallback_position: false,
};

const fn category_flag(c: u8) -> u32 {
    1 << c
}

// Vowels and placeholders are treated as consonants, which is safe because
// vowels cannot happen inside a consonant syllable; the consonant logic
// then covers vowel syllables too.
const CONSONANT_FLAGS: u32 = category_flag(cat::C)
    | category_flag(cat::CS)
    | category_flag(cat::RA)
    | category_flag(cat::CM)
    | category_flag(cat::V)
    | category_flag(cat::PLACEHOLDER)
    | category_flag(cat::DOTTED_CIRCLE);

const JOINER_FLAGS: u32 = category_flag(cat::ZWJ) | category_flag(cat::ZWNJ);

#[derive(Clone, Copy, PartialEq)]
enum RephPosition {
    AfterMain = pos::AFTER_MAIN as isize,
    BeforeSub = pos::BEFORE_SUB as isize,
    AfterSub = pos::AFTER_SUB as isize,
    BeforePost = pos::BEFORE_POST as isize,
    AfterPost = pos::AFTER_POST as isize,
}

#[derive(Clone, Copy, PartialEq)]
enum RephMode {
    /// Reph formed out of an initial Ra,H sequence.
    Implicit,
    /// Reph formed out of an initial Ra,H,ZWJ sequence.
    Explicit,
    /// An atomically encoded Repha character, needing reordering.
    LogRepha,
}

#[derive(Clone, Copy, PartialEq)]
enum BlwfMode {
    /// Below-forms feature applied to pre-base and post-base.
    PreAndPost,
    /// Below-forms feature applied to post-base only.
    PostOnly,
}

#[derive(Clone, Copy)]
struct IndicConfig {
    script: Option<Script>,
    has_old_spec: bool,
    virama: u32,
    reph_pos: RephPosition,
    reph_mode: RephMode,
    blwf_mode: BlwfMode,
}

impl IndicConfig {
    const fn new(
        script: Option<Script>,
        has_old_spec: bool,
        virama: u32,
        reph_pos: RephPosition,
        reph_mode: RephMode,
        blwf_mode: BlwfMode,
    ) -> Self {
        IndicConfig {
            script,
            has_old_spec,
            virama,
            reph_pos,
            reph_mode,
            blwf_mode,
        }
    }
}

const INDIC_CONFIGS: &[IndicConfig] = &[
    IndicConfig::new(
        None,
        false,
        0,
        RephPosition::BeforePost,
        RephMode::Implicit,
        BlwfMode::PreAndPost,
    ),
    IndicConfig::new(
        Some(script::DEVANAGARI),
        true,
        0x094D,
        RephPosition::BeforePost,
        RephMode::Implicit,
        BlwfMode::PreAndPost,
    ),
    IndicConfig::new(
        Some(script::BENGALI),
        true,
        0x09CD,
        RephPosition::AfterSub,
        RephMode::Implicit,
        BlwfMode::PreAndPost,
    ),
    IndicConfig::new(
        Some(script::GURMUKHI),
        true,
        0x0A4D,
        RephPosition::BeforeSub,
        RephMode::Implicit,
        BlwfMode::PreAndPost,
    ),
    IndicConfig::new(
        Some(script::GUJARATI),
        true,
        0x0ACD,
        RephPosition::BeforePost,
        RephMode::Implicit,
        BlwfMode::PreAndPost,
    ),
    IndicConfig::new(
        Some(script::ORIYA),
        true,
        0x0B4D,
        RephPosition::AfterMain,
        RephMode::Implicit,
        BlwfMode::PreAndPost,
    ),
    IndicConfig::new(
        Some(script::TAMIL),
        true,
        0x0BCD,
        RephPosition::AfterPost,
        RephMode::Implicit,
        BlwfMode::PreAndPost,
    ),
    IndicConfig::new(
        Some(script::TELUGU),
        true,
        0x0C4D,
        RephPosition::AfterPost,
        RephMode::Explicit,
        BlwfMode::PostOnly,
    ),
    IndicConfig::new(
        Some(script::KANNADA),
        true,
        0x0CCD,
        RephPosition::AfterPost,
        RephMode::Implicit,
        BlwfMode::PostOnly,
    ),
    IndicConfig::new(
        Some(script::MALAYALAM),
        true,
        0x0D4D,
        RephPosition::AfterMain,
        RephMode::LogRepha,
        BlwfMode::PreAndPost,
    ),
    IndicConfig::new(
        Some(script::SINHALA),
        false,
        0x0DCA,
        RephPosition::AfterPost,
        RephMode::Explicit,
        BlwfMode::PreAndPost,
    ),
];

const INDIC_FEATURES: &[(&[u8; 4], FeatureFlags)] = &[
    // Basic features, applied in order, one at a time, after the initial
    // reordering, constrained to the syllable.
    (b"nukt", F_GLOBAL_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"akhn", F_GLOBAL_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"rphf", F_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"rkrf", F_GLOBAL_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"pref", F_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"blwf", F_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"abvf", F_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"half", F_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"pstf", F_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"vatu", F_GLOBAL_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"cjct", F_GLOBAL_MANUAL_JOINERS | F_PER_SYLLABLE),
    // Other features, applied all at once after the final reordering.
    (b"init", F_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"pres", F_GLOBAL_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"abvs", F_GLOBAL_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"blws", F_GLOBAL_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"psts", F_GLOBAL_MANUAL_JOINERS | F_PER_SYLLABLE),
    (b"haln", F_GLOBAL_MANUAL_JOINERS | F_PER_SYLLABLE),
];

// Must stay in INDIC_FEATURES order.
mod indic_feature {
    pub const RPHF: usize = 2;
    pub const PREF: usize = 4;
    pub const BLWF: usize = 5;
    pub const ABVF: usize = 6;
    pub const HALF: usize = 7;
    pub const PSTF: usize = 8;
    pub const VATU: usize = 9;
    pub const INIT: usize = 11;
}

impl GlyphInfo {
    pub(crate) fn indic_category(&self) -> u8 {
        self.shaper_category
    }

    pub(crate) fn set_indic_category(&mut self, c: u8) {
        self.shaper_category = c;
    }

    pub(crate) fn indic_position(&self) -> u8 {
        self.shaper_aux
    }

    pub(crate) fn set_indic_position(&mut self, p: u8) {
        self.shaper_aux = p;
    }

    fn is_one_of(&self, flags: u32) -> bool {
        // If it ligated, all bets are off.
        if self.ligated() {
            return false;
        }
        (1 << self.indic_category()) & flags != 0
    }

    fn is_indic_joiner(&self) -> bool {
        self.is_one_of(JOINER_FLAGS)
    }

    pub(crate) fn is_consonant(&self) -> bool {
        self.is_one_of(CONSONANT_FLAGS)
    }

    fn is_halant(&self) -> bool {
        self.is_one_of(category_flag(cat::H))
    }

    fn set_indic_properties(&mut self) {
        let (c, p) = get_categories(self.glyph_id);
        self.set_indic_category(c);
        self.set_indic_position(p);
    }
}

struct WouldSubstituteFeature {
    lookups: Range<usize>,
    zero_context: bool,
}

impl WouldSubstituteFeature {
    fn new(map: &OtMap, feature_tag: Tag, zero_context: bool) -> Self {
        WouldSubstituteFeature {
            lookups: match map.feature_stage(TableIndex::Gsub, feature_tag) {
                Some(stage) => map.stage_lookup_range(TableIndex::Gsub, stage),
                None => 0..0,
            },
            zero_context,
        }
    }

    fn would_substitute(&self, map: &OtMap, face: &Face, glyphs: &[u32]) -> bool {
        let ctx = WouldApplyContext {
            glyphs,
            zero_context: self.zero_context,
        };
        self.lookups.clone().any(|index| {
            let lookup = map.lookups(TableIndex::Gsub)[index];
            crate::ot_lookup::would_apply(face, lookup.index, &ctx)
        })
    }
}

struct IndicShapePlan {
    config: IndicConfig,
    is_old_spec: bool,
    rphf: WouldSubstituteFeature,
    pref: WouldSubstituteFeature,
    blwf: WouldSubstituteFeature,
    pstf: WouldSubstituteFeature,
    vatu: WouldSubstituteFeature,
    mask_array: [Mask; INDIC_FEATURES.len()],
}

impl IndicShapePlan {
    fn new(plan: &ShapePlan) -> Self {
        let script = plan.script;
        let config = *INDIC_CONFIGS
            .iter()
            .skip(1)
            .find(|c| c.script == script)
            .unwrap_or(&INDIC_CONFIGS[0]);

        let is_old_spec = config.has_old_spec
            && plan
                .ot_map
                .chosen_script(TableIndex::Gsub)
                .map_or(true, |tag| tag.to_be_bytes()[3] != b'2');

        // Zero-context matching for the would-substitute probes: testing
        // shows old and new spec want different behaviour per script; only
        // change this as new cases of what the dominant engines do surface.
        let zero_context = is_old_spec && script != Some(script::MALAYALAM);

        let mut mask_array = [0; INDIC_FEATURES.len()];
        for (mask, (tag, flags)) in mask_array.iter_mut().zip(INDIC_FEATURES) {
            *mask = if flags & crate::ot_map::F_GLOBAL != 0 {
                0
            } else {
                plan.ot_map.one_mask(Tag::new(tag))
            };
        }

        IndicShapePlan {
            config,
            is_old_spec,
            rphf: WouldSubstituteFeature::new(&plan.ot_map, Tag::new(b"rphf"), zero_context),
            pref: WouldSubstituteFeature::new(&plan.ot_map, Tag::new(b"pref"), zero_context),
            blwf: WouldSubstituteFeature::new(&plan.ot_map, Tag::new(b"blwf"), zero_context),
            pstf: WouldSubstituteFeature::new(&plan.ot_map, Tag::new(b"pstf"), zero_context),
            vatu: WouldSubstituteFeature::new(&plan.ot_map, Tag::new(b"vatu"), zero_context),
            mask_array,
        }
    }
}

fn collect_features(planner: &mut ShapePlanner) {
    // Do this before any lookups have been applied.
    planner.ot_map.add_gsub_pause(Some(setup_syllables));

    planner
        .ot_map
        .enable_feature(Tag::new(b"locl"), F_PER_SYLLABLE, 1);
    // The Indic specs do not require ccmp, but if a font uses it, it is
    // typically at the beginning.
    planner
        .ot_map
        .enable_feature(Tag::new(b"ccmp"), F_PER_SYLLABLE, 1);

    planner.ot_map.add_gsub_pause(Some(initial_reordering));

    for (tag, flags) in INDIC_FEATURES.iter().take(11) {
        planner.ot_map.add_feature(Tag::new(tag), *flags, 1);
        planner.ot_map.add_gsub_pause(None);
    }

    planner.ot_map.add_gsub_pause(Some(final_reordering));

    for (tag, flags) in INDIC_FEATURES.iter().skip(11) {
        planner.ot_map.add_feature(Tag::new(tag), *flags, 1);
    }
}

fn override_features(planner: &mut ShapePlanner) {
    planner.ot_map.disable_feature(Tag::new(b"liga"));
    planner.ot_map.add_gsub_pause(Some(crate::ot_shaper_syllabic::clear_syllables));
}

fn decompose(_: &NormalizeContext, ab: char) -> Option<(char, char)> {
    // Don't decompose these: the fonts handle the composed forms.
    match ab {
        '\u{0931}' |               // DEVANAGARI LETTER RRA
        '\u{09DC}' |               // BENGALI LETTER RRA
        '\u{09DD}' |               // BENGALI LETTER RHA
        '\u{0B94}' => return None, // TAMIL LETTER AU
        _ => {}
    }

    unicode::decompose(ab)
}

fn compose(_: &NormalizeContext, a: char, b: char) -> Option<char> {
    // Avoid recomposing split matras.
    if GeneralCategory::of(a).is_mark() {
        return None;
    }

    // A composition-exclusion exception that we do want recomposed.
    if a == '\u{09AF}' && b == '\u{09BC}' {
        return Some('\u{09DF}');
    }

    unicode::compose(a, b)
}

fn setup_masks(_: &ShapePlan, _: &Face, buffer: &mut Buffer) {
    // No masks yet: record the character classes and set masks later, in
    // the syllable pause.
    for info in &mut buffer.info {
        info.set_indic_properties();
    }
}

fn setup_syllables(_: &ShapePlan, _: &Face, buffer: &mut Buffer) -> bool {
    find_syllables_indic(buffer);

    let mut start = 0;
    while start < buffer.len {
        let end = buffer.next_syllable(start);
        buffer.unsafe_to_break(Some(start), Some(end));
        start = end;
    }
    false
}

fn initial_reordering(plan: &ShapePlan, face: &Face, buffer: &mut Buffer) -> bool {
    let indic_plan = plan.data::<IndicShapePlan>();

    update_consonant_positions(plan, indic_plan, face, buffer);
    let ret = crate::ot_shaper_syllabic::insert_dotted_circles(
        face,
        buffer,
        SyllableType::BrokenCluster as u8,
        cat::DOTTED_CIRCLE,
        Some(cat::REPHA),
        Some(pos::END),
    );

    let mut start = 0;
    while start < buffer.len {
        let end = buffer.next_syllable(start);
        initial_reordering_syllable(plan, indic_plan, face, start, end, buffer);
        start = end;
    }
    ret
}

fn update_consonant_positions(
    plan: &ShapePlan,
    indic_plan: &IndicShapePlan,
    face: &Face,
    buffer: &mut Buffer,
) {
    if indic_plan.config.virama == 0 {
        return;
    }
    let Some(virama) = face.nominal_glyph_u32(indic_plan.config.virama) else {
        return;
    };
    let virama = virama.to_u32();

    for info in &mut buffer.info {
        if info.indic_position() == pos::BASE_C {
            let consonant = info.glyph_id;
            info.set_indic_position(consonant_position_from_face(
                plan, indic_plan, face, consonant, virama,
            ));
        }
    }
}

fn consonant_position_from_face(
    plan: &ShapePlan,
    indic_plan: &IndicShapePlan,
    face: &Face,
    consonant: u32,
    virama: u32,
) -> u8 {
    // For old-spec the glyph order is Consonant,Virama; for new-spec it is
    // Virama,Consonant. Some fonts copied old-spec lookups into new-spec
    // tables unchanged, and the dominant engines respect them, so both
    // orders are probed.
    if indic_plan
        .blwf
        .would_substitute(&plan.ot_map, face, &[virama, consonant])
        || indic_plan
            .blwf
            .would_substitute(&plan.ot_map, face, &[consonant, virama])
        || indic_plan
            .vatu
            .would_substitute(&plan.ot_map, face, &[virama, consonant])
        || indic_plan
            .vatu
            .would_substitute(&plan.ot_map, face, &[consonant, virama])
    {
        return pos::BELOW_C;
    }

    if indic_plan
        .pstf
        .would_substitute(&plan.ot_map, face, &[virama, consonant])
        || indic_plan
            .pstf
            .would_substitute(&plan.ot_map, face, &[consonant, virama])
    {
        return pos::POST_C;
    }

    if indic_plan
        .pref
        .would_substitute(&plan.ot_map, face, &[virama, consonant])
        || indic_plan
            .pref
            .would_substitute(&plan.ot_map, face, &[consonant, virama])
    {
        return pos::POST_C;
    }

    pos::BASE_C
}

fn initial_reordering_syllable(
    plan: &ShapePlan,
    indic_plan: &IndicShapePlan,
    face: &Face,
    start: usize,
    end: usize,
    buffer: &mut Buffer,
) {
    let syllable_type = match buffer.info[start].syllable & 0x0F {
        0 => SyllableType::ConsonantSyllable,
        1 => SyllableType::VowelSyllable,
        2 => SyllableType::StandaloneCluster,
        3 => SyllableType::SymbolCluster,
        4 => SyllableType::BrokenCluster,
        _ => SyllableType::NonIndicCluster,
    };

    match syllable_type {
        // Vowels were made to look like consonants, so the consonant logic
        // covers them.
        SyllableType::ConsonantSyllable | SyllableType::VowelSyllable => {
            initial_reordering_consonant_syllable(plan, indic_plan, face, start, end, buffer);
        }
        // Dotted circles were already inserted, so these chain to the
        // consonant logic as well.
        SyllableType::BrokenCluster | SyllableType::StandaloneCluster => {
            initial_reordering_consonant_syllable(plan, indic_plan, face, start, end, buffer);
        }
        SyllableType::SymbolCluster | SyllableType::NonIndicCluster => {}
    }
}

fn initial_reordering_consonant_syllable(
    plan: &ShapePlan,
    indic_plan: &IndicShapePlan,
    face: &Face,
    start: usize,
    end: usize,
    buffer: &mut Buffer,
) {
    // For compatibility with legacy Kannada usage, Ra+H+ZWJ must behave
    // like Ra+ZWJ+H.
    if buffer.script == Some(script::KANNADA)
        && start + 3 <= end
        && buffer.info[start].is_one_of(category_flag(cat::RA))
        && buffer.info[start + 1].is_one_of(category_flag(cat::H))
        && buffer.info[start + 2].is_one_of(category_flag(cat::ZWJ))
    {
        buffer.merge_clusters(start + 1, start + 3);
        buffer.info.swap(start + 1, start + 2);
    }

    // 1. Find the base consonant, and the beginning of the reph if any:
    // scan backwards from the end until a consonant is found that has
    // neither a below-base nor a post-base form (post-base only counts
    // once a below-base was seen).
    let mut base = end;
    let mut has_reph = false;

    {
        // If the syllable starts with Ra + Halant and has more than one
        // consonant, Ra is excluded from candidates for the base.
        let mut limit = start;
        if indic_plan.mask_array[indic_feature::RPHF] != 0
            && start + 3 <= end
            && ((indic_plan.config.reph_mode == RephMode::Implicit
                && !buffer.info[start + 2].is_indic_joiner())
                || (indic_plan.config.reph_mode == RephMode::Explicit
                    && buffer.info[start + 2].indic_category() == cat::ZWJ))
        {
            // See if it matches the 'rphf' feature.
            let glyphs = [
                buffer.info[start].glyph_id,
                buffer.info[start + 1].glyph_id,
                if indic_plan.config.reph_mode == RephMode::Explicit {
                    buffer.info[start + 2].glyph_id
                } else {
                    0
                },
            ];
            if indic_plan
                .rphf
                .would_substitute(&plan.ot_map, face, &glyphs[0..2])
                || (indic_plan.config.reph_mode == RephMode::Explicit
                    && indic_plan.rphf.would_substitute(&plan.ot_map, face, &glyphs))
            {
                limit += 2;
                while limit < end && buffer.info[limit].is_indic_joiner() {
                    limit += 1;
                }
                base = start;
                has_reph = true;
            }
        } else if indic_plan.config.reph_mode == RephMode::LogRepha
            && buffer.info[start].indic_category() == cat::REPHA
        {
            limit += 1;
            while limit < end && buffer.info[limit].is_indic_joiner() {
                limit += 1;
            }
            base = start;
            has_reph = true;
        }

        {
            let mut i = end;
            let mut seen_below = false;
            loop {
                i -= 1;
                if buffer.info[i].is_consonant() {
                    if buffer.info[i].indic_position() != pos::BELOW_C
                        && (buffer.info[i].indic_position() != pos::POST_C || seen_below)
                    {
                        base = i;
                        break;
                    }
                    if buffer.info[i].indic_position() == pos::BELOW_C {
                        seen_below = true;
                    }

                    // A pre-base-reordering Ra was tagged POST_C and is
                    // skipped by the checks above already.
                    base = i;
                } else {
                    // A ZWJ after a halant stops the base search and
                    // requests an explicit half form; a ZWJ before a halant
                    // requests a subjoined form instead, so the search
                    // continues (Bengali Ra,H,Ya forming Ya-Phalaa relies
                    // on this).
                    if start < i
                        && buffer.info[i].indic_category() == cat::ZWJ
                        && buffer.info[i - 1].indic_category() == cat::H
                    {
                        break;
                    }
                }

                if i <= limit {
                    break;
                }
            }
        }

        // Only an unforced reph with at least one more consonant counts;
        // otherwise Ra stays the base.
        if has_reph && base == start && limit - base <= 2 {
            has_reph = false;
        }
    }

    // 2. Matras were decomposed and marks reordered by the normalizer, so
    // only positions need assigning now.
    for i in start..base {
        let p = buffer.info[i].indic_position();
        buffer.info[i].set_indic_position(cmp::min(pos::PRE_C, p));
    }

    if base < end {
        buffer.info[base].set_indic_position(pos::BASE_C);
    }

    if has_reph {
        buffer.info[start].set_indic_position(pos::RA_TO_BECOME_REPH);
    }

    // Old-spec tags move the first post-base halant after the last
    // consonant, except in Kannada which only reorders when there is no
    // halant after the last consonant already.
    if indic_plan.is_old_spec {
        let disallow_double_halants = buffer.script == Some(script::KANNADA);
        for i in base + 1..end {
            if buffer.info[i].indic_category() == cat::H {
                let mut j = end - 1;
                while j > i {
                    if buffer.info[j].is_consonant()
                        || (disallow_double_halants && buffer.info[j].indic_category() == cat::H)
                    {
                        break;
                    }
                    j -= 1;
                }

                if buffer.info[j].indic_category() != cat::H && j > i {
                    // Move the halant to after the last consonant.
                    let t = buffer.info[i];
                    for k in 0..j - i {
                        buffer.info[k + i] = buffer.info[k + i + 1];
                    }
                    buffer.info[j] = t;
                }
                break;
            }
        }
    }

    // Attach misc marks to the previous char so they move together.
    {
        let mut last_pos = pos::START;
        for i in start..end {
            let ok = (1u32 << buffer.info[i].indic_category())
                & (category_flag(cat::ZWJ)
                    | category_flag(cat::ZWNJ)
                    | category_flag(cat::N)
                    | category_flag(cat::RS)
                    | category_flag(cat::CM)
                    | category_flag(cat::H))
                != 0;
            if ok {
                buffer.info[i].set_indic_position(last_pos);

                if buffer.info[i].indic_category() == cat::H
                    && buffer.info[i].indic_position() == pos::PRE_M
                {
                    // The halant does not move with a left matra.
                    for j in (start + 1..=i).rev() {
                        if buffer.info[j - 1].indic_position() != pos::PRE_M {
                            let p = buffer.info[j - 1].indic_position();
                            buffer.info[i].set_indic_position(p);
                            break;
                        }
                    }
                }
            } else if buffer.info[i].indic_position() != pos::SMVD {
                last_pos = buffer.info[i].indic_position();
            }
        }
    }

    // Post-base consonants own everything before them back to the last
    // consonant or matra.
    {
        let mut last = base;
        for i in base + 1..end {
            if buffer.info[i].is_consonant() {
                for j in last + 1..i {
                    if buffer.info[j].indic_position() < pos::SMVD {
                        let p = buffer.info[i].indic_position();
                        buffer.info[j].set_indic_position(p);
                    }
                }
                last = i;
            } else if buffer.info[i].indic_category() == cat::M {
                last = i;
            }
        }
    }

    {
        // Use the syllable byte for sort accounting temporarily.
        let syllable = buffer.info[start].syllable;
        for i in start..end {
            buffer.info[i].syllable = (i - start) as u8;
        }

        buffer.info[start..end].sort_by_key(|info| info.indic_position());

        // Find the base again.
        base = end;
        for i in start..end {
            if buffer.info[i].indic_position() == pos::BASE_C {
                base = i;
                break;
            }
        }

        // Things are out of control for post-base positions; in old-spec
        // mode halants move around, so merge everything after base there.
        // Otherwise follow the permutation recorded in the syllable bytes
        // and merge exactly the pieces that moved across base; pre-base
        // cluster issues are handled in the final reordering.
        if indic_plan.is_old_spec || end - start > 127 {
            buffer.merge_clusters(base, end);
        } else {
            for i in base..end {
                if buffer.info[i].syllable != 255 {
                    let mut min = i;
                    let mut max = i;
                    let mut j = start + buffer.info[i].syllable as usize;
                    while j != i {
                        min = cmp::min(min, j);
                        max = cmp::max(max, j);
                        let next = start + buffer.info[j].syllable as usize;
                        buffer.info[j].syllable = 255; // So we don't process j again.
                        j = next;
                    }
                    buffer.merge_clusters(cmp::max(base, min), max + 1);
                }
            }
        }

        for info in &mut buffer.info[start..end] {
            info.syllable = syllable;
        }
    }

    // Set up the feature masks.
    {
        // Reph.
        for info in &mut buffer.info[start..end] {
            if info.indic_position() != pos::RA_TO_BECOME_REPH {
                break;
            }
            info.mask |= indic_plan.mask_array[indic_feature::RPHF];
        }

        // Pre-base.
        let mut mask = indic_plan.mask_array[indic_feature::HALF];
        if !indic_plan.is_old_spec && indic_plan.config.blwf_mode == BlwfMode::PreAndPost {
            mask |= indic_plan.mask_array[indic_feature::BLWF];
        }
        for info in &mut buffer.info[start..base.min(end)] {
            info.mask |= mask;
        }

        // Post-base.
        mask = indic_plan.mask_array[indic_feature::BLWF]
            | indic_plan.mask_array[indic_feature::ABVF]
            | indic_plan.mask_array[indic_feature::PSTF];
        for i in base + 1..end {
            buffer.info[i].mask |= mask;
        }
    }

    if indic_plan.is_old_spec && buffer.script == Some(script::DEVANAGARI) {
        // Old-spec eye-lash Ra: below-base form applies to Ra,H before the
        // base unless a ZWJ requested the eyelash form explicitly.
        for i in start..base.saturating_sub(1) {
            if buffer.info[i].indic_category() == cat::RA
                && buffer.info[i + 1].indic_category() == cat::H
                && (i + 2 == base || buffer.info[i + 2].indic_category() != cat::ZWJ)
            {
                buffer.info[i].mask |= indic_plan.mask_array[indic_feature::BLWF];
                buffer.info[i + 1].mask |= indic_plan.mask_array[indic_feature::BLWF];
            }
        }
    }

    let pref_len = 2;
    if indic_plan.mask_array[indic_feature::PREF] != 0 && base + pref_len < end {
        // Find a Halant,Ra sequence and mark it for pre-base-reordering.
        for i in base + 1..end - pref_len + 1 {
            let glyphs = [buffer.info[i].glyph_id, buffer.info[i + 1].glyph_id];
            if indic_plan.pref.would_substitute(&plan.ot_map, face, &glyphs) {
                buffer.info[i].mask |= indic_plan.mask_array[indic_feature::PREF];
                buffer.info[i + 1].mask |= indic_plan.mask_array[indic_feature::PREF];
                break;
            }
        }
    }

    // Apply ZWJ/ZWNJ effects.
    for i in start + 1..end {
        if buffer.info[i].is_indic_joiner() {
            let non_joiner = buffer.info[i].indic_category() == cat::ZWNJ;
            let mut j = i;

            loop {
                j -= 1;

                // A ZWJ disables CJCT by merely being there (the feature
                // does not skip joiners); a ZWNJ also disables HALF.
                if non_joiner {
                    buffer.info[j].mask &= !indic_plan.mask_array[indic_feature::HALF];
                }

                if j <= start || buffer.info[j].is_consonant() {
                    break;
                }
            }
        }
    }
}

fn final_reordering(plan: &ShapePlan, face: &Face, buffer: &mut Buffer) -> bool {
    if buffer.is_empty() {
        return false;
    }

    let mut start = 0;
    while start < buffer.len {
        let end = buffer.next_syllable(start);
        final_reordering_syllable(plan, face, start, end, buffer);
        start = end;
    }
    false
}

fn final_reordering_syllable(
    plan: &ShapePlan,
    face: &Face,
    start: usize,
    end: usize,
    buffer: &mut Buffer,
) {
    let indic_plan = plan.data::<IndicShapePlan>();

    // Ligation and multiple substitution may have messed up the virama
    // classification; recover the lost halants we are fairly sure about.
    if indic_plan.config.virama != 0 {
        if let Some(virama_glyph) = face.nominal_glyph_u32(indic_plan.config.virama) {
            let virama_glyph = virama_glyph.to_u32();
            for info in &mut buffer.info[start..end] {
                if info.glyph_id == virama_glyph && info.ligated() && info.multiplied() {
                    // This ensures the glyph passes the is_halant test.
                    info.set_indic_category(cat::H);
                    info.clear_ligated_and_multiplied();
                }
            }
        }
    }

    // 4. Final reordering: reposition matras, reph and pre-base-reordering
    // consonants now that the basic shaping forms have been applied.

    let mut try_pref = indic_plan.mask_array[indic_feature::PREF] != 0;

    // Find the base again.
    let mut base = start;
    while base < end {
        if buffer.info[base].indic_position() >= pos::BASE_C {
            if try_pref && base + 1 < end {
                for i in base + 1..end {
                    if (buffer.info[i].mask & indic_plan.mask_array[indic_feature::PREF]) != 0 {
                        if !(buffer.info[i].substituted()
                            && buffer.info[i].ligated_and_didnt_multiply())
                        {
                            // A 'pref' candidate that didn't form: the base
                            // is around here.
                            base = i;
                            while base < end && buffer.info[base].is_halant() {
                                base += 1;
                            }
                            if base < end {
                                buffer.info[base].set_indic_position(pos::BASE_C);
                            }
                            try_pref = false;
                        }
                        break;
                    }
                }
            }

            // For Malayalam, skip over unformed below-base (but NOT
            // post-base) forms.
            if buffer.script == Some(script::MALAYALAM) {
                let mut i = base + 1;
                while i < end {
                    while i < end && buffer.info[i].is_indic_joiner() {
                        i += 1;
                    }
                    if i == end || !buffer.info[i].is_halant() {
                        break;
                    }
                    i += 1; // Skip halant.
                    while i < end && buffer.info[i].is_indic_joiner() {
                        i += 1;
                    }
                    if i < end
                        && buffer.info[i].is_consonant()
                        && buffer.info[i].indic_position() == pos::BELOW_C
                    {
                        base = i;
                        buffer.info[base].set_indic_position(pos::BASE_C);
                    }
                    i += 1;
                }
            }

            if start < base && buffer.info[base].indic_position() > pos::BASE_C {
                base -= 1;
            }
            break;
        }
        base += 1;
    }

    if base == end && start < base && buffer.info[base - 1].is_one_of(category_flag(cat::ZWJ)) {
        base -= 1;
    }

    if base < end {
        while start < base
            && buffer.info[base].is_one_of(category_flag(cat::N) | category_flag(cat::H))
        {
            base -= 1;
        }
    }

    // Reorder matras: move a pre-base matra closer to the base, to just
    // after the last standalone halant that is not followed by ZWJ.
    if start + 1 < end && start < base {
        // If base has moved to the end, position before the last thing.
        let mut new_pos = if base == end { base - 2 } else { base - 1 };

        // Malayalam and Tamil have no half forms, only chillus and ligated
        // explicit viramas; matras go after them.
        if buffer.script != Some(script::MALAYALAM) && buffer.script != Some(script::TAMIL) {
            loop {
                while new_pos > start
                    && !buffer.info[new_pos]
                        .is_one_of(category_flag(cat::M) | category_flag(cat::H))
                {
                    new_pos -= 1;
                }

                // Only proceed if the halant does not belong to the matra
                // itself.
                if buffer.info[new_pos].is_halant()
                    && buffer.info[new_pos].indic_position() != pos::PRE_M
                {
                    if new_pos + 1 < end
                        && buffer.info[new_pos + 1].indic_category() == cat::ZWJ
                    {
                        // A ZWJ after the halant blocks the move.
                        if new_pos > start {
                            new_pos -= 1;
                            continue;
                        }
                    }
                } else {
                    new_pos = start; // No move.
                }
                break;
            }
        }

        if start < new_pos && buffer.info[new_pos].indic_position() != pos::PRE_M {
            // Move any matras.
            for i in (start + 1..=new_pos).rev() {
                if buffer.info[i - 1].indic_position() == pos::PRE_M {
                    let old_pos = i - 1;
                    // Shouldn't actually happen.
                    if old_pos < base && base <= new_pos {
                        base -= 1;
                    }

                    let tmp = buffer.info[old_pos];
                    buffer.info.copy_within(old_pos + 1..new_pos + 1, old_pos);
                    buffer.info[new_pos] = tmp;

                    // Merge clusters *after* the reordering: matra
                    // reordering is special.
                    buffer.merge_clusters(new_pos, cmp::min(end, base + 1));
                    new_pos -= 1;
                }
            }
        } else {
            for i in start..base {
                if buffer.info[i].indic_position() == pos::PRE_M {
                    buffer.merge_clusters(i, cmp::min(end, base + 1));
                    break;
                }
            }
        }
    }

    // Reorder reph: the five-step search for the target position.
    //
    // A character-sequence reph only moves if it actually ligated to the
    // reph form; an atomically encoded repha only moves if it did NOT
    // ligate (a ligature means the font made it work in place).
    if start + 1 < end
        && buffer.info[start].indic_position() == pos::RA_TO_BECOME_REPH
        && (buffer.info[start].indic_category() == cat::REPHA)
            != buffer.info[start].ligated_and_didnt_multiply()
    {
        let mut new_reph_pos;
        let reph_pos = indic_plan.config.reph_pos;

        'search: {
            // 1. If reph should be positioned after post-base consonant
            //    forms, skip to step 5.
            if reph_pos != RephPosition::AfterPost {
                // 2. Target position is after the first explicit halant
                //    between the first post-reph consonant and the last main
                //    consonant; a joiner after that halant moves the
                //    position past it.
                new_reph_pos = start + 1;
                while new_reph_pos < base && !buffer.info[new_reph_pos].is_halant() {
                    new_reph_pos += 1;
                }

                if new_reph_pos < base && buffer.info[new_reph_pos].is_halant() {
                    if new_reph_pos + 1 < base && buffer.info[new_reph_pos + 1].is_indic_joiner() {
                        new_reph_pos += 1;
                    }
                    break 'search;
                }

                // 3. After the main consonant: the first consonant not
                //    ligated with main.
                if reph_pos == RephPosition::AfterMain {
                    new_reph_pos = base;
                    while new_reph_pos + 1 < end
                        && buffer.info[new_reph_pos + 1].indic_position() <= pos::AFTER_MAIN
                    {
                        new_reph_pos += 1;
                    }
                    if new_reph_pos < end {
                        break 'search;
                    }
                }

                // 4. Before the first post-base classified consonant not
                //    ligated with main, or before the first matra, syllable
                //    modifier or vedic sign.
                if reph_pos == RephPosition::AfterSub {
                    new_reph_pos = base;
                    while new_reph_pos + 1 < end
                        && (1u32 << buffer.info[new_reph_pos + 1].indic_position())
                            & (1 << pos::POST_C | 1 << pos::AFTER_POST | 1 << pos::SMVD)
                            == 0
                    {
                        new_reph_pos += 1;
                    }
                    if new_reph_pos < end {
                        break 'search;
                    }
                }
            }

            // 5. Same search as step 2, for the remaining configurations.
            new_reph_pos = start + 1;
            while new_reph_pos < base && !buffer.info[new_reph_pos].is_halant() {
                new_reph_pos += 1;
            }
            if new_reph_pos < base && buffer.info[new_reph_pos].is_halant() {
                if new_reph_pos + 1 < base && buffer.info[new_reph_pos + 1].is_indic_joiner() {
                    new_reph_pos += 1;
                }
                break 'search;
            }

            // 6. Otherwise move reph to the end of the syllable, skipping
            //    trailing vedic marks.
            new_reph_pos = end - 1;
            while new_reph_pos > start && buffer.info[new_reph_pos].indic_position() == pos::SMVD {
                new_reph_pos -= 1;
            }

            // If the reph lands after a Matra,Halant sequence, position it
            // before that halant so it can interact with the matra; a plain
            // Consonant,Halant keeps the reph after it.
            if buffer.info[new_reph_pos].is_halant() {
                for info in &buffer.info[base + 1..new_reph_pos] {
                    if info.indic_category() == cat::M {
                        new_reph_pos -= 1;
                        break;
                    }
                }
            }
        }

        // Move it.
        buffer.merge_clusters(start, new_reph_pos + 1);
        let reph = buffer.info[start];
        buffer.info.copy_within(start + 1..new_reph_pos + 1, start);
        buffer.info[new_reph_pos] = reph;

        if start < base && base <= new_reph_pos {
            base -= 1;
        }
    }

    // Reorder pre-base-reordering consonants: only a glyph actually
    // produced by the 'pref' substitution moves, to just before the base
    // (or after the matra/halant found by the same search as for matras).
    if try_pref && base + 1 < end {
        for i in base + 1..end {
            if (buffer.info[i].mask & indic_plan.mask_array[indic_feature::PREF]) != 0 {
                if buffer.info[i].ligated_and_didnt_multiply() {
                    let mut new_pos = base;
                    // Malayalam and Tamil: position after chillus and
                    // ligated explicit viramas.
                    if buffer.script != Some(script::MALAYALAM)
                        && buffer.script != Some(script::TAMIL)
                    {
                        while new_pos > start
                            && !buffer.info[new_pos - 1]
                                .is_one_of(category_flag(cat::M) | category_flag(cat::H))
                        {
                            new_pos -= 1;
                        }
                    }

                    if new_pos > start && buffer.info[new_pos - 1].is_halant() {
                        // A joiner after the halant moves the position.
                        if new_pos < end && buffer.info[new_pos].is_indic_joiner() {
                            new_pos += 1;
                        }
                    }

                    let old_pos = i;
                    buffer.merge_clusters(new_pos, old_pos + 1);
                    let tmp = buffer.info[old_pos];
                    buffer.info.copy_within(new_pos..old_pos, new_pos + 1);
                    buffer.info[new_pos] = tmp;
                }
                break;
            }
        }
    }

    // Apply 'init' to a left matra at word start.
    if buffer.info[start].indic_position() == pos::PRE_M {
        if start == 0 || {
            let prev_gc = buffer.info[start - 1].general_category();
            !(GeneralCategory::FORMAT.to_u8()..=GeneralCategory::NON_SPACING_MARK.to_u8())
                .contains(&prev_gc.to_u8())
        } {
            buffer.info[start].mask |= indic_plan.mask_array[indic_feature::INIT];
        } else {
            buffer.unsafe_to_break(Some(start - 1), Some(start + 1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_lookup() {
        let config = INDIC_CONFIGS
            .iter()
            .skip(1)
            .find(|c| c.script == Some(script::DEVANAGARI))
            .unwrap();
        assert_eq!(config.virama, 0x094D);
        assert!(config.has_old_spec);
    }

    #[test]
    fn feature_indices_match_tags() {
        assert_eq!(INDIC_FEATURES[indic_feature::RPHF].0, b"rphf");
        assert_eq!(INDIC_FEATURES[indic_feature::PREF].0, b"pref");
        assert_eq!(INDIC_FEATURES[indic_feature::HALF].0, b"half");
        assert_eq!(INDIC_FEATURES[indic_feature::INIT].0, b"init");
        assert_eq!(INDIC_FEATURES[indic_feature::VATU].0, b"vatu");
    }
}
