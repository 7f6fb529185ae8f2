//! Encoding of parsed lines into dictionary-coded records.
//!
//! This is the only place that writes to the dictionaries. A line whose
//! month falls outside the [`TimeIndex`] is rejected before any dictionary
//! is consulted, so skipped lines never allocate codes.

use std::borrow::Cow;

use crate::common::{Category, CREATED_BY_UNSET, QUEST_TYPE_UNSET, SeqIdx, TRACKED_TAGS};
use crate::interner::{CodeSpaceExhausted, Dictionaries};
use crate::parser::RawChangeset;
use crate::position::{GridPos, quantize};
use crate::rules::{NormalizationRules, ReplaceRuleSet};
use crate::time_index::TimeIndex;

/// Software identifier whose changesets carry a quest type.
pub const STREET_COMPLETE: &str = "StreetComplete";
pub const QUEST_TYPE_TAG: &str = "StreetComplete:quest_type";

/// Source entries are cut to this many characters after normalization.
pub const MAX_SOURCE_CHARS: usize = 120;

/// Quest types that were renamed upstream, mapped to their current name.
const QUEST_TYPE_RENAMES: [(&str, &str); 4] = [
    ("AddAccessibleForPedestrians", "AddProhibitedForPedestrians"),
    ("AddWheelChairAccessPublicTransport", "AddWheelchairAccessPublicTransport"),
    ("AddWheelChairAccessToilets", "AddWheelchairAccessToilets"),
    ("AddSidewalks", "AddSidewalk"),
];

/// Tag-derived booleans stored in the general table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagFlags {
    /// `bot=yes`
    pub bot: bool,
    pub comment: bool,
    pub locale: bool,
    pub host: bool,
    pub changesets_count: bool,
    pub version: bool,
}

/// One encoded changeset: a general-table row plus its relation values.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangesetRecord {
    pub seq: SeqIdx,
    pub year: u8,
    pub month: u16,
    pub edits: u32,
    pub user: u32,
    pub pos: GridPos,
    pub created_by: u32,
    pub quest_type: u16,
    pub flags: TagFlags,
    pub imagery: Vec<u32>,
    pub hashtags: Vec<u32>,
    pub sources: Vec<u32>,
    pub all_tags: Vec<u32>,
}

/// Turns [`RawChangeset`]s into [`ChangesetRecord`]s.
pub struct RecordEncoder<'r> {
    time_index: &'r TimeIndex,
    rules: &'r NormalizationRules,
}

impl<'r> RecordEncoder<'r> {
    pub fn new(time_index: &'r TimeIndex, rules: &'r NormalizationRules) -> Self {
        Self { time_index, rules }
    }

    /// Encode `raw`, or return `Ok(None)` when its month is outside the
    /// time index (structural skip; no dictionary is touched).
    pub fn encode(
        &self,
        seq: SeqIdx,
        raw: &RawChangeset<'_>,
        dicts: &mut Dictionaries,
    ) -> Result<Option<ChangesetRecord>, CodeSpaceExhausted> {
        let Some(month) = raw.month_key().and_then(|k| self.time_index.month_code(k)) else {
            return Ok(None);
        };
        let Some(year) = raw.year_key().and_then(|k| self.time_index.year_code(k)) else {
            return Ok(None);
        };

        let tags = &raw.tags;
        let user = dicts.get_mut(Category::UserName).add(raw.user);
        let (created_by, quest_type) = self.created_by_and_quest_type(raw, dicts)?;

        let imagery = match tags.get("imagery_used") {
            Some(value) => {
                let entries = normalized_entries(value, &self.rules.imagery, None);
                dicts.get_mut(Category::Imagery).add_many(entries)
            }
            None => Vec::new(),
        };
        let sources = match tags.get("source") {
            Some(value) => {
                let entries =
                    normalized_entries(value, &self.rules.source, Some(MAX_SOURCE_CHARS));
                dicts.get_mut(Category::Source).add_many(entries)
            }
            None => Vec::new(),
        };
        let hashtags = match tags.get("hashtags") {
            Some(value) => {
                let lower = value.to_lowercase();
                let entries = lower.split(';').map(str::trim).filter(|e| !e.is_empty());
                dicts.get_mut(Category::Hashtag).add_many(entries)
            }
            None => Vec::new(),
        };
        // Filtered on the namespace, not the full key: `source:date` and
        // `StreetComplete:quest_type` contribute nothing here.
        let all_tags = dicts.get_mut(Category::AllTags).add_many(
            tags.keys()
                .map(|key| key.split(':').next().unwrap_or(*key))
                .filter(|namespace| !TRACKED_TAGS.contains(namespace)),
        );

        Ok(Some(ChangesetRecord {
            seq,
            year,
            month,
            edits: raw.edits,
            user,
            pos: quantize(raw.bbox.as_ref()),
            created_by,
            quest_type,
            flags: TagFlags {
                bot: tags.get("bot").is_some_and(|v| *v == "yes"),
                comment: tags.contains_key("comment"),
                locale: tags.contains_key("locale"),
                host: tags.contains_key("host"),
                changesets_count: tags.contains_key("changesets_count"),
                version: tags.contains_key("version"),
            },
            imagery,
            hashtags,
            sources,
            all_tags,
        }))
    }

    fn created_by_and_quest_type(
        &self,
        raw: &RawChangeset<'_>,
        dicts: &mut Dictionaries,
    ) -> Result<(u32, u16), CodeSpaceExhausted> {
        let decoded = match raw.tags.get("created_by") {
            Some(value) => decode_escapes(value),
            None => return Ok((CREATED_BY_UNSET, QUEST_TYPE_UNSET)),
        };
        let trimmed = decoded.trim();
        if trimmed.is_empty() {
            return Ok((CREATED_BY_UNSET, QUEST_TYPE_UNSET));
        }

        let name = self.rules.created_by.normalize(trimmed);
        let created_by = dicts.get_mut(Category::CreatedBy).add(name);
        if created_by == CREATED_BY_UNSET {
            return Err(CodeSpaceExhausted {
                category: Category::CreatedBy.name(),
                code: created_by,
                limit: CREATED_BY_UNSET as u64,
            });
        }

        if name != STREET_COMPLETE {
            return Ok((created_by, QUEST_TYPE_UNSET));
        }
        let Some(quest) = raw.tags.get(QUEST_TYPE_TAG) else {
            return Ok((created_by, QUEST_TYPE_UNSET));
        };
        let quest = rename_quest_type(quest);
        let code = dicts.get_mut(Category::QuestType).add(quest);
        match u16::try_from(code) {
            Ok(code) if code != QUEST_TYPE_UNSET => Ok((created_by, code)),
            _ => Err(CodeSpaceExhausted {
                category: Category::QuestType.name(),
                code,
                limit: QUEST_TYPE_UNSET as u64,
            }),
        }
    }
}

/// Current name of a possibly renamed quest type.
pub fn rename_quest_type(quest: &str) -> &str {
    QUEST_TYPE_RENAMES
        .iter()
        .find(|(old, _)| *old == quest)
        .map_or(quest, |(_, new)| *new)
}

/// Undo the upstream escapes for spaces and commas.
pub fn decode_escapes(value: &str) -> Cow<'_, str> {
    if value.contains('%') {
        Cow::Owned(value.replace("%20%", " ").replace("%2c%", ","))
    } else {
        Cow::Borrowed(value)
    }
}

/// Decode `value`, split it on `;`, trim and drop empty entries, normalize
/// each entry and optionally cut it to `max_chars` characters.
pub fn normalized_entries(
    value: &str,
    rules: &ReplaceRuleSet,
    max_chars: Option<usize>,
) -> Vec<String> {
    decode_escapes(value)
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let name = rules.normalize(entry);
            match max_chars {
                Some(limit) => truncate_chars(name, limit).to_string(),
                None => name.to_string(),
            }
        })
        .collect()
}

pub(crate) fn truncate_chars(value: &str, limit: usize) -> &str {
    match value.char_indices().nth(limit) {
        Some((end, _)) => &value[..end],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;

    const CREATED_BY_RULES: &str = r#"{
        "JOSM": { "starts_with": ["JOSM/"] },
        "StreetComplete": { "aliases": ["StreetComplete_ee"], "starts_with": ["StreetComplete "] }
    }"#;
    const IMAGERY_RULES: &str = r#"{
        "Bing aerial imagery": { "aliases": ["Bing", "bing"], "starts_with": ["Bing aerial"] },
        "Esri World Imagery": { "ends_with": ["World Imagery"] }
    }"#;

    fn rules() -> NormalizationRules {
        let imagery = ReplaceRuleSet::from_json_str(IMAGERY_RULES).unwrap();
        NormalizationRules {
            created_by: ReplaceRuleSet::from_json_str(CREATED_BY_RULES).unwrap(),
            source: imagery.clone(),
            imagery,
        }
    }

    fn line(month: &str, tags: &str) -> String {
        format!("c1 k4 s{month}-03T12:00:00Z e d0 i1 umapper x1 y2 X3 Y4 T{tags}")
    }

    fn encode(text: &str, dicts: &mut Dictionaries) -> Option<ChangesetRecord> {
        let index = TimeIndex::until(2024, 1);
        let rules = rules();
        let encoder = RecordEncoder::new(&index, &rules);
        let raw = parse_line(text).unwrap();
        encoder.encode(SeqIdx(9), &raw, dicts).unwrap()
    }

    #[test]
    fn test_street_complete_quest_type_is_renamed() {
        let mut dicts = Dictionaries::new();
        let text = line(
            "2020-05",
            "created_by=StreetComplete%20%48.0,StreetComplete:quest_type=AddSidewalks",
        );
        let record = encode(&text, &mut dicts).unwrap();
        assert_eq!(record.created_by, 0);
        assert_eq!(record.quest_type, 0);
        assert_eq!(dicts.get(Category::CreatedBy).value(0), Some("StreetComplete"));
        assert_eq!(dicts.get(Category::QuestType).value(0), Some("AddSidewalk"));
        assert!(record.all_tags.is_empty(), "StreetComplete:* keys are tracked");
    }

    #[test]
    fn test_quest_type_only_for_street_complete() {
        let mut dicts = Dictionaries::new();
        let text = line("2020-05", "created_by=JOSM/1.5,StreetComplete:quest_type=AddRoadName");
        let record = encode(&text, &mut dicts).unwrap();
        assert_eq!(record.quest_type, QUEST_TYPE_UNSET);
        assert!(dicts.get(Category::QuestType).is_empty());

        let text = line("2020-05", "created_by=StreetComplete");
        let record = encode(&text, &mut dicts).unwrap();
        assert_eq!(record.created_by, 1);
        assert_eq!(record.quest_type, QUEST_TYPE_UNSET);
    }

    #[test]
    fn test_missing_or_blank_created_by_is_unset() {
        let mut dicts = Dictionaries::new();
        for tags in ["", "created_by=", "created_by=%20%"] {
            let record = encode(&line("2020-05", tags), &mut dicts).unwrap();
            assert_eq!(record.created_by, CREATED_BY_UNSET);
            assert_eq!(record.quest_type, QUEST_TYPE_UNSET);
        }
        assert!(dicts.get(Category::CreatedBy).is_empty());
    }

    #[test]
    fn test_imagery_and_source_entries() {
        let mut dicts = Dictionaries::new();
        let long = "s".repeat(150);
        let text = line(
            "2019-11",
            &format!("imagery_used=Bing;%20%Esri%20%World%20%Imagery;;Custom,source={long};bing"),
        );
        let record = encode(&text, &mut dicts).unwrap();

        let imagery = dicts.get(Category::Imagery);
        let names: Vec<&str> =
            record.imagery.iter().filter_map(|&c| imagery.value(c)).collect();
        assert_eq!(names, vec!["Bing aerial imagery", "Esri World Imagery", "Custom"]);

        let source = dicts.get(Category::Source);
        let names: Vec<&str> = record.sources.iter().filter_map(|&c| source.value(c)).collect();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].chars().count(), MAX_SOURCE_CHARS);
        assert_eq!(names[1], "Bing aerial imagery");
    }

    #[test]
    fn test_hashtags_and_generic_tags() {
        let mut dicts = Dictionaries::new();
        let text = line(
            "2021-02",
            "hashtags=#MapLesotho;#hotosm;,name:en=x,name:de=y,highway=primary,comment=hi",
        );
        let record = encode(&text, &mut dicts).unwrap();

        let hashtag = dicts.get(Category::Hashtag);
        let names: Vec<&str> = record.hashtags.iter().filter_map(|&c| hashtag.value(c)).collect();
        assert_eq!(names, vec!["#maplesotho", "#hotosm"]);

        // One occurrence per key, duplicates kept.
        assert_eq!(record.all_tags, vec![0, 0, 1]);
        assert_eq!(dicts.get(Category::AllTags).value(1), Some("highway"));
        assert!(record.flags.comment);
    }

    #[test]
    fn test_flags() {
        let mut dicts = Dictionaries::new();
        let text = line(
            "2021-02",
            "bot=yes,locale=de,host=https://www.openstreetmap.org,changesets_count=12,version=1.0",
        );
        let record = encode(&text, &mut dicts).unwrap();
        assert_eq!(
            record.flags,
            TagFlags {
                bot: true,
                comment: false,
                locale: true,
                host: true,
                changesets_count: true,
                version: true,
            }
        );

        let record = encode(&line("2021-02", "bot=no"), &mut dicts).unwrap();
        assert!(!record.flags.bot);
    }

    #[test]
    fn test_out_of_range_month_touches_nothing() {
        let mut dicts = Dictionaries::new();
        let text = line("1999-01", "created_by=JOSM/1.5,hashtags=#a,name=x");
        assert_eq!(encode(&text, &mut dicts), None);
        assert!(dicts.sizes().iter().all(|(_, n)| *n == 0));

        // The month still in progress has no code either.
        assert_eq!(encode(&line("2024-01", ""), &mut dicts), None);
    }

    #[test]
    fn test_record_fields() {
        let mut dicts = Dictionaries::new();
        let record = encode(&line("2005-04", ""), &mut dicts).unwrap();
        assert_eq!(record.seq, SeqIdx(9));
        assert_eq!((record.year, record.month), (0, 0));
        assert_eq!(record.edits, 4);
        assert_eq!(record.user, 0);
        // mid (2, 3) → (round(-178), round(93))
        assert_eq!(record.pos, GridPos { x: 182, y: 93 });
    }

    #[test]
    fn test_truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("äöü", 2), "äö");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }

    #[test]
    fn test_quest_type_code_space_is_exhausted() {
        let mut dicts = Dictionaries::new();
        let quests = dicts.get_mut(Category::QuestType);
        for i in 0..u32::from(QUEST_TYPE_UNSET) - 1 {
            quests.add(&format!("Q{i}"));
        }
        let index = TimeIndex::until(2024, 1);
        let rules = rules();
        let encoder = RecordEncoder::new(&index, &rules);
        let quest_line = |quest: &str| {
            line(
                "2020-05",
                &format!("created_by=StreetComplete,StreetComplete:quest_type={quest}"),
            )
        };

        // The last code below the unset sentinel is still usable.
        let text = quest_line("Q65534");
        let record = encoder
            .encode(SeqIdx(0), &parse_line(&text).unwrap(), &mut dicts)
            .unwrap()
            .unwrap();
        assert_eq!(record.quest_type, 65534);

        let text = quest_line("Q65535");
        let err = encoder
            .encode(SeqIdx(1), &parse_line(&text).unwrap(), &mut dicts)
            .unwrap_err();
        assert_eq!(err.category, "streetcomplete_quest_type");
        assert_eq!(err.code, 65535);
        assert_eq!(err.limit, QUEST_TYPE_UNSET as u64);
    }
}
