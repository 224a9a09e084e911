//! Curation queue ranking
//!
//! Each item collects a set of boolean inclusion reasons. Items with at least
//! one reason enter the queue unless they were curated recently enough to be
//! inside the reminder cool-down. The queue is ordered by a composite
//! comparator built from [`CurateSettings::priority`].

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Item, ItemId, TagsDoc, UNTAGGED_TAG_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Day,
    Week,
    Month,
}

/// A span of calendar time such as "3 months"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub unit: TimeUnit,
    pub value: u32,
}

impl Period {
    pub fn new(unit: TimeUnit, value: u32) -> Self {
        Self { unit, value }
    }

    /// The instant one period before `now`
    ///
    /// Months are calendar months; an out-of-range result clamps to the
    /// earliest representable time.
    pub fn before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let earlier = match self.unit {
            TimeUnit::Day => now.checked_sub_signed(Duration::days(i64::from(self.value))),
            TimeUnit::Week => now.checked_sub_signed(Duration::weeks(i64::from(self.value))),
            TimeUnit::Month => now.checked_sub_months(Months::new(self.value)),
        };
        earlier.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unit = match self.unit {
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
        };
        let plural = if self.value == 1 { "" } else { "s" };
        write!(f, "{} {}{}", self.value, unit, plural)
    }
}

/// Kinds of inclusion reason, used to configure queue priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReasonKind {
    UnassignedTag,
    AiTag,
    QuickTag,
    OlderThanThreshold,
    Manual,
}

impl ReasonKind {
    pub const ALL: [ReasonKind; 5] = [
        ReasonKind::Manual,
        ReasonKind::UnassignedTag,
        ReasonKind::QuickTag,
        ReasonKind::AiTag,
        ReasonKind::OlderThanThreshold,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurateSettings {
    /// Items saved longer ago than this are due for curation
    #[serde(default = "default_threshold")]
    pub threshold: Period,
    /// Cool-down after an item was curated
    #[serde(default = "default_reminder")]
    pub reminder: Period,
    /// Reason kinds in comparator order
    #[serde(default = "default_priority")]
    pub priority: Vec<ReasonKind>,
}

fn default_threshold() -> Period {
    Period::new(TimeUnit::Month, 3)
}

fn default_reminder() -> Period {
    Period::new(TimeUnit::Month, 1)
}

fn default_priority() -> Vec<ReasonKind> {
    ReasonKind::ALL.to_vec()
}

impl Default for CurateSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            reminder: default_reminder(),
            priority: default_priority(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionReasons {
    pub has_unassigned_tag: bool,
    #[serde(rename = "hasAITag")]
    pub has_ai_tag: bool,
    pub has_quick_tag: bool,
    pub older_than_threshold: bool,
    pub manual: bool,
}

impl InclusionReasons {
    pub fn get(&self, kind: ReasonKind) -> bool {
        match kind {
            ReasonKind::UnassignedTag => self.has_unassigned_tag,
            ReasonKind::AiTag => self.has_ai_tag,
            ReasonKind::QuickTag => self.has_quick_tag,
            ReasonKind::OlderThanThreshold => self.older_than_threshold,
            ReasonKind::Manual => self.manual,
        }
    }

    pub fn any(&self) -> bool {
        ReasonKind::ALL.iter().any(|kind| self.get(*kind))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionResult {
    pub item_id: ItemId,
    pub reasons: InclusionReasons,
}

/// Compute every reason `item` has to be curated
pub fn inclusion_reasons(
    item: &Item,
    tags: &TagsDoc,
    settings: &CurateSettings,
    manual: &HashSet<ItemId>,
    now: DateTime<Utc>,
) -> InclusionReasons {
    let item_tags = || item.tag_ids.iter().filter_map(|id| tags.get(*id));
    InclusionReasons {
        has_unassigned_tag: item.has_tag(UNTAGGED_TAG_ID),
        has_ai_tag: item_tags().any(|t| t.is_ai),
        has_quick_tag: item_tags().any(|t| t.is_quick),
        older_than_threshold: item.saved_at < settings.threshold.before(now),
        manual: manual.contains(&item.id),
    }
}

/// Whether `item` is still inside its post-curation cool-down
pub fn is_suppressed(item: &Item, settings: &CurateSettings, now: DateTime<Utc>) -> bool {
    match item.last_curated_at {
        Some(curated) => curated > settings.reminder.before(now),
        None => false,
    }
}

/// Build the ranked curation queue
pub fn curate_queue(
    items: &[Item],
    tags: &TagsDoc,
    settings: &CurateSettings,
    manual: &HashSet<ItemId>,
    now: DateTime<Utc>,
) -> Vec<InclusionResult> {
    let mut queue: Vec<InclusionResult> = items
        .iter()
        .filter(|item| !is_suppressed(item, settings, now))
        .map(|item| InclusionResult {
            item_id: item.id.clone(),
            reasons: inclusion_reasons(item, tags, settings, manual, now),
        })
        .filter(|result| result.reasons.any())
        .collect();
    rank(&mut queue, &settings.priority);
    queue
}

/// Order results by `priority`; for each kind `false` sorts before `true`
///
/// The sort is stable so equal reason vectors keep their input order.
pub fn rank(results: &mut [InclusionResult], priority: &[ReasonKind]) {
    results.sort_by(|a, b| compare(&a.reasons, &b.reasons, priority));
}

fn compare(a: &InclusionReasons, b: &InclusionReasons, priority: &[ReasonKind]) -> Ordering {
    priority
        .iter()
        .map(|kind| a.get(*kind).cmp(&b.get(*kind)))
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tag;

    fn now() -> DateTime<Utc> {
        "2026-06-15T12:00:00Z".parse().unwrap()
    }

    fn old_item(id: &str) -> Item {
        let mut item = Item::with_id(id, format!("https://example.com/{}", id)).tagged([1]);
        item.saved_at = now() - Duration::days(365);
        item
    }

    fn fresh_item(id: &str) -> Item {
        let mut item = Item::with_id(id, format!("https://example.com/{}", id)).tagged([1]);
        item.saved_at = now() - Duration::days(1);
        item
    }

    fn tags() -> TagsDoc {
        let mut doc = TagsDoc::default();
        doc.tags.push(Tag::new(1, "plain", "#111111"));
        let mut quick = Tag::new(2, "Quick", "#222222");
        quick.is_quick = true;
        doc.tags.push(quick);
        let mut ai = Tag::new(3, "ai", "#333333");
        ai.is_ai = true;
        doc.tags.push(ai);
        doc
    }

    fn ids(queue: &[InclusionResult]) -> Vec<&str> {
        queue.iter().map(|r| r.item_id.as_str()).collect()
    }

    #[test]
    fn test_period_before() {
        let now = now();
        assert_eq!(
            Period::new(TimeUnit::Day, 2).before(now),
            now - Duration::days(2)
        );
        assert_eq!(
            Period::new(TimeUnit::Week, 1).before(now),
            now - Duration::days(7)
        );
        let expected: DateTime<Utc> = "2026-03-15T12:00:00Z".parse().unwrap();
        assert_eq!(Period::new(TimeUnit::Month, 3).before(now), expected);
    }

    #[test]
    fn test_reasons() {
        let settings = CurateSettings::default();
        let manual: HashSet<ItemId> = [ItemId::from("m")].into_iter().collect();

        let untagged = Item::with_id("u", "https://a.com");
        let r = inclusion_reasons(&untagged, &tags(), &settings, &manual, now());
        assert!(r.has_unassigned_tag);
        assert!(!r.older_than_threshold);

        let quick = fresh_item("q").tagged([2, 3]);
        let r = inclusion_reasons(&quick, &tags(), &settings, &manual, now());
        assert!(r.has_quick_tag && r.has_ai_tag);
        assert!(!r.has_unassigned_tag);

        let r = inclusion_reasons(&fresh_item("m"), &tags(), &settings, &manual, now());
        assert_eq!(
            r,
            InclusionReasons {
                manual: true,
                ..Default::default()
            }
        );

        let r = inclusion_reasons(&old_item("o"), &tags(), &settings, &manual, now());
        assert!(r.older_than_threshold);
    }

    #[test]
    fn test_items_without_reasons_are_excluded() {
        let settings = CurateSettings::default();
        let queue = curate_queue(
            &[fresh_item("a"), old_item("b")],
            &tags(),
            &settings,
            &HashSet::new(),
            now(),
        );
        assert_eq!(ids(&queue), vec!["b"]);
    }

    #[test]
    fn test_recently_curated_item_is_suppressed() {
        let settings = CurateSettings::default();
        let mut item = old_item("1");
        item.last_curated_at = Some(now() - Duration::days(2));

        let queue = curate_queue(&[item.clone()], &tags(), &settings, &HashSet::new(), now());
        assert!(queue.is_empty());

        // Past the cool-down it comes back
        item.last_curated_at = Some(now() - Duration::days(45));
        let queue = curate_queue(&[item], &tags(), &settings, &HashSet::new(), now());
        assert_eq!(ids(&queue), vec!["1"]);
    }

    #[test]
    fn test_suppression_overrides_manual() {
        let settings = CurateSettings::default();
        let mut item = fresh_item("1");
        item.last_curated_at = Some(now() - Duration::hours(1));
        let manual: HashSet<ItemId> = [ItemId::from("1")].into_iter().collect();

        assert!(curate_queue(&[item], &tags(), &settings, &manual, now()).is_empty());
    }

    #[test]
    fn test_rank_false_before_true_in_priority_order() {
        let settings = CurateSettings {
            priority: vec![ReasonKind::QuickTag, ReasonKind::OlderThanThreshold],
            ..Default::default()
        };
        let items = vec![
            old_item("old-quick").tagged([2]),
            old_item("old"),
            fresh_item("fresh-quick").tagged([2]),
        ];

        let queue = curate_queue(&items, &tags(), &settings, &HashSet::new(), now());
        assert_eq!(ids(&queue), vec!["old", "fresh-quick", "old-quick"]);
    }

    #[test]
    fn test_rank_is_stable_on_ties() {
        let items: Vec<Item> = ["c", "a", "d", "b"].iter().map(|id| old_item(id)).collect();
        let queue = curate_queue(
            &items,
            &tags(),
            &CurateSettings::default(),
            &HashSet::new(),
            now(),
        );
        assert_eq!(ids(&queue), vec!["c", "a", "d", "b"]);
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: CurateSettings =
            serde_json::from_str(r#"{"threshold": {"unit": "week", "value": 2}}"#).unwrap();
        assert_eq!(settings.threshold, Period::new(TimeUnit::Week, 2));
        assert_eq!(settings.reminder, Period::new(TimeUnit::Month, 1));
        assert_eq!(settings.priority.len(), 5);
        assert_eq!(Period::new(TimeUnit::Month, 1).to_string(), "1 month");
    }
}
