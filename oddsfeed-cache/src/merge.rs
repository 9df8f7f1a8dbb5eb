//! Merge rules shared by every cache item.
//!
//! - Translatable fields only ever gain or overwrite the entry for the merge
//!   locale; other locales are untouched.
//! - An incoming scalar overwrites the stored one; an absent incoming scalar
//!   never erases.
//! - Structural collections (tournament groups) follow the incoming data,
//!   including removal.
//!
//! Applying the same DTO twice yields the same item.

use std::collections::BTreeSet;

use oddsfeed_core::{DtoKind, EntityId, GroupDto, Locale};

use crate::item::{Group, Translations};

/// In-place merge of a DTO into an item, for the given locale.
pub trait MergeFrom<D: ?Sized> {
    fn merge_from(&mut self, dto: &D, locale: &Locale, kind: DtoKind);
}

/// Functional form: `existing` merged with `dto`, leaving `existing` untouched.
pub fn merged<I, D>(existing: &I, dto: &D, locale: &Locale, kind: DtoKind) -> I
where
    I: MergeFrom<D> + Clone,
    D: ?Sized,
{
    let mut next = existing.clone();
    next.merge_from(dto, locale, kind);
    next
}

// ============================================================================
// FIELD RULES
// ============================================================================

/// Overwrite with the incoming value when present.
pub fn scalar<T>(target: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *target = incoming;
    }
}

/// Set the entry for `locale` when a value arrives.
pub fn translation(target: &mut Translations, locale: &Locale, incoming: Option<&str>) {
    if let Some(value) = incoming {
        target.insert(locale.clone(), value.to_string());
    }
}

/// Like [`translation`], but guarantees an entry for `locale` afterwards.
///
/// Used for fields of a DTO that completes the locale: a value the source
/// does not provide is recorded as empty so the item stays consistent with
/// its fetched-locale set.
pub fn translation_complete(target: &mut Translations, locale: &Locale, incoming: Option<&str>) {
    match incoming {
        Some(value) => {
            target.insert(locale.clone(), value.to_string());
        }
        None => {
            target.entry(locale.clone()).or_default();
        }
    }
}

/// Append ids not yet present, preserving order.
pub fn union_ids<'a>(target: &mut Vec<EntityId>, incoming: impl IntoIterator<Item = &'a EntityId>) {
    for id in incoming {
        if !target.contains(id) {
            target.push(id.clone());
        }
    }
}

/// Deduplicate ids preserving first occurrence.
pub fn ordered_ids<'a>(ids: impl IntoIterator<Item = &'a EntityId>) -> Vec<EntityId> {
    let mut out = Vec::new();
    union_ids(&mut out, ids);
    out
}

// ============================================================================
// GROUP RECONCILIATION
// ============================================================================

/// Reconcile stored groups with a freshly received group list.
///
/// Each incoming group is paired with at most one stored group, looked up by
/// id, then by name, then (only for incoming groups carrying neither) by the
/// largest non-empty competitor overlap. Ties go to the earliest stored group.
/// A paired group keeps the stored id/name where the incoming one lacks them
/// and takes the incoming competitor set. Incoming groups without a partner
/// are added; stored groups without a partner are dropped. The result follows
/// incoming order.
pub fn reconcile_groups(existing: &[Group], incoming: &[GroupDto]) -> Vec<Group> {
    let incoming_ids: Vec<Vec<EntityId>> = incoming
        .iter()
        .map(|group| ordered_ids(group.competitors.iter().map(|c| &c.id)))
        .collect();

    let mut taken = vec![false; existing.len()];
    let mut partner: Vec<Option<usize>> = vec![None; incoming.len()];

    // Pass 1: id.
    for (i, group) in incoming.iter().enumerate() {
        let Some(id) = group.id.as_deref() else { continue };
        partner[i] = claim(&mut taken, existing, |g| g.id.as_deref() == Some(id));
    }

    // Pass 2: name.
    for (i, group) in incoming.iter().enumerate() {
        if partner[i].is_some() {
            continue;
        }
        let Some(name) = group.name.as_deref() else { continue };
        partner[i] = claim(&mut taken, existing, |g| g.name.as_deref() == Some(name));
    }

    // Pass 3: overlap, for anonymous incoming groups only.
    for (i, group) in incoming.iter().enumerate() {
        if partner[i].is_some() || group.id.is_some() || group.name.is_some() {
            continue;
        }
        let mut best: Option<(usize, usize)> = None;
        for (j, candidate) in existing.iter().enumerate() {
            if taken[j] {
                continue;
            }
            let overlap = candidate.overlap(&incoming_ids[i]);
            if overlap > 0 && best.map(|(_, top)| overlap > top).unwrap_or(true) {
                best = Some((j, overlap));
            }
        }
        if let Some((j, _)) = best {
            taken[j] = true;
            partner[i] = Some(j);
        }
    }

    incoming
        .iter()
        .zip(incoming_ids)
        .zip(partner)
        .map(|((group, competitor_ids), partner)| {
            let stored = partner.map(|j| &existing[j]);
            Group {
                id: group
                    .id
                    .clone()
                    .or_else(|| stored.and_then(|g| g.id.clone())),
                name: group
                    .name
                    .clone()
                    .or_else(|| stored.and_then(|g| g.name.clone())),
                competitor_ids,
            }
        })
        .collect()
}

fn claim(taken: &mut [bool], existing: &[Group], matches: impl Fn(&Group) -> bool) -> Option<usize> {
    let index = existing
        .iter()
        .enumerate()
        .position(|(j, group)| !taken[j] && matches(group))?;
    taken[index] = true;
    Some(index)
}

/// Union of the competitors of every group, in group order.
pub fn group_competitors(groups: &[Group]) -> Vec<EntityId> {
    ordered_ids(groups.iter().flat_map(|g| g.competitor_ids.iter()))
}

/// Locales present in every one of `fields`.
pub fn common_locales(fields: &[&Translations]) -> BTreeSet<Locale> {
    let Some((first, rest)) = fields.split_first() else {
        return BTreeSet::new();
    };
    first
        .keys()
        .filter(|locale| rest.iter().all(|field| field.contains_key(*locale)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use oddsfeed_core::TeamCompetitorDto;
    use proptest::prelude::*;

    fn competitor(n: u64) -> TeamCompetitorDto {
        TeamCompetitorDto {
            id: EntityId::from_parts("sr", "competitor", n).unwrap(),
            name: format!("Team {n}"),
            abbreviation: None,
            country: None,
            country_code: None,
            gender: None,
            qualifier: None,
        }
    }

    fn cid(n: u64) -> EntityId {
        EntityId::from_parts("sr", "competitor", n).unwrap()
    }

    fn dto(id: Option<&str>, name: Option<&str>, members: &[u64]) -> GroupDto {
        GroupDto {
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            competitors: members.iter().copied().map(competitor).collect(),
        }
    }

    fn stored(id: Option<&str>, name: Option<&str>, members: &[u64]) -> Group {
        Group {
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            competitor_ids: members.iter().copied().map(cid).collect(),
        }
    }

    #[test]
    fn test_scalar_never_erases() {
        let mut value = Some(3);
        scalar(&mut value, None);
        assert_eq!(value, Some(3));
        scalar(&mut value, Some(4));
        assert_eq!(value, Some(4));
    }

    #[test]
    fn test_translation_only_touches_merge_locale() {
        let en = Locale::new("en");
        let de = Locale::new("de");
        let mut names = Translations::new();
        translation(&mut names, &en, Some("Cup"));
        translation(&mut names, &de, Some("Pokal"));
        translation(&mut names, &en, None);
        assert_eq!(names.get(&en).map(String::as_str), Some("Cup"));
        assert_eq!(names.get(&de).map(String::as_str), Some("Pokal"));

        translation_complete(&mut names, &Locale::new("fr"), None);
        assert_eq!(names.get(&Locale::new("fr")).map(String::as_str), Some(""));
        translation_complete(&mut names, &en, None);
        assert_eq!(names.get(&en).map(String::as_str), Some("Cup"));
    }

    #[test]
    fn test_matched_group_membership_is_replaced() {
        let existing = vec![stored(Some("1"), None, &[1, 2, 3])];
        let result = reconcile_groups(&existing, &[dto(Some("1"), None, &[1, 2])]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].competitor_ids, vec![cid(1), cid(2)]);
    }

    #[test]
    fn test_unmatched_group_is_added_and_stale_dropped() {
        let existing = vec![stored(Some("1"), None, &[1, 2, 3])];
        let result = reconcile_groups(&existing, &[dto(Some("2"), Some("X"), &[4])]);
        assert_eq!(result, vec![stored(Some("2"), Some("X"), &[4])]);
    }

    #[test]
    fn test_group_matched_by_name_keeps_stored_id() {
        let existing = vec![stored(Some("g1"), Some("Group A"), &[1])];
        let result = reconcile_groups(&existing, &[dto(None, Some("Group A"), &[1, 5])]);
        assert_eq!(result[0].id.as_deref(), Some("g1"));
        assert_eq!(result[0].competitor_ids, vec![cid(1), cid(5)]);
    }

    #[test]
    fn test_anonymous_group_matched_by_overlap_with_first_tie() {
        let existing = vec![
            stored(Some("a"), Some("A"), &[1, 2]),
            stored(Some("b"), Some("B"), &[3, 4]),
            stored(Some("c"), Some("C"), &[1, 2]),
        ];
        let result = reconcile_groups(
            &existing,
            &[dto(None, None, &[3, 4, 9]), dto(None, None, &[1, 2])],
        );
        assert_eq!(result[0].id.as_deref(), Some("b"));
        assert_eq!(result[1].id.as_deref(), Some("a"));
    }

    #[test]
    fn test_each_stored_group_is_claimed_once() {
        let existing = vec![stored(Some("1"), Some("A"), &[1])];
        let result = reconcile_groups(
            &existing,
            &[dto(Some("1"), None, &[1]), dto(None, Some("A"), &[2])],
        );
        assert_eq!(result[0].name.as_deref(), Some("A"));
        assert_eq!(result[1].id, None);
    }

    #[test]
    fn test_identified_group_does_not_fall_back_to_overlap() {
        let existing = vec![stored(Some("1"), None, &[1, 2])];
        let result = reconcile_groups(&existing, &[dto(Some("7"), None, &[1, 2])]);
        assert_eq!(result[0].id.as_deref(), Some("7"));
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_group_competitors_union() {
        let groups = vec![stored(None, None, &[1, 2]), stored(None, None, &[2, 3])];
        assert_eq!(group_competitors(&groups), vec![cid(1), cid(2), cid(3)]);
    }

    #[test]
    fn test_common_locales() {
        let en = Locale::new("en");
        let de = Locale::new("de");
        let mut a = Translations::new();
        a.insert(en.clone(), "x".into());
        a.insert(de.clone(), "y".into());
        let mut b = Translations::new();
        b.insert(en.clone(), "z".into());
        assert_eq!(common_locales(&[&a, &b]), [en].into_iter().collect());
        assert!(common_locales(&[]).is_empty());
    }

    /// Group lists whose ids are distinct, as the feed delivers them.
    fn identified_groups() -> impl Strategy<Value = Vec<GroupDto>> {
        proptest::collection::vec(
            (
                0u8..6,
                proptest::option::of("[A-C]"),
                proptest::collection::vec(1u64..8, 0..5),
            ),
            0..4,
        )
        .prop_map(|raw| {
            let mut seen = Vec::new();
            raw.into_iter()
                .filter(|(id, _, _)| {
                    let fresh = !seen.contains(id);
                    seen.push(*id);
                    fresh
                })
                .map(|(id, name, members)| GroupDto {
                    id: Some(format!("g{id}")),
                    name,
                    competitors: members.into_iter().map(competitor).collect(),
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Reconciling the same incoming list twice changes nothing the second time.
        #[test]
        fn prop_reconcile_is_idempotent(
            existing in identified_groups(),
            incoming in identified_groups(),
        ) {
            let existing = reconcile_groups(&[], &existing);
            let once = reconcile_groups(&existing, &incoming);
            let twice = reconcile_groups(&once, &incoming);
            prop_assert_eq!(once, twice);
        }

        /// The result always has exactly one group per incoming group.
        #[test]
        fn prop_reconcile_follows_incoming_shape(
            existing in identified_groups(),
            incoming in identified_groups(),
        ) {
            let existing = reconcile_groups(&[], &existing);
            let result = reconcile_groups(&existing, &incoming);
            prop_assert_eq!(result.len(), incoming.len());
            for (group, source) in result.iter().zip(incoming.iter()) {
                let expected = ordered_ids(source.competitors.iter().map(|c| &c.id));
                prop_assert_eq!(&group.competitor_ids, &expected);
            }
        }
    }
}
