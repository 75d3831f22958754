//! Pricing engine: line quantities, discount, per-person and sub-group totals

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::defaults::{GROUP_DISCOUNT_BPS, GROUP_DISCOUNT_MIN_EXCLUSIVE};
use crate::error::PricingError;
use crate::services::catalog::Catalog;
use crate::types::{
    BillingItem, BudgetCheck, ItemId, ItemPricing, Money, PriceBreakdown, PriceLine, SubGroup,
    SubGroupTotal,
};

/// How "All" items are attributed when no explicit sub-group exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AllSplitPolicy {
    /// The whole group is one implicit sub-group ("All") carrying 100%
    #[default]
    SingleImplicitGroup,
    /// No per-sub-group totals unless explicit groups exist
    Unattributed,
}

impl AllSplitPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "implicit" | "single" => Some(AllSplitPolicy::SingleImplicitGroup),
            "none" | "unattributed" => Some(AllSplitPolicy::Unattributed),
            _ => None,
        }
    }
}

/// Everything the engine reads
#[derive(Debug, Clone)]
pub struct PricingInput<'a> {
    pub items: &'a [BillingItem],
    /// Distinct non-"All" tags on stops and items
    pub sub_groups: &'a BTreeSet<SubGroup>,
    pub group_size: i64,
    pub duration_hours: f64,
    pub overrides: &'a BTreeMap<ItemId, Money>,
    pub budget_per_person: Option<Money>,
    pub split_policy: AllSplitPolicy,
}

/// Price one proposal. Deterministic: same input, same breakdown.
///
/// `group_size <= 0` is a contract violation and returns
/// `PricingError::DivisionUndefined`.
pub fn price(input: &PricingInput<'_>, catalog: &Catalog) -> Result<PriceBreakdown, PricingError> {
    if input.group_size <= 0 {
        return Err(PricingError::DivisionUndefined {
            group_size: input.group_size,
        });
    }
    let group_size = input.group_size;

    let lines = input
        .items
        .iter()
        .map(|item| price_line(item, catalog, group_size, input.duration_hours, input.overrides))
        .collect::<Result<Vec<PriceLine>, PricingError>>()?;

    let subtotal = lines
        .iter()
        .try_fold(Money::zero(), |acc, line| acc.checked_add(line.total))
        .ok_or_else(|| PricingError::Overflow { item: "subtotal".into() })?;
    let discount = if group_size > GROUP_DISCOUNT_MIN_EXCLUSIVE as i64 {
        subtotal.percentage(GROUP_DISCOUNT_BPS)
    } else {
        Money::zero()
    };
    let total = subtotal - discount;
    let per_person = total
        .divide_rounded(group_size)
        .ok_or(PricingError::DivisionUndefined { group_size })?;

    let per_sub_group = attribute(&lines, input.sub_groups, input.split_policy);
    let budget = input.budget_per_person.map(|cap| budget_check(per_person, cap));

    debug!(
        "Priced {} lines: subtotal {}, discount {}, total {}, {} pp",
        lines.len(),
        subtotal,
        discount,
        total,
        per_person
    );

    Ok(PriceBreakdown {
        lines,
        subtotal,
        discount,
        total,
        per_person,
        per_sub_group,
        budget,
    })
}

fn price_line(
    item: &BillingItem,
    catalog: &Catalog,
    group_size: i64,
    duration_hours: f64,
    overrides: &BTreeMap<ItemId, Money>,
) -> Result<PriceLine, PricingError> {
    let (quantity, unit_price, notes) = match item.pricing {
        ItemPricing::Catalog { key } => {
            let entry = catalog.get(key);
            // group_size was checked positive by the caller
            let derived = entry.derive_units(group_size as u32, duration_hours);
            (derived.units, entry.price_per_unit, derived.notes)
        }
        ItemPricing::Custom => (group_size, item.unit_price, item.notes.clone()),
    };
    let override_price = overrides.get(&item.id).copied();
    let total = override_price
        .unwrap_or(unit_price)
        .checked_mul(quantity)
        .ok_or_else(|| PricingError::Overflow { item: item.name.clone() })?;

    Ok(PriceLine {
        item_id: item.id,
        name: item.name.clone(),
        sub_group: item.sub_group,
        quantity,
        unit_price,
        override_price,
        total,
        notes,
    })
}

/// Per-sub-group totals from line totals (before discount).
///
/// Tagged lines go to their group; "All" lines are split evenly across the
/// explicit groups, remainder cents to the first groups in label order.
fn attribute(
    lines: &[PriceLine],
    sub_groups: &BTreeSet<SubGroup>,
    policy: AllSplitPolicy,
) -> Vec<SubGroupTotal> {
    let explicit: Vec<SubGroup> = sub_groups.iter().copied().filter(|g| !g.is_all()).collect();

    if explicit.is_empty() {
        return match policy {
            AllSplitPolicy::SingleImplicitGroup => vec![SubGroupTotal {
                sub_group: SubGroup::All,
                total: lines.iter().map(|l| l.total).sum(),
            }],
            AllSplitPolicy::Unattributed => vec![],
        };
    }

    let mut totals: BTreeMap<SubGroup, Money> = explicit.iter().map(|g| (*g, Money::zero())).collect();
    for line in lines {
        if line.sub_group.is_all() {
            for (group, share) in explicit.iter().zip(line.total.split_evenly(explicit.len())) {
                *totals.entry(*group).or_default() += share;
            }
        } else {
            *totals.entry(line.sub_group).or_default() += line.total;
        }
    }

    totals
        .into_iter()
        .map(|(sub_group, total)| SubGroupTotal { sub_group, total })
        .collect()
}

fn budget_check(per_person: Money, cap: Money) -> BudgetCheck {
    BudgetCheck {
        budget_per_person: cap,
        within_budget: per_person <= cap,
        over_by_per_person: (per_person - cap).max(Money::zero()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::STANDARD_CATALOG;
    use crate::types::{CatalogKey, ItemType};
    use uuid::Uuid;

    fn catalog_item(key: CatalogKey) -> BillingItem {
        let entry = STANDARD_CATALOG.get(key);
        BillingItem {
            id: Uuid::new_v4(),
            name: entry.item_name(),
            item_type: ItemType::Transport,
            pricing: ItemPricing::Catalog { key },
            unit_price: entry.price_per_unit,
            notes: String::new(),
            sub_group: SubGroup::All,
        }
    }

    fn custom_item(name: &str, euros: i64, sub_group: SubGroup) -> BillingItem {
        BillingItem {
            id: Uuid::new_v4(),
            name: name.to_string(),
            item_type: ItemType::Food,
            pricing: ItemPricing::Custom,
            unit_price: Money::from_euros(euros),
            notes: String::new(),
            sub_group,
        }
    }

    fn run(
        items: &[BillingItem],
        group_size: i64,
        duration_hours: f64,
        overrides: &BTreeMap<ItemId, Money>,
    ) -> Result<PriceBreakdown, PricingError> {
        let groups: BTreeSet<SubGroup> = items.iter().map(|i| i.sub_group).filter(|g| !g.is_all()).collect();
        price(
            &PricingInput {
                items,
                sub_groups: &groups,
                group_size,
                duration_hours,
                overrides,
                budget_per_person: None,
                split_policy: AllSplitPolicy::default(),
            },
            &STANDARD_CATALOG,
        )
    }

    #[test]
    fn test_jeeps_twenty_people_eight_hours() {
        let items = [catalog_item(CatalogKey::Jeeps)];
        let breakdown = run(&items, 20, 8.0, &BTreeMap::new()).unwrap();

        assert_eq!(breakdown.lines[0].quantity, 8);
        assert_eq!(breakdown.lines[0].total, Money::from_euros(3200));
        assert_eq!(breakdown.lines[0].notes, "4 vehicle(s) x 2 block(s) of 4h");
        assert_eq!(breakdown.subtotal, Money::from_euros(3200));
    }

    #[test]
    fn test_walking_six_people_three_hours() {
        let items = [catalog_item(CatalogKey::Walking)];
        let breakdown = run(&items, 6, 3.0, &BTreeMap::new()).unwrap();

        assert_eq!(breakdown.subtotal, Money::from_euros(180));
        assert_eq!(breakdown.discount, Money::zero());
        assert_eq!(breakdown.total, Money::from_euros(180));
        assert_eq!(breakdown.per_person, Money::from_euros(30));
    }

    #[test]
    fn test_discount_boundary() {
        let items = [custom_item("Lunch", 25, SubGroup::All)];

        let ten = run(&items, 10, 6.0, &BTreeMap::new()).unwrap();
        assert_eq!(ten.subtotal, Money::from_euros(250));
        assert_eq!(ten.discount, Money::zero());
        assert_eq!(ten.total, Money::from_euros(250));

        let eleven = run(&items, 11, 6.0, &BTreeMap::new()).unwrap();
        assert_eq!(eleven.subtotal, Money::from_euros(275));
        assert_eq!(eleven.discount, Money::from_cents(1375));
        assert_eq!(eleven.total, Money::from_cents(26125));
        assert_eq!(eleven.per_person, Money::from_cents(2375));
    }

    #[test]
    fn test_discount_applies_to_aggregate_not_per_line() {
        // Two lines of 12 x 1.11 = 13.32. Per line 5% would round to 0.67 each
        // (1.34); on the 26.64 aggregate it is 1.332 -> 1.33.
        let items = [
            custom_item("Snack", 0, SubGroup::All),
            custom_item("Drink", 0, SubGroup::All),
        ];
        let mut overrides = BTreeMap::new();
        overrides.insert(items[0].id, Money::from_cents(111));
        overrides.insert(items[1].id, Money::from_cents(111));
        let breakdown = run(&items, 12, 6.0, &overrides).unwrap();

        assert_eq!(breakdown.subtotal, Money::from_cents(2664));
        assert_eq!(breakdown.discount, Money::from_cents(133));
    }

    #[test]
    fn test_override_replaces_unit_price() {
        let items = [catalog_item(CatalogKey::Jeeps)];
        let mut overrides = BTreeMap::new();
        overrides.insert(items[0].id, Money::from_euros(350));
        let breakdown = run(&items, 6, 4.0, &overrides).unwrap();

        let line = &breakdown.lines[0];
        assert_eq!(line.unit_price, Money::from_euros(400));
        assert_eq!(line.effective_unit_price(), Money::from_euros(350));
        assert_eq!(line.total, Money::from_euros(350));
    }

    #[test]
    fn test_custom_quantity_is_group_size() {
        let items = [custom_item("Wine tasting", 18, SubGroup::All)];
        let breakdown = run(&items, 7, 6.0, &BTreeMap::new()).unwrap();

        assert_eq!(breakdown.lines[0].quantity, 7);
        assert_eq!(breakdown.total, Money::from_euros(126));
    }

    #[test]
    fn test_pricing_is_deterministic() {
        let items = [
            catalog_item(CatalogKey::Rzr),
            custom_item("Picnic", 22, SubGroup::Group('A')),
            custom_item("Kayak", 35, SubGroup::Group('B')),
        ];
        let first = run(&items, 13, 5.0, &BTreeMap::new()).unwrap();
        let second = run(&items, 13, 5.0, &BTreeMap::new()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_group_size_is_contract_violation() {
        let items = [custom_item("Lunch", 25, SubGroup::All)];
        assert_eq!(
            run(&items, 0, 6.0, &BTreeMap::new()),
            Err(PricingError::DivisionUndefined { group_size: 0 })
        );
    }

    #[test]
    fn test_overflowing_line_is_an_error() {
        let items = [catalog_item(CatalogKey::Walking)];
        let err = run(&items, 2_000_000_000, 1.0e7, &BTreeMap::new()).unwrap_err();
        assert_eq!(err, PricingError::Overflow { item: items[0].name.clone() });

        let huge = custom_item("Charter", 0, SubGroup::All);
        let overrides = BTreeMap::from([(huge.id, Money::from_cents(i64::MAX / 2))]);
        let err = run(&[huge], 4, 8.0, &overrides).unwrap_err();
        assert!(matches!(err, PricingError::Overflow { .. }));
    }

    #[test]
    fn test_all_item_split_across_two_groups() {
        // One person, so each line total equals its unit price
        let items = [
            custom_item("Boat", 100, SubGroup::All),
            custom_item("Kayak", 40, SubGroup::Group('A')),
            custom_item("Bikes", 30, SubGroup::Group('B')),
        ];
        let breakdown = run(&items, 1, 6.0, &BTreeMap::new()).unwrap();

        assert_eq!(breakdown.sub_group_total(SubGroup::Group('A')), Some(Money::from_euros(90)));
        assert_eq!(breakdown.sub_group_total(SubGroup::Group('B')), Some(Money::from_euros(80)));
        assert_eq!(breakdown.sub_group_total(SubGroup::All), None);
        let attributed: Money = breakdown.per_sub_group.iter().map(|g| g.total).sum();
        assert_eq!(attributed, breakdown.subtotal);
    }

    #[test]
    fn test_all_split_remainder_cents() {
        let items = [
            custom_item("Guide", 0, SubGroup::All),
            custom_item("A", 0, SubGroup::Group('A')),
            custom_item("B", 0, SubGroup::Group('B')),
            custom_item("C", 0, SubGroup::Group('C')),
        ];
        let mut overrides = BTreeMap::new();
        overrides.insert(items[0].id, Money::from_euros(1));
        let breakdown = run(&items, 1, 6.0, &overrides).unwrap();

        assert_eq!(breakdown.sub_group_total(SubGroup::Group('A')), Some(Money::from_cents(34)));
        assert_eq!(breakdown.sub_group_total(SubGroup::Group('B')), Some(Money::from_cents(33)));
        assert_eq!(breakdown.sub_group_total(SubGroup::Group('C')), Some(Money::from_cents(33)));
    }

    #[test]
    fn test_no_explicit_groups_by_policy() {
        let items = [custom_item("Lunch", 25, SubGroup::All)];
        let groups = BTreeSet::new();
        let overrides = BTreeMap::new();
        let mut input = PricingInput {
            items: &items,
            sub_groups: &groups,
            group_size: 4,
            duration_hours: 6.0,
            overrides: &overrides,
            budget_per_person: None,
            split_policy: AllSplitPolicy::SingleImplicitGroup,
        };

        let implicit = price(&input, &STANDARD_CATALOG).unwrap();
        assert_eq!(implicit.sub_group_total(SubGroup::All), Some(Money::from_euros(100)));

        input.split_policy = AllSplitPolicy::Unattributed;
        let none = price(&input, &STANDARD_CATALOG).unwrap();
        assert!(none.per_sub_group.is_empty());
    }

    #[test]
    fn test_budget_check() {
        let items = [custom_item("Lunch", 25, SubGroup::All)];
        let groups = BTreeSet::new();
        let overrides = BTreeMap::new();
        let mut input = PricingInput {
            items: &items,
            sub_groups: &groups,
            group_size: 4,
            duration_hours: 6.0,
            overrides: &overrides,
            budget_per_person: Some(Money::from_euros(20)),
            split_policy: AllSplitPolicy::default(),
        };

        let over = price(&input, &STANDARD_CATALOG).unwrap().budget.unwrap();
        assert!(!over.within_budget);
        assert_eq!(over.over_by_per_person, Money::from_euros(5));

        input.budget_per_person = Some(Money::from_euros(25));
        let exact = price(&input, &STANDARD_CATALOG).unwrap().budget.unwrap();
        assert!(exact.within_budget);
        assert_eq!(exact.over_by_per_person, Money::zero());
    }

    #[test]
    fn test_split_policy_parse() {
        assert_eq!(AllSplitPolicy::parse("implicit"), Some(AllSplitPolicy::SingleImplicitGroup));
        assert_eq!(AllSplitPolicy::parse("NONE"), Some(AllSplitPolicy::Unattributed));
        assert_eq!(AllSplitPolicy::parse("half"), None);
    }
}
