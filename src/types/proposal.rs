//! Proposal types (one quoting alternative of an event)

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::default_start_time;

use super::{CatalogKey, Coordinates, EventId, Money};

pub type ProposalId = Uuid;
pub type StopId = Uuid;
pub type ItemId = Uuid;

/// Single-letter proposal label, assigned A, B, C… in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "char", into = "char")]
pub struct ProposalLabel(char);

impl ProposalLabel {
    pub const FIRST: ProposalLabel = ProposalLabel('A');

    pub fn new(letter: char) -> Option<Self> {
        letter.is_ascii_uppercase().then_some(ProposalLabel(letter))
    }

    /// Following letter; `None` after `Z`
    pub fn next(self) -> Option<Self> {
        u8::try_from(self.0)
            .ok()
            .and_then(|b| b.checked_add(1))
            .map(char::from)
            .and_then(Self::new)
    }

    pub fn as_char(self) -> char {
        self.0
    }
}

impl TryFrom<char> for ProposalLabel {
    type Error = String;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("invalid proposal label '{}'", value))
    }
}

impl From<ProposalLabel> for char {
    fn from(label: ProposalLabel) -> char {
        label.0
    }
}

impl fmt::Display for ProposalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sub-group tag: "All" or "Group A", "Group B", …
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SubGroup {
    #[default]
    All,
    Group(char),
}

impl SubGroup {
    pub fn group(letter: char) -> Option<Self> {
        letter.is_ascii_uppercase().then_some(SubGroup::Group(letter))
    }

    pub fn is_all(&self) -> bool {
        matches!(self, SubGroup::All)
    }
}

impl TryFrom<String> for SubGroup {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(SubGroup::All);
        }
        let letter = trimmed
            .strip_prefix("Group ")
            .or_else(|| trimmed.strip_prefix("group "))
            .and_then(|rest| {
                let mut chars = rest.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c.to_ascii_uppercase()),
                    _ => None,
                }
            });
        letter
            .and_then(SubGroup::group)
            .ok_or_else(|| format!("invalid sub-group '{}'", value))
    }
}

impl From<SubGroup> for String {
    fn from(value: SubGroup) -> String {
        value.to_string()
    }
}

impl fmt::Display for SubGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubGroup::All => write!(f, "All"),
            SubGroup::Group(letter) => write!(f, "Group {}", letter),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    #[default]
    Adventure,
    Cultural,
    Food,
    Transport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Adventure,
    Cultural,
    Food,
    Transport,
    #[default]
    Service,
}

/// Travel mode of the tour, derived from the selected catalog transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TourType {
    #[default]
    Walking,
    Driving,
}

impl TourType {
    pub const fn as_str(self) -> &'static str {
        match self {
            TourType::Walking => "walking",
            TourType::Driving => "driving",
        }
    }
}

/// Whether the stop order is owned by the sequencer or by the user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencingMode {
    #[default]
    Auto,
    Manual,
}

/// Route waypoint. Timing fields are not stored here; see `TimedStop`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub id: StopId,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub activity_type: ActivityType,
    #[serde(default)]
    pub sub_group: SubGroup,
}

impl Stop {
    pub fn is_food(&self) -> bool {
        self.activity_type == ActivityType::Food
    }
}

/// Pricing source of a billing item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ItemPricing {
    /// Unit price locked to the catalog, quantity derived
    Catalog { key: CatalogKey },
    /// Quantity = group size, unit price editable
    Custom,
}

/// Priced line item. Quantity is always derived, so it lives on `PriceLine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingItem {
    pub id: ItemId,
    pub name: String,
    pub item_type: ItemType,
    pub pricing: ItemPricing,
    pub unit_price: Money,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub sub_group: SubGroup,
}

impl BillingItem {
    pub fn catalog_key(&self) -> Option<CatalogKey> {
        match self.pricing {
            ItemPricing::Catalog { key } => Some(key),
            ItemPricing::Custom => None,
        }
    }
}

/// Editable proposal state. Everything derived lives in `ProposalSnapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: ProposalId,
    pub event_id: EventId,
    pub label: ProposalLabel,
    pub name: String,
    pub start_time: NaiveTime,
    pub tour_type: TourType,
    pub sequencing: SequencingMode,
    /// Stop pinned at position 0 ("event starts here")
    pub anchor: Option<StopId>,
    pub stops: Vec<Stop>,
    pub items: Vec<BillingItem>,
    /// Manual unit-price overrides by item id
    pub overrides: BTreeMap<ItemId, Money>,
}

impl Proposal {
    pub fn new(event_id: EventId, label: ProposalLabel) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            label,
            name: Self::default_name(label),
            start_time: default_start_time(),
            tour_type: TourType::default(),
            sequencing: SequencingMode::default(),
            anchor: None,
            stops: vec![],
            items: vec![],
            overrides: BTreeMap::new(),
        }
    }

    pub fn default_name(label: ProposalLabel) -> String {
        format!("Option {}", label)
    }

    /// Distinct non-"All" sub-groups tagged on any stop or item.
    pub fn active_sub_groups(&self) -> BTreeSet<SubGroup> {
        self.stops
            .iter()
            .map(|s| s.sub_group)
            .chain(self.items.iter().map(|i| i.sub_group))
            .filter(|g| !g.is_all())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_sequence() {
        assert_eq!(ProposalLabel::FIRST.next().unwrap().as_char(), 'B');
        let y = ProposalLabel::new('Y').unwrap();
        assert_eq!(y.next().unwrap().as_char(), 'Z');
        assert_eq!(y.next().unwrap().next(), None);
    }

    #[test]
    fn test_sub_group_serde() {
        let json = serde_json::to_string(&SubGroup::Group('B')).unwrap();
        assert_eq!(json, "\"Group B\"");
        let all: SubGroup = serde_json::from_str("\"All\"").unwrap();
        assert_eq!(all, SubGroup::All);
        let a: SubGroup = serde_json::from_str("\"group a\"").unwrap();
        assert_eq!(a, SubGroup::Group('A'));
        assert!(serde_json::from_str::<SubGroup>("\"Team 1\"").is_err());
    }

    #[test]
    fn test_new_proposal_defaults() {
        let proposal = Proposal::new(Uuid::nil(), ProposalLabel::FIRST);
        assert_eq!(proposal.name, "Option A");
        assert_eq!(proposal.start_time, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(proposal.tour_type, TourType::Walking);
        assert_eq!(proposal.sequencing, SequencingMode::Auto);
    }

    #[test]
    fn test_active_sub_groups_ignores_all() {
        let mut proposal = Proposal::new(Uuid::nil(), ProposalLabel::FIRST);
        proposal.items.push(BillingItem {
            id: Uuid::new_v4(),
            name: "Kayak".into(),
            item_type: ItemType::Adventure,
            pricing: ItemPricing::Custom,
            unit_price: Money::from_euros(30),
            notes: String::new(),
            sub_group: SubGroup::Group('B'),
        });
        proposal.stops.push(Stop {
            id: Uuid::new_v4(),
            name: "Palace".into(),
            location: None,
            coordinates: None,
            duration_minutes: 60,
            notes: String::new(),
            activity_type: ActivityType::Cultural,
            sub_group: SubGroup::All,
        });
        let groups: Vec<_> = proposal.active_sub_groups().into_iter().collect();
        assert_eq!(groups, vec![SubGroup::Group('B')]);
    }
}
