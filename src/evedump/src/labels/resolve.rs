//! Three-stage label resolution
//!
//! 1. [`discover_ids`] collects every object ID the galaxy map mentions.
//! 2. [`index_message_ids`] finds the message ID carrying each object's name
//!    by matching `FullPath` tags and parsing `label` suffixes.
//! 3. [`resolve_names`] looks the message IDs up in the string table.
//!
//! The catalogs share no keys, so every link that fails to resolve simply
//! leaves the object out of the result.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::catalog::{Catalogs, LocalizationIndex, LocalizedStrings, StarMapCatalog};

pub const SOLAR_SYSTEM_PREFIX: &str = "solar_system_";
pub const CONSTELLATION_PREFIX: &str = "constellation_";
pub const REGION_PREFIX: &str = "region_";

/// Tally key for index entries without a `FullPath`
pub const MISSING_TAG: &str = "<missing>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    SolarSystem,
    Constellation,
    Region,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 3] = [
        ObjectKind::SolarSystem,
        ObjectKind::Constellation,
        ObjectKind::Region,
    ];

    pub fn label_prefix(self) -> &'static str {
        match self {
            ObjectKind::SolarSystem => SOLAR_SYSTEM_PREFIX,
            ObjectKind::Constellation => CONSTELLATION_PREFIX,
            ObjectKind::Region => REGION_PREFIX,
        }
    }

    pub fn parse_label(self, label: &str) -> Option<u32> {
        match self {
            ObjectKind::SolarSystem => parse_solar_system_label(label),
            ObjectKind::Constellation => parse_constellation_label(label),
            ObjectKind::Region => parse_region_label(label),
        }
    }

    /// Plural used for log lines and the combined file keys
    pub fn plural(self) -> &'static str {
        match self {
            ObjectKind::SolarSystem => "systems",
            ObjectKind::Constellation => "constellations",
            ObjectKind::Region => "regions",
        }
    }
}

/// The suffix after `prefix` must be non-empty ASCII digits fitting a `u32`
fn parse_prefixed(label: &str, prefix: &str) -> Option<u32> {
    let digits = label.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `solar_system_30000142` -> `30000142`
pub fn parse_solar_system_label(label: &str) -> Option<u32> {
    parse_prefixed(label, SOLAR_SYSTEM_PREFIX)
}

pub fn parse_constellation_label(label: &str) -> Option<u32> {
    parse_prefixed(label, CONSTELLATION_PREFIX)
}

pub fn parse_region_label(label: &str) -> Option<u32> {
    parse_prefixed(label, REGION_PREFIX)
}

/// One value per object kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PerKind<T> {
    pub systems: T,
    pub constellations: T,
    pub regions: T,
}

impl<T> PerKind<T> {
    pub fn get(&self, kind: ObjectKind) -> &T {
        match kind {
            ObjectKind::SolarSystem => &self.systems,
            ObjectKind::Constellation => &self.constellations,
            ObjectKind::Region => &self.regions,
        }
    }

    pub fn get_mut(&mut self, kind: ObjectKind) -> &mut T {
        match kind {
            ObjectKind::SolarSystem => &mut self.systems,
            ObjectKind::Constellation => &mut self.constellations,
            ObjectKind::Region => &mut self.regions,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> PerKind<U> {
        PerKind {
            systems: f(&self.systems),
            constellations: f(&self.constellations),
            regions: f(&self.regions),
        }
    }
}

/// Object ID to display name, ordered by ID
pub type LabelMap = BTreeMap<u32, String>;

/// Resolved labels for every kind
pub type LabelSet = PerKind<LabelMap>;

pub type DiscoveredIds = PerKind<BTreeSet<u32>>;

/// Object ID to the message ID holding its name
pub type MessageIndex = PerKind<BTreeMap<u32, u64>>;

/// `FullPath` tags selecting each kind's index entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTags {
    pub systems: String,
    pub constellations: String,
    pub regions: String,
}

impl Default for PathTags {
    fn default() -> Self {
        Self {
            systems: "Map/SolarSystems".to_string(),
            constellations: "Map/Constellations".to_string(),
            regions: "Map/Regions".to_string(),
        }
    }
}

impl PathTags {
    pub fn kind_for(&self, full_path: &str) -> Option<ObjectKind> {
        if full_path == self.systems {
            Some(ObjectKind::SolarSystem)
        } else if full_path == self.constellations {
            Some(ObjectKind::Constellation)
        } else if full_path == self.regions {
            Some(ObjectKind::Region)
        } else {
            None
        }
    }
}

/// Stage-by-stage counts for one resolution pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub discovered: PerKind<usize>,
    pub indexed: PerKind<usize>,
    pub resolved: PerKind<usize>,
    /// Tagged entries whose label did not parse
    pub bad_suffix: usize,
    /// Parsed IDs absent from the galaxy map
    pub undiscovered: usize,
    /// Message IDs absent from the string table
    pub missing_strings: usize,
    pub null_names: usize,
    pub unrecognized_tags: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub labels: LabelSet,
    pub report: ResolutionReport,
}

/// Stage 1: the union of every ID at every nesting level, map keys included
pub fn discover_ids(star_map: &StarMapCatalog) -> DiscoveredIds {
    let mut ids = DiscoveredIds::default();

    for (region_id, region) in &star_map.regions {
        ids.regions.insert(*region_id);
        ids.constellations.extend(&region.constellation_ids);
        ids.systems.extend(&region.solar_system_ids);
    }

    for (constellation_id, constellation) in &star_map.constellations {
        ids.constellations.insert(*constellation_id);
        ids.systems.extend(&constellation.solar_system_ids);
    }

    if let Some(listing) = &star_map.solar_systems {
        ids.systems.extend(listing.ids());
    }

    ids
}

/// Stage 2: object ID to message ID for every tagged, parseable, known object
///
/// Entries are visited in message ID order and the first message for an
/// object wins.
pub fn index_message_ids(
    index: &LocalizationIndex,
    ids: &DiscoveredIds,
    tags: &PathTags,
    report: &mut ResolutionReport,
) -> MessageIndex {
    let mut messages = MessageIndex::default();

    for (message_id, entry) in &index.entries {
        let Some(full_path) = entry.full_path.as_deref() else {
            *report
                .unrecognized_tags
                .entry(MISSING_TAG.to_string())
                .or_default() += 1;
            continue;
        };

        let Some(kind) = tags.kind_for(full_path) else {
            *report
                .unrecognized_tags
                .entry(full_path.to_string())
                .or_default() += 1;
            continue;
        };

        let Some(object_id) = entry.label.as_deref().and_then(|l| kind.parse_label(l)) else {
            tracing::debug!(
                "Message {} under {} has an unparseable label {:?}",
                message_id,
                full_path,
                entry.label
            );
            report.bad_suffix += 1;
            continue;
        };

        if !ids.get(kind).contains(&object_id) {
            report.undiscovered += 1;
            continue;
        }

        messages
            .get_mut(kind)
            .entry(object_id)
            .or_insert(*message_id);
    }

    report.indexed = messages.map(BTreeMap::len);
    messages
}

/// Stage 3: look each message ID up; null and missing names are dropped
pub fn resolve_names(
    messages: &MessageIndex,
    strings: &LocalizedStrings,
    report: &mut ResolutionReport,
) -> LabelSet {
    let mut labels = LabelSet::default();

    for kind in ObjectKind::ALL {
        let out = labels.get_mut(kind);
        for (object_id, message_id) in messages.get(kind) {
            match strings.get(*message_id) {
                Some(Some(name)) => {
                    out.insert(*object_id, name.to_string());
                }
                Some(None) => report.null_names += 1,
                None => report.missing_strings += 1,
            }
        }
    }

    report.resolved = labels.map(BTreeMap::len);
    labels
}

/// Run all three stages over loaded catalogs
pub fn resolve_labels(catalogs: &Catalogs, tags: &PathTags) -> Resolution {
    let mut report = ResolutionReport::default();

    let ids = discover_ids(&catalogs.star_map);
    report.discovered = ids.map(BTreeSet::len);

    let messages = index_message_ids(&catalogs.index, &ids, tags, &mut report);
    let labels = resolve_names(&messages, &catalogs.strings, &mut report);

    for kind in ObjectKind::ALL {
        tracing::info!(
            "{}: {} discovered, {} indexed, {} named",
            kind.plural(),
            report.discovered.get(kind),
            report.indexed.get(kind),
            report.resolved.get(kind)
        );
    }

    Resolution { labels, report }
}
