//! Cluster topology classification and server selection.
pub mod monitor;
pub mod server;

use crate::common::{ReadMode, ReadPreference};
use crate::connstring::Host;

use rand::{thread_rng, Rng};

use std::collections::HashMap;

use self::server::{ServerDescription, ServerType};

/// Describes the type of topology for a server set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopologyType {
    Single,
    ReplicaSetNoPrimary,
    ReplicaSetWithPrimary,
    Sharded,
    Unknown,
}

/// A snapshot classification of the overall cluster shape.
///
/// Always recomputed as a whole from the current description map, never
/// patched incrementally. `Single` and `Sharded` are terminal: once a
/// cluster classifies as either, it keeps that classification.
#[derive(Clone, Debug)]
pub struct TopologyDescription {
    pub topology_type: TopologyType,
    /// The replica set name, either configured up front or discovered from
    /// a primary's probe response.
    pub set_name: Option<String>,
    /// Known servers within the topology.
    pub servers: HashMap<Host, ServerDescription>,
}

impl TopologyDescription {
    /// Returns an empty topology description. A configured replica set name
    /// immediately classifies the topology as a primary-less replica set.
    pub fn new(set_name: Option<String>) -> TopologyDescription {
        let topology_type = if set_name.is_some() {
            TopologyType::ReplicaSetNoPrimary
        } else {
            TopologyType::Unknown
        };

        TopologyDescription {
            topology_type,
            set_name,
            servers: HashMap::new(),
        }
    }

    /// Classifies a new description map, carrying over whatever the previous
    /// topology had already settled (set name, terminal classifications).
    pub fn with_descriptions(
        previous: &TopologyDescription,
        descriptions: HashMap<Host, ServerDescription>,
    ) -> TopologyDescription {
        let set_name = match previous.set_name {
            Some(ref name) => Some(name.clone()),
            // Adopt the set name reported by a primary.
            None => descriptions
                .values()
                .find(|d| d.server_type == ServerType::RSPrimary && !d.set_name.is_empty())
                .map(|d| d.set_name.clone()),
        };

        let topology_type = classify(previous.topology_type, &descriptions, &set_name);

        TopologyDescription {
            topology_type,
            set_name,
            servers: descriptions,
        }
    }

    /// Returns the candidate descriptions satisfying this topology's shape:
    /// the standalone server for `Single`, name-matching primaries and
    /// secondaries for replica sets, mongos routers for `Sharded`, and
    /// nothing for `Unknown`.
    pub fn servers(&self) -> Vec<&ServerDescription> {
        match self.topology_type {
            TopologyType::Unknown => Vec::new(),
            TopologyType::Single => self
                .servers
                .values()
                .filter(|d| d.server_type == ServerType::Standalone)
                .take(1)
                .collect(),
            TopologyType::Sharded => self
                .servers
                .values()
                .filter(|d| d.server_type == ServerType::Mongos)
                .collect(),
            TopologyType::ReplicaSetWithPrimary | TopologyType::ReplicaSetNoPrimary => self
                .servers
                .values()
                .filter(|d| {
                    (d.server_type == ServerType::RSPrimary
                        || d.server_type == ServerType::RSSecondary)
                        && self.name_matches(d)
                })
                .collect(),
        }
    }

    /// Picks one candidate according to the read preference, or `None` when
    /// the candidate set admits nothing for it.
    pub fn select(&self, read_preference: &ReadPreference) -> Option<&ServerDescription> {
        let candidates = self.servers();
        if candidates.is_empty() {
            return None;
        }

        match self.topology_type {
            TopologyType::Unknown => None,
            // A standalone serves every preference.
            TopologyType::Single => candidates.into_iter().next(),
            TopologyType::Sharded => nearest(candidates),
            TopologyType::ReplicaSetWithPrimary | TopologyType::ReplicaSetNoPrimary => {
                let primaries: Vec<_> = candidates
                    .iter()
                    .cloned()
                    .filter(|d| d.server_type == ServerType::RSPrimary)
                    .collect();
                let secondaries: Vec<_> = candidates
                    .iter()
                    .cloned()
                    .filter(|d| d.server_type == ServerType::RSSecondary)
                    .collect();

                match read_preference.mode {
                    ReadMode::Primary => rand_pick(primaries),
                    ReadMode::PrimaryPreferred => {
                        rand_pick(primaries).or_else(|| rand_pick(secondaries))
                    }
                    ReadMode::Secondary => rand_pick(secondaries),
                    ReadMode::SecondaryPreferred => {
                        rand_pick(secondaries).or_else(|| rand_pick(primaries))
                    }
                    ReadMode::Nearest => nearest(candidates),
                }
            }
        }
    }

    fn name_matches(&self, description: &ServerDescription) -> bool {
        match self.set_name {
            Some(ref name) => description.set_name == *name,
            None => true,
        }
    }
}

// Pure classification of a description map. Single and Sharded are sticky.
fn classify(
    previous: TopologyType,
    descriptions: &HashMap<Host, ServerDescription>,
    set_name: &Option<String>,
) -> TopologyType {
    match previous {
        TopologyType::Single => return TopologyType::Single,
        TopologyType::Sharded => return TopologyType::Sharded,
        _ => {}
    }

    let mut standalones = 0;
    let mut mongoses = 0;
    let mut members = 0;
    let mut has_primary = false;

    for description in descriptions.values() {
        match description.server_type {
            ServerType::Standalone => standalones += 1,
            ServerType::Mongos => mongoses += 1,
            stype if stype.is_replica_set_member() => {
                members += 1;
                if stype == ServerType::RSPrimary {
                    let matches = match set_name {
                        Some(name) => description.set_name == *name,
                        None => true,
                    };
                    if matches {
                        has_primary = true;
                    }
                }
            }
            _ => {}
        }
    }

    if mongoses > 0 {
        TopologyType::Sharded
    } else if standalones > 0 && descriptions.len() == 1 {
        TopologyType::Single
    } else if has_primary {
        TopologyType::ReplicaSetWithPrimary
    } else if members > 0 || set_name.is_some() {
        TopologyType::ReplicaSetNoPrimary
    } else {
        TopologyType::Unknown
    }
}

// Picks the candidate with the lowest round-trip estimate, falling back to
// a random pick when no estimates have been taken yet.
fn nearest(candidates: Vec<&ServerDescription>) -> Option<&ServerDescription> {
    let best = candidates
        .iter()
        .filter(|d| d.round_trip_time.is_some())
        .min_by(|a, b| {
            a.round_trip_time
                .partial_cmp(&b.round_trip_time)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .cloned();

    best.or_else(|| rand_pick(candidates))
}

// Chooses a candidate at random.
fn rand_pick(candidates: Vec<&ServerDescription>) -> Option<&ServerDescription> {
    if candidates.is_empty() {
        return None;
    }
    let index = thread_rng().gen_range(0, candidates.len());
    candidates.into_iter().nth(index)
}
