//! Partition of agents into groups that share a policy.

use crate::error::{CollaboratorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ordered mapping from group name to the agents it contains.
///
/// Iteration follows the order in which the task declared the groups. Every
/// agent belongs to exactly one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(String, Vec<String>)>", into = "Vec<(String, Vec<String>)>")]
pub struct GroupMap {
    groups: Vec<(String, Vec<String>)>,
}

impl GroupMap {
    /// Builds a group map, checking that it is a partition.
    pub fn new<I, G, A>(groups: I) -> Result<Self>
    where
        I: IntoIterator<Item = (G, Vec<A>)>,
        G: Into<String>,
        A: Into<String>,
    {
        let groups: Vec<(String, Vec<String>)> = groups
            .into_iter()
            .map(|(g, agents)| (g.into(), agents.into_iter().map(Into::into).collect()))
            .collect();

        if groups.is_empty() {
            return Err(CollaboratorError::InvalidGroupMap("no groups declared".to_string()));
        }

        let mut names = HashSet::new();
        let mut agents_seen = HashSet::new();
        for (group, agents) in &groups {
            if group.is_empty() || group.contains('/') {
                return Err(CollaboratorError::InvalidGroupMap(format!("invalid group name '{}'", group)));
            }
            if !names.insert(group.as_str()) {
                return Err(CollaboratorError::InvalidGroupMap(format!("duplicate group '{}'", group)));
            }
            if agents.is_empty() {
                return Err(CollaboratorError::InvalidGroupMap(format!("group '{}' has no agents", group)));
            }
            for agent in agents {
                if !agents_seen.insert(agent.as_str()) {
                    return Err(CollaboratorError::InvalidGroupMap(format!(
                        "agent '{}' belongs to more than one group",
                        agent
                    )));
                }
            }
        }

        Ok(Self { groups })
    }

    /// Group names in declared order.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(g, _)| g.as_str())
    }

    /// Agents of `group`.
    pub fn agents(&self, group: &str) -> Option<&[String]> {
        self.groups.iter().find(|(g, _)| g == group).map(|(_, a)| a.as_slice())
    }

    pub fn contains(&self, group: &str) -> bool {
        self.groups.iter().any(|(g, _)| g == group)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.groups.iter().map(|(g, a)| (g.as_str(), a.as_slice()))
    }
}

impl TryFrom<Vec<(String, Vec<String>)>> for GroupMap {
    type Error = CollaboratorError;

    fn try_from(groups: Vec<(String, Vec<String>)>) -> Result<Self> {
        Self::new(groups)
    }
}

impl From<GroupMap> for Vec<(String, Vec<String>)> {
    fn from(map: GroupMap) -> Self {
        map.groups
    }
}
