//! Core types used throughout Svarog.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Hierarchical name identifying a router, a neighbor or a probe.
///
/// Names are `/`-separated component lists. The canonical form always starts
/// with `/` and never ends with one (the root name is just `/`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Name(String);

impl Name {
    /// Build a name from its textual form, normalising separators.
    pub fn new(name: impl AsRef<str>) -> Self {
        let components: Vec<&str> = name
            .as_ref()
            .split('/')
            .filter(|c| !c.is_empty())
            .collect();
        Self::from_components(&components)
    }

    fn from_components(components: &[&str]) -> Self {
        if components.is_empty() {
            Self("/".to_string())
        } else {
            Self(format!("/{}", components.join("/")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name components, outermost first.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    pub fn len(&self) -> usize {
        self.components().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == "/"
    }

    /// Return a new name with `component` appended.
    pub fn append(&self, component: impl fmt::Display) -> Self {
        let component = component.to_string();
        let mut components: Vec<&str> = self.components().collect();
        components.extend(component.split('/').filter(|c| !c.is_empty()));
        Self::from_components(&components)
    }

    /// Name without its last `n` components.
    pub fn prefix(&self, n: usize) -> Self {
        let components: Vec<&str> = self.components().collect();
        let keep = components.len().saturating_sub(n);
        Self::from_components(&components[..keep])
    }

    /// Last component, if any.
    pub fn last(&self) -> Option<&str> {
        self.components().last()
    }

    /// Whether `self` is a (non-strict) prefix of `other`.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        let mut theirs = other.components();
        self.components().all(|c| theirs.next() == Some(c))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.0
    }
}

impl FromStr for Name {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// Liveness status of a neighbor as reported by the hello protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    #[default]
    Active,
    Inactive,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkStatus::Active => write!(f, "ACTIVE"),
            LinkStatus::Inactive => write!(f, "INACTIVE"),
        }
    }
}

/// Kind of advertisement held in the topology database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvertisementType {
    /// Adjacency advertisement (neighbors and link costs).
    Adjacency,
    /// Hyperbolic coordinate advertisement.
    Coordinate,
    /// Name-prefix advertisement.
    Name,
}

impl fmt::Display for AdvertisementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvertisementType::Adjacency => write!(f, "adjacency"),
            AdvertisementType::Coordinate => write!(f, "coordinate"),
            AdvertisementType::Name => write!(f, "name"),
        }
    }
}

/// Hyperbolic routing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HyperbolicState {
    /// Link-state routing only.
    #[default]
    Off,
    /// Link-state routing drives forwarding; hyperbolic results go to the dry-run table.
    DryRun,
    /// Hyperbolic routing drives forwarding.
    On,
}

/// Cost-aware routing algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingAlgorithm {
    /// Standard algorithm selected by the hyperbolic state.
    #[default]
    LinkState,
    /// RTT costs remapped by recent load and stability.
    LoadAware,
    /// RTT costs replaced by the online-learned model.
    MlAdaptive,
}

impl fmt::Display for RoutingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingAlgorithm::LinkState => write!(f, "link-state"),
            RoutingAlgorithm::LoadAware => write!(f, "load-aware"),
            RoutingAlgorithm::MlAdaptive => write!(f, "ml-adaptive"),
        }
    }
}
