//! Declarative link rules between node classes.
//!
//! A [`LinkRule`] says that members of one class may link to members of
//! another at a given downlink bandwidth. Whether a candidate pair is
//! actually linked also depends on range: each class is either
//! [`LinkRange::Bounded`] by the global distance threshold or
//! [`LinkRange::Unbounded`] (satellites and similar, always in range).

use indexmap::IndexMap;

use skymesh_core::{ClassId, Position};

/// Whether a class's links are subject to the distance threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum LinkRange {
    /// Linkable only while closer than the distance threshold.
    #[default]
    Bounded,
    /// Always in range.
    Unbounded,
}

/// `from` may link to `to` at `bandwidth` bytes/second.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkRule {
    /// Declaring class.
    pub from: ClassId,
    /// Target class.
    pub to: ClassId,
    /// Downlink bandwidth of the declaring class.
    pub bandwidth: f64,
}

/// The full set of link rules plus range settings.
#[derive(Clone, Debug, Default)]
pub struct ConnectivityPolicy {
    rules: Vec<LinkRule>,
    ranges: IndexMap<ClassId, LinkRange>,
    distance_threshold: Option<f64>,
}

impl ConnectivityPolicy {
    /// Empty policy. Bounded pairs need `distance_threshold` to link.
    pub fn new(distance_threshold: Option<f64>) -> Self {
        Self {
            rules: Vec::new(),
            ranges: IndexMap::new(),
            distance_threshold,
        }
    }

    /// Add a rule.
    pub fn add_rule(&mut self, from: ClassId, to: ClassId, bandwidth: f64) -> &mut Self {
        self.rules.push(LinkRule {
            from,
            to,
            bandwidth,
        });
        self
    }

    /// Set a class's range. Classes default to [`LinkRange::Bounded`].
    pub fn set_range(&mut self, class: ClassId, range: LinkRange) -> &mut Self {
        self.ranges.insert(class, range);
        self
    }

    /// Range of `class`.
    pub fn range(&self, class: ClassId) -> LinkRange {
        self.ranges.get(&class).copied().unwrap_or_default()
    }

    /// Configured threshold, in metres.
    pub fn distance_threshold(&self) -> Option<f64> {
        self.distance_threshold
    }

    /// All rules, in insertion order.
    pub fn rules(&self) -> &[LinkRule] {
        &self.rules
    }

    /// True if some rule connects two bounded classes, so a threshold is
    /// required for it to ever produce a link.
    pub fn needs_threshold(&self) -> bool {
        self.rules.iter().any(|r| {
            self.range(r.from) == LinkRange::Bounded && self.range(r.to) == LinkRange::Bounded
        })
    }

    /// Fastest declared bandwidth, used as the step value seed before
    /// any edge exists.
    pub fn max_bandwidth(&self) -> Option<f64> {
        self.rules
            .iter()
            .map(|r| r.bandwidth)
            .fold(None, |acc: Option<f64>, bw| Some(acc.map_or(bw, |m| m.max(bw))))
    }

    /// Bandwidth a link between classes `x` and `y` would get, ignoring
    /// range.
    ///
    /// A rule in either direction suffices. When both classes declare each
    /// other the smaller bandwidth wins, since the link can carry no more
    /// than its slower side.
    pub fn rule_bandwidth(&self, x: ClassId, y: ClassId) -> Option<f64> {
        self.rules
            .iter()
            .filter(|r| (r.from == x && r.to == y) || (r.from == y && r.to == x))
            .map(|r| r.bandwidth)
            .fold(None, |acc: Option<f64>, bw| Some(acc.map_or(bw, |m| m.min(bw))))
    }

    /// Range predicate for a candidate pair.
    ///
    /// Holds if either class is unbounded, or if the distance is strictly
    /// below the threshold. Bounded pairs never link without a threshold.
    pub fn in_range(&self, x: ClassId, px: &Position, y: ClassId, py: &Position) -> bool {
        if self.range(x) == LinkRange::Unbounded || self.range(y) == LinkRange::Unbounded {
            return true;
        }
        self.distance_threshold
            .is_some_and(|threshold| px.distance(py) < threshold)
    }

    /// Bandwidth of the link the pair should have right now, or `None` if
    /// it should not be linked.
    pub fn link_bandwidth(&self, x: ClassId, px: &Position, y: ClassId, py: &Position) -> Option<f64> {
        let bandwidth = self.rule_bandwidth(x, y)?;
        self.in_range(x, px, y, py).then_some(bandwidth)
    }
}
