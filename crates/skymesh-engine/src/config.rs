//! Simulation configuration, validation, and error types.
//!
//! [`SimConfig`] is the builder input for a simulation: global parameters,
//! node classes, and the registry of mobility providers those classes may
//! name. [`validate()`](SimConfig::validate) checks every structural
//! invariant before anything is built; loading the values from a file is
//! the caller's concern.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use skymesh_core::{
    DecisionProvider, LinearDrift, MobilityProvider, NodeId, Position, RandomWalk, Role,
    Stationary, DEFAULT_SPEED,
};
use skymesh_topology::{ConnectivityPolicy, LinkRange, TopologyError};

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`SimConfig::validate()`] or while building a
/// simulation from a validated config.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// No node classes configured.
    #[error("no node classes configured")]
    NoClasses,
    /// Two classes share a name.
    #[error("duplicate class name '{0}'")]
    DuplicateClass(String),
    /// A class lacks a parameter its role or links require.
    #[error("class '{class}' is missing required parameter '{parameter}'")]
    MissingParameter {
        /// The class.
        class: String,
        /// Name of the missing parameter.
        parameter: &'static str,
    },
    /// A class names a mobility provider that is not registered.
    #[error("class '{class}' names unknown mobility model '{key}'")]
    UnknownMobility {
        /// The class.
        class: String,
        /// The unregistered key.
        key: String,
    },
    /// A class refers to a class that does not exist.
    #[error("class '{class}' refers to unknown class '{reference}'")]
    UnknownClass {
        /// The referring class.
        class: String,
        /// The missing class name.
        reference: String,
    },
    /// A node was requested for a class that is not configured.
    #[error("no class named '{0}'")]
    NoSuchClass(String),
    /// A distance-bounded link rule exists but no threshold is set.
    #[error("distance_threshold is required by a link between bounded classes")]
    MissingDistanceThreshold,
    /// Distance threshold is NaN, infinite, zero or negative.
    #[error("distance_threshold must be finite and positive, got {0}")]
    InvalidDistanceThreshold(f64),
    /// Bandwidth is NaN, infinite, zero or negative.
    #[error("class '{class}' bandwidth must be finite and positive, got {value}")]
    InvalidBandwidth {
        /// The class.
        class: String,
        /// The invalid value.
        value: f64,
    },
    /// Generation rate is NaN, infinite or negative.
    #[error("class '{class}' generation_rate must be finite and non-negative, got {value}")]
    InvalidGenerationRate {
        /// The class.
        class: String,
        /// The invalid value.
        value: f64,
    },
    /// A packet size of zero bytes.
    #[error("packet size must be positive ({context})")]
    InvalidPacketSize {
        /// `global` or the class name.
        context: String,
    },
    /// Duration is NaN, infinite, zero or negative.
    #[error("duration must be finite and positive, got {0}")]
    InvalidDuration(f64),
    /// Link refresh period is zero.
    #[error("link_refresh_period must be at least 1")]
    InvalidRefreshPeriod,
    /// Area dimensions are NaN, infinite or negative.
    #[error("area dimensions must be finite and non-negative")]
    InvalidArea,
    /// A search limit is zero.
    #[error("{0} must be at least 1")]
    InvalidLimit(&'static str),
    /// `Explicit` initial positions do not match the class count.
    #[error("class '{class}' has {count} nodes but {positions} explicit positions")]
    PositionCountMismatch {
        /// The class.
        class: String,
        /// Configured node count.
        count: usize,
        /// Number of positions supplied.
        positions: usize,
    },
    /// Decision policies are only supported on relay classes.
    #[error("class '{0}' has a decision policy but is not a relay")]
    PolicyRequiresRelay(String),
    /// Graph construction failed.
    #[error("topology: {0}")]
    Topology(#[from] TopologyError),
}

// ── InitialPosition ────────────────────────────────────────────────

/// Where a class's members start.
#[derive(Clone, Debug, PartialEq)]
pub enum InitialPosition {
    /// Every member at the same point.
    Fixed(Position),
    /// One position per member, in creation order.
    Explicit(Vec<Position>),
    /// Uniformly random over the configured area, at a fixed altitude.
    /// Drawn from the simulation seed.
    UniformInArea {
        /// Altitude in metres.
        altitude: f64,
    },
}

impl Default for InitialPosition {
    fn default() -> Self {
        Self::Fixed(Position::default())
    }
}

// ── IterationOrder ─────────────────────────────────────────────────

/// Order in which nodes compute their plans within a tick.
///
/// Results never depend on it; it exists so that independence can be
/// checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IterationOrder {
    /// Ascending node id.
    #[default]
    Forward,
    /// Descending node id.
    Reverse,
}

// ── DecisionPolicyConfig ───────────────────────────────────────────

/// Builds one decision provider per policy node.
pub type DecisionFactory = Arc<dyn Fn(NodeId) -> Box<dyn DecisionProvider> + Send + Sync>;

/// Forwarding policy attached to a relay class.
#[derive(Clone)]
pub struct DecisionPolicyConfig {
    /// Called once per member node.
    pub factory: DecisionFactory,
    /// Class whose members are offload targets.
    pub offload_class: String,
}

impl DecisionPolicyConfig {
    /// Policy built by `factory`, offloading to `offload_class`.
    pub fn new<F>(offload_class: impl Into<String>, factory: F) -> Self
    where
        F: Fn(NodeId) -> Box<dyn DecisionProvider> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            offload_class: offload_class.into(),
        }
    }
}

impl fmt::Debug for DecisionPolicyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionPolicyConfig")
            .field("offload_class", &self.offload_class)
            .finish_non_exhaustive()
    }
}

// ── MobilityRegistry ───────────────────────────────────────────────

/// Builds a mobility provider for a node, given the simulation seed.
pub type MobilityFactory = Arc<dyn Fn(NodeId, u64) -> Box<dyn MobilityProvider> + Send + Sync>;

/// Named mobility providers that classes can refer to.
///
/// [`MobilityRegistry::default`] contains `STATIC`, `LINEAR_X` and
/// `RANDOM`.
#[derive(Clone)]
pub struct MobilityRegistry {
    factories: IndexMap<String, MobilityFactory>,
}

impl MobilityRegistry {
    /// Registry with no entries.
    pub fn empty() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// Add or replace `key`.
    pub fn register<F>(&mut self, key: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(NodeId, u64) -> Box<dyn MobilityProvider> + Send + Sync + 'static,
    {
        self.factories.insert(key.into(), Arc::new(factory));
        self
    }

    /// True if `key` is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Instantiate `key` for `node`.
    pub fn build(&self, key: &str, node: NodeId, seed: u64) -> Option<Box<dyn MobilityProvider>> {
        self.factories.get(key).map(|f| f(node, seed))
    }

    /// Registered keys, in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for MobilityRegistry {
    fn default() -> Self {
        let mut r = Self::empty();
        r.register("STATIC", |_, _| Box::new(Stationary))
            .register("LINEAR_X", |_, _| Box::new(LinearDrift::along_x(DEFAULT_SPEED)))
            .register("RANDOM", |_, seed| Box::new(RandomWalk::new(DEFAULT_SPEED, seed)));
        r
    }
}

impl fmt::Debug for MobilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

// ── NodeClassConfig ────────────────────────────────────────────────

/// One class of nodes (ground stations, UAV relays, satellites, ...).
#[derive(Clone, Debug)]
pub struct NodeClassConfig {
    /// Unique name, used by `connected_to` and offload references.
    pub name: String,
    /// Role of every member.
    pub role: Role,
    /// Members created at build time.
    pub count: usize,
    /// Where members start.
    pub initial_position: InitialPosition,
    /// Bytes per second generated by each member. Required for sources.
    pub generation_rate: Option<f64>,
    /// Bytes per generated packet. Falls back to the global packet size.
    pub packet_size: Option<u64>,
    /// Buffer capacity in bytes. `None` is unbounded.
    pub buffer_size: Option<u64>,
    /// Mobility registry key. `None` is stationary.
    pub mobility: Option<String>,
    /// Classes this class may link to.
    pub connected_to: Vec<String>,
    /// Bandwidth of this class's links, in bytes per second. Required
    /// when `connected_to` is non-empty.
    pub downlink_bandwidth: Option<f64>,
    /// Whether this class's links obey the distance threshold.
    pub link_range: LinkRange,
    /// Forwarding policy. Relays only.
    pub decision: Option<DecisionPolicyConfig>,
}

impl NodeClassConfig {
    /// A stationary, unbounded class at the origin with no links.
    pub fn new(name: impl Into<String>, role: Role, count: usize) -> Self {
        Self {
            name: name.into(),
            role,
            count,
            initial_position: InitialPosition::default(),
            generation_rate: None,
            packet_size: None,
            buffer_size: None,
            mobility: None,
            connected_to: Vec::new(),
            downlink_bandwidth: None,
            link_range: LinkRange::Bounded,
            decision: None,
        }
    }

    /// Set the starting positions.
    pub fn at(mut self, initial_position: InitialPosition) -> Self {
        self.initial_position = initial_position;
        self
    }

    /// Set the generation rate in bytes per second.
    pub fn generating(mut self, rate: f64) -> Self {
        self.generation_rate = Some(rate);
        self
    }

    /// Override the global packet size.
    pub fn packet_size(mut self, bytes: u64) -> Self {
        self.packet_size = Some(bytes);
        self
    }

    /// Bound the buffer.
    pub fn buffer(mut self, bytes: u64) -> Self {
        self.buffer_size = Some(bytes);
        self
    }

    /// Attach a mobility registry key.
    pub fn moving(mut self, key: impl Into<String>) -> Self {
        self.mobility = Some(key.into());
        self
    }

    /// Allow links to `class` at this class's downlink bandwidth.
    pub fn links_to(mut self, class: impl Into<String>) -> Self {
        self.connected_to.push(class.into());
        self
    }

    /// Set the downlink bandwidth in bytes per second.
    pub fn bandwidth(mut self, bytes_per_second: f64) -> Self {
        self.downlink_bandwidth = Some(bytes_per_second);
        self
    }

    /// Set the link range.
    pub fn range(mut self, range: LinkRange) -> Self {
        self.link_range = range;
        self
    }

    /// Attach a forwarding policy.
    pub fn policy(mut self, decision: DecisionPolicyConfig) -> Self {
        self.decision = Some(decision);
        self
    }
}

// ── GlobalConfig ───────────────────────────────────────────────────

/// Parameters shared by every class.
#[derive(Clone, Debug)]
pub struct GlobalConfig {
    /// Width and depth of the simulated area, in metres.
    pub area: (f64, f64),
    /// Bytes per packet, for link tick values and classes without their own.
    pub packet_size: u64,
    /// Ticks between topology refreshes. Default: 10.
    pub link_refresh_period: u64,
    /// Simulated run length in seconds.
    pub duration: f64,
    /// Link distance limit for bounded classes, in metres.
    pub distance_threshold: Option<f64>,
    /// Seed for every random stream in the run.
    pub seed: u64,
    /// Destinations a source spreads its traffic over. Default: 6.
    pub max_destinations: usize,
    /// Destination draws before a generation is abandoned. Default: 20.
    pub max_route_attempts: u32,
    /// Plan-phase iteration order.
    pub iteration_order: IterationOrder,
    /// Keep a [`PacketOutcome`](skymesh_core::PacketOutcome) for every
    /// resolved packet in the run statistics.
    pub retain_packet_records: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            area: (1000.0, 1000.0),
            packet_size: 500,
            link_refresh_period: 10,
            duration: 60.0,
            distance_threshold: None,
            seed: 0,
            max_destinations: 6,
            max_route_attempts: 20,
            iteration_order: IterationOrder::Forward,
            retain_packet_records: false,
        }
    }
}

// ── SimConfig ──────────────────────────────────────────────────────

/// Complete configuration for constructing a simulation.
#[derive(Clone, Debug, Default)]
pub struct SimConfig {
    /// Shared parameters.
    pub global: GlobalConfig,
    /// Node classes. `ClassId(n)` is `classes[n]`.
    pub classes: Vec<NodeClassConfig>,
    /// Providers that `NodeClassConfig::mobility` keys resolve against.
    pub mobility: MobilityRegistry,
}

impl SimConfig {
    /// Config with `global` parameters and no classes.
    pub fn new(global: GlobalConfig) -> Self {
        Self {
            global,
            classes: Vec::new(),
            mobility: MobilityRegistry::default(),
        }
    }

    /// Append a class.
    pub fn with_class(mut self, class: NodeClassConfig) -> Self {
        self.classes.push(class);
        self
    }

    /// Index of the class named `name`.
    pub fn class_index(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|c| c.name == name)
    }

    /// Validate all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.global;
        // 1. Global scalars.
        if g.packet_size == 0 {
            return Err(ConfigError::InvalidPacketSize {
                context: "global".to_string(),
            });
        }
        if !g.duration.is_finite() || g.duration <= 0.0 {
            return Err(ConfigError::InvalidDuration(g.duration));
        }
        if g.link_refresh_period == 0 {
            return Err(ConfigError::InvalidRefreshPeriod);
        }
        let (w, d) = g.area;
        if !w.is_finite() || !d.is_finite() || w < 0.0 || d < 0.0 {
            return Err(ConfigError::InvalidArea);
        }
        if let Some(t) = g.distance_threshold {
            if !t.is_finite() || t <= 0.0 {
                return Err(ConfigError::InvalidDistanceThreshold(t));
            }
        }
        if g.max_destinations == 0 {
            return Err(ConfigError::InvalidLimit("max_destinations"));
        }
        if g.max_route_attempts == 0 {
            return Err(ConfigError::InvalidLimit("max_route_attempts"));
        }

        // 2. Classes exist and are uniquely named.
        if self.classes.is_empty() {
            return Err(ConfigError::NoClasses);
        }
        for (i, class) in self.classes.iter().enumerate() {
            if self.classes[..i].iter().any(|c| c.name == class.name) {
                return Err(ConfigError::DuplicateClass(class.name.clone()));
            }
        }

        // 3. Per-class parameters.
        for class in &self.classes {
            self.validate_class(class)?;
        }

        // 4. Bounded links need a threshold.
        if g.distance_threshold.is_none() && self.connectivity_policy().needs_threshold() {
            return Err(ConfigError::MissingDistanceThreshold);
        }
        Ok(())
    }

    fn validate_class(&self, class: &NodeClassConfig) -> Result<(), ConfigError> {
        let name = || class.name.clone();
        if class.role == Role::Source {
            match class.generation_rate {
                None => {
                    return Err(ConfigError::MissingParameter {
                        class: name(),
                        parameter: "generation_rate",
                    })
                }
                Some(rate) if !rate.is_finite() || rate < 0.0 => {
                    return Err(ConfigError::InvalidGenerationRate {
                        class: name(),
                        value: rate,
                    })
                }
                Some(_) => {}
            }
        }
        if class.packet_size == Some(0) {
            return Err(ConfigError::InvalidPacketSize { context: name() });
        }
        if let Some(key) = &class.mobility {
            if !self.mobility.contains(key) {
                return Err(ConfigError::UnknownMobility {
                    class: name(),
                    key: key.clone(),
                });
            }
        }
        if !class.connected_to.is_empty() {
            match class.downlink_bandwidth {
                None => {
                    return Err(ConfigError::MissingParameter {
                        class: name(),
                        parameter: "downlink_bandwidth",
                    })
                }
                Some(bw) if !bw.is_finite() || bw <= 0.0 => {
                    return Err(ConfigError::InvalidBandwidth {
                        class: name(),
                        value: bw,
                    })
                }
                Some(_) => {}
            }
        }
        for target in &class.connected_to {
            if self.class_index(target).is_none() {
                return Err(ConfigError::UnknownClass {
                    class: name(),
                    reference: target.clone(),
                });
            }
        }
        if let InitialPosition::Explicit(positions) = &class.initial_position {
            if positions.len() != class.count {
                return Err(ConfigError::PositionCountMismatch {
                    class: name(),
                    count: class.count,
                    positions: positions.len(),
                });
            }
        }
        if let Some(policy) = &class.decision {
            if class.role != Role::Relay {
                return Err(ConfigError::PolicyRequiresRelay(name()));
            }
            if self.class_index(&policy.offload_class).is_none() {
                return Err(ConfigError::UnknownClass {
                    class: name(),
                    reference: policy.offload_class.clone(),
                });
            }
        }
        Ok(())
    }

    /// Link rules derived from every class's `connected_to`.
    ///
    /// Unknown class names are skipped; [`validate()`](Self::validate)
    /// rejects them first.
    pub fn connectivity_policy(&self) -> ConnectivityPolicy {
        let mut policy = ConnectivityPolicy::new(self.global.distance_threshold);
        for (i, class) in self.classes.iter().enumerate() {
            let from = class_id(i);
            policy.set_range(from, class.link_range);
            let Some(bandwidth) = class.downlink_bandwidth else {
                continue;
            };
            for target in &class.connected_to {
                if let Some(j) = self.class_index(target) {
                    policy.add_rule(from, class_id(j), bandwidth);
                }
            }
        }
        policy
    }

    /// Packet size used by members of class `index`.
    pub fn packet_size_for(&self, index: usize) -> u64 {
        self.classes
            .get(index)
            .and_then(|c| c.packet_size)
            .unwrap_or(self.global.packet_size)
    }
}

/// `ClassId` for the class at `index`.
pub(crate) fn class_id(index: usize) -> skymesh_core::ClassId {
    skymesh_core::ClassId(u32::try_from(index).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skymesh_core::AlwaysForward;

    fn valid_config() -> SimConfig {
        SimConfig::new(GlobalConfig {
            distance_threshold: Some(100.0),
            ..GlobalConfig::default()
        })
        .with_class(
            NodeClassConfig::new("ground", Role::Source, 2)
                .generating(500.0)
                .links_to("uav")
                .bandwidth(1000.0),
        )
        .with_class(NodeClassConfig::new("uav", Role::Relay, 1).moving("RANDOM"))
        .with_class(NodeClassConfig::new("sink", Role::Destination, 1))
    }

    #[test]
    fn validate_valid_config_succeeds() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_no_classes_fails() {
        let cfg = SimConfig::new(GlobalConfig::default());
        match cfg.validate() {
            Err(ConfigError::NoClasses) => {}
            other => panic!("expected NoClasses, got {other:?}"),
        }
    }

    #[test]
    fn validate_duplicate_class_fails() {
        let cfg = valid_config().with_class(NodeClassConfig::new("uav", Role::Relay, 1));
        match cfg.validate() {
            Err(ConfigError::DuplicateClass(name)) => assert_eq!(name, "uav"),
            other => panic!("expected DuplicateClass, got {other:?}"),
        }
    }

    #[test]
    fn validate_source_without_rate_fails() {
        let mut cfg = valid_config();
        cfg.classes[0].generation_rate = None;
        match cfg.validate() {
            Err(ConfigError::MissingParameter {
                parameter: "generation_rate",
                ..
            }) => {}
            other => panic!("expected MissingParameter, got {other:?}"),
        }
    }

    #[test]
    fn validate_links_without_bandwidth_fails() {
        let mut cfg = valid_config();
        cfg.classes[0].downlink_bandwidth = None;
        match cfg.validate() {
            Err(ConfigError::MissingParameter {
                parameter: "downlink_bandwidth",
                ..
            }) => {}
            other => panic!("expected MissingParameter, got {other:?}"),
        }
    }

    #[test]
    fn validate_zero_bandwidth_fails() {
        let mut cfg = valid_config();
        cfg.classes[0].downlink_bandwidth = Some(0.0);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidBandwidth { .. })
        ));
    }

    #[test]
    fn validate_unknown_mobility_fails() {
        let mut cfg = valid_config();
        cfg.classes[1].mobility = Some("TELEPORT".into());
        match cfg.validate() {
            Err(ConfigError::UnknownMobility { key, .. }) => assert_eq!(key, "TELEPORT"),
            other => panic!("expected UnknownMobility, got {other:?}"),
        }
    }

    #[test]
    fn validate_unknown_link_target_fails() {
        let cfg = valid_config().with_class(
            NodeClassConfig::new("sat", Role::Relay, 1)
                .links_to("moon")
                .bandwidth(10.0),
        );
        match cfg.validate() {
            Err(ConfigError::UnknownClass { reference, .. }) => assert_eq!(reference, "moon"),
            other => panic!("expected UnknownClass, got {other:?}"),
        }
    }

    #[test]
    fn validate_missing_threshold_fails() {
        let mut cfg = valid_config();
        cfg.global.distance_threshold = None;
        match cfg.validate() {
            Err(ConfigError::MissingDistanceThreshold) => {}
            other => panic!("expected MissingDistanceThreshold, got {other:?}"),
        }
    }

    #[test]
    fn unbounded_links_need_no_threshold() {
        let mut cfg = valid_config();
        cfg.global.distance_threshold = None;
        cfg.classes[1].link_range = LinkRange::Unbounded;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_scalars() {
        let mut cfg = valid_config();
        cfg.global.duration = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidDuration(_))));

        let mut cfg = valid_config();
        cfg.global.packet_size = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidPacketSize { .. })
        ));

        let mut cfg = valid_config();
        cfg.global.link_refresh_period = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidRefreshPeriod));

        let mut cfg = valid_config();
        cfg.global.max_route_attempts = 0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidLimit("max_route_attempts"))
        );
    }

    #[test]
    fn validate_position_count_mismatch_fails() {
        let mut cfg = valid_config();
        cfg.classes[0].initial_position = InitialPosition::Explicit(vec![Position::default()]);
        match cfg.validate() {
            Err(ConfigError::PositionCountMismatch {
                count: 2,
                positions: 1,
                ..
            }) => {}
            other => panic!("expected PositionCountMismatch, got {other:?}"),
        }
    }

    #[test]
    fn validate_policy_on_source_fails() {
        let mut cfg = valid_config();
        cfg.classes[0].decision = Some(DecisionPolicyConfig::new("uav", |_| {
            Box::new(AlwaysForward) as Box<dyn DecisionProvider>
        }));
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::PolicyRequiresRelay("ground".into()))
        );
    }

    #[test]
    fn connectivity_policy_from_classes() {
        let policy = valid_config().connectivity_policy();
        assert_eq!(policy.rules().len(), 1);
        assert_eq!(
            policy.rule_bandwidth(skymesh_core::ClassId(1), skymesh_core::ClassId(0)),
            Some(1000.0)
        );
    }

    #[test]
    fn default_registry_has_builtins() {
        let r = MobilityRegistry::default();
        assert_eq!(r.keys().collect::<Vec<_>>(), vec!["STATIC", "LINEAR_X", "RANDOM"]);
        assert!(r.build("LINEAR_X", NodeId(0), 1).is_some());
        assert!(r.build("ORBIT", NodeId(0), 1).is_none());
    }
}
