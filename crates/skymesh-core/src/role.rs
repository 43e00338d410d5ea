//! Node roles.

use std::fmt;

/// What a node does with traffic. Fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Originates packets and forwards at most one per tick.
    Source,
    /// Forwards packets, one per neighbor per tick.
    Relay,
    /// Sinks packets. Never originates and is never used as a transit hop.
    Destination,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Source => "src",
            Self::Relay => "rel",
            Self::Destination => "dest",
        };
        f.write_str(s)
    }
}
