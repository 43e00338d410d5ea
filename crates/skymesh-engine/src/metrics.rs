//! Per-tick performance metrics for the tick engine.
//!
//! [`StepMetrics`] captures wall-clock timing for one tick, broken down
//! by phase, plus the packet traffic the tick produced.

/// Timing and traffic metrics collected during a single tick.
///
/// All durations are in microseconds. The engine overwrites these fields
/// on every [`execute_tick`](crate::tick::TickEngine::execute_tick).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepMetrics {
    /// Wall-clock time for the entire tick.
    pub total_us: u64,
    /// Observation and forwarding decisions.
    pub decide_us: u64,
    /// Generation and forward planning across all nodes.
    pub plan_us: u64,
    /// Applying plans, delivery and mobility.
    pub apply_us: u64,
    /// Flushing staging areas into buffers.
    pub queue_us: u64,
    /// Link reconciliation; zero on ticks without a refresh.
    pub topology_us: u64,
    /// Packets created this tick.
    pub generated: u64,
    /// Packets sent over a link this tick.
    pub forwarded: u64,
    /// Packets that reached their destination this tick.
    pub arrived: u64,
    /// Packets dropped this tick.
    pub dropped: u64,
    /// Links added by this tick's refresh.
    pub links_added: u32,
    /// Links removed by this tick's refresh.
    pub links_removed: u32,
}

pub(crate) fn elapsed_us(start: std::time::Instant) -> u64 {
    start.elapsed().as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = StepMetrics::default();
        assert_eq!(m.total_us, 0);
        assert_eq!(m.topology_us, 0);
        assert_eq!(m.generated + m.forwarded + m.arrived + m.dropped, 0);
        assert_eq!(m.links_added + m.links_removed, 0);
    }

    #[test]
    fn elapsed_is_monotone() {
        let start = std::time::Instant::now();
        let a = elapsed_us(start);
        let b = elapsed_us(start);
        assert!(b >= a);
    }
}
