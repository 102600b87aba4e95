use serde::Serialize;

/// Snapshot of splitter throughput, recomputed on demand from the atomic
/// counters. Never the source of truth for data correctness.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SplitterStatistics {
    /// Total input frames seen by `process`.
    pub frames_processed: u64,

    /// Total blocks distributed.
    pub blocks_processed: u64,

    /// Destinations currently enabled and healthy.
    pub active_destinations: usize,

    /// All registered destinations, enabled or not.
    pub total_destinations: usize,

    /// Running average time spent per `process` call, in microseconds.
    pub average_process_time_us: f64,

    /// Sample rate of the initialized input format (0 if uninitialized).
    pub input_sample_rate: f64,

    /// Channel count of the initialized input format (0 if uninitialized).
    pub input_channels: u16,
}
