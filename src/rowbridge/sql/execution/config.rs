//! Pipeline tuning knobs.

/// Default capacity of every operator-to-operator message channel.
pub const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Configuration applied when constructing pipeline tasks
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bounded capacity of each task's outbound channel. Backpressure
    /// propagates upstream once a downstream operator falls behind.
    pub channel_buffer_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            channel_buffer_size: DEFAULT_CHANNEL_BUFFER_SIZE,
        }
    }
}
