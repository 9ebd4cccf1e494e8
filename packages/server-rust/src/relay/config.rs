/// Flow-control settings of the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Tokens every client receives on each consumed filter. A client may
    /// have at most this many frames per filter outstanding with the engines.
    pub num_tokens_per_filter: u32,
    /// Capacity of each engine input queue (in-process transport).
    pub input_queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            num_tokens_per_filter: 2,
            input_queue_capacity: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_config_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.num_tokens_per_filter, 2);
        assert_eq!(config.input_queue_capacity, 2);
    }
}
