//! ---
//! rchan_section: "11-simulation"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Simulated channels and synthetic payloads."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
//! Simulated weather channels used by the daemon and the end-to-end tests.

mod channel;
mod reading;

use std::sync::Arc;

use rchan_common::AppConfig;
use rchan_failover::SharedChannel;

pub use channel::SimulatedChannel;
pub use reading::WeatherReading;

/// Build one simulated channel per configured entry, in declaration order.
pub fn channels_from_config(config: &AppConfig) -> Vec<Arc<SimulatedChannel>> {
    config
        .channels
        .iter()
        .map(|(id, channel)| Arc::new(SimulatedChannel::from_config(id.as_str(), channel)))
        .collect()
}

/// Erase concrete channel types for registration with a data service.
pub fn into_shared(channels: &[Arc<SimulatedChannel>]) -> Vec<SharedChannel<WeatherReading>> {
    channels
        .iter()
        .map(|channel| channel.clone() as SharedChannel<WeatherReading>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rchan_failover::Channel;

    #[test]
    fn builds_channels_in_declaration_order() {
        let config: AppConfig = r#"
            [channels.primary]
            priority = 2
            fail_probability = 0.0

            [channels.backup]
            priority = 1
            initial_status = "unavailable"
        "#
        .parse()
        .unwrap();

        let channels = channels_from_config(&config);
        let ids: Vec<&str> = channels.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["primary", "backup"]);
        assert_eq!(into_shared(&channels).len(), 2);
    }
}
