//! ---
//! rchan_section: "11-simulation"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Simulated channels and synthetic payloads."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::prelude::*;
use rchan_common::config::{ChannelConfig, ChannelStatus};
use rchan_failover::{Channel, FetchError, ProbeError};
use tracing::trace;

use crate::reading::WeatherReading;

#[derive(Debug, Clone, Copy)]
struct Profile {
    fail_probability: f64,
    latency: Duration,
}

/// Channel that sleeps for a configured latency and fails at random.
#[derive(Debug)]
pub struct SimulatedChannel {
    id: String,
    priority: i32,
    initial_status: ChannelStatus,
    profile: Mutex<Profile>,
    rng: Mutex<StdRng>,
}

impl SimulatedChannel {
    pub fn new(id: impl Into<String>, fail_probability: f64, latency: Duration) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            initial_status: ChannelStatus::Idle,
            profile: Mutex::new(Profile {
                fail_probability: clamp_probability(fail_probability),
                latency,
            }),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn from_config(id: impl Into<String>, config: &ChannelConfig) -> Self {
        let channel = Self::new(id, config.fail_probability, config.latency)
            .with_priority(config.priority)
            .with_initial_status(config.initial_status);
        match config.seed {
            Some(seed) => channel.with_seed(seed),
            None => channel,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_initial_status(mut self, status: ChannelStatus) -> Self {
        self.initial_status = status;
        self
    }

    /// Make the random sequence reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    pub fn fail_probability(&self) -> f64 {
        self.profile.lock().fail_probability
    }

    /// Values outside `[0, 1]` are clamped.
    pub fn set_fail_probability(&self, fail_probability: f64) {
        self.profile.lock().fail_probability = clamp_probability(fail_probability);
    }

    pub fn latency(&self) -> Duration {
        self.profile.lock().latency
    }

    pub fn set_latency(&self, latency: Duration) {
        self.profile.lock().latency = latency;
    }

    fn roll(&self) -> f64 {
        self.rng.lock().gen::<f64>()
    }
}

fn clamp_probability(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[async_trait]
impl Channel for SimulatedChannel {
    type Payload = WeatherReading;

    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn initial_status(&self) -> ChannelStatus {
        self.initial_status
    }

    async fn attempt_fetch(&self) -> Result<WeatherReading, FetchError> {
        let profile = *self.profile.lock();
        tokio::time::sleep(profile.latency).await;

        if self.roll() < profile.fail_probability {
            trace!(channel = %self.id, "simulated fetch failure");
            return Err(FetchError::failed(&self.id, "simulated transport error"));
        }
        let reading = {
            let mut rng = self.rng.lock();
            WeatherReading::synthetic(&mut *rng, &self.id)
        };
        Ok(reading)
    }

    async fn attempt_health_check(&self) -> Result<bool, ProbeError> {
        let profile = *self.profile.lock();
        tokio::time::sleep(profile.latency / 2).await;
        Ok(self.roll() >= profile.fail_probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn reliable_channel_returns_reading_after_latency() {
        let channel = SimulatedChannel::new("steady", 0.0, Duration::from_millis(500));
        let started = tokio::time::Instant::now();
        let reading = channel.attempt_fetch().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert_eq!(reading.source, "steady");

        let started = tokio::time::Instant::now();
        assert!(channel.attempt_health_check().await.unwrap());
        assert_eq!(started.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn certain_failure_fails_fetch_and_probe() {
        let channel = SimulatedChannel::new("broken", 1.0, Duration::from_millis(10));
        assert!(matches!(
            channel.attempt_fetch().await,
            Err(FetchError::Failed { ref channel, .. }) if channel == "broken"
        ));
        assert!(!channel.attempt_health_check().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn fault_injection_takes_effect_immediately() {
        let channel = SimulatedChannel::new("tunable", 0.0, Duration::from_millis(10));
        channel.set_fail_probability(4.0);
        assert_eq!(channel.fail_probability(), 1.0);
        assert!(channel.attempt_fetch().await.is_err());

        channel.set_fail_probability(0.0);
        channel.set_latency(Duration::from_millis(40));
        let started = tokio::time::Instant::now();
        assert!(channel.attempt_fetch().await.is_ok());
        assert_eq!(started.elapsed(), Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_channels_are_reproducible() {
        let a = SimulatedChannel::new("seeded", 0.3, Duration::ZERO).with_seed(42);
        let b = SimulatedChannel::new("seeded", 0.3, Duration::ZERO).with_seed(42);
        for _ in 0..20 {
            let left = a.attempt_fetch().await.map(|r| (r.temperature, r.humidity));
            let right = b.attempt_fetch().await.map(|r| (r.temperature, r.humidity));
            assert_eq!(left, right);
        }
    }

    #[test]
    fn config_carries_priority_and_status() {
        let config = ChannelConfig {
            priority: 2,
            initial_status: ChannelStatus::Unavailable,
            fail_probability: 0.05,
            latency: Duration::from_millis(800),
            seed: Some(1),
        };
        let channel = SimulatedChannel::from_config("Weather.com API", &config);
        assert_eq!(channel.id(), "Weather.com API");
        assert_eq!(channel.priority(), 2);
        assert_eq!(channel.initial_status(), ChannelStatus::Unavailable);
        assert_eq!(channel.latency(), Duration::from_millis(800));
    }
}
