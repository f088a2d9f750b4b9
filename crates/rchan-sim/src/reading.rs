//! ---
//! rchan_section: "11-simulation"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Simulated channels and synthetic payloads."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Weather observation produced by a simulated channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    /// Degrees Celsius.
    pub temperature: i32,
    /// Relative humidity, percent.
    pub humidity: u8,
    /// Metres per second.
    pub wind_speed: u8,
    /// Identifier of the channel that produced the reading.
    pub source: String,
    pub observed_at: DateTime<Utc>,
}

impl WeatherReading {
    pub(crate) fn synthetic<R: Rng + ?Sized>(rng: &mut R, source: &str) -> Self {
        Self {
            temperature: rng.gen_range(20..30),
            humidity: rng.gen_range(40..80),
            wind_speed: rng.gen_range(0..30),
            source: source.to_owned(),
            observed_at: rchan_common::time::now_utc(),
        }
    }
}

impl std::fmt::Display for WeatherReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}°C, {}% humidity, wind {} m/s (via {})",
            self.temperature, self.humidity, self.wind_speed, self.source
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn synthetic_values_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let reading = WeatherReading::synthetic(&mut rng, "probe");
            assert!((20..30).contains(&reading.temperature));
            assert!((40..80).contains(&reading.humidity));
            assert!(reading.wind_speed < 30);
            assert_eq!(reading.source, "probe");
        }
    }
}
