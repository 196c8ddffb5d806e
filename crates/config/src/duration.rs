//! Duration fields that accept either integer milliseconds or humantime text.
//!
//! Env expansion coerces `${FLUSH:1000}` to an integer, while hand-written
//! configs read better as `"1s"`. Both forms deserialize to `Duration`.
//!
//! ```yaml
//! flush_time: 1000      # milliseconds
//! flush_time: "1s"      # humantime
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Raw {
    Millis(u64),
    Text(String),
}

pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    humantime_serde::serialize(value, serializer)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
        Raw::Text(text) => humantime_serde::re::humantime::parse_duration(&text)
            .map_err(serde::de::Error::custom),
    }
}
