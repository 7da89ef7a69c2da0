//! Duration fields written as `"30s"`, `"5m"` or a bare number of seconds

use std::time::Duration;

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

impl RawDuration {
    fn into_duration<E: serde::de::Error>(self) -> Result<Duration, E> {
        match self {
            Self::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Self::Text(text) => duration_str::parse(text.trim())
                .map_err(|e| E::custom(format!("invalid duration '{text}': {e}"))),
        }
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    RawDuration::deserialize(deserializer)?.into_duration()
}

/// Optional variant of [`deserialize`]; absent or `null` gives `None`
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawDuration>::deserialize(deserializer)?
        .map(RawDuration::into_duration::<D::Error>)
        .transpose()
}
