//! Serde adapter that writes 64-bit seeds as JSON strings.
//!
//! JSON embedders routinely round-trip numbers through IEEE doubles, which
//! silently corrupts seeds above 2^53. Serializing as a string keeps the full
//! range; deserialization accepts either form.

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(seed: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(seed)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SeedRepr {
        Text(String),
        Raw(u64),
    }

    match SeedRepr::deserialize(deserializer)? {
        SeedRepr::Text(text) => text
            .parse::<u64>()
            .map_err(|err| D::Error::custom(format!("seed is not a u64: {err}"))),
        SeedRepr::Raw(value) => Ok(value),
    }
}
