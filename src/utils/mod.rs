//! Miscellaneous public handy functions are collected here, such as random identifier
//! generation and the serde helpers used by stored entries.

use std::time::{Duration, SystemTime};

use humantime::{format_rfc3339, parse_duration, parse_rfc3339};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::{Deserialize, Deserializer, Serializer};

pub mod locks;

pub fn generate_uuid() -> String {
    let mut buf = [0u8; 16];
    thread_rng().fill(&mut buf);

    format!(
        "{}-{}-{}-{}-{}",
        hex::encode(&buf[0..4]),
        hex::encode(&buf[4..6]),
        hex::encode(&buf[6..8]),
        hex::encode(&buf[8..10]),
        hex::encode(&buf[10..16])
    )
}

/// Returns `len` random bytes hex encoded, so the result is `2 * len` chars long.
pub fn random_hex(len: usize) -> String {
    let mut buf = vec![0u8; len];
    thread_rng().fill(buf.as_mut_slice());
    hex::encode(buf)
}

pub fn random_alphanumeric(len: usize) -> String {
    thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

pub fn serialize_system_time<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let formatted = format_rfc3339(*time).to_string();
    serializer.serialize_str(&formatted)
}

pub fn deserialize_system_time<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
where
    D: Deserializer<'de>,
{
    let input: String = Deserialize::deserialize(deserializer)?;
    let parsed_time = parse_rfc3339(&input).map_err(serde::de::Error::custom)?;
    Ok(parsed_time)
}

pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_secs())
}

pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct DurationVisitor;

    impl serde::de::Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a number of seconds or a duration string such as \"90s\" or \"1h\"")
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Duration::from_secs(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            u64::try_from(value).map(Duration::from_secs).map_err(|_| E::custom("duration must not be negative"))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if let Ok(secs) = value.parse::<u64>() {
                return Ok(Duration::from_secs(secs));
            }
            parse_duration(value).map_err(serde::de::Error::custom)
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}

#[cfg(test)]
mod test {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Holder {
        #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
        ttl: Duration,
        #[serde(serialize_with = "serialize_system_time", deserialize_with = "deserialize_system_time")]
        at: SystemTime,
    }

    #[test]
    fn test_generate_uuid() {
        let id = generate_uuid();
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
        assert_ne!(id, generate_uuid());
    }

    #[test]
    fn test_random_strings() {
        assert_eq!(random_hex(8).len(), 16);
        let password = random_alphanumeric(32);
        assert_eq!(password.len(), 32);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_duration_forms() {
        let holder: Holder = serde_json::from_str(r#"{"ttl": "1h", "at": "2024-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(holder.ttl, Duration::from_secs(3600));

        let holder: Holder = serde_json::from_str(r#"{"ttl": 90, "at": "2024-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(holder.ttl, Duration::from_secs(90));

        let holder: Holder = serde_json::from_str(r#"{"ttl": "120", "at": "2024-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(holder.ttl, Duration::from_secs(120));

        assert!(serde_json::from_str::<Holder>(r#"{"ttl": -5, "at": "2024-01-01T00:00:00Z"}"#).is_err());

        let json = serde_json::to_string(&holder).unwrap();
        let back: Holder = serde_json::from_str(&json).unwrap();
        assert_eq!(back.at, holder.at);
    }
}
