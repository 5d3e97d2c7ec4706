//! Lease duration handling.
//!
//! TTLs travel as whole seconds everywhere they are stored (storage records,
//! lease internal data). Human input accepts either a bare number of seconds
//! or a number with a `d`/`h`/`m`/`s` suffix.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer, Serializer};

/// Parse a TTL like "3600", "1h", "30m" or "7d".
///
/// # Examples
///
/// ```
/// use credbroker::duration::parse_ttl;
/// use std::time::Duration;
///
/// assert_eq!(parse_ttl("90").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_ttl("2h").unwrap(), Duration::from_secs(2 * 60 * 60));
/// assert_eq!(parse_ttl("0").unwrap(), Duration::ZERO);
/// ```
pub fn parse_ttl(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        anyhow::bail!("TTL must not be empty");
    }

    let (num, multiplier) = match s.char_indices().last() {
        Some((idx, 'd')) => (&s[..idx], 24 * 60 * 60),
        Some((idx, 'h')) => (&s[..idx], 60 * 60),
        Some((idx, 'm')) => (&s[..idx], 60),
        Some((idx, 's')) => (&s[..idx], 1),
        _ => (s.as_str(), 1),
    };

    let num: u64 = num
        .parse()
        .with_context(|| format!("Invalid number in TTL {s:?}"))?;
    let secs = num
        .checked_mul(multiplier)
        .context("TTL is too large")?;

    Ok(Duration::from_secs(secs))
}

/// Lease durations are only applied when strictly positive; zero defers to
/// the host default.
pub fn positive(ttl: Duration) -> Option<Duration> {
    (!ttl.is_zero()).then_some(ttl)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSecs {
    Whole(u64),
    // Hosts that round-trip JSON through floats hand back `3600.0`.
    Float(f64),
}

impl RawSecs {
    fn into_duration<E: de::Error>(self) -> Result<Duration, E> {
        match self {
            RawSecs::Whole(secs) => Ok(Duration::from_secs(secs)),
            RawSecs::Float(secs) if secs.is_finite() && secs >= 0.0 && secs.fract() == 0.0 => {
                Ok(Duration::from_secs(secs as u64))
            }
            RawSecs::Float(secs) => Err(E::custom(format!("invalid number of seconds: {secs}"))),
        }
    }
}

/// Serde helpers for a `Duration` stored as whole seconds.
///
/// Use with `#[serde(with = "crate::duration::secs")]`.
pub mod secs {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        RawSecs::deserialize(deserializer)?.into_duration()
    }
}

/// Like [`secs`], for optional durations; `None` is written as `null`.
pub mod opt_secs {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&value.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<RawSecs>::deserialize(deserializer)?
            .map(RawSecs::into_duration)
            .transpose()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTtl {
    Seconds(u64),
    Text(String),
}

/// Serde deserializer for settings values written either as a number of
/// seconds or as a duration string.
pub fn deserialize_ttl<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTtl::deserialize(deserializer)? {
        RawTtl::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawTtl::Text(s) => parse_ttl(&s).map_err(de::Error::custom),
    }
}

/// Optional variant of [`deserialize_ttl`].
///
/// Use with `#[serde(default, deserialize_with = "deserialize_ttl_opt")]`.
pub fn deserialize_ttl_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawTtl> = Option::deserialize(deserializer)?;
    match raw {
        Some(RawTtl::Seconds(secs)) => Ok(Some(Duration::from_secs(secs))),
        Some(RawTtl::Text(s)) => parse_ttl(&s).map(Some).map_err(de::Error::custom),
        None => Ok(None),
    }
}
