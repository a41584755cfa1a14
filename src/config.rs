use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mongodb_uri: Option<String>,
    pub database: String,
    pub bind: String,
    pub secret: String,
    pub sync_interval: Duration,
    pub alarm_interval: Duration,
    pub alarm_lead: chrono::Duration,
    pub payment_limit: f64,
    pub max_document_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Ok(Config {
            mongodb_uri: get("MONGODB_URI"),
            database: get("FINTRACK_DB").unwrap_or_else(|| "fintrack".to_string()),
            bind: get("FINTRACK_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            secret: get("FINTRACK_SECRET").ok_or(ConfigError::Missing("FINTRACK_SECRET"))?,
            sync_interval: Duration::from_secs(parse(&get, "FINTRACK_SYNC_SECS", 5)?),
            alarm_interval: Duration::from_secs(parse(&get, "FINTRACK_ALARM_SECS", 30)?),
            alarm_lead: lead_minutes(&get)?,
            payment_limit: parse(&get, "FINTRACK_PAYMENT_LIMIT", 5000.0)?,
            max_document_bytes: parse(&get, "FINTRACK_MAX_DOCUMENT_BYTES", 5 * 1024 * 1024)?,
        })
    }
}

fn lead_minutes(get: &impl Fn(&str) -> Option<String>) -> Result<chrono::Duration, ConfigError> {
    const NAME: &str = "FINTRACK_ALARM_LEAD_MINUTES";
    let minutes: i64 = parse(get, NAME, 0)?;
    chrono::Duration::try_minutes(minutes).ok_or_else(|| ConfigError::Invalid {
        name: NAME,
        value: minutes.to_string(),
    })
}

fn parse<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_to_memory_backend() {
        let config = Config::from_lookup(lookup(&[("FINTRACK_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.mongodb_uri, None);
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!(config.alarm_interval, Duration::from_secs(30));
        assert_eq!(config.payment_limit, 5000.0);
    }

    #[test]
    fn secret_is_required() {
        let err = Config::from_lookup(lookup(&[("MONGODB_URI", "mongodb://db")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("FINTRACK_SECRET"));
    }

    #[test]
    fn out_of_range_lead_time_is_invalid() {
        let err = Config::from_lookup(lookup(&[
            ("FINTRACK_SECRET", "s3cret"),
            ("FINTRACK_ALARM_LEAD_MINUTES", "9223372036854775807"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "FINTRACK_ALARM_LEAD_MINUTES",
                ..
            }
        ));

        let config = Config::from_lookup(lookup(&[
            ("FINTRACK_SECRET", "s3cret"),
            ("FINTRACK_ALARM_LEAD_MINUTES", "15"),
        ]))
        .unwrap();
        assert_eq!(config.alarm_lead, chrono::Duration::minutes(15));
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let err = Config::from_lookup(lookup(&[
            ("FINTRACK_SECRET", "s3cret"),
            ("FINTRACK_SYNC_SECS", "soon"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "FINTRACK_SYNC_SECS",
                value: "soon".into()
            }
        );
    }
}
