use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{DbError, WorkloadError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid parameter {name}: {reason}")]
pub struct ParamError {
    pub name: String,
    pub reason: String,
}

impl From<ParamError> for WorkloadError {
    fn from(err: ParamError) -> Self {
        WorkloadError::InvalidParameter {
            name: err.name,
            reason: err.reason,
        }
    }
}

impl From<ParamError> for DbError {
    fn from(err: ParamError) -> Self {
        DbError::Init(err.to_string())
    }
}

/// Free-form `key=value` parameters handed to a plugin at initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, String>);

pub type DbParams = Params;
pub type WorkloadParams = Params;

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn parse<T>(&self, key: &str) -> Result<Option<T>, ParamError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| ParamError {
                name: key.to_string(),
                reason: format!("{raw:?}: {e}"),
            }),
        }
    }

    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ParamError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse(key)?.unwrap_or(default))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Parses a `key=value` pair as given on the command line.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reports_key_and_value() {
        let params = Params::new().with("records", "ten");
        let err = params.parse::<u64>("records").unwrap_err();
        assert_eq!(err.name, "records");
        assert!(err.reason.contains("ten"));
        assert_eq!(params.parse::<u64>("missing"), Ok(None));
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("a = b=c"),
            Ok(("a".to_string(), "b=c".to_string()))
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
