//! Fixed-delay retry for flaky storage reads.

use std::time::Duration;

use eop_store::StoreError;
use serde::{Deserialize, Serialize};

use crate::error::{FillError, Result};

/// How often, and how patiently, a failed read is retried.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Pause between attempts.
    #[serde(with = "secs_f64", rename = "delay_secs")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 50, delay: Duration::from_secs(5) }
    }
}

impl RetryPolicy {
    /// Retry up to `max_attempts` times with no pause.
    pub fn immediate(max_attempts: u32) -> Self {
        Self { max_attempts, delay: Duration::ZERO }
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent.
    ///
    /// Exhaustion is reported as [`FillError::DataUnavailable`] carrying the
    /// last error; non-transient errors propagate unchanged.
    pub fn run<T, F>(&self, file: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> std::result::Result<T, StoreError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err.into()),
                Err(err) if attempt >= attempts => {
                    return Err(FillError::DataUnavailable {
                        file: file.to_string(),
                        attempts,
                        source: err,
                    });
                }
                Err(err) => {
                    log::warn!(
                        "read attempt {attempt}/{attempts} for {file} failed ({err}); \
                         retrying in {:?}",
                        self.delay
                    );
                    if !self.delay.is_zero() {
                        std::thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

mod secs_f64 {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flaky() -> StoreError {
        StoreError::Unavailable("xrootd timeout".into())
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::immediate(5);
        let mut calls = 0;
        let out = policy
            .run("mc/361020.parquet", |attempt| {
                calls += 1;
                if attempt < 3 { Err(flaky()) } else { Ok(attempt) }
            })
            .unwrap();
        assert_eq!(out, 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn exhaustion_is_data_unavailable() {
        let policy = RetryPolicy::immediate(50);
        let mut calls = 0;
        let err = policy
            .run("mc/361020.parquet", |_| -> std::result::Result<(), _> {
                calls += 1;
                Err(flaky())
            })
            .unwrap_err();
        assert_eq!(calls, 50);
        match err {
            FillError::DataUnavailable { file, attempts, .. } => {
                assert_eq!(file, "mc/361020.parquet");
                assert_eq!(attempts, 50);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn permanent_errors_not_retried() {
        let policy = RetryPolicy::immediate(10);
        let mut calls = 0;
        let err = policy
            .run("data.parquet", |_| -> std::result::Result<(), _> {
                calls += 1;
                Err(StoreError::MissingBranch("trk_p".into()))
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, FillError::Store(StoreError::MissingBranch(_))));
    }

    #[test]
    fn default_budget() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 50);
        assert_eq!(p.delay, Duration::from_secs(5));
    }

    #[test]
    fn serde_delay_in_seconds() {
        let p: RetryPolicy =
            serde_json::from_str(r#"{"max_attempts": 3, "delay_secs": 0.25}"#).unwrap();
        assert_eq!(p, RetryPolicy { max_attempts: 3, delay: Duration::from_millis(250) });
    }
}
