use std::time::{Duration, SystemTime};

use better_default::Default;
use serde::{Deserialize, Serialize};

use crate::utils::{deserialize_duration, deserialize_system_time, serialize_duration, serialize_system_time};

#[derive(Debug, Clone, Eq, Default, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub ttl: Duration,
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub max_ttl: Duration,
    #[default(true)]
    pub renewable: bool,
    #[default(SystemTime::now())]
    #[serde(serialize_with = "serialize_system_time", deserialize_with = "deserialize_system_time")]
    pub issue_time: SystemTime,
}

impl Lease {
    pub fn new(ttl: Duration, max_ttl: Duration, renewable: bool) -> Self {
        Self { ttl, max_ttl, renewable, ..Default::default() }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn renewable(&self) -> bool {
        self.renewable
    }

    pub fn enabled(&self) -> bool {
        self.ttl.as_secs() > 0
    }

    pub fn expiration_time(&self) -> SystemTime {
        self.issue_time + self.ttl
    }

    /// The latest instant any renewal may push the expiry to.
    pub fn max_expiration_time(&self) -> SystemTime {
        self.issue_time + self.max_ttl
    }
}
