//! Empty / fail-fast / retry classification of HTTP statuses.
//!
//! Every provider integration goes through [`classify_status`], so "confirmed absent"
//! and "failed, try again" never get conflated downstream.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Statuses that mean "no such resource" rather than "bad request".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmptyStatusSet(BTreeSet<u16>);

impl EmptyStatusSet {
    /// The provider-independent default: 404 Not Found and 410 Gone.
    pub const DEFAULT: [u16; 2] = [404, 410];

    pub fn new(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self(statuses.into_iter().collect())
    }

    pub fn contains(&self, status: u16) -> bool {
        self.0.contains(&status)
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }
}

impl Default for EmptyStatusSet {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

/// How a response status is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx: decode the body.
    Value,
    /// Confirmed absent: return an empty result, no retry, no error.
    Empty,
    /// Request defect (other 4xx and anything unexpected): fail without retry.
    FailFast,
    /// 5xx: retry per the retry policy.
    Retry,
}

pub fn classify_status(status: u16, empty: &EmptyStatusSet) -> ResponseClass {
    match status {
        200..=299 => ResponseClass::Value,
        status if empty.contains(status) => ResponseClass::Empty,
        500..=599 => ResponseClass::Retry,
        _ => ResponseClass::FailFast,
    }
}
