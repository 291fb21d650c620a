//! Job identifier types with proper encapsulation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Characters that are not safe inside a file name or container path.
const PATH_UNSAFE: [char; 2] = ['/', ':'];

/// Replace every path-unsafe separator in a pair name with `_`.
///
/// `ETH/USDT:USDT` becomes `ETH_USDT_USDT`.
#[must_use]
pub fn safe_name(pair: &str) -> String {
    pair.replace(PATH_UNSAFE, "_")
}

/// Job identifier - newtype for type safety.
///
/// Holds the sanitized form of a pair name so it can be embedded in overlay
/// file names, log paths and model identifiers. The inner String is private
/// to ensure all construction goes through [`JobKey::from_pair`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobKey(String);

impl JobKey {
    /// Derive the job key for a trading pair.
    pub fn from_pair(pair: &str) -> Self {
        Self(safe_name(pair))
    }

    /// Get the job key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobKey {
    fn from(pair: &str) -> Self {
        Self::from_pair(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_name_replaces_slash_and_colon() {
        assert_eq!(safe_name("ETH/USDT:USDT"), "ETH_USDT_USDT");
        assert_eq!(safe_name("BTC/USDT"), "BTC_USDT");
        assert_eq!(safe_name("PLAIN"), "PLAIN");
    }

    #[test]
    fn job_key_is_sanitized() {
        let key = JobKey::from_pair("SOL/USDT:USDT");
        assert_eq!(key.as_str(), "SOL_USDT_USDT");
        assert_eq!(key.to_string(), "SOL_USDT_USDT");
    }

    #[test]
    fn distinct_pairs_map_to_distinct_keys() {
        assert_ne!(JobKey::from("BTC/USDT"), JobKey::from("BTC/USDC"));
        assert_eq!(JobKey::from("BTC/USDT"), JobKey::from("BTC/USDT"));
    }
}
