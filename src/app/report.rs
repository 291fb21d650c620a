//! Fan-in of job results into one run outcome.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use crate::domain::{JobKey, JobResult};

/// Every job succeeded.
pub const EXIT_SUCCESS: i32 = 0;

/// The run completed but at least one job failed.
pub const EXIT_JOB_FAILURES: i32 = 1;

/// The run aborted before dispatch.
pub const EXIT_PRECONDITION: i32 = 2;

/// Results of one run, keyed by job.
///
/// Content depends only on which results were recorded, never on the order
/// they arrived in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    results: BTreeMap<JobKey, JobResult>,
}

impl RunReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: JobResult) {
        self.results.insert(result.key.clone(), result);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results in job-key order.
    pub fn results(&self) -> impl Iterator<Item = &JobResult> {
        self.results.values()
    }

    #[must_use]
    pub fn get(&self, key: &JobKey) -> Option<&JobResult> {
        self.results.get(key)
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.success()).count()
    }

    /// Failed jobs in job-key order.
    #[must_use]
    pub fn failures(&self) -> Vec<&JobResult> {
        self.results.values().filter(|r| !r.success()).collect()
    }

    /// [`EXIT_SUCCESS`] when every job succeeded, else [`EXIT_JOB_FAILURES`].
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.failures().is_empty() {
            EXIT_SUCCESS
        } else {
            EXIT_JOB_FAILURES
        }
    }

    /// Machine-readable summary.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "total": self.len(),
            "succeeded": self.succeeded(),
            "failed": self.failures().len(),
            "exit_code": self.exit_code(),
            "results": self.results.values().collect::<Vec<_>>(),
            "failures": self
                .failures()
                .iter()
                .map(|r| r.pair.as_str())
                .collect::<Vec<_>>(),
        })
    }
}

impl FromIterator<JobResult> for RunReport {
    fn from_iter<I: IntoIterator<Item = JobResult>>(iter: I) -> Self {
        let mut report = Self::new();
        for result in iter {
            report.record(result);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::fixture;

    fn result(pair: &str, code: i32) -> JobResult {
        JobResult::new(&fixture::job(pair), code)
    }

    #[test]
    fn all_ok_exits_zero() {
        let report: RunReport = ["A", "B", "C"].iter().map(|p| result(p, 0)).collect();
        assert_eq!(report.len(), 3);
        assert!(report.failures().is_empty());
        assert_eq!(report.exit_code(), EXIT_SUCCESS);
    }

    #[test]
    fn any_failure_exits_one_and_names_the_job() {
        let report: RunReport = [result("A", 0), result("B", 3), result("C", 0)]
            .into_iter()
            .collect();

        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].pair, "B");
        assert_eq!(failures[0].code, 3);
        assert_eq!(report.exit_code(), EXIT_JOB_FAILURES);
        assert_eq!(report.succeeded(), 2);
    }

    #[test]
    fn content_is_independent_of_arrival_order() {
        let forward: RunReport = [result("A", 0), result("B", 3), result("C", 99)]
            .into_iter()
            .collect();
        let backward: RunReport = [result("C", 99), result("A", 0), result("B", 3)]
            .into_iter()
            .collect();
        assert_eq!(forward, backward);
        assert_eq!(forward.to_json(), backward.to_json());
    }

    #[test]
    fn json_summary_lists_failures() {
        let report: RunReport = [result("A", 0), result("B", 2)].into_iter().collect();
        let json = report.to_json();
        assert_eq!(json["total"], 2);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["exit_code"], 1);
        assert_eq!(json["failures"], serde_json::json!(["B"]));
    }
}
