//! Health projection over the scheduler's job list

use serde::Serialize;

use crate::scheduler::JobInfo;

/// Overall daemon health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthState {
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "WARN")]
    Warn,
}

/// Health report served on `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthInfo {
    pub status: HealthState,
    pub jobs: Vec<JobInfo>,
}

/// A daemon is healthy while its full job set is still scheduled; a job that
/// dropped out of the schedule is the one internal fault worth surfacing.
pub fn evaluate(jobs: Vec<JobInfo>, expected_jobs: usize) -> HealthInfo {
    let status = if jobs.len() == expected_jobs {
        HealthState::Up
    } else {
        HealthState::Warn
    };
    HealthInfo { status, jobs }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str) -> JobInfo {
        JobInfo {
            name: name.to_string(),
            interval_seconds: 60,
            last_run: None,
            next_run: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn full_job_set_is_up() {
        let info = evaluate(vec![job("a"), job("b")], 2);
        assert_eq!(info.status, HealthState::Up);
        assert_eq!(info.jobs.len(), 2);
    }

    #[test]
    fn missing_jobs_warn() {
        let info = evaluate(vec![job("a")], 2);
        assert_eq!(info.status, HealthState::Warn);
    }

    #[test]
    fn surplus_jobs_warn_too() {
        let info = evaluate(vec![job("a"), job("b"), job("c")], 2);
        assert_eq!(info.status, HealthState::Warn);
    }

    #[test]
    fn status_serializes_to_operator_words() {
        assert_eq!(
            serde_json::to_value(HealthState::Up).unwrap(),
            serde_json::json!("UP")
        );
        assert_eq!(
            serde_json::to_value(HealthState::Warn).unwrap(),
            serde_json::json!("WARN")
        );
    }
}
