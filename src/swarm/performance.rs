//! Step timing
//!
//! Keeps a rolling window of step durations against the tick budget so hosts
//! can tell when a simulator is falling behind.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Samples kept in the rolling window (~4 seconds at 30Hz)
const MAX_SAMPLES: usize = 120;
/// Samples required before the status moves off its initial value
const MIN_SAMPLES: usize = 10;

/// Step cost relative to the tick budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum StepStatus {
    /// Under 30% of budget
    Excellent,
    Good,
    /// Over 70% of budget
    Warning,
    /// Over 90% of budget
    Critical,
}

impl StepStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, StepStatus::Warning | StepStatus::Critical)
    }
}

/// Snapshot of the rolling window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepTiming {
    pub status: StepStatus,
    pub average_ms: f64,
    pub p95_ms: f64,
    pub budget_pct: f32,
    pub agents: usize,
}

#[derive(Debug)]
pub struct StepMonitor {
    durations: VecDeque<Duration>,
    budget: Duration,
    excellent_threshold: f32,
    warning_threshold: f32,
    critical_threshold: f32,
    status: StepStatus,
    step_start: Option<Instant>,
    last_agent_count: usize,
}

impl StepMonitor {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            durations: VecDeque::with_capacity(MAX_SAMPLES),
            budget: Duration::from_secs_f32(1.0 / tick_rate.max(1) as f32),
            excellent_threshold: 0.3,
            warning_threshold: 0.7,
            critical_threshold: 0.9,
            status: StepStatus::Excellent,
            step_start: None,
            last_agent_count: 0,
        }
    }

    pub fn step_start(&mut self) {
        self.step_start = Some(Instant::now());
    }

    /// Close the step opened by [`step_start`](Self::step_start)
    pub fn step_end(&mut self, agent_count: usize) {
        if let Some(start) = self.step_start.take() {
            self.record(start.elapsed());
            self.last_agent_count = agent_count;
        }
    }

    pub fn record(&mut self, duration: Duration) {
        self.durations.push_back(duration);
        while self.durations.len() > MAX_SAMPLES {
            self.durations.pop_front();
        }
        self.update_status();
    }

    fn update_status(&mut self) {
        if self.durations.len() < MIN_SAMPLES {
            return;
        }

        let ratio = self.average().as_secs_f32() / self.budget.as_secs_f32();
        let status = if ratio < self.excellent_threshold {
            StepStatus::Excellent
        } else if ratio < self.warning_threshold {
            StepStatus::Good
        } else if ratio < self.critical_threshold {
            StepStatus::Warning
        } else {
            StepStatus::Critical
        };

        if status != self.status {
            if status > self.status && status.is_degraded() {
                tracing::warn!(
                    from = ?self.status,
                    to = ?status,
                    budget_pct = ratio * 100.0,
                    agents = self.last_agent_count,
                    "Simulation step degraded"
                );
            } else {
                tracing::info!(from = ?self.status, to = ?status, "Simulation step status changed");
            }
            self.status = status;
        }
    }

    pub fn average(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.durations.iter().sum();
        sum / self.durations.len() as u32
    }

    /// 95th percentile step duration
    pub fn p95(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<_> = self.durations.iter().copied().collect();
        sorted.sort_unstable();
        let idx = (sorted.len() as f32 * 0.95) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn budget_usage_percent(&self) -> f32 {
        self.average().as_secs_f32() / self.budget.as_secs_f32() * 100.0
    }

    pub fn last_agent_count(&self) -> usize {
        self.last_agent_count
    }

    pub fn timing(&self) -> StepTiming {
        StepTiming {
            status: self.status,
            average_ms: self.average().as_secs_f64() * 1000.0,
            p95_ms: self.p95().as_secs_f64() * 1000.0,
            budget_pct: self.budget_usage_percent(),
            agents: self.last_agent_count,
        }
    }

    pub fn status_message(&self) -> String {
        format!(
            "{:?} - {:.1}% budget, {} agents",
            self.status,
            self.budget_usage_percent(),
            self.last_agent_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_needs_min_samples() {
        let mut monitor = StepMonitor::new(30);
        for _ in 0..MIN_SAMPLES - 1 {
            monitor.record(Duration::from_millis(100));
        }
        assert_eq!(monitor.status(), StepStatus::Excellent);

        monitor.record(Duration::from_millis(100));
        assert_eq!(monitor.status(), StepStatus::Critical);
        assert!(monitor.status().is_degraded());
    }

    #[test]
    fn test_status_levels() {
        // 30Hz budget is ~33.3ms
        let cases = [
            (5, StepStatus::Excellent),
            (15, StepStatus::Good),
            (27, StepStatus::Warning),
            (40, StepStatus::Critical),
        ];
        for (ms, expected) in cases {
            let mut monitor = StepMonitor::new(30);
            for _ in 0..MIN_SAMPLES {
                monitor.record(Duration::from_millis(ms));
            }
            assert_eq!(monitor.status(), expected, "{}ms", ms);
        }
    }

    #[test]
    fn test_window_is_bounded() {
        let mut monitor = StepMonitor::new(30);
        for _ in 0..MAX_SAMPLES {
            monitor.record(Duration::from_millis(50));
        }
        for _ in 0..MAX_SAMPLES {
            monitor.record(Duration::from_millis(1));
        }
        assert_eq!(monitor.average(), Duration::from_millis(1));
        assert_eq!(monitor.status(), StepStatus::Excellent);
    }

    #[test]
    fn test_p95() {
        let mut monitor = StepMonitor::new(30);
        for ms in 1..=100 {
            monitor.record(Duration::from_millis(ms));
        }
        let p95 = monitor.p95();
        assert!(p95 >= Duration::from_millis(95) && p95 <= Duration::from_millis(96));
    }

    #[test]
    fn test_timing_snapshot() {
        let mut monitor = StepMonitor::new(10);
        for _ in 0..MIN_SAMPLES {
            monitor.record(Duration::from_millis(50));
        }

        let timing = monitor.timing();
        assert_eq!(timing.status, StepStatus::Good);
        assert!((timing.average_ms - 50.0).abs() < 1e-6);
        assert!((timing.p95_ms - 50.0).abs() < 1e-6);
        assert!((timing.budget_pct - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_step_timing_records_agents() {
        let mut monitor = StepMonitor::new(30);
        monitor.step_end(5);
        assert_eq!(monitor.last_agent_count(), 0);

        monitor.step_start();
        monitor.step_end(42);
        assert_eq!(monitor.last_agent_count(), 42);
        assert!(monitor.status_message().contains("42 agents"));
    }
}
