use std::fmt;

use serde::Serialize;

/// Final measurement for one session, ready for the caller to render or
/// serialize.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Report {
    pub latency_ms: f64,
    pub packet_loss_percent: f64,
    pub jitter_ms: f64,
}

/// Reduce the recorded round-trip samples (seconds) and the session
/// counters into the final report. Jitter is the mean absolute deviation
/// from the average, not a standard deviation. With no samples, latency
/// and jitter are zero while packet loss stays meaningful for `sent > 0`.
pub fn aggregate(sent: u64, received: u64, samples: &[f64]) -> Report {
    let latency_avg = if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    };
    let jitter = if samples.is_empty() {
        0.0
    } else {
        samples.iter().map(|s| (s - latency_avg).abs()).sum::<f64>() / samples.len() as f64
    };
    let packet_loss = if sent == 0 {
        0.0
    } else {
        (sent - received) as f64 / sent as f64
    };

    Report {
        latency_ms: latency_avg * 1000.0,
        packet_loss_percent: packet_loss * 100.0,
        jitter_ms: jitter * 1000.0,
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "latency: {:.2} ms packet loss: {:.2}% jitter: {:.2} ms",
            self.latency_ms, self.packet_loss_percent, self.jitter_ms
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn all_timeouts_yield_zero_latency_and_full_loss() {
        let report = aggregate(20, 0, &[]);
        assert_eq!(report.latency_ms, 0.0);
        assert_eq!(report.jitter_ms, 0.0);
        assert_eq!(report.packet_loss_percent, 100.0);
    }

    #[test]
    fn identical_samples_have_no_jitter() {
        let report = aggregate(4, 4, &[0.025; 4]);
        assert!((report.latency_ms - 25.0).abs() < 1e-9);
        assert_eq!(report.jitter_ms, 0.0);
        assert_eq!(report.packet_loss_percent, 0.0);
    }

    #[test]
    fn mean_and_mean_absolute_deviation() {
        // 10/20/10/20/10 ms: mean 14 ms, deviations 4/6/4/6/4 -> 4.8 ms
        let samples = [0.010, 0.020, 0.010, 0.020, 0.010];
        let report = aggregate(5, 5, &samples);
        assert!((report.latency_ms - 14.0).abs() < 1e-9);
        assert!((report.jitter_ms - 4.8).abs() < 1e-9);
        assert_eq!(report.packet_loss_percent, 0.0);
    }

    #[test]
    fn loss_is_bounded_and_exact() {
        assert_eq!(aggregate(4, 2, &[0.01, 0.01]).packet_loss_percent, 50.0);
        for received in 0..=20u64 {
            let loss = aggregate(20, received, &[]).packet_loss_percent;
            assert!((0.0..=100.0).contains(&loss));
            assert_eq!(loss, 100.0 * (20 - received) as f64 / 20.0);
        }
    }
}
