//! Rollout dispatch pacing

use std::time::Duration;

use tokio::time::Instant;

/// Token bucket releasing one dispatch permit per interval.
///
/// Local to the orchestrator, so pacing holds even when the underlying
/// transport applies no rate limiting of its own. The first permit is
/// immediate; each subsequent permit waits out the interval.
pub struct DispatchPacer {
    interval: Duration,
    next_slot: Option<Instant>,
}

impl DispatchPacer {
    /// A pacer allowing at most `max_per_minute` permits per minute.
    /// `max_per_minute = 0` is treated as 1 to keep the rollout moving.
    pub fn new(max_per_minute: u32) -> Self {
        let per_minute = max_per_minute.max(1);
        Self {
            interval: Duration::from_secs_f64(60.0 / per_minute as f64),
            next_slot: None,
        }
    }

    /// Wait until the next dispatch permit is available
    pub async fn acquire(&mut self) {
        let now = Instant::now();
        let slot = match self.next_slot {
            Some(slot) if slot > now => {
                tokio::time::sleep_until(slot).await;
                slot
            }
            _ => now,
        };
        self.next_slot = Some(slot + self.interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_permit_is_immediate() {
        let mut pacer = DispatchPacer::new(60);
        let start = Instant::now();
        pacer.acquire().await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permits_spaced_by_interval() {
        // 60/minute: one permit per second
        let mut pacer = DispatchPacer::new(60);
        let start = Instant::now();
        for _ in 0..4 {
            pacer.acquire().await;
        }
        let elapsed = Instant::now() - start;
        assert!(elapsed >= Duration::from_secs(3), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(4), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rate_clamped() {
        let mut pacer = DispatchPacer::new(0);
        pacer.acquire().await;
        let start = Instant::now();
        pacer.acquire().await;
        assert_eq!(Instant::now() - start, Duration::from_secs(60));
    }
}
