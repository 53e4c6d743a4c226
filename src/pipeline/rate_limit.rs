use std::time::Instant;

/// Token bucket admitting up to `capacity` entries per second.
///
/// Starts full, so a burst of `capacity` entries is admitted immediately.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate_per_second: f64) -> Self {
        Self::new_at(rate_per_second, Instant::now())
    }

    pub fn new_at(rate_per_second: f64, now: Instant) -> Self {
        Self {
            capacity: rate_per_second,
            tokens: rate_per_second,
            last_refill: now,
        }
    }

    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Refill for the time elapsed since the last check, then take one token if available.
    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.capacity).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_burst_within_one_second() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new_at(2.0, start);

        let admitted = (0..5)
            .filter(|i| bucket.try_acquire_at(start + Duration::from_millis(*i * 10)))
            .count();

        assert_eq!(admitted, 2);
    }

    #[test]
    fn test_refill_after_wait() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new_at(2.0, start);

        assert!(bucket.try_acquire_at(start));
        assert!(bucket.try_acquire_at(start));
        assert!(!bucket.try_acquire_at(start));

        // Half a second at 2 tokens/s refills exactly one token
        let later = start + Duration::from_millis(500);
        assert!(bucket.try_acquire_at(later));
        assert!(!bucket.try_acquire_at(later));
    }

    #[test]
    fn test_refill_is_capped_at_capacity() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new_at(3.0, start);

        for _ in 0..3 {
            assert!(bucket.try_acquire_at(start));
        }

        let much_later = start + Duration::from_secs(60);
        let admitted = (0..10).filter(|_| bucket.try_acquire_at(much_later)).count();
        assert_eq!(admitted, 3);
    }

    #[test]
    fn test_fractional_rate() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new_at(0.5, start);

        // Capacity below one token admits nothing until refilled past 1
        assert!(!bucket.try_acquire_at(start));
        assert!(bucket.tokens() < 1.0);
        assert_eq!(bucket.capacity(), 0.5);
    }
}
