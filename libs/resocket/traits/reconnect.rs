use std::time::Duration;

/// Default lower bound of the backoff ladder, before jitter
pub const DEFAULT_MIN_RECONNECTION_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound of the random jitter added to the default lower bound
pub const DEFAULT_MIN_DELAY_JITTER: Duration = Duration::from_millis(4000);

pub const DEFAULT_MAX_RECONNECTION_DELAY: Duration = Duration::from_millis(10_000);

pub const DEFAULT_RECONNECTION_DELAY_GROW_FACTOR: f64 = 1.3;

/// Trait for defining the delay before a retry
///
/// Implement this trait to control how long the session waits in
/// `auth_backoff` / `connection_backoff` before trying again. Any
/// `Fn(u32) -> Duration` closure is a strategy, which is how a custom
/// delay function fully replaces the exponential formula.
pub trait ReconnectionStrategy: Send + Sync {
    /// Get the delay before the next attempt
    ///
    /// # Arguments
    /// * `retry_count` - Consecutive failures so far (auth + connection)
    fn next_delay(&self, retry_count: u32) -> Duration;
}

impl<F> ReconnectionStrategy for F
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn next_delay(&self, retry_count: u32) -> Duration {
        self(retry_count)
    }
}

/// Exponential backoff reconnection strategy
///
/// `delay(0) = 0`, otherwise `min_delay * grow_factor^(n - 1)` capped at
/// `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    grow_factor: f64,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy
    ///
    /// # Arguments
    /// * `min_delay` - Delay after the first failure
    /// * `max_delay` - The maximum delay between attempts
    /// * `grow_factor` - Multiplier applied per additional failure
    pub fn new(min_delay: Duration, max_delay: Duration, grow_factor: f64) -> Self {
        Self {
            min_delay,
            max_delay,
            grow_factor,
        }
    }

    /// Default lower bound: 1s plus up to 4s of random jitter, so that a
    /// fleet of clients dropped at once does not reconnect in lockstep.
    pub fn jittered_min_delay() -> Duration {
        let jitter = rand::random::<f64>() * DEFAULT_MIN_DELAY_JITTER.as_millis() as f64;
        DEFAULT_MIN_RECONNECTION_DELAY + Duration::from_millis(jitter as u64)
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn grow_factor(&self) -> f64 {
        self.grow_factor
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(
            Self::jittered_min_delay(),
            DEFAULT_MAX_RECONNECTION_DELAY,
            DEFAULT_RECONNECTION_DELAY_GROW_FACTOR,
        )
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, retry_count: u32) -> Duration {
        if retry_count == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(retry_count - 1).unwrap_or(i32::MAX);
        let delay_ms = self.min_delay.as_millis() as f64 * self.grow_factor.powi(exponent);
        let max_ms = self.max_delay.as_millis() as f64;

        // powi overflows to infinity long before u64 millis would
        if !delay_ms.is_finite() || delay_ms >= max_ms {
            return self.max_delay;
        }
        Duration::from_millis(delay_ms.round() as u64)
    }
}
