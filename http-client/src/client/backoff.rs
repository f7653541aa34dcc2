use auto_impl::auto_impl;
use rand::{thread_rng, Rng};
use std::{
    fmt::{self, Debug},
    sync::Arc,
    time::Duration,
};

/// 退避时长获取接口
///
/// 第 `attempt` 次尝试失败后等待多久再发起下一次尝试，
/// 尝试次数从 1 开始计数
#[auto_impl(&, Box, Arc)]
pub trait Backoff: Debug + Send + Sync {
    /// 获取退避时长
    fn backoff(&self, attempt: usize) -> Duration;
}

/// 函数形式的退避策略
#[derive(Clone)]
pub struct BackoffFn(Arc<dyn Fn(usize) -> Duration + Send + Sync>);

impl BackoffFn {
    /// 通过函数创建退避策略
    #[inline]
    pub fn new(f: impl Fn(usize) -> Duration + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

impl Backoff for BackoffFn {
    #[inline]
    fn backoff(&self, attempt: usize) -> Duration {
        (self.0)(attempt)
    }
}

impl Debug for BackoffFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BackoffFn").finish()
    }
}

/// 指数退避策略
///
/// 第 n 次尝试后的基础时长为 `base_delay * multiplier^(n-1)`，
/// 超出 `max_delay` 时截断（`max_delay` 为零表示不设上限），
/// 再按 `jitter` 比例在区间 `[-1, 1]` 内随机扰动；
/// 扰动越过上限的部分往下反射，保证结果不超过 `max_delay`
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    /// 首次失败后的基础退避时长
    pub base_delay: Duration,
    /// 每次失败后基础时长的放大系数
    pub multiplier: f64,
    /// 随机扰动比例，取值范围 [0, 1]
    pub jitter: f64,
    /// 退避时长上限，为零表示不设上限
    pub max_delay: Duration,
}

impl Default for ExponentialBackoff {
    /// 默认退避配置：1s 基础时长、1.6 倍放大、20% 扰动、120s 上限
    #[inline]
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 1.6,
            jitter: 0.2,
            max_delay: Duration::from_secs(120),
        }
    }
}

impl Backoff for ExponentialBackoff {
    fn backoff(&self, attempt: usize) -> Duration {
        let mut backoff = self.base_delay.as_secs_f64();

        if self.multiplier > 0.0 {
            backoff *= self.multiplier.powi(attempt.saturating_sub(1).min(i32::MAX as usize) as i32);
        }

        let max_delay = self.max_delay.as_secs_f64();
        if !self.max_delay.is_zero() {
            backoff = backoff.min(max_delay);
        }
        backoff = backoff.max(0.0);

        if self.jitter > 0.0 {
            backoff *= 1.0 + self.jitter * (thread_rng().gen::<f64>() * 2.0 - 1.0);
            if !self.max_delay.is_zero() {
                let delta = backoff - max_delay;
                if delta > 0.0 {
                    // 扰动越过上限，往下反射
                    backoff = max_delay - delta;
                }
            }
        }

        Duration::from_secs_f64(backoff.max(0.0))
    }
}

/// 零退避策略，重试之间没有任何等待
#[inline]
pub fn no_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        base_delay: Duration::ZERO,
        multiplier: 0.0,
        jitter: 0.0,
        max_delay: Duration::ZERO,
    }
}

/// 固定退避策略，重试之间等待固定时长，没有扰动
#[inline]
pub fn constant_backoff(delay: Duration) -> ExponentialBackoff {
    ExponentialBackoff {
        base_delay: delay,
        multiplier: 0.0,
        jitter: 0.0,
        max_delay: Duration::ZERO,
    }
}

/// 带 20% 扰动的固定退避策略
#[inline]
pub fn constant_backoff_with_jitter(delay: Duration) -> ExponentialBackoff {
    ExponentialBackoff {
        base_delay: delay,
        multiplier: 0.0,
        jitter: 0.2,
        max_delay: Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_without_jitter() {
        let backoff = ExponentialBackoff {
            base_delay: Duration::from_millis(50),
            multiplier: 2.0,
            jitter: 0.0,
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(backoff.backoff(1), Duration::from_millis(50));
        assert_eq!(backoff.backoff(2), Duration::from_millis(100));
        assert_eq!(backoff.backoff(3), Duration::from_millis(200));
        // 上限截断
        assert_eq!(backoff.backoff(10), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_multiplier_keeps_base_delay() {
        let backoff = constant_backoff(Duration::from_millis(80));
        for attempt in 1..5 {
            assert_eq!(backoff.backoff(attempt), Duration::from_millis(80));
        }
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let backoff = ExponentialBackoff {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: 0.2,
            max_delay: Duration::from_secs(2),
        };
        for attempt in 1..=6 {
            for _ in 0..10_000 {
                let delay = backoff.backoff(attempt);
                assert!(delay <= Duration::from_secs(2), "attempt {}: {:?}", attempt, delay);
            }
        }
    }

    #[test]
    fn test_jitter_varies_the_delay() {
        let backoff = constant_backoff_with_jitter(Duration::from_secs(1));
        let first = backoff.backoff(1);
        let varied = (0..100).map(|_| backoff.backoff(1)).any(|delay| delay != first);
        assert!(varied);
        for _ in 0..10_000 {
            let delay = backoff.backoff(1);
            assert!(delay >= Duration::from_millis(800));
            assert!(delay <= Duration::from_millis(1200));
        }
    }

    #[test]
    fn test_no_backoff_is_zero() {
        for attempt in 1..5 {
            assert_eq!(no_backoff().backoff(attempt), Duration::ZERO);
        }
    }
}
