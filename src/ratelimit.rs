//! Fixed-window request limiter keyed by client IP.

use std::{collections::HashMap, net::IpAddr, time::Duration};

use tokio::{sync::Mutex, time::Instant};

pub struct RateLimiter {
  limit: u32,
  window: Duration,
  hits: Mutex<HashMap<IpAddr, (Instant, u32)>>,
}

impl RateLimiter {
  /// `limit == 0` disables limiting.
  pub fn new(limit: u32, window: Duration) -> Self {
    Self { limit, window, hits: Mutex::new(HashMap::new()) }
  }

  /// Count one request. `Err` carries how long until the window resets.
  pub async fn check(&self, key: IpAddr) -> Result<(), Duration> {
    if self.limit == 0 {
      return Ok(());
    }
    let now = Instant::now();
    let mut hits = self.hits.lock().await;
    if hits.len() > 4096 {
      hits.retain(|_, (start, _)| now.duration_since(*start) < self.window);
    }

    let entry = hits.entry(key).or_insert((now, 0));
    if now.duration_since(entry.0) >= self.window {
      *entry = (now, 0);
    }
    if entry.1 >= self.limit {
      return Err(self.window.saturating_sub(now.duration_since(entry.0)));
    }
    entry.1 += 1;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::net::Ipv4Addr;

  #[tokio::test(start_paused = true)]
  async fn window_limits_then_resets() {
    let limiter = RateLimiter::new(2, Duration::from_secs(60));
    let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

    assert!(limiter.check(a).await.is_ok());
    assert!(limiter.check(a).await.is_ok());
    let retry = limiter.check(a).await.unwrap_err();
    assert_eq!(retry, Duration::from_secs(60));
    assert!(limiter.check(b).await.is_ok());

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(limiter.check(a).await.is_ok());
  }

  #[tokio::test]
  async fn zero_limit_disables() {
    let limiter = RateLimiter::new(0, Duration::from_secs(60));
    let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
    for _ in 0..100 {
      assert!(limiter.check(ip).await.is_ok());
    }
  }
}
