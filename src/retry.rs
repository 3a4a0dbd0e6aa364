//! Small async retry helpers for service resolution paths.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Retry `f` up to `times` attempts with a fixed delay between them.
pub async fn timed<T, E, F, Fut>(times: u32, interval: Duration, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let times = times.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= times => return Err(e),
            Err(_) => sleep(interval).await,
        }
    }
}

/// Retry `f` up to `times` attempts, doubling the delay each round.
pub async fn exponential<T, E, F, Fut>(times: u32, base: Duration, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let times = times.max(1);
    let mut delay = base;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= times => return Err(e),
            Err(_) => {
                sleep(delay).await;
                delay *= 2;
            }
        }
    }
}
