//! Fragment pacing, per-fragment timeout and cooperative cancellation
//!
//! Every adapter's raw stream goes through `StreamPacing::pace`, so all
//! providers share the same emission rules:
//! - fragments are forwarded one at a time, in backend order
//! - a fixed delay separates consecutive fragments (client-side typing effect)
//! - the cancellation flag is checked before each fragment is pulled
//! - waiting longer than `timeout` for a fragment ends the stream with
//!   `ProviderError::Timeout`

use futures::{stream, Future, StreamExt};
use std::time::Duration;

use super::error::{ProviderError, ProviderResult};
use super::traits::FragmentStream;
use crate::types::CancellationToken;

/// Pacing and timeout settings shared by the provider adapters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPacing {
    pub delay: Duration,
    pub timeout: Duration,
}

impl Default for StreamPacing {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(15),
            timeout: Duration::from_secs(10),
        }
    }
}

struct PaceState {
    inner: FragmentStream,
    cancel: CancellationToken,
    delay: Duration,
    timeout: Duration,
    provider: String,
    emitted: usize,
    finished: bool,
}

impl StreamPacing {
    pub fn new(delay: Duration, timeout: Duration) -> Self {
        Self { delay, timeout }
    }

    /// No delay, used by tests and by callers that render immediately
    pub fn immediate(timeout: Duration) -> Self {
        Self::new(Duration::ZERO, timeout)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs().max(1)
    }

    /// Bound the request phase (connect + response headers)
    pub async fn bound_request<T, F>(&self, provider: &str, request: F) -> ProviderResult<T>
    where
        F: Future<Output = ProviderResult<T>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(provider, self.timeout_secs())),
        }
    }

    /// Wrap a raw fragment stream with pacing, idle timeout and cancellation
    pub fn pace(&self, provider: &str, inner: FragmentStream, cancel: CancellationToken) -> FragmentStream {
        let state = PaceState {
            inner,
            cancel,
            delay: self.delay,
            timeout: self.timeout,
            provider: provider.to_string(),
            emitted: 0,
            finished: false,
        };

        Box::pin(stream::unfold(state, |mut st| async move {
            if st.finished || st.cancel.is_cancelled() {
                return None;
            }

            if st.emitted > 0 && !st.delay.is_zero() {
                tokio::time::sleep(st.delay).await;
                if st.cancel.is_cancelled() {
                    return None;
                }
            }

            let next = match tokio::time::timeout(st.timeout, st.inner.next()).await {
                Ok(next) => next,
                Err(_) => {
                    st.finished = true;
                    let secs = st.timeout.as_secs().max(1);
                    let err = ProviderError::timeout(st.provider.clone(), secs);
                    return Some((Err(err), st));
                }
            };

            match next {
                Some(Ok(fragment)) => {
                    st.emitted += 1;
                    Some((Ok(fragment), st))
                }
                Some(Err(err)) => {
                    st.finished = true;
                    Some((Err(err), st))
                }
                None => None,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn fragments(parts: &[&str]) -> FragmentStream {
        let owned: Vec<ProviderResult<String>> = parts.iter().map(|p| Ok(p.to_string())).collect();
        Box::pin(stream::iter(owned))
    }

    #[tokio::test]
    async fn test_pace_preserves_order() {
        let pacing = StreamPacing::immediate(Duration::from_secs(1));
        let out: Vec<String> = pacing
            .pace("mock", fragments(&["SELECT", " *", " FROM", " t"]), CancellationToken::new())
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["SELECT", " *", " FROM", " t"]);
    }

    #[tokio::test]
    async fn test_pace_applies_delay_between_fragments() {
        let pacing = StreamPacing::new(Duration::from_millis(20), Duration::from_secs(1));
        let started = Instant::now();
        let out: Vec<_> = pacing
            .pace("mock", fragments(&["a", "b", "c"]), CancellationToken::new())
            .collect()
            .await;
        assert_eq!(out.len(), 3);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_pace_stops_after_cancellation() {
        let pacing = StreamPacing::immediate(Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let mut paced = pacing.pace("mock", fragments(&["a", "b", "c"]), cancel.clone());

        assert_eq!(paced.next().await.unwrap().unwrap(), "a");
        cancel.cancel();
        assert!(paced.next().await.is_none());
    }

    #[tokio::test]
    async fn test_pace_times_out_stalled_stream() {
        let pacing = StreamPacing::immediate(Duration::from_millis(50));
        let stalled: FragmentStream = Box::pin(stream::pending());
        let mut paced = pacing.pace("mock", stalled, CancellationToken::new());

        let err = paced.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
        assert!(paced.next().await.is_none());
    }

    #[tokio::test]
    async fn test_pace_ends_after_error() {
        let pacing = StreamPacing::immediate(Duration::from_secs(1));
        let items: Vec<ProviderResult<String>> = vec![
            Ok("a".into()),
            Err(ProviderError::stream_error("mock", "overloaded")),
            Ok("never".into()),
        ];
        let out: Vec<_> = pacing
            .pace("mock", Box::pin(stream::iter(items)), CancellationToken::new())
            .collect()
            .await;
        assert_eq!(out.len(), 2);
        assert!(out[1].is_err());
    }

    #[tokio::test]
    async fn test_bound_request_times_out() {
        let pacing = StreamPacing::immediate(Duration::from_millis(20));
        let result: ProviderResult<()> = pacing
            .bound_request("mock", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Timeout { .. })));
    }
}
