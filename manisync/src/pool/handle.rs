//! Deferred fetch result.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::runtime::Builder;
use tokio::sync::oneshot;

use super::error::FetchError;

/// Handle to the result of a submitted fetch.
///
/// Await it from async code (pool tasks included), or call [`wait`] from a
/// plain thread. If the fetch is abandoned by a forced shutdown the handle
/// resolves to [`FetchError::Cancelled`].
///
/// Blocking is refused on any thread inside a tokio runtime, not only on
/// pool workers: [`wait`] and [`wait_timeout`] return
/// [`FetchError::BlockingInRuntime`] there, since blocking a runtime thread
/// would panic or stall it. Await the handle instead.
///
/// [`wait`]: FetchHandle::wait
/// [`wait_timeout`]: FetchHandle::wait_timeout
#[derive(Debug)]
pub struct FetchHandle {
    url: String,
    rx: oneshot::Receiver<Result<Bytes, FetchError>>,
}

impl FetchHandle {
    pub(crate) fn new(url: String, rx: oneshot::Receiver<Result<Bytes, FetchError>>) -> Self {
        Self { url, rx }
    }

    /// URL being fetched.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Blocks the current thread until the fetch resolves.
    ///
    /// Blocking a pool worker on another submission could starve the pool, so
    /// calling this from inside any async runtime, the pool's or another one,
    /// returns [`FetchError::BlockingInRuntime`] instead of blocking.
    pub fn wait(self) -> Result<Bytes, FetchError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(FetchError::BlockingInRuntime { url: self.url });
        }
        let url = self.url;
        self.rx
            .blocking_recv()
            .unwrap_or(Err(FetchError::Cancelled { url }))
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout` with
    /// [`FetchError::Timeout`]. The fetch itself keeps running.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Bytes, FetchError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(FetchError::BlockingInRuntime { url: self.url });
        }

        let waiter = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        let url = self.url;
        match waiter.block_on(tokio::time::timeout(timeout, self.rx)) {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(FetchError::Cancelled { url }),
            Err(_) => Err(FetchError::Timeout {
                url,
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

impl Future for FetchHandle {
    type Output = Result<Bytes, FetchError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|result| {
            result.unwrap_or_else(|_| {
                Err(FetchError::Cancelled {
                    url: this.url.clone(),
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_receives_result() {
        let (tx, rx) = oneshot::channel();
        let handle = FetchHandle::new("u".to_string(), rx);
        tx.send(Ok(Bytes::from_static(b"data"))).unwrap();

        assert_eq!(handle.wait().unwrap(), Bytes::from_static(b"data"));
    }

    #[test]
    fn test_dropped_sender_is_cancelled() {
        let (tx, rx) = oneshot::channel::<Result<Bytes, FetchError>>();
        let handle = FetchHandle::new("u".to_string(), rx);
        drop(tx);

        assert_eq!(
            handle.wait().unwrap_err(),
            FetchError::Cancelled {
                url: "u".to_string()
            }
        );
    }

    #[test]
    fn test_wait_timeout_expires() {
        let (_tx, rx) = oneshot::channel::<Result<Bytes, FetchError>>();
        let handle = FetchHandle::new("u".to_string(), rx);

        assert!(matches!(
            handle.wait_timeout(Duration::from_millis(20)),
            Err(FetchError::Timeout { .. })
        ));
    }

    #[test]
    fn test_wait_timeout_receives_result() {
        let (tx, rx) = oneshot::channel();
        let handle = FetchHandle::new("u".to_string(), rx);
        tx.send(Ok(Bytes::from_static(b"data"))).unwrap();

        assert_eq!(
            handle.wait_timeout(Duration::from_secs(1)).unwrap(),
            Bytes::from_static(b"data")
        );
    }

    #[tokio::test]
    async fn test_await_receives_result() {
        let (tx, rx) = oneshot::channel();
        let handle = FetchHandle::new("u".to_string(), rx);
        tx.send(Err(FetchError::Status {
            url: "u".to_string(),
            status: 500,
        }))
        .unwrap();

        assert!(matches!(
            handle.await,
            Err(FetchError::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_rejected_inside_runtime() {
        let (_tx, rx) = oneshot::channel();
        let handle = FetchHandle::new("u".to_string(), rx);

        assert!(matches!(
            handle.wait(),
            Err(FetchError::BlockingInRuntime { .. })
        ));
    }

    #[test]
    fn test_wait_timeout_rejected_inside_foreign_runtime() {
        let runtime = Builder::new_current_thread().build().unwrap();
        let (tx, rx) = oneshot::channel();
        let handle = FetchHandle::new("u".to_string(), rx);
        tx.send(Ok(Bytes::from_static(b"data"))).unwrap();

        let result = runtime.block_on(async { handle.wait_timeout(Duration::from_secs(1)) });

        assert_eq!(
            result.unwrap_err(),
            FetchError::BlockingInRuntime {
                url: "u".to_string()
            }
        );
    }
}
