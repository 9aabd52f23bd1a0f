//! Blocking entry points over the async core.
//!
//! Blocking calls run their future on a dedicated multi-thread runtime from a
//! scoped thread, so they work from plain threads and from inside another
//! runtime alike. Connections used through blocking calls should be opened
//! through blocking calls too ([`SqlServerConnection::open_blocking`]), which
//! binds their sockets to this runtime.
//!
//! [`SqlServerConnection::open_blocking`]: crate::drivers::SqlServerConnection::open_blocking

use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Builder, Runtime};

use crate::error::{BulkError, Result};

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn runtime() -> Result<&'static Runtime> {
    if let Some(rt) = RUNTIME.get() {
        return Ok(rt);
    }
    let rt = Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("mssql-access-bulk")
        .enable_all()
        .build()?;
    // A concurrent first call may have won; its runtime is kept and ours dropped.
    // Only called off async threads, where dropping a runtime is allowed.
    Ok(RUNTIME.get_or_init(|| rt))
}

/// Drive `future` to completion and return its result.
pub fn block_on<F, T>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send,
    T: Send,
{
    std::thread::scope(|scope| {
        scope
            .spawn(|| runtime()?.block_on(future))
            .join()
            .unwrap_or_else(|_| {
                Err(BulkError::InvalidOperation(
                    "blocking bulk operation panicked".into(),
                ))
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on_from_plain_thread() {
        let value = block_on(async { Ok::<_, BulkError>(21 * 2) }).unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_block_on_inside_runtime() {
        let borrowed = String::from("borrowed");
        let len = block_on(async {
            tokio::task::yield_now().await;
            Ok(borrowed.len())
        })
        .unwrap();
        assert_eq!(len, 8);
    }

    #[test]
    fn test_errors_pass_through() {
        let err = block_on(async { Err::<(), _>(BulkError::ConnectionClosed) }).unwrap_err();
        assert!(matches!(err, BulkError::ConnectionClosed));
    }
}
