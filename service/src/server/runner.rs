/// Runs filesystem work on the blocking pool.
///
/// There is no timeout: filesystem calls are expected to return on their own,
/// and a half-finished mutation is not rolled back by abandoning it.
pub(super) async fn run_blocking<T>(
    f: impl FnOnce() -> dirserve::Result<T> + Send + 'static,
) -> dirserve::Result<T>
where
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| dirserve::Error::Io(format!("blocking task failed: {err}")))?
}
