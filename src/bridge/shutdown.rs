use tokio::select;
use tokio_util::sync::CancellationToken;

/// Turns a ctrl-c signal into cancellation. Also returns once something else
/// cancels the token, e.g. the event source closing, so the bridge can exit
/// cleanly either way.
pub async fn detect_shutdown(cancellation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            cancellation.cancel();
        },
        _ = cancellation.cancelled() => (),
    };
}
