//! Primary-side wiring from received arguments to the UI.
//!
//! The [`ListenerBinding`] consumes the primary's [`ArgumentStream`], resolves
//! each argument off the async workers with `spawn_blocking`, and hands every
//! resolved directory to the [`Presenter`] in receipt order.

use crate::channel::{ArgumentListener, ArgumentStream, RawArgument};
use crate::dispatch::CommandDispatcher;
use crate::error::Result;
use crate::instance::PrimaryClaim;
use crate::shutdown::ShutdownRegistry;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// UI collaborator that displays resolved vault directories.
pub trait Presenter: Send + Sync + 'static {
    /// Show `path` and bring the application window to the foreground.
    ///
    /// Called from a Tokio worker; implementations marshal onto their own UI
    /// thread if they have one.
    fn present_directory(&self, path: &Path);
}

/// Live subscription turning received arguments into presented directories.
#[derive(Debug)]
pub struct ListenerBinding {
    task: Option<JoinHandle<()>>,
}

impl ListenerBinding {
    /// Spawn the consumer task. Must be called from within a Tokio runtime.
    pub fn bind(
        stream: ArgumentStream,
        dispatcher: CommandDispatcher,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        let task = tokio::spawn(consume(stream, Arc::new(dispatcher), presenter));
        Self { task: Some(task) }
    }

    /// Stop handling arguments.
    pub fn close(mut self) {
        self.abort();
    }

    /// Wait until the stream ends on its own (listener shut down).
    pub async fn finished(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Listener binding closed");
        }
    }
}

impl Drop for ListenerBinding {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn consume(
    mut stream: ArgumentStream,
    dispatcher: Arc<CommandDispatcher>,
    presenter: Arc<dyn Presenter>,
) {
    while let Some(raw) = stream.recv().await {
        let dispatcher = dispatcher.clone();
        let resolved = tokio::task::spawn_blocking(move || dispatcher.resolve(&raw)).await;
        match resolved {
            Ok(Some(path)) => {
                info!("Presenting {}", path.display());
                presenter.present_directory(&path);
            }
            Ok(None) => debug!("Argument ignored"),
            Err(e) => warn!("Argument resolution task failed: {}", e),
        }
    }
    debug!("Argument stream ended");
}

/// Bring up everything the primary owns and hand its teardown to `registry`.
///
/// Starts the argument listener on the claim's socket, queues `launch_args`
/// first, binds the stream to `presenter`, and registers shutdown tasks that
/// close the listener, stop the binding and release the claim, in that
/// order. Returns the listener address.
pub fn bind_primary(
    mut claim: PrimaryClaim,
    registry: &ShutdownRegistry,
    dispatcher: CommandDispatcher,
    presenter: Arc<dyn Presenter>,
    launch_args: Vec<RawArgument>,
) -> Result<SocketAddr> {
    let (mut handle, stream) = ArgumentListener::listen(claim.take_listener()?)?;
    let addr = handle.addr();

    let queued = handle.deliver_local(launch_args);
    if queued > 0 {
        debug!("Queued {} launch argument(s)", queued);
    }

    let binding = ListenerBinding::bind(stream, dispatcher, presenter);

    registry.add("close-argument-listener", move || handle.shutdown())?;
    registry.add("stop-listener-binding", move || binding.close())?;
    registry.add("release-instance-claim", move || claim.release())?;

    Ok(addr)
}
