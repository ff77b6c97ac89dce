use crate::models::artifact::Artifact;
use crate::models::error::CaptureError;

/// Receives the outcome of a snapshot dump or a stopped recording.
///
/// Both methods consume the handler, so each operation reports exactly once.
pub trait ResultHandler: Send {
    fn on_success(self: Box<Self>, artifact: Artifact);

    fn on_failure(self: Box<Self>, error: CaptureError);
}

impl<F> ResultHandler for F
where
    F: FnOnce(Result<Artifact, CaptureError>) + Send,
{
    fn on_success(self: Box<Self>, artifact: Artifact) {
        (*self)(Ok(artifact))
    }

    fn on_failure(self: Box<Self>, error: CaptureError) {
        (*self)(Err(error))
    }
}

/// A job queued onto a caller-chosen execution context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The execution context result handlers run on.
///
/// A UI host implements this by forwarding jobs to its event loop.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Runs handlers directly on the audio worker thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, job: Job) {
        job()
    }
}

/// Deliver an operation result through `dispatcher`.
pub(crate) fn deliver(
    dispatcher: &dyn Dispatcher,
    handler: Box<dyn ResultHandler>,
    result: Result<Artifact, CaptureError>,
) {
    dispatcher.dispatch(Box::new(move || match result {
        Ok(artifact) => handler.on_success(artifact),
        Err(error) => handler.on_failure(error),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn closure_handler_receives_failure() {
        let (tx, rx) = mpsc::channel();
        let handler: Box<dyn ResultHandler> = Box::new(move |result: Result<Artifact, CaptureError>| {
            tx.send(result).unwrap();
        });

        deliver(&InlineDispatcher, handler, Err(CaptureError::Timeout));
        assert_eq!(rx.try_recv().unwrap(), Err(CaptureError::Timeout));
    }
}
