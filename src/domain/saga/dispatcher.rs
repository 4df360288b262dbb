//! Action dispatcher - runs exactly one saga path per invocation

use tracing::{Instrument, Span};

use super::{Outcome, ProvisioningSaga};
use crate::domain::{TaskAction, TaskContext};

/// Routes a task to the saga path its action selects
#[derive(Debug)]
pub struct Dispatcher {
    saga: ProvisioningSaga,
    span: Span,
}

impl Dispatcher {
    /// `span` carries the task identifiers and wraps every saga step
    pub fn new(saga: ProvisioningSaga, span: Span) -> Self {
        Self { saga, span }
    }

    pub async fn dispatch(&self, task: TaskContext) -> Outcome {
        let saga = &self.saga;
        let action = task.action().clone();

        async move {
            match action {
                TaskAction::Create => saga.create(task).await,
                TaskAction::Delete => saga.delete(task).await,
                TaskAction::Unknown(_) => saga.reject_unknown_action(task).await,
            }
        }
        .instrument(self.span.clone())
        .await
    }
}
