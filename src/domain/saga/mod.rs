//! Provisioning saga and the action dispatcher in front of it

mod dispatcher;
mod outcome;
mod provisioning;

pub use dispatcher::Dispatcher;
pub use outcome::{Outcome, SagaState};
pub use provisioning::ProvisioningSaga;
