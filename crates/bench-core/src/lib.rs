//! Session validation, per-model call execution, and the concurrent dispatch engine.

pub mod dispatch;
pub mod executor;
pub mod result;
pub mod session;
pub mod stream;

pub use dispatch::{dispatch, Dispatcher};
pub use executor::{CallExecutor, HttpExecutor};
pub use result::{BenchmarkOutcome, CallResult, CallStatus, OutcomeSummary, NO_RESPONSE_PLACEHOLDER};
pub use session::{parse_model_list, AuthToken, DispatchPolicy, Session, SessionBuilder};
pub use stream::{ResultStream, StreamEvent};
