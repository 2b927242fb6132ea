//! Microsoft Calendar delivery: sign-in, the Graph batch client, and the
//! dispatcher that feeds reminder events through it.

pub mod dispatcher;
pub mod error;
pub mod graph;
pub mod microsoft;
pub mod provider;
pub mod types;

pub use dispatcher::{dispatch, BatchDispatcher, DispatchError, DispatchReport, Progress, Tally};
pub use error::CalendarError;
pub use graph::GraphBatchClient;
pub use microsoft::MicrosoftAuth;
pub use provider::{BatchSender, TokenProvider};
pub use types::{BatchRequest, ItemResult, MAX_BATCH_SIZE};
