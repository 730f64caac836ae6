//! Delivery adapters around the shared [`Pipeline`](crate::pipeline::Pipeline)
//!
//! - [`poller`]: long-running loop that receives messages from a queue and
//!   acknowledges the ones that were fully processed.
//! - [`invocation`]: processes one SQS batch event handed over by a
//!   function runtime and reports which records must be redelivered, either
//!   from the Lambda runtime or from a replayed event file.

pub mod invocation;
pub mod poller;

pub use invocation::{BatchItemFailure, BatchResponse, InvocationError, SqsBatchEvent, SqsEventRecord, handle_batch, serve_lambda};
pub use poller::{PollSummary, Poller, PollerConfig};
