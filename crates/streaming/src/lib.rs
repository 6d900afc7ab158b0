//! Streaming layer for ldstore
//!
//! Turns ordered fragment streams into documents and pages:
//! - `flow`: synchronous publisher/subscriber protocol with credit-based backpressure
//! - `credit`: the credit budget and re-entry guard behind the protocol
//! - `assembler`: push-side `DocumentAssembler` for buffered, limited reads
//! - `group_by`: pull-side lazy grouping into a document stream
//! - `pagination`: cursor ranges over ordered streams
//!
//! Every pipeline is confined to the thread that runs it. Concurrent reads
//! use independent pipelines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembler;
pub mod credit;
pub mod flow;
pub mod group_by;
pub mod pagination;

pub use assembler::{assemble, AssembledDocuments, AssemblySlot, DocumentAssembler, INITIAL_REQUEST};
pub use credit::{Credit, DrainGuard};
pub use flow::{IteratorPublisher, Publisher, Subscriber, Subscription};
pub use group_by::{assemble_documents, AssembledStream, GroupByOrdered, GroupByOrderedExt};
pub use pagination::{Admission, PaginateExt, Paginated, Paginator, TryPaginated};
