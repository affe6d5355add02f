//! Approval requests, decisions and the gateways that carry them.
//!
//! A gateway is the boundary to whoever approves tool calls. Submitting a
//! request never waits for the approver; the decision arrives later, either
//! polled with [`ApprovalGateway::fetch_decision`] or pushed by a transport.
//!
//! - [`MemoryGateway`]: in-process, optional push channel
//! - [`LedgerGateway`]: SQLite table shared between processes
//! - [`HttpGateway`]: remote function-call approval service
//! - [`PolicyGateway`]: answers allow/deny listed tools, escalates the rest

mod error;
mod gateway;
mod http;
mod ledger;
mod memory;
mod policy;
mod request;

pub use error::{Error, Result};
pub use gateway::{ApprovalGateway, RecordDecision};
pub use http::{FunctionCall, FunctionCallSpec, FunctionCallStatus, HttpGateway, HttpGatewayBuilder};
pub use ledger::{LedgerEntry, LedgerGateway};
pub use memory::MemoryGateway;
pub use policy::{AllowRules, DenyRules, Policy, PolicyGateway, Verdict};
pub use request::{ApprovalRequest, ApprovalRequestId, Decision, EXPIRED_FEEDBACK};
