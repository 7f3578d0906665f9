//! Freeze analysis
//!
//! This module contains the pure logic that turns sampled snapshots into a
//! report, separated from sampling and from the filesystem lifecycle.
//!
//! - `cause_thread`: pick the thread to blame for each sampled tick
//! - `call_tree`: fold the blamed stacks into a weighted call tree
//! - `report`: dominant stack, metrics, attachments, suppression

pub mod call_tree;
pub mod cause_thread;
pub mod report;

pub use call_tree::{CallTree, CallTreeNode, NodeId};
pub use cause_thread::select_cause_thread;
pub use report::{Attachment, FreezeReport, FreezeReportBuilder};
