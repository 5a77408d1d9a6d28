//! claimflow — insurance mailbox classifier.
//!
//! Polls a mailbox for unread messages, classifies each one through an LLM
//! with a forced structured-output contract, and dispatches two generated
//! emails: a customer acknowledgement and an internal admin action plan.

pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod mailbox;
