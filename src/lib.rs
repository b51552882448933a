//! # Gestora
//!
//! Client core for a team task tracker. Tasks move through a fixed status
//! pipeline (`PENDING → IN_PROGRESS → DONE → CLOSED`, with `OVERDUE` set only
//! by the backend), every change is written to a bounded activity feed, and
//! users are told about changes through a deduplicated notification list.
//!
//! The persistent source of truth is a REST backend; this crate keeps a
//! client-side cache of its answers and applies the workflow rules before
//! anything is sent.
//!
//! ## Layout
//!
//! - [`fields`], [`task`], [`user`]: the data model.
//! - [`workflow`]: the status transition rules, free of I/O.
//! - [`notify`], [`activity`]: the notification list and the activity feed.
//! - [`state`]: the immutable cache and its mutations.
//! - [`backend`]: the REST client and an in-process demo backend.
//! - [`session`]: every user-facing operation, wiring the above together.
//! - [`report`]: dashboard and per-employee figures.

pub mod activity;
pub mod backend;
pub mod clock;
pub mod compose;
pub mod config;
pub mod error;
pub mod fields;
pub mod local;
pub mod messages;
pub mod notify;
pub mod report;
pub mod session;
pub mod state;
pub mod task;
pub mod user;
pub mod workflow;
