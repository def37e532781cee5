//! # tgpg
//!
//! Notification-driven work dispatcher for the Telegram bot process.
//!
//! Subscribes to the `tg_bot` Postgres channel, turns each notification into
//! a queued work item, runs queued work under a concurrency cap, evicts work
//! that outlives its deadline and sends a periodic heartbeat to the database.

pub mod action;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod telemetry;
