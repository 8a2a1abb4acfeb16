//! `mixtape-scheduler`: live triggers for persisted automation schedules.
//!
//! # Overview
//!
//! Schedules and their execution history live in SQLite ([`ScheduleStore`]).
//! The [`SchedulerEngine`] keeps one timer task per enabled schedule; when it
//! fires, the schedule is reloaded, handed to a
//! [`JobRunner`](mixtape_core::JobRunner), and exactly one
//! [`JobExecution`](mixtape_core::JobExecution) is written.
//!
//! # Recurrence
//!
//! | Kind       | Input                         | Unparseable input        |
//! |------------|-------------------------------|--------------------------|
//! | `interval` | `hourly`, `every-6h`, `daily`, `every-3d`, `weekly`, `monthly`, … | daily |
//! | `cron`     | `minute hour dom month dow`   | `scheduler.fallback_cron` |

pub mod cron;
pub mod db;
pub mod engine;
pub mod error;
pub mod recurrence;
pub mod store;

pub use cron::CronExpression;
pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use recurrence::{interval_duration, next_fire_for, Trigger};
pub use store::ScheduleStore;
