//! 调度层
//!
//! 包含CRON计算、内存触发器注册表（调度引擎）、作业配置与触发器之间的协调引擎，
//! 以及对外的作业配置服务。

pub mod cron_utils;
pub mod job_config_service;
pub mod reconciler;
pub mod scheduler;

pub use cron_utils::CronScheduler;
pub use job_config_service::JobConfigService;
pub use reconciler::{decide, Reconciler, SyncAction};
pub use scheduler::{ScheduledTrigger, SchedulerEngine, SchedulerEngineConfig};
