//! 消息交换状态机
//!
//! 每次作业触发依次执行推送阶段和拉取阶段，单条消息的失败不影响同批次的其他消息。

pub mod classifier;
pub mod job_cycle;
pub mod pull_phase;
pub mod push_phase;
pub mod result_report;
pub mod state_machine;

pub use classifier::RequestClassifier;
pub use job_cycle::{CycleSummary, JobCycleRunner};
pub use pull_phase::{PullOutcome, PullPhase};
pub use push_phase::{PushOutcome, PushPhase};
pub use result_report::{failure_report, success_summary, PerformanceDataMessage, SuccessSummary};

use std::future::Future;

use broker_core::{BrokerError, BrokerResult};
use broker_domain::CancellationSignal;

/// 外部调用与关闭信号竞争，信号先到时放弃调用
pub(crate) async fn with_cancel<T, F>(cancel: &CancellationSignal, call: F) -> BrokerResult<T>
where
    F: Future<Output = BrokerResult<T>>,
{
    let mut cancel = cancel.clone();
    tokio::select! {
        result = call => result,
        _ = cancel.cancelled() => Err(BrokerError::Cancelled),
    }
}
