use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::debug;

use broker_core::{BrokerError, BrokerResult};

/// CRON表达式解析和调度工具
///
/// 表达式采用带秒字段的 Quartz 风格（6 或 7 个字段），所有计算均在 UTC 下进行。
/// Quartz 的 `?` 占位符按 `*` 处理。
#[derive(Debug, Clone)]
pub struct CronScheduler {
    expression: String,
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器，空表达式视为无效
    pub fn new(cron_expr: &str) -> BrokerResult<Self> {
        let schedule = parse(cron_expr)?;
        Ok(Self {
            expression: cron_expr.to_string(),
            schedule,
        })
    }

    /// 原始表达式文本
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 表达式是否可用。空字符串视为有效（是否必填由调用方决定），非法语法返回 false 而不报错。
    pub fn is_valid(cron_expr: &str) -> bool {
        if cron_expr.trim().is_empty() {
            return true;
        }
        parse(cron_expr).is_ok()
    }

    /// 验证CRON表达式是否有效，空表达式返回错误
    pub fn validate_cron_expression(cron_expr: &str) -> BrokerResult<()> {
        parse(cron_expr).map(|_| ())
    }

    /// 获取严格晚于 `from` 的下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }
}

fn parse(cron_expr: &str) -> BrokerResult<Schedule> {
    let trimmed = cron_expr.trim();
    if trimmed.is_empty() {
        return Err(BrokerError::invalid_cron(cron_expr, "表达式为空"));
    }
    let normalized = normalize(trimmed);
    if normalized != trimmed {
        debug!("CRON表达式已规范化: '{}' -> '{}'", trimmed, normalized);
    }
    Schedule::from_str(&normalized)
        .map_err(|e| BrokerError::invalid_cron(cron_expr, e.to_string()))
}

fn normalize(cron_expr: &str) -> String {
    cron_expr
        .split_whitespace()
        .map(|field| if field == "?" { "*" } else { field })
        .collect::<Vec<_>>()
        .join(" ")
}
