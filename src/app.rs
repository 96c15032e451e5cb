use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use broker_core::AppConfig;
use broker_dispatcher::{JobConfigService, Reconciler, SchedulerEngine, SchedulerEngineConfig};
use broker_domain::{CancellationSignal, EsisService, JobStore, MessageStore};
use broker_infrastructure::{DatabaseManager, EsisSoapClient, MetricsCollector};
use broker_worker::JobCycleRunner;

/// 主应用程序
///
/// 持有数据库、调度引擎和协调引擎。启动时从作业存储重建全部触发器。
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    engine: Arc<SchedulerEngine>,
    reconciler: Arc<Reconciler>,
    job_service: JobConfigService,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序，数据库: {}", config.database.url);

        let database = DatabaseManager::new(&config.database)
            .await
            .context("连接数据库失败")?;
        database.migrate().await.context("数据库迁移失败")?;

        let job_store: Arc<dyn JobStore> = Arc::new(database.job_store());
        let message_store: Arc<dyn MessageStore> = Arc::new(database.message_store());
        let esis: Arc<dyn EsisService> =
            Arc::new(EsisSoapClient::new(&config.esis).context("创建 ESIS 客户端失败")?);
        let metrics = Arc::new(MetricsCollector::new());

        let runner = Arc::new(JobCycleRunner::new(
            Arc::clone(&job_store),
            message_store,
            esis,
            &config.exchange,
            Arc::clone(&metrics),
        ));
        let engine = Arc::new(SchedulerEngine::new(
            runner,
            SchedulerEngineConfig::from(&config.scheduler),
            Arc::clone(&metrics),
        ));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&job_store),
            Arc::clone(&engine),
            metrics,
        ));
        let job_service =
            JobConfigService::new(job_store, Arc::clone(&engine), Arc::clone(&reconciler));

        Ok(Self {
            config,
            database,
            engine,
            reconciler,
            job_service,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn job_service(&self) -> &JobConfigService {
        &self.job_service
    }

    pub fn engine(&self) -> &Arc<SchedulerEngine> {
        &self.engine
    }

    /// 重建触发器并启动调度引擎，收到关闭信号后停止
    pub async fn start(&self) -> Result<()> {
        let synced = self
            .reconciler
            .sync_all_enabled()
            .await
            .context("重建作业触发器失败")?;
        info!("已协调 {} 个启用的作业", synced);

        self.engine.start().await;
        self.engine
            .wait_until_ready()
            .await
            .context("等待调度引擎就绪失败")?;
        info!("调度引擎已就绪");
        Ok(())
    }

    /// 停止调度引擎并关闭数据库连接
    pub async fn stop(&self) {
        info!("正在停止调度引擎");
        self.engine.shutdown().await;
        self.database.close().await;
        info!("应用程序已停止");
    }

    /// 运行应用程序直到收到关闭信号
    pub async fn run(&self, mut shutdown: CancellationSignal) -> Result<()> {
        if let Err(e) = self.start().await {
            error!("应用启动失败: {e:#}");
            self.stop().await;
            return Err(e);
        }

        shutdown.cancelled().await;
        info!("收到关闭信号");
        self.stop().await;
        Ok(())
    }
}
