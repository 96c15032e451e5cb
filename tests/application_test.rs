use anyhow::Result;

use broker_core::AppConfig;
use broker_domain::{JobCredentials, ScheduleIntent};
use itr_broker::app::Application;
use itr_broker::shutdown::{ShutdownManager, ShutdownReason};

fn config_for(dir: &tempfile::TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = format!("sqlite://{}", dir.path().join("broker.db").display());
    config.database.max_connections = 2;
    config.scheduler.tick_interval_ms = 50;
    config.scheduler.shutdown_timeout_seconds = 1;
    config.esis.endpoint = "http://127.0.0.1:9/esis".to_string();
    config
}

#[tokio::test]
async fn test_triggers_are_rebuilt_after_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let job_id = {
        let app = Application::new(config_for(&dir)).await?;
        let job = app
            .job_service()
            .create_job(
                "tenant-a",
                Some("0 0 3 * * ?".to_string()),
                ScheduleIntent::Enabled,
                JobCredentials::new("https://crm.example", "client", "secret"),
            )
            .await?;
        assert!(app.engine().get_trigger(job.id).await.is_some());
        app.stop().await;
        job.id
    };

    let app = Application::new(config_for(&dir)).await?;
    assert!(app.engine().get_trigger(job_id).await.is_none());

    app.start().await?;
    let trigger = app.engine().get_trigger(job_id).await;
    assert!(trigger.is_some());
    assert_eq!(trigger.map(|t| t.cron_expression), Some("0 0 3 * * ?".to_string()));
    assert!(app.engine().is_ready());

    app.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_run_stops_on_shutdown_signal() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let app = std::sync::Arc::new(Application::new(config_for(&dir)).await?);
    let shutdown = ShutdownManager::new();

    let handle = {
        let app = std::sync::Arc::clone(&app);
        let signal = shutdown.subscribe();
        tokio::spawn(async move { app.run(signal).await })
    };

    app.engine().wait_until_ready().await?;
    shutdown.shutdown(ShutdownReason::Requested);

    let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await??;
    assert!(result.is_ok());
    Ok(())
}
