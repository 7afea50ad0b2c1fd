use std::sync::Arc;

use anyhow::Context;

use meeting_assist::agent::{MeetingChat, Neutralizer, RateLimiter};
use meeting_assist::config::AppConfig;
use meeting_assist::http::{AppState, router};
use meeting_assist::inference::create_provider;
use meeting_assist::meetings::MeetingLifecycle;
use meeting_assist::pipeline::Summarizer;
use meeting_assist::store::{ActivityLog, LibSqlStore, MeetingStore, NotificationSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional rolling file log next to stdout output.
    let _log_guard = match std::env::var("MEETING_ASSIST_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "meeting-assist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .with_target(false)
                .init();
            None
        }
    };

    let config = AppConfig::from_env().context("invalid configuration")?;

    eprintln!("Meeting Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.inference.model);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   API: http://0.0.0.0:{}/api/meetings", config.http_port);

    // ── Store ────────────────────────────────────────────────────────────
    let store = Arc::new(
        LibSqlStore::new_local(&config.db_path)
            .await
            .context("failed to open database")?,
    );
    let meeting_store: Arc<dyn MeetingStore> = store.clone();
    let activity_log: Arc<dyn ActivityLog> = store.clone();
    let notifications: Arc<dyn NotificationSink> = store.clone();

    // ── Inference ────────────────────────────────────────────────────────
    let inference = create_provider(&config.inference);

    // ── Core components ──────────────────────────────────────────────────
    let summarizer = Arc::new(Summarizer::new(
        meeting_store.clone(),
        inference.clone(),
        notifications.clone(),
    ));
    let quota = Arc::new(RateLimiter::new(&config.quota));
    let neutralizer = Arc::new(Neutralizer::new(
        meeting_store.clone(),
        inference.clone(),
        activity_log,
        notifications.clone(),
        quota,
        config.inference.call_timeout,
        config.inference.max_retries,
    ));
    let chat = Arc::new(MeetingChat::new(meeting_store.clone(), inference));
    let lifecycle = Arc::new(MeetingLifecycle::new(
        meeting_store,
        summarizer,
        notifications,
    ));

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = router(AppState {
        lifecycle,
        neutralizer,
        chat,
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("failed to bind port {}", config.http_port))?;
    tracing::info!(port = config.http_port, "HTTP server started");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
