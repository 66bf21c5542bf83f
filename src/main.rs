use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;
use chrono::Utc;

use mailhub::channels::{AgentMailTransport, EmailTransport};
use mailhub::config::MailhubConfig;
use mailhub::llm::{LlmConfig, LlmRecruiter, RecruiterModel, create_provider};
use mailhub::pipeline::{Dispatcher, PollLoop, PollSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A .env file is optional; real environment variables win.
    dotenvy::dotenv().ok();

    let config = MailhubConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export AGENTMAIL_API_KEY=...");
        eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
        std::process::exit(1);
    });

    // RUST_LOG wins over LOG_LEVEL
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.log_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // ── Inbox ────────────────────────────────────────────────────────────
    let agentmail = AgentMailTransport::new(
        config.inbox_api_key.clone(),
        config.agentmail_base_url.clone(),
    )
    .context("Failed to create AgentMail client")?;
    let inbox = agentmail
        .create_inbox(&config.inbox_name)
        .await
        .context("Failed to set up inbox")?;
    let transport: Arc<dyn EmailTransport> = Arc::new(agentmail);

    eprintln!("📬 MailHub v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   Inbox: {}", inbox);
    eprintln!("   Interviewer: {}", config.interviewer_address);
    eprintln!("   Qualification threshold: {}/10", config.qualification_threshold);
    eprintln!("   Polling every {}s\n", config.poll_interval.as_secs());

    // ── LLM ─────────────────────────────────────────────────────────────
    let llm = create_provider(&LlmConfig {
        api_key: config.llm_api_key.clone(),
        model: config.model.clone(),
    })?;
    let recruiter: Arc<dyn RecruiterModel> = Arc::new(LlmRecruiter::new(llm));

    if let Err(e) = recruiter.probe().await {
        eprintln!("Error: LLM connectivity check failed: {e}");
        std::process::exit(1);
    }
    tracing::info!(model = %config.model, "LLM connectivity check passed");

    // ── Poll loop ───────────────────────────────────────────────────────
    let dispatcher = Dispatcher::new(
        recruiter,
        Arc::clone(&transport),
        &config.interviewer_address,
        config.qualification_threshold,
    );
    let mut poll_loop = PollLoop::new(dispatcher, transport, inbox, PollSettings::from(&config))
        .with_since(Utc::now());

    let shutdown = poll_loop.shutdown_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, stopping after the current message");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    poll_loop.run().await;
    Ok(())
}
