use std::sync::Arc;

use anyhow::{Context, Result};
use calview_auth::{AuthSession, GraphProfileClient, GraphToken};
use calview_calendar::grid::{agenda, format_event_time};
use calview_calendar::{
    EventSource, GraphClient, Notice, NoticeLevel, RateLimiter, RetryPolicy, RetryingFetcher,
};
use calview_core::{AppError, Config};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize core
    calview_core::init()?;

    let (config, _validation) = match Config::load_validated() {
        Ok(loaded) => loaded,
        Err(e) => {
            let err = AppError::from(e);
            eprintln!("{}", err.user_message());
            return Err(err.into());
        }
    };
    tracing::info!("Config directory: {}", config.config_dir.display());

    let session = AuthSession::new();
    match config.graph.access_token.as_deref() {
        Some(token) => {
            let profiles = GraphProfileClient::with_base_url(&config.graph.base_url);
            let user = session
                .sign_in_with_graph(&profiles, GraphToken::new(token))
                .await
                .map_err(AppError::from)
                .context("Microsoft sign-in failed")?;
            println!("Signed in as {} <{}>", user.name, user.email);
        }
        None => {
            let user = session
                .sign_in("demo@calview.local", "demo")
                .map_err(AppError::from)?;
            println!("No Microsoft token configured, signed in as {}", user.email);
        }
    }

    // One quota per API, shared by everything that calls Graph
    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
    let fetcher = RetryingFetcher::new(limiter, RetryPolicy::from_config(&config.retry));
    let source = EventSource::new(GraphClient::from_config(&config.graph), fetcher, &config.events);

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let credential = session.access_token().map_err(AppError::from)?;
    let loaded = match source.load(Utc::now(), credential.as_deref(), &cancel).await {
        Ok(loaded) => loaded,
        Err(e) => {
            print_notice(&Notice::for_error(&e));
            return Err(AppError::from(e).into());
        }
    };

    if let Some(notice) = &loaded.notice {
        print_notice(notice);
    }

    println!(
        "\n{} events ({:?}) between {} and {}",
        loaded.events.len(),
        loaded.origin,
        loaded.start.date_naive(),
        loaded.end.date_naive()
    );
    for (day, events) in agenda(&loaded.events) {
        println!("\n{}", day.format("%A, %B %-d %Y"));
        for event in events {
            let time = if event.is_all_day {
                "All day".to_string()
            } else {
                format!(
                    "{} - {}",
                    format_event_time(event.start),
                    format_event_time(event.end)
                )
            };
            println!("  {:<20} {} [{:?}]", time, event.title, event.source);
        }
    }

    source.clear_cache();
    session.sign_out();
    Ok(())
}

fn print_notice(notice: &Notice) {
    let label = match notice.level {
        NoticeLevel::Info => "info",
        NoticeLevel::Success => "ok",
        NoticeLevel::Warning => "warning",
        NoticeLevel::Error => "error",
    };
    println!("[{}] {}", label, notice.message);
}
