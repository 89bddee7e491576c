use ledger_realtime::sync::{
    ConnectionState, QueryKey, RealtimeSync, SyncOptions, ToastNotifier, UserId,
};
use ledger_realtime::{PostgrestFetcher, QueryCache, RealtimeClient, RealtimeClientOptions};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledger_realtime=info".into()),
        )
        .init();

    let url = std::env::var("SUPABASE_URL").expect("SUPABASE_URL must be set in .env");
    let api_key = std::env::var("SUPABASE_API_KEY").expect("SUPABASE_API_KEY must be set in .env");
    let user_id = std::env::var("LEDGER_USER_ID").expect("LEDGER_USER_ID must be set in .env");
    let access_token = std::env::var("SUPABASE_ACCESS_TOKEN").ok();

    println!("📡 Connecting to: {}\n", url);

    let client = RealtimeClient::new(
        &url,
        RealtimeClientOptions {
            api_key: api_key.clone(),
            access_token: access_token.clone(),
            ..Default::default()
        },
    )?;
    let fetcher = PostgrestFetcher::for_realtime_endpoint(&url, api_key, access_token)?;

    let options = SyncOptions::from_env()?;
    let cache = QueryCache::new();
    let user = UserId::new(user_id);

    // Prime the cache so invalidations have something to stale
    for table in &options.tables {
        let key = QueryKey::new([table.name.as_str(), user.as_str()]);
        match cache.get_or_fetch(&key, &fetcher).await {
            Ok(rows) => println!(
                "Loaded {} {} rows",
                rows.as_array().map(Vec::len).unwrap_or(0),
                table.name
            ),
            Err(e) => println!("Could not load {}: {}", table.name, e),
        }
    }

    let (notifier, mut toasts) = ToastNotifier::new();
    let mut sync = RealtimeSync::new(
        Arc::new(client),
        cache.clone(),
        Arc::new(notifier),
        options,
    );

    let mut status = sync.status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let state = *status.borrow_and_update();
            let marker = match state {
                ConnectionState::Connecting => "⏳",
                ConnectionState::Connected => "🟢",
                ConnectionState::Disconnected => "🔴",
            };
            println!("{} {:?}", marker, state);
        }
    });

    tokio::spawn(async move {
        while let Some(toast) = toasts.recv().await {
            match toast.detail {
                Some(detail) => println!("🔔 {} ({})", toast.message, detail),
                None => println!("🔔 {}", toast.message),
            }
        }
    });

    // Re-read stale queries as soon as they are invalidated
    let mut invalidations = cache.invalidations();
    let refetch_cache = cache.clone();
    tokio::spawn(async move {
        while let Ok(key) = invalidations.recv().await {
            match refetch_cache.get_or_fetch(&key, &fetcher).await {
                Ok(rows) => println!(
                    "♻️  {} refreshed ({} rows)",
                    key,
                    rows.as_array().map(Vec::len).unwrap_or(0)
                ),
                Err(e) => println!("♻️  {} stays stale: {}", key, e),
            }
        }
    });

    sync.set_identity(Some(user)).await;
    println!("Status: {}", sync.status_text());
    println!("Listening on: {}", sync.topics().join(", "));
    println!("\nInsert, update or delete rows from another device to see them here.");
    println!("Press Ctrl+C to exit\n");

    tokio::signal::ctrl_c().await?;

    println!("\nShutting down...");
    sync.shutdown().await;
    println!("Done!");

    Ok(())
}
