//! porter CLI: run the quote consumer and HTTP API, or drive them by hand.

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use porter_quotes::config::Config;
use porter_quotes::consumer::{ConsumerConfig, QueueConsumer};
use porter_quotes::fetch::{FetcherConfig, PorterFetcher, QuoteFetcher};
use porter_quotes::model::{QuoteRequest, QuoteResult, WorkItem};
use porter_quotes::queue::{PgmqQueue, QueueClient};
use porter_quotes::relay::HttpRelay;
use porter_quotes::server;
use porter_quotes::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Parser)]
#[command(name = "porter", about = "Delivery quotes from porter.in")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the queue consumer and the HTTP API together
    Serve {
        /// Do not consume the queue
        #[arg(long)]
        no_consumer: bool,
        /// Do not serve HTTP
        #[arg(long, conflicts_with = "no_consumer")]
        no_http: bool,
    },
    /// Run the queue consumer only
    Consume,
    /// Put a quote request on the queue
    Enqueue {
        #[command(flatten)]
        request: RequestArgs,
        /// Producer's correlation id
        #[arg(long)]
        reference_id: String,
        /// Producer's correlation type
        #[arg(long)]
        reference_type: String,
    },
    /// Fetch quotes once and print them as JSON
    Quote {
        #[command(flatten)]
        request: RequestArgs,
    },
}

#[derive(Args)]
struct RequestArgs {
    /// Customer name
    #[arg(long, default_value = "")]
    name: String,
    /// Ten-digit phone number
    #[arg(long)]
    phone: String,
    #[arg(long)]
    pickup: String,
    #[arg(long)]
    drop: String,
    /// One of the supported cities, e.g. "Mumbai"
    #[arg(long)]
    city: String,
    /// trucks, two_wheelers or packers_and_movers
    #[arg(long)]
    service_type: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "porter-quotes".to_string(),
        log_level: config.log_level.clone(),
    })?;

    match cli.command {
        Command::Serve {
            no_consumer,
            no_http,
        } => cmd_serve(config, !no_consumer, !no_http).await,
        Command::Consume => cmd_serve(config, true, false).await,
        Command::Enqueue {
            request,
            reference_id,
            reference_type,
        } => cmd_enqueue(&config, request, reference_id, reference_type).await,
        Command::Quote { request } => cmd_quote(&config, request).await,
    }
}

fn fetcher(config: &Config) -> Arc<dyn QuoteFetcher> {
    Arc::new(PorterFetcher::new(FetcherConfig {
        chrome_path: config.chrome_path.clone(),
        ..FetcherConfig::default()
    }))
}

async fn open_queue(config: &Config) -> anyhow::Result<PgmqQueue> {
    let url = config.require_database_url()?;
    let queue = PgmqQueue::connect(url.expose_secret(), &config.queue_name)
        .await
        .context("connecting to the queue database")?;
    queue.create().await?;
    Ok(queue)
}

async fn cmd_serve(config: Config, consume: bool, http: bool) -> anyhow::Result<()> {
    let fetcher = fetcher(&config);

    let consumer = if consume {
        let queue = open_queue(&config).await?;
        let relay = HttpRelay::new(&config.relay_base_url, config.relay_mode)?;
        tracing::info!(
            queue = %config.queue_name,
            relay = %config.relay_base_url,
            mode = ?config.relay_mode,
            "consumer configured"
        );
        Some(QueueConsumer::new(
            Arc::new(queue),
            fetcher.clone(),
            Arc::new(relay),
            ConsumerConfig {
                visibility_timeout: config.visibility_timeout,
                max_attempts: config.max_attempts,
                ..ConsumerConfig::default()
            },
        ))
    } else {
        None
    };

    let http_shutdown = Arc::new(Notify::new());

    {
        let consumer = consumer.clone();
        let http_shutdown = http_shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("interrupt received, shutting down");
            if let Some(consumer) = consumer {
                consumer.shutdown();
            }
            http_shutdown.notify_one();
        });
    }

    let consumer_task = consumer.clone().map(|consumer| {
        let http_shutdown = http_shutdown.clone();
        tokio::spawn(async move {
            let result = consumer.run().await;
            // A consumer that stops on its own takes the API down with it.
            http_shutdown.notify_one();
            result
        })
    });

    let http_task = http.then(|| {
        let addr = config.http_addr;
        let fetcher = fetcher.clone();
        let http_shutdown = http_shutdown.clone();
        let consumer = consumer.clone();
        tokio::spawn(async move {
            let result = server::serve(addr, fetcher, http_shutdown).await;
            if let Some(consumer) = consumer {
                consumer.shutdown();
            }
            result
        })
    });

    if let Some(task) = http_task {
        task.await?.context("HTTP API failed")?;
    }
    if let Some(task) = consumer_task {
        task.await?.context("queue consumer failed")?;
    }
    Ok(())
}

async fn cmd_enqueue(
    config: &Config,
    request: RequestArgs,
    reference_id: String,
    reference_type: String,
) -> anyhow::Result<()> {
    let queue = open_queue(config).await?;
    let item = WorkItem {
        name: Some(request.name),
        phone: Some(request.phone),
        pickup_address: Some(request.pickup),
        drop_address: Some(request.drop),
        city: Some(request.city),
        service_type: request.service_type,
        reference_id: Some(reference_id),
        reference_type: Some(reference_type),
    };
    if let Err(e) = item.validate() {
        tracing::warn!("enqueueing a request the consumer will drop: {e}");
    }

    let id = queue.send(&serde_json::to_value(&item)?).await?;
    println!("Enqueued message {id} on {}", queue.queue_name());
    Ok(())
}

async fn cmd_quote(config: &Config, request: RequestArgs) -> anyhow::Result<()> {
    let request = QuoteRequest::parse(
        &request.name,
        &request.phone,
        &request.pickup,
        &request.drop,
        &request.city,
        request.service_type.as_deref(),
    )?;

    match fetcher(config).fetch_quote(&request).await {
        QuoteResult::Success { quotes } => {
            println!("{}", serde_json::to_string_pretty(&quotes)?);
            Ok(())
        }
        QuoteResult::Failure(failure) => {
            println!("{}", serde_json::to_string_pretty(&failure)?);
            anyhow::bail!("quote fetch failed: {failure}")
        }
    }
}
