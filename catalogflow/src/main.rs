use std::error::Error;
use std::path::PathBuf;

use catalogflow_core::classifier::Routing;
use catalogflow_core::config::Settings;
use catalogflow_core::consumer::{run_feed_consumer, run_upsert_consumer};
use catalogflow_core::metrics::encode_metrics;
use catalogflow_core::pipeline::{PipelineReport, ingest_file};
use catalogflow_core::provision::provision_indices;
use catalogflow_core::sink::bulk::BulkSink;
use catalogflow_core::sink::log::LogSink;
use catalogflow_core::sink::publish::PublishSink;
use catalogflow_core::verify::verify_file;
use catalogflow_nats::{Context, JetstreamPublisher};
use catalogflow_search::SearchClient;
use clap::ArgMatches;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod cmdline;
mod setup_tracing;

type BoxResult<T> = Result<T, Box<dyn Error>>;

#[tokio::main]
async fn main() -> BoxResult<()> {
    setup_tracing::register();

    if let Err(e) = run().await {
        error!("{e:?}");
        return Err(e);
    }
    info!("Exiting...");

    Ok(())
}

async fn run() -> BoxResult<()> {
    let matches = cmdline::root_cli().get_matches();
    let settings = Settings::from_env()?;

    let cancel = CancellationToken::new();
    let shutdown_cancel = cancel.clone();
    let shutdown_handle = tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_cancel.cancel();
    });

    let result = match matches.subcommand() {
        Some(("ingest", args)) => ingest(&settings, args, cancel).await,
        Some(("verify", args)) => verify(&settings, args).await,
        Some(("create-index", args)) => create_index(&settings, args).await,
        Some(("consume", _)) => consume(&settings, cancel).await,
        Some((other, _)) => Err(format!("unknown subcommand {other}").into()),
        None => Err("a subcommand is required".into()),
    };

    if !shutdown_handle.is_finished() {
        shutdown_handle.abort();
    }
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => {
                warn!(?e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received terminate signal");
            }
            Err(e) => {
                warn!(?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Connects to NATS and makes sure the stream carrying both subjects exists.
async fn connect_bus(settings: &Settings) -> BoxResult<Context> {
    let context = catalogflow_nats::connect(&(&settings.nats).into()).await?;
    catalogflow_nats::ensure_stream(
        &context,
        &settings.nats.stream,
        &[
            settings.nats.items_subject.clone(),
            settings.nats.feed_subject.clone(),
        ],
    )
    .await?;
    Ok(context)
}

fn file_arg(args: &ArgMatches) -> BoxResult<PathBuf> {
    Ok(args
        .get_one::<PathBuf>("file")
        .cloned()
        .ok_or("--file is required")?)
}

async fn ingest(
    settings: &Settings,
    args: &ArgMatches,
    cancel: CancellationToken,
) -> BoxResult<()> {
    let file = file_arg(args)?;
    let mode = args
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or(cmdline::MODE_PUBLISH);
    let lang = args.get_one::<String>("lang");

    let report: PipelineReport = match mode {
        cmdline::MODE_DIRECT => {
            let routing = match lang {
                Some(lang) => Routing::single(settings.index_for(lang)?),
                None => Routing::multi_locale(settings),
            };
            let client = SearchClient::new((&settings.search).into())?;
            let sink = BulkSink::new(client, routing, settings.retry.clone(), cancel.clone());
            ingest_file(file, sink, &settings.pipeline, cancel).await?
        }
        cmdline::MODE_LOG => ingest_file(file, LogSink, &settings.pipeline, cancel).await?,
        _ => {
            if lang.is_some() {
                warn!("--lang only applies to direct mode, ignoring it");
            }
            let context = connect_bus(settings).await?;
            let publisher = JetstreamPublisher::new(context, settings.nats.items_subject.clone());
            ingest_file(file, PublishSink::new(publisher), &settings.pipeline, cancel).await?
        }
    };

    info!(
        mode,
        rows = report.producer.rows,
        decoded = report.producer.decoded,
        decode_errors = report.producer.decode_errors,
        batches = report.accumulator.batches,
        failed_batches = report.accumulator.failed_batches,
        failed_items = report.accumulator.failed_items,
        "Ingest summary"
    );
    match encode_metrics() {
        Ok(metrics) => debug!(%metrics, "Pipeline metrics"),
        Err(e) => warn!(?e, "Encoding metrics"),
    }
    Ok(())
}

async fn verify(settings: &Settings, args: &ArgMatches) -> BoxResult<()> {
    let file = file_arg(args)?;
    let lang = args.get_one::<String>("lang").ok_or("--lang is required")?;
    let index = settings.index_for(lang)?;

    let client = SearchClient::new((&settings.search).into())?;
    let report = verify_file(&client, index, file).await?;
    info!(
        index,
        found = report.matched,
        sampled = report.sample_size,
        ratio = report.ratio(),
        "Index holds {} of {} sampled skus",
        report.matched,
        report.sample_size
    );
    Ok(())
}

async fn create_index(settings: &Settings, args: &ArgMatches) -> BoxResult<()> {
    let index_settings = match args.get_one::<PathBuf>("settings") {
        Some(path) => {
            let raw = tokio::fs::read(path)
                .await
                .map_err(|e| format!("reading {}: {e}", path.display()))?;
            Some(serde_json::from_slice::<serde_json::Value>(&raw)?)
        }
        None => None,
    };

    let client = SearchClient::new((&settings.search).into())?;
    let created = provision_indices(&client, settings, index_settings.as_ref()).await?;
    info!(?created, "Index provisioning finished");
    Ok(())
}

async fn consume(settings: &Settings, cancel: CancellationToken) -> BoxResult<()> {
    let context = connect_bus(settings).await?;
    let client = SearchClient::new((&settings.search).into())?;

    tokio::try_join!(
        run_upsert_consumer(&context, settings, client, cancel.clone()),
        run_feed_consumer(&context, settings, cancel),
    )?;
    Ok(())
}
