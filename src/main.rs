use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use connbench::connection::postgres::PgDriver;
use connbench::{
    logging, BenchConfig, BenchmarkEngine, BenchmarkReport, ConnectionFactory, ConnectionParameters,
    CredentialProvisioner, Driver, Error, NetworkRegistry, NetworkSettings, ProvisionedStore, Result,
    ResultAggregator, TlsPolicy,
};

mod app_config;

use app_config::Cli;

/// Blocking pool floor; native-mode attempts each hold one blocking thread
const MIN_BLOCKING_THREADS: usize = 512;

fn main() -> ExitCode {
    std::panic::set_hook(Box::new(|panic_info| {
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic_info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("Unknown panic");
        let location = panic_info.location().map_or("unknown".to_string(), |l| l.to_string());
        error!("PANIC: {} at {}", message, location);
        eprintln!("CRITICAL: panic at {}: {}", location, message);
    }));

    // clap exits with status 2 on usage errors
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal: {}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = BenchConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;
    logging::init(&config.logging, cli.debug)?;

    let params = cli.connection_parameters()?;
    let concurrency = config.benchmark.concurrency;

    let store = match cli.credential_bundle(&config)? {
        Some(bundle) => {
            let provisioner = CredentialProvisioner::new(NetworkRegistry::global())
                .with_tls_policy(TlsPolicy::from_config(&config.tls)?);
            let store = provisioner.provision(bundle)?;
            print_settings(&store.settings());
            Some(store)
        }
        None => None,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.benchmark.worker_threads)
        .max_blocking_threads(concurrency.max(MIN_BLOCKING_THREADS))
        .thread_name("connbench-worker")
        .enable_all()
        .build()
        .map_err(|e| Error::InvalidState(format!("Failed to start runtime: {}", e)))?;

    let outcome = runtime.block_on(benchmark(&params, &config, store.as_ref()));
    drop(runtime);

    // Every attempt has finished; the stores are no longer referenced
    let cleanup = match store {
        Some(store) => store.close(),
        None => Ok(()),
    };

    conclude(outcome, cleanup, cli.json)
}

/// Print the report if there is one; a cleanup failure always fails the run
fn conclude(outcome: Result<BenchmarkReport>, cleanup: Result<()>, json: bool) -> Result<ExitCode> {
    match (outcome, cleanup) {
        (Ok(report), cleanup) => {
            if json {
                println!("{}", report.to_json()?);
            } else {
                println!("{}", report);
            }
            cleanup?;
            Ok(ExitCode::SUCCESS)
        }
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup)) => {
            error!("Benchmark failed: {}", e);
            let detail = match cleanup {
                Error::CleanupFailure(detail) => detail,
                other => other.to_string(),
            };
            Err(Error::CleanupFailure(format!("{} (run had already failed: {})", detail, e)))
        }
    }
}

async fn benchmark(
    params: &ConnectionParameters,
    config: &BenchConfig,
    store: Option<&ProvisionedStore<'_>>,
) -> Result<BenchmarkReport> {
    let concurrency = config.benchmark.concurrency;
    let driver: Arc<dyn Driver> = Arc::new(PgDriver);

    println!("{}", driver.describe());
    println!("Connecting using a {} driver", params.driver());

    let mut factory = ConnectionFactory::new(driver).with_pool_size(concurrency);
    if let Some(store) = store {
        factory = factory.with_network(store.settings())?;
    }

    let engine = BenchmarkEngine::new(Arc::new(factory)).with_attempt_timeout(config.benchmark.attempt_timeout);

    info!(
        "Opening {} {} connections to {} as {}",
        concurrency,
        params.pooling(),
        params.endpoint(),
        params.principal()
    );
    let start = tokio::time::Instant::now();
    let results = engine.run(params, concurrency).await;
    let elapsed = start.elapsed();

    let report = ResultAggregator::summarize(&results, elapsed);
    let close_failures = BenchmarkEngine::release(results).await;
    if close_failures > 0 {
        warn!("{} connections did not close cleanly", close_failures);
    }
    Ok(report)
}

fn print_settings(settings: &NetworkSettings) {
    for (name, value) in settings.properties() {
        println!("{:>35} -> {}", name, value);
    }
}
