// # asg-dnsd - Lifecycle event handler
//
// Thin integration layer around asg-dns-core. All reconciliation logic lives
// in the core; this binary only wires collaborators together.
//
// The asg-dnsd binary is responsible for:
// 1. Reading configuration from environment variables
// 2. Loading the reconciler config, the event and the topology snapshot
// 3. Running one reconciliation against an in-memory record store
// 4. Printing the resulting records and change log as JSON on stdout
//
// ## Configuration
//
// - `ASG_DNS_CONFIG_FILE`: Reconciler config (default `config.json`)
// - `ASG_DNS_EVENT_FILE`: CloudWatch event JSON (`-` or unset reads stdin)
// - `ASG_DNS_TOPOLOGY_FILE`: Topology snapshot JSON (required)
// - `ASG_DNS_RECORDS_FILE`: Records to seed the store with (optional)
// - `ASG_DNS_TXT_SOURCE`: Where ownership markers are read from: `store`
//   (default) or `dns` (requires the `hickory` feature)
// - `ASG_DNS_TIMEOUT_SECS`: Abort remaining actions after this long (default 30)
// - `ASG_DNS_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export ASG_DNS_CONFIG_FILE=/etc/asg-dns/config.json
// export ASG_DNS_TOPOLOGY_FILE=topology.json
//
// asg-dnsd < launch-event.json
// ```

use anyhow::{Context, Result};
use asg_dns_core::config::DEFAULT_CONFIG_FILE;
use asg_dns_core::store::RecordSnapshot;
use asg_dns_core::traits::TxtResolver;
use asg_dns_core::{
    LifecycleEvent, MemoryRecordStore, Reconciler, ReconcilerConfig, StaticTopologyResolver,
};
use std::env;
use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different outcomes
///
/// - 0: Every record converged
/// - 1: Configuration or input error; nothing was attempted
/// - 2: Reconciliation failed (topology lookup or at least one record)
#[derive(Debug, Clone, Copy)]
enum AsgDnsExitCode {
    Converged = 0,
    ConfigError = 1,
    ReconcileError = 2,
}

impl From<AsgDnsExitCode> for ExitCode {
    fn from(code: AsgDnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    config_file: String,
    event_file: Option<String>,
    topology_file: String,
    records_file: Option<String>,
    txt_source: String,
    timeout_secs: u64,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            config_file: env::var("ASG_DNS_CONFIG_FILE")
                .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string()),
            event_file: env::var("ASG_DNS_EVENT_FILE")
                .ok()
                .filter(|s| !s.is_empty() && s != "-"),
            topology_file: env::var("ASG_DNS_TOPOLOGY_FILE").context(
                "ASG_DNS_TOPOLOGY_FILE is required. \
                Set it via: export ASG_DNS_TOPOLOGY_FILE=topology.json",
            )?,
            records_file: env::var("ASG_DNS_RECORDS_FILE").ok().filter(|s| !s.is_empty()),
            txt_source: env::var("ASG_DNS_TXT_SOURCE").unwrap_or_else(|_| "store".to_string()),
            timeout_secs: match env::var("ASG_DNS_TIMEOUT_SECS") {
                Ok(s) => s
                    .parse()
                    .with_context(|| format!("ASG_DNS_TIMEOUT_SECS is not a number: {:?}", s))?,
                Err(_) => 30,
            },
            log_level: env::var("ASG_DNS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        for (var, path) in [
            ("ASG_DNS_CONFIG_FILE", Some(&self.config_file)),
            ("ASG_DNS_TOPOLOGY_FILE", Some(&self.topology_file)),
            ("ASG_DNS_EVENT_FILE", self.event_file.as_ref()),
            ("ASG_DNS_RECORDS_FILE", self.records_file.as_ref()),
        ] {
            if let Some(path) = path
                && !std::path::Path::new(path).is_file()
            {
                anyhow::bail!("{} does not name a readable file: {}", var, path);
            }
        }

        match self.txt_source.as_str() {
            "store" => {}
            "dns" if cfg!(feature = "hickory") => {}
            "dns" => anyhow::bail!(
                "ASG_DNS_TXT_SOURCE=dns requires asg-dnsd built with the `hickory` feature"
            ),
            other => anyhow::bail!(
                "ASG_DNS_TXT_SOURCE '{}' is not supported. Supported: store, dns",
                other
            ),
        }

        if !(1..=900).contains(&self.timeout_secs) {
            anyhow::bail!(
                "ASG_DNS_TIMEOUT_SECS must be between 1 and 900 seconds. Got: {}",
                self.timeout_secs
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "ASG_DNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

/// Everything loaded from disk before the runtime starts
struct Inputs {
    config: ReconcilerConfig,
    event: LifecycleEvent,
    topology: StaticTopologyResolver,
    seed: Vec<RecordSnapshot>,
}

impl Inputs {
    fn load(config: &Config) -> Result<Self> {
        let reconciler_config = ReconcilerConfig::from_file(&config.config_file)
            .with_context(|| format!("loading {}", config.config_file))?;

        let event_json = match &config.event_file {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("reading event {}", path))?,
            None => {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("reading event from stdin")?;
                buf
            }
        };
        let event = LifecycleEvent::from_json_str(&event_json).context("parsing event")?;

        let topology = StaticTopologyResolver::from_file(&config.topology_file)
            .with_context(|| format!("loading topology {}", config.topology_file))?;

        let seed = match &config.records_file {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading records {}", path))?;
                serde_json::from_str(&json).with_context(|| format!("parsing records {}", path))?
            }
            None => Vec::new(),
        };

        Ok(Self {
            config: reconciler_config,
            event,
            topology,
            seed,
        })
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return AsgDnsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return AsgDnsExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries the JSON result
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return AsgDnsExitCode::ConfigError.into();
    }

    let inputs = match Inputs::load(&config) {
        Ok(inputs) => inputs,
        Err(e) => {
            error!("{:#}", e);
            return AsgDnsExitCode::ConfigError.into();
        }
    };

    info!(
        "Handling {} event for {} in hosted zone {}",
        inputs.event.kind, inputs.event.group_id, inputs.config.hosted_zone_id
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return AsgDnsExitCode::ReconcileError.into();
        }
    };

    let result = rt.block_on(async {
        match run(&config, inputs).await {
            Ok(code) => code,
            Err(e) => {
                error!("{:#}", e);
                AsgDnsExitCode::ReconcileError
            }
        }
    });

    result.into()
}

/// Reconcile one event and print the resulting store
async fn run(config: &Config, inputs: Inputs) -> Result<AsgDnsExitCode> {
    let store = MemoryRecordStore::with_records(inputs.seed);
    let txt_resolver = txt_resolver(config, &store)?;

    let (reconciler, mut event_rx) = Reconciler::new(
        Arc::new(inputs.topology),
        Arc::new(store.clone()),
        txt_resolver,
        inputs.config,
    )?;

    let events = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            tracing::debug!("{:?}", event);
        }
    });

    let cancel = CancellationToken::new();
    let watchdog = tokio::spawn(cancel_on_shutdown(
        cancel.clone(),
        Duration::from_secs(config.timeout_secs),
    ));

    let outcome = reconciler
        .handle_event_with_cancel(&inputs.event, &cancel)
        .await;

    watchdog.abort();
    drop(reconciler);
    let _ = events.await;

    let (code, error) = match &outcome {
        Ok(report) => {
            info!(
                "Converged: {} action(s), {} owned record(s) cleared",
                report.actions.len(),
                report.cleared.len()
            );
            (AsgDnsExitCode::Converged, None)
        }
        Err(e) => {
            for failure in e.failures() {
                error!("{}", failure);
            }
            if e.failures().is_empty() {
                error!("{}", e);
            }
            (AsgDnsExitCode::ReconcileError, Some(e.to_string()))
        }
    };

    let output = serde_json::json!({
        "event": inputs.event,
        "error": error,
        "records": store.snapshot().await,
        "changes": store.changes().await,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(code)
}

#[cfg(feature = "hickory")]
fn txt_resolver(config: &Config, store: &MemoryRecordStore) -> Result<Arc<dyn TxtResolver>> {
    if config.txt_source == "dns" {
        info!("Resolving ownership markers over DNS");
        let resolver = asg_dns_resolver_hickory::HickoryTxtResolver::from_system_conf()?;
        return Ok(Arc::new(resolver));
    }
    Ok(Arc::new(store.clone()))
}

#[cfg(not(feature = "hickory"))]
fn txt_resolver(_config: &Config, store: &MemoryRecordStore) -> Result<Arc<dyn TxtResolver>> {
    Ok(Arc::new(store.clone()))
}

/// Cancel `token` on SIGTERM/SIGINT or once `timeout_duration` has passed
#[cfg(unix)]
async fn cancel_on_shutdown(token: CancellationToken, timeout_duration: Duration) {
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to set up signal handlers: {}", e);
            tokio::time::sleep(timeout_duration).await;
            warn!("Timed out after {:?}, aborting remaining actions", timeout_duration);
            token.cancel();
            return;
        }
    };

    let reason = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
        _ = tokio::time::sleep(timeout_duration) => "timeout",
    };

    warn!("Received {}, aborting remaining actions", reason);
    token.cancel();
}

/// Cancel `token` on CTRL-C or once `timeout_duration` has passed
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn cancel_on_shutdown(token: CancellationToken, timeout_duration: Duration) {
    let reason = tokio::select! {
        _ = tokio::signal::ctrl_c() => "CTRL-C",
        _ = tokio::time::sleep(timeout_duration) => "timeout",
    };

    warn!("Received {}, aborting remaining actions", reason);
    token.cancel();
}
