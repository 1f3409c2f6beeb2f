mod cli;
mod config;
mod logging;
mod otlp;
mod parser;

use clap::Parser;
use cosimtrace_core::channel::BoundedChannel;
use cosimtrace_core::event::{Event, EventKind};
use cosimtrace_core::{ContextQueues, HostSpanner, NetworkSpanner, NicSpanner, Tracer};
use parser::EventSource;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

const HOST_PARSER_ID: u32 = 1;
const NIC_PARSER_ID: u32 = 2;
const NETWORK_PARSER_ID: u32 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let cli = cli::Cli::parse();
    let result = match cli.command {
        cli::Command::ValidateConfig(args) => run_validate_config(args),
        cli::Command::Run(args) => run_pipeline(args).await,
        cli::Command::Replay(args) => run_replay(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "cosimtrace exited with an error");
            ExitCode::FAILURE
        }
    }
}

fn run_validate_config(args: cli::ValidateConfigArgs) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = config::load(&args.config)?;
    info!(
        syscall_entries = loaded.spanning.syscall_entry.len(),
        interesting_network_devices = loaded.spanning.interesting_network_devices.len(),
        "configuration is valid"
    );
    Ok(())
}

async fn run_pipeline(args: cli::RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = config::load(&args.config)?;
    let exporter = otlp::build_exporter(&args.otlp_endpoint)?;
    let tracer = Tracer::new(Arc::new(exporter));

    let spanning = Arc::new(loaded.spanning);
    let queues = ContextQueues::new(loaded.runtime.channel_capacity);

    let host_events = BoundedChannel::new(loaded.runtime.channel_capacity);
    let nic_events = BoundedChannel::new(loaded.runtime.channel_capacity);
    let network_events = BoundedChannel::new(loaded.runtime.channel_capacity);

    let parser_handles = vec![
        parser::spawn_pump(HOST_PARSER_ID, vec![args.host_client, args.host_server], host_events.clone()),
        parser::spawn_pump(NIC_PARSER_ID, vec![args.nic_client, args.nic_server], nic_events.clone()),
        parser::spawn_pump(NETWORK_PARSER_ID, vec![args.network], network_events.clone()),
    ];

    let host_spanner =
        HostSpanner::new(HOST_PARSER_ID, tracer.clone(), spanning.clone(), queues.clone());
    let nic_spanner = NicSpanner::new(NIC_PARSER_ID, tracer.clone(), spanning.clone(), queues.clone());
    let network_spanner =
        NetworkSpanner::new(NETWORK_PARSER_ID, tracer.clone(), spanning.clone(), queues.clone());

    let spanner_handles = vec![
        tokio::spawn(host_spanner.run(host_events)),
        tokio::spawn(nic_spanner.run(nic_events)),
        tokio::spawn(network_spanner.run(network_events)),
    ];

    for handle in parser_handles {
        let _ = handle.await;
    }
    for handle in spanner_handles {
        let _ = handle.await;
    }

    queues.close_all().await;
    tracer.log_unresolved();
    Ok(())
}

/// Demultiplexes a single recorded capture file — events from every parser
/// interleaved in one newline-delimited-JSON stream — back onto the three
/// per-role channels a live run would feed separately (§8 "Test tooling":
/// replaying a capture end-to-end).
async fn run_replay(args: cli::ReplayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = config::load(&args.config)?;
    let exporter = cosimtrace_core::export::InMemorySpanExporter::new();
    let tracer = Tracer::new(Arc::new(exporter.clone()));

    let spanning = Arc::new(loaded.spanning);
    let queues = ContextQueues::new(loaded.runtime.channel_capacity);

    let host_events = BoundedChannel::new(loaded.runtime.channel_capacity);
    let nic_events = BoundedChannel::new(loaded.runtime.channel_capacity);
    let network_events = BoundedChannel::new(loaded.runtime.channel_capacity);

    let host_spanner =
        HostSpanner::new(HOST_PARSER_ID, tracer.clone(), spanning.clone(), queues.clone());
    let nic_spanner = NicSpanner::new(NIC_PARSER_ID, tracer.clone(), spanning.clone(), queues.clone());
    let network_spanner =
        NetworkSpanner::new(NETWORK_PARSER_ID, tracer.clone(), spanning.clone(), queues.clone());

    let spanner_handles = vec![
        tokio::spawn(host_spanner.run(host_events.clone())),
        tokio::spawn(nic_spanner.run(nic_events.clone())),
        tokio::spawn(network_spanner.run(network_events.clone())),
    ];

    demux_capture(&args.capture, &host_events, &nic_events, &network_events).await?;
    host_events.close().await;
    nic_events.close().await;
    network_events.close().await;

    for handle in spanner_handles {
        let _ = handle.await;
    }
    queues.close_all().await;
    tracer.log_unresolved();

    for span in exporter.exported_spans() {
        info!(span_id = span.id(), kind = span.kind().name(), "exported span");
    }
    Ok(())
}

async fn demux_capture(
    path: &PathBuf,
    host: &Arc<BoundedChannel<Event>>,
    nic: &Arc<BoundedChannel<Event>>,
    network: &Arc<BoundedChannel<Event>>,
) -> std::io::Result<()> {
    let mut source = parser::JsonlEventSource::open(path).await?;
    while let Some(event) = source.next_event().await {
        let sink = match &event.kind {
            EventKind::HostInstr { .. }
            | EventKind::HostCall { .. }
            | EventKind::HostPostInt
            | EventKind::HostClearInt
            | EventKind::HostMmioR { .. }
            | EventKind::HostMmioW { .. }
            | EventKind::HostMmioImRespPoW
            | EventKind::HostMmioCR { .. }
            | EventKind::HostMmioCW { .. }
            | EventKind::HostPciRW { .. }
            | EventKind::HostConf { .. }
            | EventKind::HostDmaR { .. }
            | EventKind::HostDmaW { .. }
            | EventKind::HostDmaC { .. }
            | EventKind::HostMsiX { .. } => host,
            EventKind::NicMmioR { .. }
            | EventKind::NicMmioW { .. }
            | EventKind::NicDmaI { .. }
            | EventKind::NicDmaEx { .. }
            | EventKind::NicDmaCR { .. }
            | EventKind::NicDmaCW { .. }
            | EventKind::NicTx { .. }
            | EventKind::NicRx { .. }
            | EventKind::NicMsix { .. }
            | EventKind::SetIx { .. } => nic,
            EventKind::NetworkEnqueue(_) | EventKind::NetworkDequeue(_) | EventKind::NetworkDrop(_) => network,
        };
        let _ = sink.push(event).await;
    }
    Ok(())
}
