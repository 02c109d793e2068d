// ==============================================================================
// main.rs - Kinship Worker Process
// ==============================================================================
// Description: Confidential worker that polls the analysis contract, runs
//              pairwise SNP kinship analysis, and submits results on-chain
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2025-12-02
// Version: 1.0.0
// ==============================================================================

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn, Level};

mod abi;
mod api;
mod config;
mod contract;
mod host;
mod processor;

use config::Config;
use contract::ContractClient;
use host::HostClient;
use processor::RequestProcessor;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    info!("Starting Kinship Worker v1.0.0");

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    info!("Contract: {}", config.contract_address);
    info!("Host socket: {:?}", config.host_socket_path);
    info!(
        "Poll interval: {:?}, max parallel: {}, retry budget: {}",
        config.poll_interval, config.max_parallel, config.retry_max
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(signal_listener(shutdown_tx));

    let host = HostClient::new(
        config.host_socket_path.clone(),
        config.host_call_method.clone(),
        config.host_submit_method.clone(),
        config.host_call_timeout,
        config.host_max_payload,
    );

    // Reachability is checked in the background: a missing socket is
    // logged and retried, never fatal
    tokio::spawn(probe_host(host.clone(), shutdown_rx.clone()));

    let contract = ContractClient::new(host, config.contract_address.clone(), config.gas_limit);
    let processor = RequestProcessor::new(contract, &config, shutdown_rx.clone());

    // Local status API (health + cached results)
    let api_state = api::ApiState::new(processor.state(), config.contract_address.clone());
    let api_addr = config.status_api_addr;
    let api_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_addr, api_state, api_shutdown).await {
            warn!("Status API unavailable: {e:#}");
        }
    });

    // Main processing loop; returns after shutdown and drain
    processor.run().await;

    info!("Shutdown complete");
}

/// Flip the shutdown signal on SIGINT or SIGTERM
async fn signal_listener(shutdown: watch::Sender<bool>) {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => info!("SIGINT received, shutting down"),
                _ = term.recv() => info!("SIGTERM received, shutting down"),
            }
        }
        Err(e) => {
            warn!("Could not install SIGTERM handler: {e}");
            let _ = ctrl_c.await;
            info!("SIGINT received, shutting down");
        }
    }
    let _ = shutdown.send(true);
}

/// Start-up reachability probe for the host socket, with capped backoff
async fn probe_host(host: HostClient, shutdown: watch::Receiver<bool>) {
    let mut delay = Duration::from_secs(1);
    loop {
        match host.probe().await {
            Ok(()) => {
                info!("Host runtime reachable at {:?}", host.socket_path());
                return;
            }
            Err(e) => {
                warn!("Host runtime not reachable: {e}; retrying in {delay:?}");
            }
        }
        let mut rx = shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = rx.wait_for(|stop| *stop) => return,
        }
        delay = (delay * 2).min(Duration::from_secs(60));
    }
}
