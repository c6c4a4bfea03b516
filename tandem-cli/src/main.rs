use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::time::Duration;
use tandem_config::{ConfigLoader, TandemConfig};
use tandem_ipc::{Metadata, TransVar, WorkerHandle};
use tracing::{info, warn};

mod cli;
use cli::{ArrayArgs, Cli, Commands, ConfigCommands, TaskArgs, WaitArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { action } = &cli.command {
        return handle_config_command(action);
    }

    let mut config = ConfigLoader::new()
        .load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(port) = cli.base_port {
        config.transport.base_port = port;
    }
    config.validate_all().context("Invalid configuration")?;

    tandem_logging::init_logging_from_config(&config.logging)?;

    match cli.command {
        Commands::Ports => hold_ports(&config).await,
        Commands::Task(args) => run_task(&config, args).await,
        Commands::Array(args) => run_array(&config, args).await,
        Commands::Config { .. } => Ok(()),
    }
}

fn handle_config_command(action: &ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Sample => {
            print!("{}", TandemConfig::generate_sample());
        }
        ConfigCommands::Validate { path } => {
            ConfigLoader::new()
                .from_file(path)
                .with_context(|| format!("Configuration {} is invalid", path.display()))?;
            println!("Configuration {} is valid", path.display());
        }
    }
    Ok(())
}

async fn start_handle(config: &TandemConfig) -> Result<WorkerHandle> {
    let handle = WorkerHandle::start(&config.transport)
        .await
        .context("Failed to bind worker channels")?;
    let ports = handle.ports();
    eprintln!(
        "Worker channels ready: request_port={} result_port={}",
        ports.request, ports.result
    );
    Ok(handle)
}

async fn hold_ports(config: &TandemConfig) -> Result<()> {
    let mut handle = start_handle(config).await?;
    let ports = handle.ports();
    println!("{} {}", ports.request, ports.result);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Interrupted, releasing ports");
    handle.shutdown().await;
    Ok(())
}

async fn run_task(config: &TandemConfig, args: TaskArgs) -> Result<()> {
    let mut handle = start_handle(config).await?;
    let metadata: Metadata = args.metadata.into_iter().collect();

    if let Err(e) = handle
        .send_request(&args.operation, args.inputs.as_slice(), &metadata)
        .await
    {
        handle.shutdown().await;
        return Err(e).context("Failed to send task request");
    }

    let result = wait_for_result(&mut handle, config, &args.wait).await;
    finish(&mut handle, args.wait.quit).await;
    print_result(result, args.wait.values)
}

async fn run_array(config: &TandemConfig, args: ArrayArgs) -> Result<()> {
    let payload = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let metadata: Metadata = args.metadata.into_iter().collect();

    let mut handle = start_handle(config).await?;
    if let Err(e) = handle
        .send_array_data(&args.id, &args.origin, &args.shape, payload, &metadata)
        .await
    {
        handle.shutdown().await;
        return Err(e).context("Failed to send array data");
    }

    if !args.wait_result {
        finish(&mut handle, args.wait.quit).await;
        return Ok(());
    }

    let result = wait_for_result(&mut handle, config, &args.wait).await;
    finish(&mut handle, args.wait.quit).await;
    print_result(result, args.wait.values)
}

async fn wait_for_result(
    handle: &mut WorkerHandle,
    config: &TandemConfig,
    wait: &WaitArgs,
) -> Option<TransVar> {
    let timeout = wait
        .timeout
        .map(Duration::from_secs)
        .or(config.transport.result_timeout);

    match timeout {
        Some(timeout) => handle.get_result_timeout(timeout).await,
        None => handle.get_result().await,
    }
}

async fn finish(handle: &mut WorkerHandle, quit: bool) {
    if quit {
        if let Err(e) = handle.quit().await {
            warn!(error = %e, "Failed to send quit to worker");
        }
    } else {
        handle.shutdown().await;
    }
}

fn print_result(result: Option<TransVar>, values: bool) -> Result<()> {
    let result = result.ok_or_else(|| {
        anyhow!("No result: the worker reported an error, disconnected, or the wait timed out")
    })?;

    println!("{}", result.header());
    println!("payload: {} bytes", result.payload().len());

    if values {
        let decoded = result
            .to_f32_vec()
            .context("Result payload is not an f32 array")?;
        println!("{:?}", decoded);
    }

    Ok(())
}
