use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use zeebe_starter::config::AppConfig;
use zeebe_starter::facade::{run_facade, FacadeState};
use zeebe_starter::gateway::GatewayClient;
use zeebe_starter::service::WorkflowService;
use zeebe_starter::shutdown::install_shutdown_handler;
use zeebe_starter::worker::WorkerHost;

#[derive(Parser, Debug)]
#[command(name = "zeebe-starter")]
#[command(version)]
#[command(about = "HTTP-fronted starter service for a Zeebe-style workflow engine")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the service: deploy the demo model, start the job workers
    /// and serve the HTTP facade
    Serve(ServeArgs),

    /// Print the broker cluster topology
    Status {
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Deploy a process definition file from the resource directory
    Deploy {
        #[command(flatten)]
        client: ClientArgs,

        /// File name, resolved against the resource directory
        file: String,
    },

    /// Start a process instance and wait for its result
    Start {
        #[command(flatten)]
        client: ClientArgs,

        /// BPMN process id to start
        #[arg(long, default_value = "test-process")]
        process_id: String,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Port the HTTP facade listens on
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Directory process definition files are read from
    #[arg(long, default_value = "resources")]
    resource_dir: PathBuf,

    /// Process definition file deployed at startup
    #[arg(long, default_value = "test-process.bpmn")]
    model_file: String,

    /// Process started by GET /start
    #[arg(long, default_value = "test-process")]
    process_id: String,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(ValueEnum, Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Server
// =============================================================================

async fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Gateway settings come from the environment, facade settings from
    // the CLI. A bad configuration is fatal here, before anything runs.
    let mut config = AppConfig::from_env()?;
    config.gateway.resource_dir = args.resource_dir;
    config.facade.listen_addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    config.facade.model_file = args.model_file;
    config.facade.process_id = args.process_id;

    tracing::info!(
        gateway = %config.gateway.address,
        tls = config.gateway.tls,
        facade = %config.facade.listen_addr,
        process_id = %config.facade.process_id,
        "Starting zeebe-starter"
    );

    let gateway = GatewayClient::connect(&config.gateway)?;
    let service = WorkflowService::new(gateway.clone(), &config);

    service.deploy(&config.facade.model_file).await?;

    let mut host = WorkerHost::new(gateway);
    service.register_workers(&mut host)?;

    let shutdown = install_shutdown_handler();
    let workers = tokio::spawn(host.run(shutdown.clone()));

    let state = FacadeState {
        service,
        process_id: config.facade.process_id.clone(),
    };
    run_facade(config.facade.listen_addr, state, shutdown.clone()).await;

    // The facade has stopped (signal or bind failure); wind down the
    // workers as well.
    shutdown.cancel();
    let _ = workers.await;

    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn client_service() -> Result<WorkflowService, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let gateway = GatewayClient::connect(&config.gateway)?;
    Ok(WorkflowService::new(gateway, &config))
}

async fn handle_status(
    service: &WorkflowService,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let topology = service.status().await?;
    match output {
        OutputFormat::Json => {
            let brokers: Vec<serde_json::Value> = topology
                .brokers
                .iter()
                .map(|b| {
                    serde_json::json!({
                        "node_id": b.node_id,
                        "host": b.host,
                        "port": b.port,
                        "version": b.version,
                    })
                })
                .collect();
            let output = serde_json::json!({
                "cluster_size": topology.cluster_size,
                "partitions_count": topology.partitions_count,
                "replication_factor": topology.replication_factor,
                "gateway_version": topology.gateway_version,
                "brokers": brokers,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            print!("{}", topology);
        }
    }
    Ok(())
}

async fn handle_deploy(
    service: &WorkflowService,
    file: &str,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let deployment = service.deploy(file).await?;
    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&deployment)?);
        }
        OutputFormat::Table => {
            println!("Deployed process model!");
            println!("Process ID: {}", deployment.bpmn_process_id);
            println!("Version:    {}", deployment.version);
            println!("Key:        {}", deployment.process_definition_key);
        }
    }
    Ok(())
}

async fn handle_start(
    service: &WorkflowService,
    process_id: &str,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let instance = service.start_instance(process_id).await?;
    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&instance)?);
        }
        OutputFormat::Table => {
            println!("Process instance completed!");
            println!("Instance Key: {}", instance.process_instance_key);
            println!("Process ID:   {}", instance.bpmn_process_id);
            println!("Version:      {}", instance.version);
            if let Some(variables) = &instance.variables {
                println!("Variables:");
                println!("{}", serde_json::to_string_pretty(variables)?);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Serve(serve_args) => {
            run_serve(serve_args).await?;
        }
        Commands::Status { client } => {
            let service = client_service().await?;
            handle_status(&service, &client.output).await?;
        }
        Commands::Deploy { client, file } => {
            let service = client_service().await?;
            handle_deploy(&service, &file, &client.output).await?;
        }
        Commands::Start { client, process_id } => {
            let service = client_service().await?;
            handle_start(&service, &process_id, &client.output).await?;
        }
    }

    Ok(())
}
