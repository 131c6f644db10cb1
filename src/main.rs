use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;
mod config;
mod node;

use blockchain::number::Amount;
use blockchain::{Address, Block, ChainStore, Ledger, StorageError, Wallet};
use config::{Cli, Commands, ConsensusParams, KeygenArgs, RunArgs};
use node::NodeService;

// Load the persisted chain, or start a new one from a fresh genesis block
async fn initialize_ledger(store: &ChainStore, owner: &Address, params: &ConsensusParams) -> Ledger {
    match store.load() {
        Ok(blocks) => match Ledger::from_blocks(blocks) {
            Ok(ledger) => {
                info!(
                    "Loaded blockchain with {} blocks from {}",
                    ledger.len(),
                    store.path().display()
                );
                if let Err(err) = ledger.verify_integrity() {
                    warn!("Loaded chain failed its integrity check: {}", err);
                }
                return ledger;
            }
            Err(err) => warn!("Failed to rebuild chain from {}: {}", store.path().display(), err),
        },
        Err(StorageError::NotFound(_)) => {
            info!("No chain file at {}, creating genesis block", store.path().display());
        }
        Err(err) => warn!("Failed to load chain from {}: {}", store.path().display(), err),
    }

    let genesis = Block::genesis(owner.clone(), Amount::from_units(params.owner_allocation));
    info!(
        "Genesis block created, {} PHN allocated to {}",
        params.owner_allocation,
        owner.display()
    );

    let ledger = Ledger::new(genesis);
    if let Err(err) = store.save(ledger.blocks()).await {
        error!("Failed to save genesis block: {}", err);
    }
    ledger
}

// Generate a wallet and print its keys
fn keygen(args: KeygenArgs) -> anyhow::Result<()> {
    let wallet = Wallet::generate();

    println!("Private key:     {}", wallet.export_secret_key_hex());
    println!("Address:         {}", wallet.address());
    println!("Display address: {}", wallet.address().display());

    if let Some(path) = args.out {
        wallet
            .save(&path)
            .with_context(|| format!("Failed to write wallet file {}", path.display()))?;
        println!("Wallet written to {}", path.display());
    }

    Ok(())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::get_pending_transactions,
        api::handlers::validate_chain,
        api::handlers::get_balance,
        api::handlers::get_all_accounts,
        api::handlers::get_node_info
    ),
    components(
        schemas(
            api::handlers::ChainResponse,
            api::handlers::PendingResponse,
            api::handlers::ValidationResponse,
            api::handlers::BalanceResponse,
            api::handlers::AccountResponse,
            api::handlers::NodeInfoResponse
        )
    ),
    tags(
        (name = "phn-node", description = "Read-only views of the PHN ledger")
    ),
    info(
        title = "PHN Node API",
        version = "1.0.0",
        description = "REST views of the PHN ledger. Wallets and miners use the WebSocket protocol at /ws.",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let params = args.consensus();

    let owner = Wallet::load(&args.owner_wallet)
        .with_context(|| format!("Failed to load owner wallet {}", args.owner_wallet.display()))?;
    info!("Owner address: {}", owner.address().display());

    let store = ChainStore::new(&args.chain_file);
    let ledger = initialize_ledger(&store, owner.address(), &params).await;

    let node = NodeService::start(
        ledger,
        Some(store),
        owner.address().clone(),
        params,
        args.persistence(),
    );
    let data = web::Data::new(node.clone());

    info!("Starting node at ws://{}:{}/ws", args.host, args.port);
    info!("Swagger UI at http://{}:{}/swagger-ui/", args.host, args.port);

    // Start HTTP server
    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(data.clone())
            .configure(api::configure_routes)
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()))
    })
    .bind((args.host.as_str(), args.port))
    .with_context(|| format!("Failed to bind {}:{}", args.host, args.port))?
    .run()
    .await?;

    info!("Server stopped, flushing chain");
    if let Err(err) = node.flush().await {
        error!("Final chain flush failed: {}", err);
    }

    Ok(())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            env_logger::init_from_env(env_logger::Env::new().default_filter_or(&args.log_level));
            run(args).await
        }
        Commands::Keygen(args) => keygen(args),
    }
}
