#[macro_use]
extern crate log;

use dotenv::dotenv;
use log::LevelFilter;
use poem::{
    listener::TcpListener,
    middleware::{AddData, Cors},
    EndpointExt, Route, Server,
};
use poem_openapi::OpenApiService;
use std::sync::Arc;
use workhub::api::auth::{secret_key_from_env, DEFAULT_SECRET_KEY};
use workhub::api::route::WorkhubApi;
use workhub::devops::client::pat_fingerprint;
use workhub::model::config::DevOpsDefaults;
use workhub::{connect_db, init_logger, run_migrations};

use structopt::StructOpt;

/// Workhub backend server.
#[derive(Debug, PartialEq, StructOpt)]
#[structopt(setting=structopt::clap::AppSettings::ColoredHelp, name="workhub")]
struct Opt {
    /// Activate debug mode
    /// short and long flags (--debug) will be deduced from the field's name
    #[structopt(name = "debug", long = "debug")]
    debug: bool,

    /// Activate openapi mode
    #[structopt(name = "openapi", short = "o", long = "openapi")]
    openapi: bool,

    /// Enable simple CORS support.
    #[structopt(name = "cors", short = "c", long = "cors")]
    cors: bool,

    /// 127.0.0.1 or 0.0.0.0
    #[structopt(name = "host", short = "H", long = "host", possible_values=&["127.0.0.1", "0.0.0.0"], default_value = "127.0.0.1")]
    host: String,

    /// Which port.
    #[structopt(name = "port", short = "p", long = "port", default_value = "8000")]
    port: String,

    /// Database url, such as postgres:://user:pass@host:port/dbname.
    /// You can also set it with env var: DATABASE_URL.
    #[structopt(name = "database-url", short = "d", long = "database-url")]
    database_url: Option<String>,

    /// Pool size for database connection.
    #[structopt(name = "pool-size", short = "s", long = "pool-size")]
    pool_size: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    dotenv().ok();

    let args = Opt::from_args();

    let log_result = if args.debug {
        init_logger("workhub", LevelFilter::Debug)
    } else {
        init_logger("workhub", LevelFilter::Info)
    };

    if let Err(log) = log_result {
        error!(target:"stdout", "Log initialization error, {}", log);
        std::process::exit(1);
    };

    let host = args.host;
    let port = args.port;

    println!("\n\t\t*** Launch workhub on {}:{} ***", host, port);

    // Warn about placeholder secrets, they only make sense for local development.
    if secret_key_from_env() == DEFAULT_SECRET_KEY {
        warn!("You don't set SECRET_KEY environment variable, so we will use the built-in development key. Don't use it in production.");
    }

    let defaults = DevOpsDefaults::from_env();
    if defaults.org == "your-org" || defaults.project == "your-project" {
        warn!("AZURE_DEVOPS_ORG / AZURE_DEVOPS_PROJECT are not set, new user configurations will be seeded with placeholder values.");
    }
    info!(
        "Default PAT fingerprint: {}",
        pat_fingerprint(&defaults.pat)
    );

    // Connect to database.
    let database_url = args.database_url;
    let database_url = if database_url.is_none() {
        match std::env::var("DATABASE_URL") {
            Ok(v) => v,
            Err(_) => {
                error!("{}", "DATABASE_URL is not set.");
                std::process::exit(1);
            }
        }
    } else {
        database_url.unwrap()
    };

    match run_migrations(&database_url).await {
        Ok(_) => (),
        Err(err) => {
            error!("Running migrations failed, {}", err);
            std::process::exit(1);
        }
    };

    let pool_size = args.pool_size.unwrap_or(10);
    let pool = connect_db(&database_url, pool_size).await;
    let arc_pool = Arc::new(pool);
    let shared_rb = AddData::new(arc_pool.clone());

    let api_service = OpenApiService::new(WorkhubApi, "Workhub", "v0.1.0")
        .summary("A RESTful API Service for Workhub.")
        .description("A work item management service backed by Azure DevOps, with per-user configuration stored in PostgreSQL.")
        .server(format!("http://{}:{}", host, port));
    let openapi = api_service.swagger_ui();
    let mut spec = api_service.spec();

    // Remove charset=utf-8 from spec for compatibility with Apifox.
    spec = spec.replace("; charset=utf-8", "");

    let route = Route::new();

    let route = if args.openapi {
        info!("OpenApi mode is enabled. You can access the OpenApi spec at /openapi.");
        route
            .nest("/openapi", openapi)
            .at("/spec", poem::endpoint::make_sync(move |_| spec.clone()))
    } else {
        warn!("OpenApi mode is disabled. If you need the OpenApi, please use `--openapi` flag.");
        route
    };

    let route = route.nest_no_strip("/api/v1", api_service).with(shared_rb);

    if args.cors {
        info!("CORS mode is enabled.");
        let route = route.with(Cors::new().allow_origin("*"));
        Server::new(TcpListener::bind(format!("{}:{}", host, port)))
            .run(route)
            .await
    } else {
        warn!("CORS mode is disabled. If you need the CORS, please use `--cors` flag.");
        Server::new(TcpListener::bind(format!("{}:{}", host, port)))
            .run(route)
            .await
    }
}
