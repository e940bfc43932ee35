#![doc = include_str!("../README.md")]
//! Workhub library for proxying Azure DevOps work items with persistent user management.

pub mod api;
pub mod devops;
pub mod model;

use log::{debug, error, info, warn, LevelFilter};
use log4rs;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use regex::Regex;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const MIGRATIONS: include_dir::Dir = include_dir::include_dir!("migrations");

/// Connect to the database and run the migrations.
pub async fn run_migrations(database_url: &str) -> sqlx::Result<()> {
    info!("Running migrations.");
    // Create a temporary directory.
    let dir = tempfile::tempdir()?;

    for file in MIGRATIONS.files() {
        // Create each file in the temporary directory.
        let file_path = dir.path().join(file.path());
        let mut temp_file = File::create(&file_path)?;
        // Write the contents of the included file to the temporary file.
        temp_file.write_all(file.contents())?;
    }

    // Now we can create a Migrator from the temporary directory.
    info!("Importing migrations from {:?}", dir.path());
    for file in dir.path().read_dir()? {
        match file {
            Ok(file) => debug!("Found migration: {:?}", file.path()),
            Err(e) => warn!("Error: {:?}", e),
        }
    }
    let migrator = Migrator::new(Path::new(dir.path())).await?;

    let pool = connect_db(database_url, 1).await;

    migrator.run(&pool).await?;

    // Don't forget to cleanup the temporary directory.
    dir.close()?;
    info!("Migrations finished.");

    Ok(())
}

pub fn init_logger(tag_name: &str, level: LevelFilter) -> Result<log4rs::Handle, String> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            &(format!("[{}]", tag_name) + " {d} - {h({l} - {t} - {m}{n})}"),
        )))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .logger(
            Logger::builder()
                .appender("stdout")
                .additive(false)
                .build("stdout", level),
        )
        .build(Root::builder().appender("stdout").build(level))
        .unwrap();

    log4rs::init_config(config).map_err(|e| {
        format!(
            "couldn't initialize log configuration. Reason: {}",
            e.description()
        )
    })
}

pub fn is_db_url_valid(db_url: &str) -> bool {
    // check whether db url is valid. the db_url format is postgres://<username>:<password>@<host>:<port>/database
    let regex_str = r"^postgres://((.+):(.+)@)?(.+):(\d+)(/.+)?$";
    let is_valid = match Regex::new(regex_str) {
        Ok(r) => r.is_match(db_url),
        Err(_) => false,
    };

    return is_valid;
}

pub fn parse_db_url(db_url: &str) -> (String, String, String, String, String) {
    // Get host, username and password from db_url. the db_url format is postgres://<username>:<password>@<host>:<port>/database
    let url = url::Url::parse(db_url).unwrap();
    let host = match url.host_str() {
        Some(h) => h.to_string(),
        None => "".to_string(),
    };
    let port = match url.port() {
        Some(p) => p.to_string(),
        None => "".to_string(),
    };
    let username = url.username().to_string();
    let password = match url.password() {
        Some(p) => p.to_string(),
        None => "".to_string(),
    };
    let database = url.path().to_string().replace("/", "");

    return (host, port, username, password, database);
}

pub async fn connect_db(database_url: &str, max_connections: u32) -> sqlx::PgPool {
    match is_db_url_valid(database_url) {
        true => (),
        false => {
            error!("Invalid database_url: {}, the format is postgres://<username>:<password>@<host>:<port>/<database>", database_url);
            std::process::exit(1);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .idle_timeout(std::time::Duration::from_secs(600)) // 10 min
        .acquire_timeout(std::time::Duration::from_secs(30)) // 30 seconds
        .max_lifetime(std::time::Duration::from_secs(1800)) // 30 min
        .connect(&database_url)
        .await;

    match pool {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to connect to the database: {}", e);
            std::process::exit(1);
        }
    }
}

// Setup the test database
pub async fn setup_test_db() -> sqlx::PgPool {
    // Get the database url from the environment variable
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            println!("{}", "DATABASE_URL is not set.");
            std::process::exit(1);
        }
    };
    let pool = connect_db(&database_url, 1).await;

    return pool;
}
