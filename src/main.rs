mod config;
mod ip;
mod provider;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use config::{Config, Settings};
use provider::azure::{self, AzureDnsClient};

#[derive(Parser, Debug)]
#[command(name = "azure-dyndns")]
#[command(about = "Update an A record in an Azure DNS zone with the current public IP")]
struct Args {
    /// Path to a JSON config file; when given, its contents replace all
    /// other flag values
    #[arg(short = 'f', long)]
    config_file: Option<PathBuf>,

    /// Resource group where the DNS zone is located
    #[arg(short = 'g', long)]
    resource_group: Option<String>,

    /// DNS zone name
    #[arg(short = 'z', long)]
    zone: Option<String>,

    /// DNS record name to create or update
    #[arg(short = 'r', long)]
    record: Option<String>,

    /// Azure subscription ID
    #[arg(short = 's', long)]
    subscription_id: Option<String>,

    /// Azure tenant ID (or set AZURE_TENANT_ID)
    #[arg(short = 't', long)]
    tenant_id: Option<String>,

    /// Service principal client ID (or set AZURE_CLIENT_ID)
    #[arg(short = 'c', long)]
    client_id: Option<String>,

    /// Service principal client secret (or set AZURE_CLIENT_SECRET)
    #[arg(short = 'x', long)]
    client_secret: Option<String>,
}

impl Args {
    fn settings(&self) -> Settings {
        Settings {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            zone_name: self.zone.clone(),
            record_name: self.record.clone(),
            tenant_id: self.tenant_id.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }
}

/// Outbound service endpoints, overridable so tests can point the pipeline
/// at a local mock server.
struct Endpoints {
    authority: String,
    management: String,
    ip_echo: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            authority: azure::AUTHORITY.to_string(),
            management: azure::MANAGEMENT_ENDPOINT.to_string(),
            ip_echo: ip::IP_ECHO_URL.to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = Config::resolve(args.settings(), args.config_file.as_deref())?;

    let result = run(&config, &Endpoints::default()).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// The whole pipeline: authenticate, look up the public IP, upsert the
/// record. Strictly sequential; the first failure aborts the run.
async fn run(config: &Config, endpoints: &Endpoints) -> Result<serde_json::Value> {
    let credentials = config.credentials()?;
    let client = reqwest::Client::new();

    let token = azure::acquire_token(&client, &endpoints.authority, &credentials).await?;
    let dns = AzureDnsClient::new(client.clone(), endpoints.management.clone(), token);

    let address = ip::fetch(&client, &endpoints.ip_echo).await?;
    info!("Current public IP: {}", address);

    let result = dns
        .upsert_a_record(
            &config.subscription_id,
            &config.resource_group,
            &config.zone_name,
            &config.record_name,
            address,
        )
        .await?;

    info!(
        "Record {}.{} now points at {}",
        config.record_name, config.zone_name, address
    );
    Ok(result)
}
