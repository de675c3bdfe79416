use std::path::PathBuf;

use clap::{Parser, Subcommand};
use laptop_catalog::client::{self, AuthInterceptor, CatalogClient, DEFAULT_CHUNK_SIZE};
use laptop_catalog::proto::memory::Unit;
use laptop_catalog::proto::{Filter, Memory};
use laptop_catalog::{sample, serializer};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Laptop catalog client", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    server: String,

    /// CA certificate (PEM) used to verify the server; enables TLS
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    #[arg(short, long, env = "CATALOG_USER", default_value = "admin1")]
    user: String,

    #[arg(short, long, env = "CATALOG_PASSWORD", default_value = "secret")]
    password: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print an access token.
    Login,

    /// Create random sample laptops.
    Create {
        #[arg(short, long, default_value = "1")]
        count: usize,
    },

    /// Search laptops.
    Search {
        #[arg(long, default_value = "3000")]
        max_price: f64,

        #[arg(long, default_value = "4")]
        min_cores: u32,

        #[arg(long, default_value = "2.5")]
        min_ghz: f64,

        #[arg(long, default_value = "8", help = "Minimum RAM in GiB")]
        min_ram_gb: u64,
    },

    /// Upload an image for a laptop.
    Upload {
        #[arg(short, long)]
        laptop: String,

        #[arg(short, long)]
        file: PathBuf,
    },

    /// Rate laptops, given as comma-separated ids and scores.
    Rate {
        #[arg(short, long, value_delimiter = ',')]
        laptops: Vec<String>,

        #[arg(long, value_delimiter = ',')]
        scores: Vec<f64>,
    },
}

async fn connect(cli: &Cli) -> Result<Channel, Box<dyn std::error::Error>> {
    let mut endpoint = Endpoint::from_shared(cli.server.clone())?;

    if let Some(ca_cert) = &cli.ca_cert {
        let pem = tokio::fs::read(ca_cert).await?;
        endpoint = endpoint.tls_config(
            ClientTlsConfig::new().ca_certificate(tonic::transport::Certificate::from_pem(pem)),
        )?;
    }

    Ok(endpoint.connect().await?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let channel = connect(&cli).await?;
    let token = client::login(channel.clone(), &cli.user, &cli.password).await?;

    let mut catalog = CatalogClient::new(channel, AuthInterceptor::new(&token)?);

    match cli.command {
        Commands::Login => {
            println!("{token}");
        }

        Commands::Create { count } => {
            for _ in 0..count {
                let id = catalog.create_laptop(sample::new_laptop()).await?;
                println!("created laptop {id}");
            }
        }

        Commands::Search {
            max_price,
            min_cores,
            min_ghz,
            min_ram_gb,
        } => {
            let filter = Filter {
                max_price_usd: max_price,
                min_cpu_cores: min_cores,
                min_cpu_ghz: min_ghz,
                min_ram: Some(Memory {
                    value: min_ram_gb,
                    unit: Unit::Gigabyte as i32,
                }),
            };

            let laptops = catalog.search(filter).await?;
            for laptop in &laptops {
                println!("{}", serializer::laptop_to_json(laptop)?);
            }
            println!("found {} laptop(s)", laptops.len());
        }

        Commands::Upload { laptop, file } => {
            let image_type = file
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| format!(".{ext}"))
                .ok_or("image file has no extension")?;
            let data = tokio::fs::read(&file).await?;

            let response = catalog
                .upload_image(&laptop, &image_type, &data, DEFAULT_CHUNK_SIZE)
                .await?;
            println!("image uploaded with id {}, size {}", response.id, response.size);
        }

        Commands::Rate { laptops, scores } => {
            if laptops.len() != scores.len() {
                return Err("Number of laptops and scores must match".into());
            }

            let responses = catalog
                .rate(laptops.into_iter().zip(scores).collect())
                .await?;
            for response in responses {
                println!(
                    "laptop {} rated {} time(s), average {:.2}",
                    response.laptop_id, response.rated_count, response.average_score
                );
            }
        }
    }

    Ok(())
}
