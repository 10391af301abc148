use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "region-cli")]
#[command(about = "Operational CLI for a georeplica region node", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Node identity, uptime and replication queue
    Status,
    /// List configured regions
    Regions,
    /// Rank regions by distance from a point
    Nearest {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Routing advice for this client (or a forwarded address)
    Advice {
        #[arg(long)]
        forwarded_for: Option<String>,
    },
    /// Heartbeat-derived health of every region
    Health,
    /// Aggregated replication lag and recent log rows
    Lag {
        #[arg(long, default_value_t = 20)]
        recent: usize,
    },
    /// Cache and replication counters
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/status", base)),
        Commands::Regions => client.get(format!("{}/regions", base)),
        Commands::Nearest { lat, lon } => client
            .get(format!("{}/regions/nearest", base))
            .query(&[("lat", lat), ("lon", lon)]),
        Commands::Advice { forwarded_for } => {
            let request = client.get(format!("{}/routing/advice", base));
            match forwarded_for {
                Some(addr) => request.header("x-forwarded-for", addr),
                None => request,
            }
        }
        Commands::Health => client.get(format!("{}/health/regions", base)),
        Commands::Lag { recent } => client
            .get(format!("{}/replication/lag", base))
            .query(&[("recent", recent)]),
        Commands::Stats => client.get(format!("{}/stats", base)),
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: node returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
