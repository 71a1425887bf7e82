use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Inspect a running breaker gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every route's circuit status and counters
    Status {
        /// Only show this route
        #[arg(short, long)]
        route: Option<String>,
    },
    /// Check the gateway is alive
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Status { route } => {
            let res = client.get(format!("{base}/breaker-status")).send().await?;
            let status = res.status();
            if !status.is_success() {
                eprintln!("Error: gateway returned status {status}");
                std::process::exit(1);
            }

            let json: Value = res.json().await?;
            match route {
                Some(route) => match json.get(&route) {
                    Some(entry) => println!("{}", serde_json::to_string_pretty(entry)?),
                    None => {
                        eprintln!("Error: no breaker for route {route}");
                        std::process::exit(1);
                    }
                },
                None => println!("{}", serde_json::to_string_pretty(&json)?),
            }
        }
        Commands::Health => {
            let res = client.get(format!("{base}/health")).send().await?;
            let status = res.status();
            let text = res.text().await?;
            if !status.is_success() {
                eprintln!("Error: gateway returned status {status}");
                std::process::exit(1);
            }
            print!("{text}");
        }
    }

    Ok(())
}
