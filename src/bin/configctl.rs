use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "configctl")]
#[command(about = "Management CLI for the config center", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "CONFIGCTL_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service status
    Status,
    /// Show the configuration a client would receive
    Get { app: String, env: String },
    /// Show the merged configuration with value sources
    Resolve { app: String, env: String },
    /// Show drift between an application's environments
    Diff { app: String },
    /// Stage the current merged view and publish it
    Publish {
        app: String,
        env: String,
        #[arg(long, default_value = "configctl")]
        author: String,
    },
    /// Re-push published configuration to connected clients
    Push {
        app: String,
        #[arg(long)]
        env: Option<String>,
    },
    /// List connected clients of an application
    Clients { app: String },
    /// Connection statistics of an application
    Stats { app: String },
    /// Disconnect one client
    Kick {
        connection_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Send a message to every connected client
    Broadcast { message: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let url = cli.url.trim_end_matches('/');
    let res = match cli.command {
        Commands::Status => client.get(format!("{url}/admin/status")).headers(headers).send().await?,
        Commands::Get { app, env } => client.get(format!("{url}/api/client/configs/{app}/{env}")).send().await?,
        Commands::Resolve { app, env } => {
            client
                .get(format!("{url}/api/applications/{app}/environments/{env}/config"))
                .send()
                .await?
        }
        Commands::Diff { app } => client.get(format!("{url}/api/applications/{app}/differences")).send().await?,
        Commands::Publish { app, env, author } => {
            let staged = client
                .post(format!("{url}/api/applications/{app}/environments/{env}/snapshots"))
                .json(&json!({ "author": author }))
                .send()
                .await?;
            if !staged.status().is_success() {
                return print_response(staged).await;
            }
            let snapshot: Value = staged.json().await?;
            let id = snapshot["id"].as_u64().ok_or("staged snapshot has no id")?;
            client
                .post(format!("{url}/api/snapshots/{id}/publish"))
                .query(&[("author", author.as_str())])
                .send()
                .await?
        }
        Commands::Push { app, env } => {
            client
                .post(format!("{url}/admin/push/app"))
                .headers(headers)
                .json(&json!({ "applicationId": app, "environmentId": env }))
                .send()
                .await?
        }
        Commands::Clients { app } => {
            client
                .get(format!("{url}/admin/apps/{app}/clients"))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Stats { app } => client.get(format!("{url}/admin/apps/{app}/stats")).headers(headers).send().await?,
        Commands::Kick { connection_id, reason } => {
            let mut request = client
                .post(format!("{url}/admin/clients/{connection_id}/disconnect"))
                .headers(headers);
            if let Some(reason) = reason {
                request = request.query(&[("reason", reason)]);
            }
            request.send().await?
        }
        Commands::Broadcast { message } => {
            client
                .post(format!("{url}/admin/broadcast"))
                .headers(headers)
                .json(&json!({ "message": message }))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: config center returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
