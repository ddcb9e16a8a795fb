use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "pipeline-cli")]
#[command(about = "Call API nodes on a running request pipeline", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// API path prefix the server was configured with.
    #[arg(long, default_value = "/api/")]
    prefix: String,

    /// Session id sent as the `SessionId` query parameter.
    #[arg(short, long)]
    session: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show server version and live session count
    Status,
    /// Show the current session's id and stored keys
    Session,
    /// Clear the current session
    Logout,
    /// Invoke any node
    Call {
        /// Node path, e.g. `user/list`
        node: String,
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let (method, node, data) = match cli.command {
        Commands::Status => (Method::GET, "system/status".to_string(), None),
        Commands::Session => (Method::GET, "session".to_string(), None),
        Commands::Logout => (Method::DELETE, "session".to_string(), None),
        Commands::Call { node, method, data } => {
            (Method::from_bytes(method.to_uppercase().as_bytes())?, node, data)
        }
    };

    let url = format!(
        "{}/{}/{}",
        cli.url.trim_end_matches('/'),
        cli.prefix.trim_matches('/'),
        node.trim_start_matches('/')
    );
    let mut request = client.request(method, url);
    if let Some(session) = &cli.session {
        request = request.query(&[("SessionId", session)]);
    }
    if let Some(data) = data {
        let body: Value = serde_json::from_str(&data)?;
        request = request.json(&body);
    }

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if let Some(cookie) = res.headers().get(reqwest::header::SET_COOKIE) {
        eprintln!("Set-Cookie: {}", cookie.to_str().unwrap_or("<binary>"));
    }
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
