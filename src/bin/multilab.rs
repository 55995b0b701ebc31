use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use multilab::{
    config::DEFAULT_BACKEND_URL,
    llm::Role,
    panel::{FileStore, HttpBackend, Orchestrator, Panel, default_models},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "multilab",
    about = "Ask several models the same question side by side"
)]
struct Cli {
    /// Base URL of a running multilab-server.
    #[arg(long, env = "MULTILAB_BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    backend_url: String,

    /// JSON file holding every panel's transcript.
    #[arg(long, env = "MULTILAB_STORE")]
    store: Option<PathBuf>,
}

const HELP: &str = "\
commands:
  <text>             send to every panel
  /models            list panels
  /history <id>      show one panel's transcript
  /clear <id|all>    wipe a transcript
  /quit              exit";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let store_path = match cli.store {
        Some(path) => path,
        None => default_store_path()?,
    };
    let store = FileStore::open(&store_path)
        .with_context(|| format!("opening {}", store_path.display()))?;
    info!(store = %store_path.display(), backend = %cli.backend_url, "panels starting");

    let mut lab = Orchestrator::new(
        default_models(),
        Arc::new(HttpBackend::new(&cli.backend_url)),
        Arc::new(store),
    );

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();

        match command {
            "" => {}
            "/quit" | "/exit" => break,
            "/help" => println!("{HELP}"),
            "/models" => {
                for panel in lab.panels() {
                    println!(
                        "{:<40} {} ({} messages)",
                        panel.model().id,
                        panel.model().name,
                        panel.transcript().len()
                    );
                }
            }
            "/history" => match lab.panel(arg) {
                Some(panel) => print_transcript(panel),
                None => println!("no panel named {arg:?}"),
            },
            "/clear" if arg == "all" => {
                lab.clear_all();
                println!("all panels cleared");
            }
            "/clear" => {
                if lab.clear_panel(arg) {
                    println!("cleared {arg}");
                } else {
                    println!("no panel named {arg:?}");
                }
            }
            _ if command.starts_with('/') => println!("unknown command {command}\n{HELP}"),
            _ => {
                println!("thinking...");
                lab.send_to_all(line).await;
                for panel in lab.panels() {
                    let reply = panel
                        .transcript()
                        .last()
                        .map_or("", |message| message.content.as_str());
                    println!("\n== {} ==\n{reply}", panel.model().name);
                }
                println!();
            }
        }
    }

    Ok(())
}

fn default_store_path() -> Result<PathBuf> {
    let base = dirs::data_dir().ok_or_else(|| anyhow!("no data directory; pass --store"))?;
    Ok(base.join("multilab").join("chats.json"))
}

fn print_transcript(panel: &Panel) {
    println!("== {} ==", panel.model().name);
    for message in panel.transcript() {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "model",
            Role::System => "system",
        };
        println!("[{who}] {}", message.content);
    }
}
