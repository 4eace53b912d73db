use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use veth::chat::{ChatController, ChatEvent, Role, SubmitOutcome};
use veth::copy::{Audience, CopyRequest, CopyWriter};

#[derive(Parser)]
#[command(name = "veth")]
#[command(about = "Veth CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and an empty config file.
    Init {
        /// Config file path (default: VETH_CONFIG_PATH or ~/.veth/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the gateway (HTTP + WebSocket). Each WebSocket connection gets its own chat widget.
    Gateway {
        /// Config file path (default: VETH_CONFIG_PATH or ~/.veth/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// WebSocket and HTTP port (default from config or 15152)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Chat with the assistant in the terminal. Replies stream in as they arrive.
    Chat {
        /// Config file path (default: VETH_CONFIG_PATH or ~/.veth/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Generate a piece of marketing copy (falls back to fixed text without an API key).
    Copy {
        /// Config file path (default: VETH_CONFIG_PATH or ~/.veth/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        #[command(subcommand)]
        kind: CopyKind,
    },
}

#[derive(Subcommand)]
enum CopyKind {
    /// Hero tagline for an audience
    Tagline {
        #[arg(long, value_enum, default_value_t = AudienceArg::Government)]
        audience: AudienceArg,
    },
    /// One-line impact statement for a portfolio project
    Project { title: String, category: String },
    /// Strategic insight for a political consulting service
    Political { service: String },
    /// Two-sentence team member bio
    Bio { name: String, role: String },
    /// Visionary mission sentence
    Mission,
    /// Context for a company milestone
    Timeline { year: String, title: String },
    /// Impact summary of a client review
    Testimonial { client: String, review: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum AudienceArg {
    Corporate,
    Government,
    Startup,
}

impl From<AudienceArg> for Audience {
    fn from(a: AudienceArg) -> Self {
        match a {
            AudienceArg::Corporate => Audience::Corporate,
            AudienceArg::Government => Audience::Government,
            AudienceArg::Startup => Audience::Startup,
        }
    }
}

impl From<CopyKind> for CopyRequest {
    fn from(kind: CopyKind) -> Self {
        match kind {
            CopyKind::Tagline { audience } => CopyRequest::Tagline {
                audience: audience.into(),
            },
            CopyKind::Project { title, category } => CopyRequest::ProjectInsight { title, category },
            CopyKind::Political { service } => CopyRequest::PoliticalInsight { service },
            CopyKind::Bio { name, role } => CopyRequest::TeamBio { name, role },
            CopyKind::Mission => CopyRequest::MissionInsight,
            CopyKind::Timeline { year, title } => CopyRequest::TimelineInsight { year, title },
            CopyKind::Testimonial { client, review } => {
                CopyRequest::TestimonialSummary { client, review }
            }
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("veth {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config }) => {
            if let Err(e) = run_chat(config).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Copy { config, kind }) => {
            if let Err(e) = run_copy(config, kind.into()).await {
                log::error!("copy failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(veth::config::default_config_path);
    let dir = veth::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = veth::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    veth::gateway::run_gateway(config).await
}

async fn run_copy(config_path: Option<PathBuf>, request: CopyRequest) -> anyhow::Result<()> {
    let (config, _) = veth::config::load_config(config_path)?;
    let out = CopyWriter::from_config(&config).generate(&request).await;
    println!("{}", out.text);
    Ok(())
}

/// The message as typed: only the line terminator is removed.
fn chat_input(line: &str) -> &str {
    line.trim_end_matches(&['\n', '\r'][..])
}

fn print_turn(role: Role, text: &str) {
    match role {
        Role::User => println!("> {}", text),
        Role::Model => println!("< {}", text),
    }
}

async fn run_chat(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = veth::config::load_config(config_path)?;
    let controller = ChatController::from_config(&config);

    for turn in controller.transcript().await {
        print_turn(turn.role, &turn.text);
    }

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = chat_input(&line);
        let command = input.trim();
        if command.is_empty() {
            continue;
        }
        if command.eq_ignore_ascii_case("/exit") || command.eq_ignore_ascii_case("/quit") {
            break;
        }
        if command.eq_ignore_ascii_case("/history") {
            for turn in controller.transcript().await {
                print_turn(turn.role, &turn.text);
            }
            continue;
        }

        let mut render = |event: &ChatEvent| match event {
            ChatEvent::PlaceholderOpened { .. } => {
                print!("< ");
                let _ = std::io::stdout().flush();
            }
            ChatEvent::Fragment { fragment, .. } => {
                print!("{}", fragment);
                let _ = std::io::stdout().flush();
            }
            ChatEvent::Completed { .. } => println!(),
            ChatEvent::Failed { text, .. } => println!("\n< {}", text),
            ChatEvent::UserTurn { .. } => {}
        };
        if let SubmitOutcome::Failed { notice } = controller.submit(input, Some(&mut render)).await {
            eprintln!("chat error: {}", notice);
            controller.acknowledge_error().await;
        }
    }

    Ok(())
}
