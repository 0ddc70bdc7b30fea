use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use deskpilot::agent_engine::loop_control::stop_channel;
use deskpilot::agent_engine::operator::ConsoleOperator;
use deskpilot::config::{load_config, AppConfig, PerceptionBackend};
use deskpilot::errors::DeskPilotResult;
use deskpilot::executor::coordinator::CoordinateSystem;
use deskpilot::executor::input::EnigoInput;
use deskpilot::perception::omniparser::OmniParserClient;
use deskpilot::perception::screenshot::XcapScreen;
use deskpilot::perception::traits::PerceptionPort;
use deskpilot::{build_agent, perception_from_config};

/// Drive the desktop toward a goal with a vision model.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    /// Config file; defaults to deskpilot.toml next to the binary, in the
    /// working directory, or in the user config dir.
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the agent until the goal is done or a limit is hit.
    Run {
        /// Monitor to observe and act on (0 = primary).
        #[arg(long, short = 's')]
        screen: Option<u32>,

        #[arg(long)]
        max_steps: Option<u32>,

        /// Override `[perception] server_url`.
        #[arg(long, value_name = "URL")]
        perception_url: Option<String>,

        /// What the agent should achieve.
        #[arg(required = true, num_args = 1..)]
        goal: Vec<String>,
    },
    /// List connected monitors.
    Screens,
    /// Check perception on one screenshot.
    Inspect {
        #[arg(long, short = 's', default_value_t = 0)]
        screen: u32,

        /// Write the labeled screenshot here.
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,

        #[arg(long, value_name = "URL")]
        perception_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    match run_main(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "deskpilot failed");
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

async fn run_main(cli: Cli) -> DeskPilotResult<bool> {
    match cli.command {
        Command::Screens => {
            let coords = CoordinateSystem::new(Arc::new(XcapScreen::new()));
            for screen in coords.enumerate()? {
                println!("{screen}");
            }
            let bounds = coords.virtual_bounds()?;
            println!(
                "virtual desktop: {}x{} at ({}, {})",
                bounds.width, bounds.height, bounds.x, bounds.y
            );
            Ok(true)
        }
        Command::Inspect {
            screen,
            save,
            perception_url,
        } => {
            let mut cfg = load_config(cli.config.as_deref())?;
            if let Some(url) = perception_url {
                cfg.perception.server_url = url;
            }
            inspect(&cfg, screen, save).await
        }
        Command::Run {
            screen,
            max_steps,
            perception_url,
            goal,
        } => {
            let mut cfg = load_config(cli.config.as_deref())?;
            if let Some(screen) = screen {
                cfg.agent.screen = screen;
            }
            if let Some(url) = perception_url {
                cfg.perception.server_url = url;
            }
            run_goal(&cfg, &goal.join(" "), max_steps).await
        }
    }
}

async fn run_goal(cfg: &AppConfig, goal: &str, max_steps: Option<u32>) -> DeskPilotResult<bool> {
    let input = Arc::new(EnigoInput::new()?);
    let (stop, signal) = stop_channel();
    let operator = Arc::new(ConsoleOperator::new(signal.clone()));
    let mut agent = build_agent(cfg, Arc::new(XcapScreen::new()), input, operator)?.with_stop(signal);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nstopping after the current step...");
            stop.stop();
        }
    });

    let report = agent.run(goal, max_steps).await;
    for (i, step) in report.steps.iter().enumerate() {
        println!("{:>3}. [{}] {}", i + 1, step.action.action_type(), step.summary);
    }
    println!("outcome: {}", report.outcome);
    Ok(report.is_success())
}

async fn inspect(cfg: &AppConfig, screen: u32, save: Option<PathBuf>) -> DeskPilotResult<bool> {
    if cfg.perception.backend == PerceptionBackend::Omniparser {
        let client = OmniParserClient::new(&cfg.perception);
        let health = client.health_check().await;
        println!(
            "perception server {}: {} (models loaded: {}, device: {})",
            client.server_url(),
            health.status,
            health.models_loaded,
            if health.device.is_empty() { "unknown" } else { health.device.as_str() }
        );
        if let Some(err) = &health.error {
            println!("  {err}");
        }
        if !health.is_healthy() {
            return Ok(false);
        }
    }

    let coords = CoordinateSystem::new(Arc::new(XcapScreen::new()));
    let image = coords.screenshot(Some(screen), None).await?;
    let perception = perception_from_config(cfg).parse(&image).await?;
    println!("{} elements on screen {screen}", perception.elements.len());
    for el in perception.elements.iter().take(20) {
        println!(
            "  [{}] {} \"{}\" at ({}, {})",
            el.index,
            el.kind,
            el.display_content(50),
            el.center[0],
            el.center[1]
        );
    }
    if let Some(path) = save {
        perception.labeled_image.save(&path)?;
        println!("labeled image written to {}", path.display());
    }
    Ok(true)
}
