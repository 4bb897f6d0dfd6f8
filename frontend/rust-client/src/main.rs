use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recruit_client::config::Config;
use recruit_client::metrics;
use recruit_client::models::codebattle::{Difficulty, SessionMode, StartSessionRequest, TaskFilter};
use recruit_client::realtime::SocketConnection;
use recruit_client::services::{ApiClient, CodeBattleService, ReviewService};
use recruit_client::state::pvp::PvpUpdate;
use recruit_client::state::solo::{Activity, SoloUpdate};
use recruit_client::state::{
    PvpController, PvpInput, PvpState, ReviewFeed, SoloCommand, SoloController, SoloPhase,
};
use recruit_client::utils::time::{format_age, format_clock};

/// Command line client for the recruiting platform
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cli {
    /// print Prometheus metrics collected during the command
    #[clap(long)]
    metrics: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// list Code Battle tasks
    Tasks {
        #[clap(long)]
        difficulty: Option<Difficulty>,
        #[clap(long)]
        language: Option<String>,
        #[clap(long)]
        category: Option<String>,
    },
    /// show one task
    Task { id: i64 },
    /// show today's task
    Daily,
    /// show the rating leaderboard
    Leaderboard {
        #[clap(long, default_value_t = 20)]
        limit: u32,
    },
    /// show your rating
    Rating,
    /// solve a task with the code in a file
    Play {
        #[clap(long)]
        task_id: i64,
        #[clap(long)]
        language: String,
        #[clap(long)]
        file: PathBuf,
        #[clap(long, default_value = "solo")]
        mode: SessionMode,
    },
    /// find a PvP match, optionally submitting the code in a file
    Pvp {
        #[clap(long)]
        language: String,
        #[clap(long)]
        difficulty: Option<Difficulty>,
        #[clap(long)]
        file: Option<PathBuf>,
        /// your user id, used to tell wins from losses
        #[clap(long)]
        user_id: Option<i64>,
    },
    /// list reviews of an employer
    Reviews { employer_id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let telemetry = match std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Ok(endpoint) => Some(init_telemetry(&endpoint)?),
        Err(_) => None,
    };
    let otel_layer = telemetry
        .as_ref()
        .map(|(_, tracer)| tracing_opentelemetry::layer().with_tracer(tracer.clone()));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recruit_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(otel_layer)
        .init();

    let config = Config::load().context("Failed to load configuration")?;
    tracing::debug!("Using API at {}", config.rest_base());

    let result = run(cli.command, &config).await;

    if cli.metrics {
        println!("{}", metrics::render_metrics()?);
    }

    if let Some((provider, _)) = telemetry {
        shutdown_telemetry(provider);
    }

    result
}

async fn run(command: Command, config: &Config) -> anyhow::Result<()> {
    let api = ApiClient::new(config)?;
    let battle = CodeBattleService::new(api.clone());

    match command {
        Command::Tasks {
            difficulty,
            language,
            category,
        } => {
            let filter = TaskFilter {
                difficulty,
                language,
                category,
            };
            for task in battle.list_tasks(&filter).await? {
                println!(
                    "{:>5}  {:<6}  {}  ({})",
                    task.id,
                    task.difficulty,
                    task.title,
                    format_clock(task.difficulty.time_limit_secs())
                );
            }
        }
        Command::Task { id } => {
            let task = battle.get_task(id).await?;
            println!("{} [{}]\n\n{}\n", task.title, task.difficulty, task.description);
            for test in task.visible_tests() {
                println!("  {} -> {}", test.input, test.expected_output);
            }
        }
        Command::Daily => {
            let task = battle.daily_task().await?;
            println!("Daily: {} [{}] (id {})", task.title, task.difficulty, task.id);
        }
        Command::Leaderboard { limit } => {
            for ranked in battle.leaderboard(limit).await? {
                println!(
                    "{:>3}. {:<20} {:>5}  {:?}",
                    ranked.rank, ranked.entry.username, ranked.entry.rating, ranked.league
                );
            }
        }
        Command::Rating => {
            let rating = battle.my_rating().await?;
            println!(
                "Rating {} ({:?}), {}W/{}L/{}D",
                rating.rating,
                rating.effective_league(),
                rating.wins,
                rating.losses,
                rating.draws
            );
        }
        Command::Play {
            task_id,
            language,
            file,
            mode,
        } => {
            let code = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            play(Arc::new(battle), config, task_id, language, mode, code).await?;
        }
        Command::Pvp {
            language,
            difficulty,
            file,
            user_id,
        } => {
            let code = match file {
                Some(path) => Some(
                    tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                None => None,
            };
            pvp(&api, config, language, difficulty, code, user_id).await?;
        }
        Command::Reviews { employer_id } => {
            let feed = ReviewFeed::new(
                Arc::new(ReviewService::new(api)),
                employer_id,
                None,
                config.review_grace(),
            );
            let now = chrono::Utc::now();
            for review in feed.refresh().await? {
                let age = review
                    .created_at
                    .map(|at| format_age(at, now))
                    .unwrap_or_default();
                println!(
                    "{} {}  {}  {}",
                    "*".repeat(review.rating as usize),
                    review.author_name.as_deref().unwrap_or("anonymous"),
                    age,
                    review.comment
                );
                if let Some(response) = review.employer_response {
                    println!("    employer: {}", response.text);
                }
            }
        }
    }

    Ok(())
}

async fn play(
    battle: Arc<CodeBattleService>,
    config: &Config,
    task_id: i64,
    language: String,
    mode: SessionMode,
    code: String,
) -> anyhow::Result<()> {
    let mut handle = SoloController::spawn(battle, config);
    handle
        .send(SoloCommand::Start(StartSessionRequest {
            task_id,
            mode,
            language,
        }))
        .await?;

    let mut code = Some(code);
    loop {
        tokio::select! {
            changed = handle.phase.changed() => {
                if changed.is_err() {
                    bail!("session controller stopped");
                }
                let phase = handle.phase.borrow_and_update().clone();
                match phase {
                    SoloPhase::Playing(playing) => {
                        if let Some(code) = code.take() {
                            println!(
                                "Session {} started, {} on the clock",
                                playing.session.id,
                                format_clock(playing.countdown.total())
                            );
                            handle.send(SoloCommand::EditCode(code)).await?;
                            handle.send(SoloCommand::Submit).await?;
                        }
                    }
                    SoloPhase::Finished(finished) => {
                        println!(
                            "{}: {}/{} tests, score {}, {}",
                            if finished.result.solved { "Solved" } else { "Not solved" },
                            finished.result.tests_passed,
                            finished.result.tests_total,
                            finished.result.score,
                            format_clock(finished.session.time_spent)
                        );
                        if let Some(change) = finished.result.rating_change {
                            println!("Rating change: {:+}", change);
                        }
                        return Ok(());
                    }
                    SoloPhase::Setup => {}
                }
            }
            update = handle.updates.recv() => match update {
                Some(SoloUpdate::Notice(notice)) => {
                    println!("[{:?}] {}", notice.level, notice.message);
                    if notice.is_error() {
                        match handle.current() {
                            SoloPhase::Setup => bail!("Could not start the session: {}", notice.message),
                            SoloPhase::Playing(p) if p.activity == Activity::Idle => {
                                bail!("Submission failed: {}", notice.message)
                            }
                            _ => {}
                        }
                    }
                }
                Some(SoloUpdate::Timer(_)) => {}
                None => bail!("session controller stopped"),
            },
        }
    }
}

async fn pvp(
    api: &ApiClient,
    config: &Config,
    language: String,
    difficulty: Option<Difficulty>,
    code: Option<String>,
    user_id: Option<i64>,
) -> anyhow::Result<()> {
    let token = api.token();
    let socket = SocketConnection::connect(&config.socket_url, token.as_deref()).await?;
    let mut handle = PvpController::spawn(socket, config, user_id);
    handle
        .send(PvpInput::FindMatch {
            language,
            difficulty,
        })
        .await?;

    let mut started = false;
    loop {
        tokio::select! {
            changed = handle.state.changed() => {
                if changed.is_err() {
                    bail!("match controller stopped");
                }
                let state = handle.state.borrow().clone();
                match state {
                    PvpState::Playing(playing) if !started => {
                        started = true;
                        println!(
                            "Match {} started against {}",
                            playing.info.match_id, playing.info.opponent.username
                        );
                        if let Some(code) = &code {
                            handle.send(PvpInput::EditCode(code.clone())).await?;
                            handle.send(PvpInput::Submit).await?;
                        }
                    }
                    PvpState::Finished(finished) => {
                        println!("Match over: {}", finished.outcome.as_str());
                        if let Some(rating) = finished.result.new_rating {
                            println!("New rating: {}", rating);
                        }
                        return Ok(());
                    }
                    PvpState::Idle => {
                        println!("Back to idle");
                        return Ok(());
                    }
                    _ => {}
                }
            }
            Some(update) = handle.updates.recv() => {
                if let PvpUpdate::Notice(notice) = update {
                    println!("[{:?}] {}", notice.level, notice.message);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let state = handle.current();
                if matches!(state, PvpState::Searching { .. }) {
                    handle.send(PvpInput::CancelSearch).await?;
                } else if state.match_id().is_some() {
                    handle.send(PvpInput::RequestLeave).await?;
                    handle.send(PvpInput::ConfirmLeave).await?;
                }
                return Ok(());
            }
        }
    }
}

fn init_telemetry(
    endpoint: &str,
) -> anyhow::Result<(SdkTracerProvider, opentelemetry_sdk::trace::Tracer)> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::Resource;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .context("Failed to create OTLP exporter")?;

    let resource = Resource::builder_empty()
        .with_service_name("recruit-client")
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("recruit-client");
    opentelemetry::global::set_tracer_provider(provider.clone());

    Ok((provider, tracer))
}

fn shutdown_telemetry(provider: SdkTracerProvider) {
    if let Err(e) = provider.shutdown() {
        eprintln!("Failed to flush traces: {}", e);
    }
}
