use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::countdown::{Countdown, Tick};
use super::notice::Notice;
use crate::config::Config;
use crate::error::ClientError;
use crate::metrics::{self, AI_STATUS_POLLS_TOTAL, AUTO_SUBMITS_TOTAL};
use crate::models::codebattle::{
    AiState, AiStatus, GameSession, GameTask, HintResponse, SessionMode, SessionStatus,
    StartSessionRequest, StartSessionResponse, SubmitResult, TestRunResult,
};
use crate::models::timer::TimerEvent;
use crate::services::CodeBattleApi;

/// What the player is doing inside a running session. Exactly one request
/// of each kind can be in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Running,
    Submitting { automatic: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiProgress {
    pub state: AiState,
    pub last: Option<AiStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Playing {
    pub session: GameSession,
    pub task: GameTask,
    pub code: String,
    pub countdown: Countdown,
    pub activity: Activity,
    pub last_run: Option<TestRunResult>,
    pub hints: Vec<String>,
    pub hint_in_flight: bool,
    pub ai: Option<AiProgress>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finished {
    pub session: GameSession,
    pub task: GameTask,
    pub result: SubmitResult,
    pub automatic: bool,
    pub ai: Option<AiStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SoloPhase {
    Setup,
    Playing(Box<Playing>),
    Finished(Box<Finished>),
}

impl SoloPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SoloPhase::Setup => "setup",
            SoloPhase::Playing(_) => "playing",
            SoloPhase::Finished(_) => "finished",
        }
    }
}

#[derive(Debug)]
pub enum SoloEvent {
    Started(StartSessionResponse),
    StartFailed(ClientError),
    CodeEdited(String),
    Tick,
    RunRequested,
    RunFinished { session_id: i64, result: TestRunResult },
    RunFailed { session_id: i64, error: ClientError },
    SubmitRequested,
    Submitted { session_id: i64, result: SubmitResult },
    SubmitFailed { session_id: i64, error: ClientError },
    HintRequested,
    HintReceived { session_id: i64, hint: HintResponse },
    HintFailed { session_id: i64, error: ClientError },
    AiPollDue,
    AiPolled {
        session_id: i64,
        status: Result<AiStatus, ClientError>,
    },
    Abandon,
}

impl SoloEvent {
    /// Session a request result belongs to; `None` for local events.
    pub fn session_id(&self) -> Option<i64> {
        match self {
            SoloEvent::RunFinished { session_id, .. }
            | SoloEvent::RunFailed { session_id, .. }
            | SoloEvent::Submitted { session_id, .. }
            | SoloEvent::SubmitFailed { session_id, .. }
            | SoloEvent::HintReceived { session_id, .. }
            | SoloEvent::HintFailed { session_id, .. }
            | SoloEvent::AiPolled { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SoloEffect {
    Run { session_id: i64, code: String },
    Submit {
        session_id: i64,
        code: String,
        automatic: bool,
    },
    RequestHint { session_id: i64 },
    PollAi { session_id: i64 },
    Notify(Notice),
    Timer(TimerEvent),
}

/// Solo / VS-AI session lifecycle: `setup -> playing -> finished`.
#[derive(Debug, Clone)]
pub struct SoloGame {
    phase: SoloPhase,
    max_hints: u32,
}

impl SoloGame {
    pub fn new(max_hints: u32) -> Self {
        Self {
            phase: SoloPhase::Setup,
            max_hints,
        }
    }

    pub fn phase(&self) -> &SoloPhase {
        &self.phase
    }

    /// Polling runs only in VS-AI mode, while the AI is still solving and
    /// the player has not submitted.
    pub fn ai_polling_active(&self) -> bool {
        match &self.phase {
            SoloPhase::Playing(p) => {
                p.session.mode == SessionMode::VsAi
                    && !matches!(p.activity, Activity::Submitting { .. })
                    && p.ai
                        .as_ref()
                        .map(|ai| ai.state == AiState::Solving)
                        .unwrap_or(false)
            }
            _ => false,
        }
    }

    pub fn apply(&mut self, event: SoloEvent) -> Vec<SoloEffect> {
        match event {
            SoloEvent::Started(response) => self.on_started(response),
            SoloEvent::StartFailed(err) => {
                tracing::error!("Failed to start session: {}", err);
                vec![SoloEffect::Notify(Notice::from(&err))]
            }
            SoloEvent::Abandon => self.on_abandon(),
            event => {
                let SoloPhase::Playing(playing) = &mut self.phase else {
                    tracing::debug!("Ignoring {:?} outside of a running session", event);
                    return vec![];
                };
                if let Some(id) = event.session_id().filter(|id| *id != playing.session.id) {
                    tracing::debug!(
                        "Dropping late result for session {} while playing {}",
                        id,
                        playing.session.id
                    );
                    return vec![];
                }
                match Self::apply_playing(playing, event, self.max_hints) {
                    Outcome::Stay(effects) => effects,
                    Outcome::Finish(result, effects) => {
                        let finished = self.finish(result);
                        let mut effects = effects;
                        effects.push(finished);
                        effects
                    }
                }
            }
        }
    }

    fn on_started(&mut self, response: StartSessionResponse) -> Vec<SoloEffect> {
        if !matches!(self.phase, SoloPhase::Setup) {
            tracing::debug!(
                "Ignoring session {} start while {}",
                response.session.id,
                self.phase.name()
            );
            return vec![];
        }

        let StartSessionResponse { session, task } = response;
        let countdown = Countdown::for_difficulty(task.difficulty);
        let code = task.starter_for(&session.language);
        let ai = (session.mode == SessionMode::VsAi).then_some(AiProgress {
            state: AiState::Solving,
            last: None,
        });

        tracing::info!(
            "Session {} playing: task={}, difficulty={}, time_limit={}s",
            session.id,
            task.id,
            task.difficulty,
            countdown.total()
        );

        let tick = countdown.tick_event();
        self.phase = SoloPhase::Playing(Box::new(Playing {
            session,
            task,
            code,
            countdown,
            activity: Activity::Idle,
            last_run: None,
            hints: Vec::new(),
            hint_in_flight: false,
            ai,
        }));

        vec![SoloEffect::Timer(tick)]
    }

    fn on_abandon(&mut self) -> Vec<SoloEffect> {
        match &self.phase {
            SoloPhase::Playing(p) => {
                tracing::info!("Session {} abandoned", p.session.id);
                metrics::record_session_outcome(p.session.mode.as_str(), "abandoned");
                self.phase = SoloPhase::Setup;
                vec![]
            }
            SoloPhase::Finished(_) => {
                self.phase = SoloPhase::Setup;
                vec![]
            }
            SoloPhase::Setup => vec![],
        }
    }

    fn apply_playing(p: &mut Playing, event: SoloEvent, max_hints: u32) -> Outcome {
        let session_id = p.session.id;
        let mut effects = Vec::new();

        match event {
            SoloEvent::CodeEdited(code) => p.code = code,

            SoloEvent::Tick => match p.countdown.tick() {
                Tick::Running(_) => {
                    p.session.time_spent = p.countdown.elapsed();
                    effects.push(SoloEffect::Timer(p.countdown.tick_event()));
                }
                Tick::Expired => {
                    p.session.time_spent = p.countdown.elapsed();
                    effects.push(SoloEffect::Timer(p.countdown.expired_event()));
                    if matches!(p.activity, Activity::Submitting { .. }) {
                        tracing::debug!("Time expired with a submission already in flight");
                    } else {
                        tracing::info!("Time expired for session {}, submitting", session_id);
                        AUTO_SUBMITS_TOTAL.inc();
                        p.activity = Activity::Submitting { automatic: true };
                        effects.push(SoloEffect::Notify(Notice::info(
                            "Time is up, submitting your solution",
                        )));
                        effects.push(SoloEffect::Submit {
                            session_id,
                            code: p.code.clone(),
                            automatic: true,
                        });
                    }
                }
                Tick::Idle => {}
            },

            SoloEvent::RunRequested => match p.activity {
                Activity::Idle if p.code.trim().is_empty() => {
                    effects.push(SoloEffect::Notify(Notice::error("Write some code first")));
                }
                Activity::Idle if p.countdown.is_expired() => {
                    effects.push(SoloEffect::Notify(Notice::error("Time is up")));
                }
                Activity::Idle => {
                    p.activity = Activity::Running;
                    effects.push(SoloEffect::Run {
                        session_id,
                        code: p.code.clone(),
                    });
                }
                _ => tracing::debug!("Run ignored while {:?}", p.activity),
            },

            SoloEvent::RunFinished { result, .. } => {
                if p.activity == Activity::Running {
                    p.activity = Activity::Idle;
                }
                effects.push(SoloEffect::Notify(if result.passed == result.total {
                    Notice::success(format!("All {} tests passed", result.total))
                } else {
                    Notice::info(format!("{}/{} tests passed", result.passed, result.total))
                }));
                p.last_run = Some(result);
            }

            SoloEvent::RunFailed { error: err, .. } => {
                tracing::error!("Test run failed for session {}: {}", session_id, err);
                if p.activity == Activity::Running {
                    p.activity = Activity::Idle;
                }
                effects.push(SoloEffect::Notify(Notice::from(&err)));
            }

            SoloEvent::SubmitRequested => match p.activity {
                Activity::Submitting { .. } => {
                    tracing::debug!("Submit ignored, one is already in flight");
                }
                _ if p.code.trim().is_empty() => {
                    effects.push(SoloEffect::Notify(Notice::error("Write some code first")));
                }
                _ => {
                    p.activity = Activity::Submitting { automatic: false };
                    effects.push(SoloEffect::Submit {
                        session_id,
                        code: p.code.clone(),
                        automatic: false,
                    });
                }
            },

            SoloEvent::Submitted { result, .. } => {
                let automatic = matches!(p.activity, Activity::Submitting { automatic: true });
                return Outcome::Finish(Box::new((result, automatic)), effects);
            }

            SoloEvent::SubmitFailed { error: err, .. } => {
                tracing::error!("Submit failed for session {}: {}", session_id, err);
                if matches!(p.activity, Activity::Submitting { .. }) {
                    p.activity = Activity::Idle;
                }
                effects.push(SoloEffect::Notify(Notice::from(&err)));
            }

            SoloEvent::HintRequested => {
                if p.hint_in_flight {
                    tracing::debug!("Hint already requested");
                } else if p.session.hints_used >= max_hints {
                    let err = ClientError::Validation("No hints left".to_string());
                    effects.push(SoloEffect::Notify(Notice::from(&err)));
                } else {
                    p.hint_in_flight = true;
                    effects.push(SoloEffect::RequestHint { session_id });
                }
            }

            SoloEvent::HintReceived { hint, .. } => {
                p.hint_in_flight = false;
                p.session.hints_used = hint.hints_used;
                p.hints.push(hint.hint);
            }

            SoloEvent::HintFailed { error: err, .. } => {
                p.hint_in_flight = false;
                effects.push(SoloEffect::Notify(Notice::from(&err)));
            }

            SoloEvent::AiPollDue => {
                let active = p.session.mode == SessionMode::VsAi
                    && !matches!(p.activity, Activity::Submitting { .. })
                    && p.ai.as_ref().map(|ai| ai.state) == Some(AiState::Solving);
                if active {
                    effects.push(SoloEffect::PollAi { session_id });
                }
            }

            SoloEvent::AiPolled {
                status: Ok(status), ..
            } => {
                AI_STATUS_POLLS_TOTAL.with_label_values(&["ok"]).inc();
                if let Some(ai) = p.ai.as_mut() {
                    if ai.state == AiState::Solving {
                        ai.state = status.status;
                        match status.status {
                            AiState::Completed => effects
                                .push(SoloEffect::Notify(Notice::info("The AI has finished its solution"))),
                            AiState::Failed => effects
                                .push(SoloEffect::Notify(Notice::info("The AI failed to solve the task"))),
                            AiState::Solving => {}
                        }
                    }
                    ai.last = Some(status);
                }
            }

            SoloEvent::AiPolled { status: Err(err), .. } => {
                AI_STATUS_POLLS_TOTAL.with_label_values(&["error"]).inc();
                tracing::warn!("AI status poll failed for session {}: {}", session_id, err);
            }

            SoloEvent::Started(_) | SoloEvent::StartFailed(_) | SoloEvent::Abandon => {}
        }

        Outcome::Stay(effects)
    }

    fn finish(&mut self, outcome: Box<(SubmitResult, bool)>) -> SoloEffect {
        let (result, automatic) = *outcome;
        let previous = std::mem::replace(&mut self.phase, SoloPhase::Setup);
        let SoloPhase::Playing(playing) = previous else {
            self.phase = previous;
            return SoloEffect::Notify(Notice::info("Submission received"));
        };

        let Playing {
            mut session,
            task,
            countdown,
            ai,
            ..
        } = *playing;

        // Local copy is updated before any refetch
        session.status = if result.solved {
            SessionStatus::Completed
        } else {
            SessionStatus::Failed
        };
        session.tests_passed = result.tests_passed;
        session.tests_total = result.tests_total;
        session.time_spent = if result.time_spent > 0 {
            result.time_spent
        } else {
            countdown.elapsed()
        };
        session.score = result.score;

        metrics::record_session_outcome(
            session.mode.as_str(),
            if result.solved { "solved" } else { "failed" },
        );
        tracing::info!(
            "Session {} finished: solved={}, tests={}/{}, automatic={}",
            session.id,
            result.solved,
            result.tests_passed,
            result.tests_total,
            automatic
        );

        let notice = if result.solved {
            Notice::success(format!("Solved! +{} points", result.score))
        } else {
            Notice::error(format!(
                "{}/{} tests passed",
                result.tests_passed, result.tests_total
            ))
        };

        let ai = result
            .ai_result
            .clone()
            .or_else(|| ai.and_then(|progress| progress.last));

        self.phase = SoloPhase::Finished(Box::new(Finished {
            session,
            task,
            result,
            automatic,
            ai,
        }));

        SoloEffect::Notify(notice)
    }
}

enum Outcome {
    Stay(Vec<SoloEffect>),
    Finish(Box<(SubmitResult, bool)>, Vec<SoloEffect>),
}

#[derive(Debug, Clone)]
pub enum SoloCommand {
    Start(StartSessionRequest),
    EditCode(String),
    Run,
    Submit,
    Hint,
    Abandon,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SoloUpdate {
    Notice(Notice),
    Timer(TimerEvent),
}

/// Handle to a running [`SoloController`]. Dropping it stops the controller
/// and its timers.
pub struct SoloHandle {
    commands: mpsc::Sender<SoloCommand>,
    pub phase: watch::Receiver<SoloPhase>,
    pub updates: mpsc::UnboundedReceiver<SoloUpdate>,
    task: JoinHandle<()>,
}

impl SoloHandle {
    pub async fn send(&self, command: SoloCommand) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::InvalidTransition("the session is closed"))
    }

    pub fn current(&self) -> SoloPhase {
        self.phase.borrow().clone()
    }

    /// Waits until the published phase satisfies `predicate`.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Result<SoloPhase, ClientError>
    where
        F: FnMut(&SoloPhase) -> bool,
    {
        self.phase
            .wait_for(|phase| predicate(phase))
            .await
            .map(|phase| phase.clone())
            .map_err(|_| ClientError::InvalidTransition("the session is closed"))
    }
}

impl Drop for SoloHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct SoloController<A> {
    api: Arc<A>,
    game: SoloGame,
    poll_interval: Duration,
    phase_tx: watch::Sender<SoloPhase>,
    updates_tx: mpsc::UnboundedSender<SoloUpdate>,
    results_tx: mpsc::UnboundedSender<SoloEvent>,
}

impl<A: CodeBattleApi + 'static> SoloController<A> {
    pub fn spawn(api: Arc<A>, config: &Config) -> SoloHandle {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (phase_tx, phase_rx) = watch::channel(SoloPhase::Setup);
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        let controller = SoloController {
            api,
            game: SoloGame::new(config.max_hints),
            poll_interval: config.ai_poll_interval(),
            phase_tx,
            updates_tx,
            results_tx,
        };

        let task = tokio::spawn(controller.run(commands_rx, results_rx));

        SoloHandle {
            commands: commands_tx,
            phase: phase_rx,
            updates: updates_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SoloCommand>,
        mut results: mpsc::UnboundedReceiver<SoloEvent>,
    ) {
        let second = Duration::from_secs(1);
        let mut ticker = interval_at(Instant::now() + second, second);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poller = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        poller.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                command = commands.recv() => match command {
                    Some(SoloCommand::Start(req)) => {
                        self.start(req);
                        continue;
                    }
                    Some(SoloCommand::EditCode(code)) => SoloEvent::CodeEdited(code),
                    Some(SoloCommand::Run) => SoloEvent::RunRequested,
                    Some(SoloCommand::Submit) => SoloEvent::SubmitRequested,
                    Some(SoloCommand::Hint) => SoloEvent::HintRequested,
                    Some(SoloCommand::Abandon) => SoloEvent::Abandon,
                    None => break,
                },
                Some(event) = results.recv() => event,
                _ = ticker.tick() => SoloEvent::Tick,
                _ = poller.tick() => SoloEvent::AiPollDue,
            };

            let was_playing = matches!(self.game.phase(), SoloPhase::Playing(_));
            let effects = self.game.apply(event);
            let now_playing = matches!(self.game.phase(), SoloPhase::Playing(_));

            if !was_playing && now_playing {
                // countdown starts from the moment the session is shown
                ticker.reset();
                poller.reset();
            }

            // notices always describe the phase already published
            self.phase_tx.send_replace(self.game.phase().clone());
            for effect in effects {
                self.execute(effect);
            }
        }

        tracing::debug!("Solo controller stopped");
    }

    fn start(&self, req: StartSessionRequest) {
        let api = Arc::clone(&self.api);
        let results = self.results_tx.clone();
        tokio::spawn(async move {
            let event = match api.start_session(&req).await {
                Ok(response) => SoloEvent::Started(response),
                Err(err) => SoloEvent::StartFailed(err),
            };
            let _ = results.send(event);
        });
    }

    fn execute(&self, effect: SoloEffect) {
        let api = Arc::clone(&self.api);
        let results = self.results_tx.clone();

        match effect {
            SoloEffect::Run { session_id, code } => {
                tokio::spawn(async move {
                    let event = match api.run_tests(session_id, &code).await {
                        Ok(result) => SoloEvent::RunFinished { session_id, result },
                        Err(error) => SoloEvent::RunFailed { session_id, error },
                    };
                    let _ = results.send(event);
                });
            }
            SoloEffect::Submit {
                session_id, code, ..
            } => {
                tokio::spawn(async move {
                    let event = match api.submit(session_id, &code).await {
                        Ok(result) => SoloEvent::Submitted { session_id, result },
                        Err(error) => SoloEvent::SubmitFailed { session_id, error },
                    };
                    let _ = results.send(event);
                });
            }
            SoloEffect::RequestHint { session_id } => {
                tokio::spawn(async move {
                    let event = match api.request_hint(session_id).await {
                        Ok(hint) => SoloEvent::HintReceived { session_id, hint },
                        Err(error) => SoloEvent::HintFailed { session_id, error },
                    };
                    let _ = results.send(event);
                });
            }
            SoloEffect::PollAi { session_id } => {
                tokio::spawn(async move {
                    let status = api.ai_status(session_id).await;
                    let _ = results.send(SoloEvent::AiPolled { session_id, status });
                });
            }
            SoloEffect::Notify(notice) => {
                let _ = self.updates_tx.send(SoloUpdate::Notice(notice));
            }
            SoloEffect::Timer(event) => {
                let _ = self.updates_tx.send(SoloUpdate::Timer(event));
            }
        }
    }
}
