use std::ops::ControlFlow;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::{
    sync::mpsc::UnboundedReceiver,
    time::{interval, Duration, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    catalog::EmoteCatalog,
    config::EmoteWallConfig,
    events::{Candidate, EngineEvent},
    gate::{SpawnDecision, SpawnGate},
    physics::{frames_between, PhysicsSimulator, Viewport},
    protocol::ChatMessage,
    registry::{InstanceId, LifecycleRegistry, RegistryParams},
    stats::{EngineStats, FpsCounter},
    traffic::TestTrafficGenerator,
    workers::{pick_candidate, ConnectionState},
};

/// Single owner of all wall state. Every mutation happens on the task
/// running [`Engine::run`], so components need no locking.
pub struct Engine<R = StdRng> {
    config: EmoteWallConfig,
    catalog: EmoteCatalog,
    gate: SpawnGate,
    registry: LifecycleRegistry,
    physics: PhysicsSimulator,
    traffic: TestTrafficGenerator,
    viewport: Viewport,
    rng: R,
    fps: FpsCounter,
    last_frame_ms: Option<u64>,
    chat_state: ConnectionState,
    admitted: u64,
    rejected: u64,
}

impl Engine<StdRng> {
    pub fn new(config: EmoteWallConfig, catalog: EmoteCatalog) -> Self {
        Self::with_rng(config, catalog, StdRng::from_entropy())
    }
}

impl<R: Rng> Engine<R> {
    pub fn with_rng(config: EmoteWallConfig, catalog: EmoteCatalog, rng: R) -> Self {
        let viewport = Viewport::from(config.viewport);
        let gate = SpawnGate::new(config.limits.clone(), &config.animation.weights);
        let registry = LifecycleRegistry::new(RegistryParams {
            ceiling: config.limits.max_on_screen,
            display_ms: config.timing.display_ms,
            fade_in_ms: config.timing.fade_in_ms,
            fade_out_ms: config.timing.fade_out_ms,
            appearance: config.appearance.clone(),
            animation: config.animation.clone(),
            viewport,
        });
        let physics = PhysicsSimulator::new(&config.animation.physics);
        let mut traffic = TestTrafficGenerator::new();
        traffic.init_pool(&catalog);
        Self {
            config,
            catalog,
            gate,
            registry,
            physics,
            traffic,
            viewport,
            rng,
            fps: FpsCounter::default(),
            last_frame_ms: None,
            chat_state: ConnectionState::Disconnected,
            admitted: 0,
            rejected: 0,
        }
    }

    pub fn catalog(&self) -> &EmoteCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &LifecycleRegistry {
        &self.registry
    }

    pub fn traffic(&self) -> &TestTrafficGenerator {
        &self.traffic
    }

    pub fn chat_state(&self) -> ConnectionState {
        self.chat_state
    }

    /// Runs a candidate through the gate and, if admitted, onto the wall.
    pub fn submit(&mut self, candidate: Candidate, now_ms: u64) -> SpawnDecision {
        let decision = self.gate.evaluate(&candidate.name, now_ms, &mut self.rng);
        let kind = match decision {
            SpawnDecision::Admit(kind) => kind,
            SpawnDecision::Reject(reason) => {
                self.rejected += 1;
                debug!(name = %candidate.name, ?reason, "candidate rejected");
                return decision;
            }
        };

        let admission = self.registry.admit(
            &candidate.name,
            &candidate.image_url,
            kind,
            now_ms,
            &mut self.rng,
        );
        self.admitted += 1;
        if let Some(evicted) = admission.evicted {
            debug!(%evicted, "evicted oldest emote");
        }
        if !candidate.is_test() {
            if self.config.debug {
                info!(
                    name = %candidate.name,
                    kind = kind.as_str(),
                    id = %admission.id,
                    active = self.registry.len(),
                    "emote admitted"
                );
            }
            self.traffic
                .collect(&candidate.name, Some(candidate.image_url.as_str()), &self.catalog);
        }
        decision
    }

    pub fn on_chat(&mut self, message: &ChatMessage, now_ms: u64) -> Option<SpawnDecision> {
        if self.config.debug {
            info!(author = %message.author, text = %message.text, "chat");
        }
        let candidate = pick_candidate(message, &self.catalog, self.config.providers.twitch)?;
        Some(self.submit(candidate, now_ms))
    }

    pub fn test_tick(&mut self, now_ms: u64) -> Option<SpawnDecision> {
        let candidate = self.traffic.tick(&mut self.rng)?;
        Some(self.submit(candidate, now_ms))
    }

    /// One render tick: integrate motion, retire fallen rain, fire
    /// deadlines. Returns the ids that left the wall.
    pub fn frame(&mut self, now_ms: u64) -> Vec<InstanceId> {
        let dt = self
            .last_frame_ms
            .map(|last| frames_between(now_ms.saturating_sub(last) as f32))
            .unwrap_or(1.0);
        self.last_frame_ms = Some(now_ms);

        let fallen = self
            .physics
            .step(self.registry.on_screen_mut(), self.viewport, dt);
        for id in fallen {
            self.registry.retire(id, now_ms);
        }
        let removed = self.registry.advance(now_ms);

        if self.fps.frame(now_ms).is_some() {
            let stats = self.snapshot();
            debug!(?stats, "frame stats");
        }
        removed
    }

    pub fn handle_image_failure(&mut self, name: &str) {
        let hidden = self.registry.hide_by_name(name);
        let purged = self.catalog.purge(name);
        let forgotten = self.traffic.forget(name);
        warn!(name, hidden, purged, forgotten, "emote image failed to load");
    }

    pub fn handle_event(&mut self, event: EngineEvent, now_ms: u64) -> ControlFlow<()> {
        match event {
            EngineEvent::Chat(message) => {
                self.on_chat(&message, now_ms);
            }
            EngineEvent::ChatStatus(state) => {
                if state != self.chat_state {
                    info!(from = ?self.chat_state, to = ?state, "chat connection state");
                    self.chat_state = state;
                }
            }
            EngineEvent::ImageFailed(name) => self.handle_image_failure(&name),
            EngineEvent::StartTestMode => {
                self.traffic.start(&self.catalog);
            }
            EngineEvent::StopTestMode => {
                self.traffic.stop();
            }
            EngineEvent::Shutdown => {
                info!("engine shutting down");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            active: self.registry.len(),
            lingering: self.registry.lingering().len(),
            hidden: self.registry.instances().filter(|i| i.hidden).count(),
            pool: self.traffic.len(),
            catalog: self.catalog.len(),
            fps: self.fps.fps(),
            admitted: self.admitted,
            rejected: self.rejected,
        }
    }

    /// Drives frames, test traffic and queued events until `Shutdown` or
    /// until every sender is gone.
    pub async fn run(&mut self, mut rx: UnboundedReceiver<EngineEvent>) {
        let started = Instant::now();
        let elapsed_ms = || started.elapsed().as_millis() as u64;

        let frame_ms = (1_000 / u64::from(self.config.timing.frame_rate.max(1))).max(1);
        let mut frames = interval(Duration::from_millis(frame_ms));
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut test_ticks = interval(Duration::from_millis(self.config.timing.test_interval_ms.max(1)));
        test_ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            frame_ms,
            test_interval_ms = self.config.timing.test_interval_ms,
            catalog = self.catalog.len(),
            "engine running"
        );
        loop {
            tokio::select! {
                _ = frames.tick() => {
                    self.frame(elapsed_ms());
                }
                _ = test_ticks.tick() => {
                    self.test_tick(elapsed_ms());
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        info!("event channel closed; engine stopping");
                        break;
                    };
                    if self.handle_event(event, elapsed_ms()).is_break() {
                        break;
                    }
                }
            }
        }
    }
}
