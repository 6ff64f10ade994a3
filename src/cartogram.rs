//! Cartogram controller
//!
//! [`Cartogram`] is the single owner of everything derived from one
//! configuration: the dataset, the force simulation, the animation state and the
//! pending timers. Every timer and tick is tagged with the generation it was
//! scheduled in; a rebuild bumps the generation and clears the queue, and any
//! event that still carries an old tag is dropped on arrival.
//!
//! The controller never sleeps. Callers drive it with [`Cartogram::step`],
//! [`Cartogram::advance`] or the tokio driver in [`crate::runtime`].

use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::animation::{AnimationState, Phase, Resume};
use crate::config::{dwell_millis, ConfigError, DorlingConfig, NutsLevel};
use crate::dataset::Dataset;
use crate::io::{GeometryProvider, ProviderResult, StatisticsProvider};
use crate::model::{CircleEntity, CircleSnapshot, Position, TooltipInfo};
use crate::render::{RenderEvent, RenderSubscriber, Subscribers};
use crate::scheduler::{Event, Generation, Scheduler, TimerId};
use crate::simulation::{ForceSimulation, RunId, TickOutcome};

/// Animated Dorling cartogram
pub struct Cartogram {
    config: DorlingConfig,
    geometry: Box<dyn GeometryProvider>,
    statistics: Box<dyn StatisticsProvider>,
    generation: Generation,
    dataset: Option<Dataset>,
    simulation: ForceSimulation,
    state: AnimationState,
    scheduler: Scheduler,
    tick_timer: Option<TimerId>,
    highlighted: Option<String>,
    subscribers: Subscribers,
}

impl Cartogram {
    /// Create an empty cartogram. Nothing is fetched until [`Cartogram::start`].
    pub fn new(
        config: DorlingConfig,
        geometry: Box<dyn GeometryProvider>,
        statistics: Box<dyn StatisticsProvider>,
    ) -> Self {
        let state = AnimationState::new(config.animate);
        Self {
            config,
            geometry,
            statistics,
            generation: Generation::default(),
            dataset: None,
            simulation: ForceSimulation::new(Vec::new()),
            state,
            scheduler: Scheduler::new(),
            tick_timer: None,
            highlighted: None,
            subscribers: Subscribers::new(),
        }
    }

    /// Register a render subscriber. Subscribers are called in registration order.
    pub fn subscribe<S>(&mut self, subscriber: S)
    where
        S: RenderSubscriber + 'static,
    {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Build the current configuration and begin the cycle from the map phase
    pub fn start(&mut self) -> ProviderResult<()> {
        self.rebuild(self.config.clone())
    }

    /// Tear down and rebuild everything for `config`.
    ///
    /// The configuration is validated and the new dataset derived before
    /// anything is torn down: on error the current state is left as it was.
    pub fn rebuild(&mut self, config: DorlingConfig) -> ProviderResult<()> {
        info!(level = %config.nuts_level, "rebuilding cartogram");
        config
            .validate()
            .inspect_err(|err| warn!(%err, "rebuild aborted, keeping current state"))?;
        let dataset = Dataset::load(&config, &*self.geometry, &*self.statistics)
            .inspect_err(|err| warn!(%err, "rebuild aborted, keeping current state"))?;

        self.teardown();
        self.install(config, dataset);
        Ok(())
    }

    /// Rebuild at another geographic level, keeping every other setting
    pub fn set_level(&mut self, level: NutsLevel) -> ProviderResult<()> {
        let config = self.config.clone().with_nuts_level(level);
        self.rebuild(config)
    }

    fn teardown(&mut self) {
        self.state.take_dwell();
        self.tick_timer = None;
        if let Some(run) = self.simulation.stop() {
            debug!(run = run.0, "stopped run for rebuild");
        }
        // hard cancel: nothing from the old generation may fire
        self.scheduler.clear();
        self.highlighted = None;
        self.generation = self.generation.next();
        self.publish(RenderEvent::Cleared {
            generation: self.generation,
        });
    }

    fn install(&mut self, config: DorlingConfig, dataset: Dataset) {
        self.simulation = ForceSimulation::new(dataset.entities.clone());
        self.state = AnimationState::new(config.animate);
        self.config = config;
        self.dataset = Some(dataset);

        let circles = self
            .simulation
            .entities()
            .iter()
            .map(CircleSnapshot::from)
            .collect();
        self.publish(RenderEvent::Built {
            generation: self.generation,
            circles,
        });
        info!(
            generation = self.generation.0,
            entities = self.simulation.len(),
            "cartogram built"
        );

        if self.config.animate {
            self.arm_dwell();
        } else {
            self.show_static();
        }
    }

    fn show_static(&mut self) {
        let from = self.state.show_cartogram();
        if from != Phase::Cartogram {
            self.phase_changed(from, Phase::Cartogram);
        }
        self.start_run();
    }

    /// Allow automatic transitions again
    pub fn play(&mut self) {
        match self.state.resume(self.simulation.is_running()) {
            Resume::Nothing => {}
            Resume::ArmDwell => self.arm_dwell(),
            Resume::EnterMap => self.enter_map(Phase::Cartogram),
        }
        debug!(phase = %self.state.phase(), "playing");
    }

    /// Suppress automatic transitions. A running simulation keeps settling.
    pub fn pause(&mut self) {
        if self.state.pause() {
            debug!(phase = %self.state.phase(), "paused");
        }
    }

    /// Flip between playing and paused; returns whether it is now playing
    pub fn toggle(&mut self) -> bool {
        if self.state.is_playing() {
            self.pause();
        } else {
            self.play();
        }
        self.state.is_playing()
    }

    /// Force the map phase, stop the run and re-enter the timed cycle.
    ///
    /// Without animation the layout is recomputed and shown again instead.
    pub fn restart(&mut self) {
        if let Some(timer) = self.state.take_dwell() {
            self.scheduler.cancel(timer);
        }
        self.stop_run();
        self.highlighted = None;
        self.publish(RenderEvent::TooltipHidden);

        let from = self.state.restart();
        if from != Phase::Map {
            self.phase_changed(from, Phase::Map);
        }
        info!(generation = self.generation.0, "restarted");

        if self.config.animate {
            if self.state.wants_dwell() {
                self.arm_dwell();
            }
        } else {
            self.show_static();
        }
    }

    /// Highlight a circle. Only live while the circles are shown.
    pub fn hover(&mut self, id: &str) -> Option<TooltipInfo> {
        if !self.state.allows_highlight() {
            return None;
        }
        let info = self.dataset.as_ref()?.tooltip(id)?;
        if let Some(previous) = self.highlighted.replace(id.to_string()) {
            if previous != id {
                self.publish(RenderEvent::Unhighlight { id: previous });
            }
        }
        self.publish(RenderEvent::Highlight { id: id.to_string() });
        Some(info)
    }

    /// Revert a highlight; returns false if `id` was not highlighted
    pub fn unhover(&mut self, id: &str) -> bool {
        if !self.state.allows_highlight() || self.highlighted.as_deref() != Some(id) {
            return false;
        }
        self.highlighted = None;
        self.publish(RenderEvent::Unhighlight { id: id.to_string() });
        self.publish(RenderEvent::TooltipHidden);
        true
    }

    /// Pull strength used by the next run
    pub fn set_position_strength(&mut self, strength: f64) -> Result<(), ConfigError> {
        self.update_config(|c| c.position_strength = strength)
    }

    /// Collision strength used by the next run
    pub fn set_collision_strength(&mut self, strength: f64) -> Result<(), ConfigError> {
        self.update_config(|c| c.collision_strength = strength)
    }

    /// Collision padding used by the next run
    pub fn set_collision_padding(&mut self, padding: f64) -> Result<(), ConfigError> {
        self.update_config(|c| c.collision_padding = padding)
    }

    /// Map dwell used the next time the dwell timer is armed
    pub fn set_dwell(&mut self, dwell: Duration) {
        self.config.dwell_ms = dwell_millis(dwell);
    }

    /// Radius exaggeration applied at the next rebuild
    pub fn set_exaggeration(&mut self, factor: f64) -> Result<(), ConfigError> {
        self.update_config(|c| c.circle_exaggeration_factor = factor)
    }

    // out-of-range values are rejected and the stored config is kept
    fn update_config(&mut self, apply: impl FnOnce(&mut DorlingConfig)) -> Result<(), ConfigError> {
        let mut config = self.config.clone();
        apply(&mut config);
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &DorlingConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn active_run(&self) -> Option<RunId> {
        self.simulation.active_run()
    }

    /// Current alpha of the simulation
    pub fn alpha(&self) -> f64 {
        self.simulation.alpha()
    }

    /// Whether the map dwell timer is armed
    pub fn dwell_pending(&self) -> bool {
        self.state
            .dwell()
            .is_some_and(|timer| self.scheduler.is_pending(timer))
    }

    pub fn entities(&self) -> &[CircleEntity] {
        self.simulation.entities()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.simulation.positions()
    }

    /// Dataset of the current generation, once built
    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    /// Virtual time of the controller clock
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    /// Due time of the next pending event
    pub fn next_due(&mut self) -> Option<Duration> {
        self.scheduler.next_due()
    }

    /// Handle the next pending event, jumping the clock to it. Returns false when
    /// nothing is pending.
    pub fn step(&mut self) -> bool {
        match self.scheduler.pop_due(Duration::MAX) {
            Some((_, event)) => {
                self.handle(event);
                true
            }
            None => false,
        }
    }

    /// Handle every event due within `by` from now
    pub fn advance(&mut self, by: Duration) {
        let until = self.scheduler.now().saturating_add(by);
        self.advance_to(until);
    }

    /// Handle every event due at or before `until`, then move the clock there
    pub fn advance_to(&mut self, until: Duration) {
        while let Some((_, event)) = self.scheduler.pop_due(until) {
            self.handle(event);
        }
        self.scheduler.advance_clock(until);
    }

    /// Apply one event. Events from a superseded generation or run are dropped.
    pub fn handle(&mut self, event: Event) {
        if event.generation() != self.generation {
            trace!(
                stale = event.generation().0,
                current = self.generation.0,
                "dropping event from an old generation"
            );
            return;
        }
        match event {
            Event::DwellElapsed { .. } => self.on_dwell_elapsed(),
            Event::Tick { run, .. } => self.on_tick(run),
        }
    }

    fn on_dwell_elapsed(&mut self) {
        if !self.state.dwell_elapsed() {
            debug!("dwell elapsed while paused, holding map phase");
            return;
        }
        self.phase_changed(Phase::Map, Phase::Cartogram);
        if self.simulation.active_run().is_none() {
            self.start_run();
        }
    }

    fn on_tick(&mut self, run: RunId) {
        if self.simulation.active_run() != Some(run) {
            trace!(run = run.0, "dropping tick from a stopped run");
            return;
        }
        self.tick_timer = None;

        let outcome = self.simulation.tick();
        self.publish(RenderEvent::Tick {
            generation: self.generation,
            run,
            alpha: self.simulation.alpha(),
            positions: self.simulation.positions(),
        });

        match outcome {
            TickOutcome::Running => self.schedule_tick(run),
            TickOutcome::Converged(run) => {
                info!(
                    run = run.0,
                    ticks = self.simulation.ticks(),
                    "simulation converged"
                );
                self.publish(RenderEvent::Converged {
                    generation: self.generation,
                    run,
                });
                if self.state.run_converged() {
                    self.enter_map(Phase::Cartogram);
                }
            }
            TickOutcome::Idle => {}
        }
    }

    fn enter_map(&mut self, from: Phase) {
        self.highlighted = None;
        self.publish(RenderEvent::TooltipHidden);
        self.phase_changed(from, Phase::Map);
        if self.state.wants_dwell() {
            self.arm_dwell();
        }
    }

    fn arm_dwell(&mut self) {
        let timer = self.scheduler.schedule(
            self.config.dwell(),
            Event::DwellElapsed {
                generation: self.generation,
            },
        );
        self.state.arm_dwell(timer);
    }

    fn start_run(&mut self) {
        self.stop_run();
        let run = self.simulation.start(self.config.simulation_params());
        self.schedule_tick(run);
    }

    fn stop_run(&mut self) {
        if let Some(timer) = self.tick_timer.take() {
            self.scheduler.cancel(timer);
        }
        if let Some(run) = self.simulation.stop() {
            debug!(run = run.0, "stopped run");
        }
    }

    fn schedule_tick(&mut self, run: RunId) {
        let timer = self.scheduler.schedule(
            self.config.tick_interval(),
            Event::Tick {
                generation: self.generation,
                run,
            },
        );
        self.tick_timer = Some(timer);
    }

    fn phase_changed(&mut self, from: Phase, to: Phase) {
        info!(generation = self.generation.0, %from, %to, "phase transition");
        self.publish(RenderEvent::PhaseChanged {
            generation: self.generation,
            from,
            to,
        });
    }

    fn publish(&mut self, event: RenderEvent) {
        self.subscribers.publish(event);
    }
}

impl std::fmt::Debug for Cartogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cartogram")
            .field("generation", &self.generation)
            .field("phase", &self.state.phase())
            .field("playing", &self.state.is_playing())
            .field("active_run", &self.simulation.active_run())
            .field("entities", &self.simulation.len())
            .field("subscribers", &self.subscribers)
            .finish()
    }
}
