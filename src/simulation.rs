//! Force simulation for the Dorling layout
//!
//! Circles are pulled toward their geographic centroid and pushed apart where
//! they overlap. Alpha (the simulation temperature) decays every tick and the
//! run converges once it drops below `alpha_min`.
//!
//! A simulation owns its entities. Only `tick` moves them, and at most one run
//! is active at a time: `start` stops the previous run before beginning a new one.

use serde::Serialize;
use tracing::debug;

use crate::config;
use crate::model::{CircleEntity, Position};

/// Identifies one run of the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RunId(pub u64);

/// Parameters fixed for the duration of a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    /// Pull toward the target position, scaled by alpha
    pub position_strength: f64,
    /// Fraction of an overlap resolved per tick
    pub collision_strength: f64,
    /// Fraction added to every radius for collision purposes
    pub collision_padding: f64,
    /// Minimum alpha before the run converges
    pub alpha_min: f64,
    /// Alpha decay rate
    pub alpha_decay: f64,
    /// Value alpha decays toward
    pub alpha_target: f64,
    /// Velocity multiplier (friction)
    pub velocity_decay: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            position_strength: config::DEFAULT_POSITION_STRENGTH,
            collision_strength: config::DEFAULT_COLLISION_STRENGTH,
            collision_padding: config::DEFAULT_COLLISION_PADDING,
            alpha_min: config::DEFAULT_ALPHA_MIN,
            alpha_decay: config::alpha_decay_for(
                config::DEFAULT_ALPHA_MIN,
                config::DEFAULT_ALPHA_DECAY_TICKS,
            ),
            alpha_target: 0.0,
            velocity_decay: config::DEFAULT_VELOCITY_DECAY,
        }
    }
}

impl SimulationParams {
    /// Upper bound on the number of ticks a run takes to converge
    pub fn max_ticks(&self) -> usize {
        // alpha never moves without decay
        if self.alpha_decay.is_nan()
            || self.alpha_decay <= 0.0
            || self.alpha_target >= self.alpha_min
        {
            return usize::MAX;
        }
        // alpha_n = target + (1 - target) * (1 - decay)^n
        let remaining = (self.alpha_min - self.alpha_target) / (1.0 - self.alpha_target);
        let ticks = remaining.ln() / (1.0 - self.alpha_decay).ln();
        // one extra tick absorbs rounding in the iterated decay
        ticks.ceil().max(1.0) as usize + 1
    }
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No run is active; nothing moved
    Idle,
    /// The run moved the circles and is still hot
    Running,
    /// The run moved the circles and has now cooled down
    Converged(RunId),
}

/// CPU force simulation over a set of circles
#[derive(Debug, Clone)]
pub struct ForceSimulation {
    entities: Vec<CircleEntity>,
    params: SimulationParams,
    alpha: f64,
    run: Option<RunId>,
    next_run: u64,
    ticks: usize,
    jiggle_state: u64,
    // scratch buffer for the sweep along x
    order: Vec<usize>,
}

impl ForceSimulation {
    /// Create a stopped simulation; every circle rests on its target
    pub fn new(mut entities: Vec<CircleEntity>) -> Self {
        for entity in &mut entities {
            entity.reset_to_target();
        }
        Self {
            entities,
            params: SimulationParams::default(),
            alpha: 1.0,
            run: None,
            next_run: 1,
            ticks: 0,
            jiggle_state: 0x9E37_79B9_7F4A_7C15,
            order: Vec::new(),
        }
    }

    pub fn entities(&self) -> &[CircleEntity] {
        &self.entities
    }

    pub fn entity(&self, id: &str) -> Option<&CircleEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Current alpha
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Parameters of the current (or last) run
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// Ticks performed by the current (or last) run
    pub fn ticks(&self) -> usize {
        self.ticks
    }

    pub fn active_run(&self) -> Option<RunId> {
        self.run
    }

    /// Check if a run is in progress
    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Begin a new run.
    ///
    /// An active run is stopped first. Every circle is put back on its target,
    /// which may have moved since the previous run.
    pub fn start(&mut self, params: SimulationParams) -> RunId {
        if let Some(previous) = self.stop() {
            debug!(run = previous.0, "stopped previous run before starting a new one");
        }
        for entity in &mut self.entities {
            entity.reset_to_target();
        }
        self.params = params;
        self.alpha = 1.0;
        self.ticks = 0;

        let id = RunId(self.next_run);
        self.next_run += 1;
        self.run = Some(id);
        debug!(
            run = id.0,
            entities = self.entities.len(),
            max_ticks = params.max_ticks(),
            "started simulation run"
        );
        id
    }

    /// Stop the active run. Returns the run that was stopped, if any.
    pub fn stop(&mut self) -> Option<RunId> {
        self.run.take()
    }

    /// Run one simulation tick
    pub fn tick(&mut self) -> TickOutcome {
        let Some(run) = self.run else {
            return TickOutcome::Idle;
        };

        if !self.entities.is_empty() {
            self.apply_position_force();
            self.apply_collision_force();

            let decay = self.params.velocity_decay;
            for entity in &mut self.entities {
                entity.vx *= decay;
                entity.vy *= decay;
                entity.x += entity.vx;
                entity.y += entity.vy;
            }
        }

        self.alpha += (self.params.alpha_target - self.alpha) * self.params.alpha_decay;
        self.ticks += 1;

        if self.alpha < self.params.alpha_min {
            self.run = None;
            debug!(run = run.0, ticks = self.ticks, "simulation run converged");
            TickOutcome::Converged(run)
        } else {
            TickOutcome::Running
        }
    }

    /// Current positions of every circle
    pub fn positions(&self) -> Vec<Position> {
        self.entities.iter().map(CircleEntity::position).collect()
    }

    /// Tick until the active run converges (or max iterations). Returns the tick count.
    pub fn run_to_convergence(&mut self, max_iterations: usize) -> usize {
        let mut count = 0;
        while count < max_iterations {
            match self.tick() {
                TickOutcome::Idle => break,
                TickOutcome::Running => count += 1,
                TickOutcome::Converged(_) => {
                    count += 1;
                    break;
                }
            }
        }
        count
    }

    /// Pull every circle toward its target
    fn apply_position_force(&mut self) {
        let k = self.params.position_strength * self.alpha;
        for entity in &mut self.entities {
            entity.vx += (entity.target_x - entity.x) * k;
            entity.vy += (entity.target_y - entity.y) * k;
        }
    }

    /// Push overlapping pairs apart.
    ///
    /// Candidate pairs come from a sweep along the predicted x coordinate; the
    /// larger circle of a pair moves less.
    fn apply_collision_force(&mut self) {
        let n = self.entities.len();
        if n < 2 {
            return;
        }

        let padding = 1.0 + self.params.collision_padding;
        let strength = self.params.collision_strength;

        let predicted: Vec<f64> = self.entities.iter().map(|e| e.x + e.vx).collect();
        let max_radius = self
            .entities
            .iter()
            .map(|e| e.radius * padding)
            .fold(0.0, f64::max);

        let mut order = std::mem::take(&mut self.order);
        order.clear();
        order.extend(0..n);
        order.sort_by(|&a, &b| predicted[a].total_cmp(&predicted[b]));

        for (k, &i) in order.iter().enumerate() {
            let ri = self.entities[i].radius * padding;
            let ri2 = ri * ri;
            let xi = self.entities[i].x + self.entities[i].vx;
            let yi = self.entities[i].y + self.entities[i].vy;

            for &j in &order[k + 1..] {
                if predicted[j] - predicted[i] > ri + max_radius {
                    break;
                }

                let rj = self.entities[j].radius * padding;
                let r = ri + rj;
                let mut dx = xi - (self.entities[j].x + self.entities[j].vx);
                let mut dy = yi - (self.entities[j].y + self.entities[j].vy);
                let mut l = dx * dx + dy * dy;
                if l >= r * r {
                    continue;
                }

                if dx == 0.0 {
                    dx = self.jiggle();
                    l += dx * dx;
                }
                if dy == 0.0 {
                    dy = self.jiggle();
                    l += dy * dy;
                }
                let dist = l.sqrt();
                let push = (r - dist) / dist * strength;
                dx *= push;
                dy *= push;

                let rj2 = rj * rj;
                let share = rj2 / (ri2 + rj2);
                self.entities[i].vx += dx * share;
                self.entities[i].vy += dy * share;
                self.entities[j].vx -= dx * (1.0 - share);
                self.entities[j].vy -= dy * (1.0 - share);
            }
        }

        self.order = order;
    }

    /// Tiny deterministic offset to separate coincident circles
    fn jiggle(&mut self) -> f64 {
        // xorshift64
        let mut x = self.jiggle_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.jiggle_state = x;
        ((x >> 11) as f64 / (1u64 << 53) as f64 - 0.5) * 1e-6
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radius::{MissingValuePolicy, RadiusModel};

    fn circle(id: &str, x: f64, y: f64, radius: f64) -> CircleEntity {
        CircleEntity::new(id, x, y).with_radius(radius)
    }

    fn distance(a: &CircleEntity, b: &CircleEntity) -> f64 {
        ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
    }

    fn make_test_simulation() -> ForceSimulation {
        ForceSimulation::new(vec![
            circle("a", 0.0, 0.0, 10.0),
            circle("b", 5.0, 0.0, 10.0),
        ])
    }

    #[test]
    fn creates_stopped_simulation() {
        let sim = make_test_simulation();

        assert_eq!(sim.len(), 2);
        assert!(!sim.is_running());
        assert_eq!(sim.entities()[1].x, 5.0);
    }

    #[test]
    fn simulation_runs() {
        let mut sim = make_test_simulation();
        sim.start(SimulationParams::default());

        let initial_alpha = sim.alpha();
        assert_eq!(sim.tick(), TickOutcome::Running);

        assert!(sim.alpha() < initial_alpha);
        assert_eq!(sim.ticks(), 1);
    }

    #[test]
    fn simulation_converges_within_bound() {
        let mut sim = make_test_simulation();
        let params = SimulationParams::default();
        sim.start(params);

        let ticks = sim.run_to_convergence(10_000);

        assert!(!sim.is_running());
        assert!(ticks <= params.max_ticks());
        assert!(sim.alpha() < params.alpha_min);
    }

    #[test]
    fn default_run_takes_about_300_ticks() {
        let params = SimulationParams::default();
        let max = params.max_ticks();
        assert!((300..=302).contains(&max), "max_ticks = {max}");
    }

    #[test]
    fn no_decay_has_no_tick_bound() {
        let params = SimulationParams {
            alpha_decay: 0.0,
            ..SimulationParams::default()
        };
        assert_eq!(params.max_ticks(), usize::MAX);

        let params = SimulationParams {
            alpha_decay: f64::NAN,
            ..SimulationParams::default()
        };
        assert_eq!(params.max_ticks(), usize::MAX);
    }

    #[test]
    fn empty_simulation_handles_gracefully() {
        let mut sim = ForceSimulation::new(Vec::new());
        assert!(sim.is_empty());

        // Should not panic when ticking an empty set
        assert_eq!(sim.tick(), TickOutcome::Idle);
        sim.start(SimulationParams::default());
        sim.run_to_convergence(1000);
        assert!(!sim.is_running());
    }

    #[test]
    fn single_circle_stays_on_target() {
        let mut sim = ForceSimulation::new(vec![circle("only", 12.0, -4.0, 8.0)]);
        sim.start(SimulationParams::default());
        sim.run_to_convergence(1000);

        let e = &sim.entities()[0];
        assert!((e.x - 12.0).abs() < 1e-9);
        assert!((e.y + 4.0).abs() < 1e-9);
    }

    #[test]
    fn three_circles_separate_with_padding() {
        let model = RadiusModel {
            scale: 1.0,
            exaggeration: 1.2,
            missing: MissingValuePolicy::Zero,
        };
        let entities = [("a", 0.0, 0.0, 100.0), ("b", 10.0, 5.0, 400.0), ("c", 20.0, -5.0, 900.0)]
            .into_iter()
            .map(|(id, x, y, v)| {
                CircleEntity::new(id, x, y)
                    .with_value(Some(v))
                    .with_radius(model.radius(Some(v)))
            })
            .collect();
        let mut sim = ForceSimulation::new(entities);
        sim.start(SimulationParams {
            collision_padding: 0.1,
            ..SimulationParams::default()
        });
        sim.run_to_convergence(10_000);
        assert!(!sim.is_running());

        let es = sim.entities();
        for i in 0..es.len() {
            for j in (i + 1)..es.len() {
                let min = (es[i].radius + es[j].radius) * 1.1;
                let d = distance(&es[i], &es[j]);
                assert!(
                    d >= min * 0.99,
                    "{} and {} overlap: distance {d}, expected at least {min}",
                    es[i].id,
                    es[j].id
                );
            }
        }
    }

    #[test]
    fn coincident_targets_stay_finite_and_separate() {
        let entities = (0..5)
            .map(|i| circle(&format!("c{i}"), 0.0, 0.0, 5.0))
            .collect();
        let mut sim = ForceSimulation::new(entities);
        sim.start(SimulationParams::default());
        sim.run_to_convergence(10_000);

        let es = sim.entities();
        for e in es {
            assert!(e.x.is_finite() && e.y.is_finite());
        }
        for i in 0..es.len() {
            for j in (i + 1)..es.len() {
                assert!(distance(&es[i], &es[j]) > 9.0);
            }
        }
    }

    #[test]
    fn start_resets_positions_to_targets() {
        let mut sim = make_test_simulation();
        sim.start(SimulationParams::default());
        sim.run_to_convergence(10_000);
        assert_ne!(sim.entities()[0].x, 0.0);

        sim.start(SimulationParams::default());

        for e in sim.entities() {
            assert_eq!((e.x, e.y), (e.target_x, e.target_y));
            assert_eq!((e.vx, e.vy), (0.0, 0.0));
        }
        assert_eq!(sim.alpha(), 1.0);
    }

    #[test]
    fn second_start_replaces_active_run() {
        let mut sim = make_test_simulation();
        let first = sim.start(SimulationParams::default());
        sim.tick();
        let second = sim.start(SimulationParams::default());

        assert_ne!(first, second);
        assert_eq!(sim.active_run(), Some(second));
        assert_eq!(sim.ticks(), 0);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut sim = make_test_simulation();
        let run = sim.start(SimulationParams::default());

        assert_eq!(sim.stop(), Some(run));
        assert_eq!(sim.stop(), None);
        assert!(!sim.is_running());
        assert_eq!(sim.tick(), TickOutcome::Idle);
    }

    #[test]
    fn zero_position_strength_lets_collisions_drift() {
        let mut sim = make_test_simulation();
        sim.start(SimulationParams {
            position_strength: 0.0,
            ..SimulationParams::default()
        });
        sim.run_to_convergence(10_000);

        let es = sim.entities();
        assert!(distance(&es[0], &es[1]) >= 22.0 * 0.99);
    }
}
