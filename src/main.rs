use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use horde_swarm::config::SwarmConfig;
use horde_swarm::swarm::poi::DEFAULT_POI_CELL_SIZE;
use horde_swarm::swarm::{
    join_combat, leave_combat, lock_pair, ColonyId, LeaveOutcome, Poi, PoiField, Simulator,
};
use horde_swarm::util::vec2::Vec2;

/// Seconds per engagement cycle: colonies march, fight, then withdraw
const CYCLE_SECS: u64 = 20;
const JOIN_AT_SECS: u64 = 5;
const LEAVE_AT_SECS: u64 = 15;
/// Fraction of each fighting colony lost per second of combat
const ATTRITION: f32 = 0.08;
const SUMMARY_EVERY_SECS: u64 = 5;

struct ColonyHandle {
    colony: ColonyId,
    sim: Arc<Mutex<Simulator>>,
}

struct Demo {
    config: SwarmConfig,
    rng: StdRng,
    colonies: Vec<ColonyHandle>,
    combat: Arc<Mutex<Simulator>>,
    fighting: Vec<usize>,
    tick: u64,
}

impl Demo {
    fn new(config: SwarmConfig) -> anyhow::Result<Self> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let bound = config.world_bound;

        let pois: Vec<Poi> = (0..config.pois)
            .map(|_| {
                let center = Vec2::new(
                    rng.gen_range(-bound * 0.8..bound * 0.8),
                    rng.gen_range(-bound * 0.8..bound * 0.8),
                );
                Poi::new(center, config.poi_radius)
            })
            .collect();
        let pois = Arc::new(PoiField::build(pois, bound, bound, DEFAULT_POI_CELL_SIZE)?);
        info!(count = pois.len(), "Obstacles placed");

        let mut colonies = Vec::with_capacity(config.colonies);
        for i in 0..config.colonies {
            let colony = Uuid::new_v4();
            let target = Vec2::new(rng.gen_range(-bound..bound), rng.gen_range(-bound..bound));
            let sim = Simulator::solo(
                colony,
                config.agents_per_colony,
                target,
                config.colony_settings(i as u64),
                Arc::clone(&pois),
            )?;
            info!(%colony, alive = config.agents_per_colony, "Colony founded");
            colonies.push(ColonyHandle {
                colony,
                sim: Arc::new(Mutex::new(sim)),
            });
        }

        let combat = Simulator::merged(config.combat_settings(), pois)?;

        Ok(Self {
            config,
            rng,
            colonies,
            combat: Arc::new(Mutex::new(combat)),
            fighting: Vec::new(),
            tick: 0,
        })
    }

    fn tick(&mut self, dt: f32) {
        let rate = self.config.tick_rate as u64;
        let cycle_tick = self.tick % (CYCLE_SECS * rate);

        if cycle_tick == JOIN_AT_SECS * rate {
            self.engage();
        } else if cycle_tick == LEAVE_AT_SECS * rate {
            self.withdraw();
        } else if cycle_tick % rate == 0 && !self.fighting.is_empty() {
            self.attrition();
        }

        for handle in &self.colonies {
            let mut sim = handle.sim.lock();
            if sim.populations().is_empty() {
                continue;
            }
            if self.tick % (2 * rate) == 0 {
                let bound = self.config.world_bound;
                let target = Vec2::new(self.rng.gen_range(-bound..bound), self.rng.gen_range(-bound..bound));
                if let Err(e) = sim.set_target(handle.colony, target) {
                    warn!(colony = %handle.colony, "Retarget rejected: {}", e);
                }
            }
            if let Err(e) = sim.step(dt) {
                error!(colony = %handle.colony, "Colony step failed: {}", e);
            }
        }

        if let Err(e) = self.combat.lock().step(dt) {
            error!("Combat step failed: {}", e);
        }

        if self.tick % (SUMMARY_EVERY_SECS * rate) == 0 {
            self.log_summaries();
        }
        self.tick += 1;
    }

    /// Send the first two colonies with survivors into the combat simulator
    fn engage(&mut self) {
        let candidates: Vec<usize> = self
            .colonies
            .iter()
            .enumerate()
            .filter(|(_, h)| h.sim.lock().alive_count(h.colony).unwrap_or(0) > 0)
            .map(|(i, _)| i)
            .take(2)
            .collect();
        if candidates.len() < 2 {
            return;
        }

        for &i in &candidates {
            let handle = &self.colonies[i];
            let Some((mut colony_sim, mut combat)) = lock_pair(&handle.sim, &self.combat) else {
                continue;
            };
            match join_combat(&mut colony_sim, &mut combat, handle.colony) {
                Ok(tag) => {
                    info!(colony = %handle.colony, tag = tag.0, "Colony joined combat");
                    self.fighting.push(i);
                }
                Err(e) => warn!(colony = %handle.colony, "Join rejected: {}", e),
            }
        }
    }

    fn attrition(&mut self) {
        let mut combat = self.combat.lock();
        for &i in &self.fighting {
            let colony = self.colonies[i].colony;
            let alive = combat.alive_count(colony).unwrap_or(0);
            let losses = ((alive as f32 * ATTRITION).ceil() as u32).min(alive);
            if let Err(e) = combat.kill(colony, losses) {
                warn!(%colony, "Kill rejected: {}", e);
            }
        }
    }

    fn withdraw(&mut self) {
        for i in std::mem::take(&mut self.fighting) {
            let handle = &self.colonies[i];
            let Some((mut combat, mut colony_sim)) = lock_pair(&self.combat, &handle.sim) else {
                continue;
            };
            match leave_combat(&mut combat, &mut colony_sim, handle.colony) {
                Ok(LeaveOutcome::Returned { alive, corpses }) => {
                    info!(colony = %handle.colony, alive, corpses, "Colony withdrew from combat");
                }
                Ok(LeaveOutcome::Eliminated { total_deaths }) => {
                    info!(colony = %handle.colony, total_deaths, "Colony wiped out");
                }
                Err(e) => warn!(colony = %handle.colony, "Withdraw rejected: {}", e),
            }
        }
    }

    fn log_summaries(&self) {
        let sims = self
            .colonies
            .iter()
            .map(|h| &h.sim)
            .chain(std::iter::once(&self.combat));
        for sim in sims {
            let sim = sim.lock();
            if sim.step_status().is_degraded() {
                warn!(sim = %sim.id(), "Step over budget: {}", sim.step_status_message());
            }
            match serde_json::to_string(&sim.summary()) {
                Ok(json) => info!("{}", json),
                Err(e) => error!("Summary serialization failed: {}", e),
            }
        }
    }
}

async fn run(mut demo: Demo) {
    let rate = demo.config.tick_rate;
    let dt = 1.0 / rate as f32;
    let limit = demo.config.ticks;
    let mut interval = tokio::time::interval(Duration::from_secs_f32(dt));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        demo.tick(dt);
        if limit > 0 && demo.tick >= limit {
            info!(ticks = demo.tick, "Tick limit reached");
            break;
        }
    }
    demo.log_summaries();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Horde Swarm v{}", env!("CARGO_PKG_VERSION"));

    let config = SwarmConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: bound={}, colonies={}, agents={}, tick_rate={}",
        config.world_bound, config.colonies, config.agents_per_colony, config.tick_rate
    );

    let demo = Demo::new(config)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        _ = run(demo) => {}
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    info!("Swarm stopped");
    Ok(())
}
