//! # kernel_app — headless turn loop
//!
//! Loads component schemas from a JSON content file, populates a small
//! skirmish (or resumes a saved one) and plays it out.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kernel_app::{Skirmish, TurnConfig, TurnLoop, load_registry};
use kernel_component::{Entity, World};
use kernel_effects::{Duration, Expiration};
use kernel_time::Ticks;

#[derive(Parser)]
#[command(name = "kernel_app", about = "Headless turn loop for the simulation kernel")]
struct Args {
    /// JSON file with the component schemas to declare
    #[arg(short, long, default_value = "crates/kernel_app/content/components.json")]
    content: PathBuf,

    /// Number of turns to play (0 = until nobody is left)
    #[arg(short, long, default_value_t = 50)]
    turns: u64,

    /// Number of actors in a new game
    #[arg(short, long, default_value_t = 3)]
    actors: usize,

    /// Ticks a normal action takes
    #[arg(short, long, default_value_t = 100)]
    duration: Ticks,

    /// Resume from this save instead of starting a new game
    #[arg(long)]
    load: Option<PathBuf>,

    /// Write a save here when the run ends
    #[arg(long)]
    save: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("kernel_app=info".parse()?))
        .init();

    let args = Args::parse();
    let registry = load_registry(&args.content)?;
    let config = TurnConfig::default()
        .with_max_turns(args.turns)
        .with_default_duration(args.duration);

    let mut turn_loop = match &args.load {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read save {}", path.display()))?;
            TurnLoop::load(registry, config, &bytes)?
        }
        None => new_game(World::new(registry), config, args.actors)?,
    };

    let mut policy = Skirmish::new(turn_loop.config().default_duration);
    let summary = turn_loop.run(&mut policy)?;
    info!(
        turns = summary.turns,
        time = summary.time,
        expired = summary.expired,
        deaths = summary.deaths,
        survivors = turn_loop.world().query(&["health"]).len(),
        "run finished"
    );

    if let Some(path) = &args.save {
        let bytes = turn_loop.save()?;
        std::fs::write(path, bytes)
            .with_context(|| format!("failed to write save {}", path.display()))?;
        info!(path = %path.display(), "save written");
    }
    Ok(())
}

/// Spawn `actors` combatants, each with a time-limited condition.
fn new_game(world: World, config: TurnConfig, actors: usize) -> Result<TurnLoop> {
    let mut turn_loop = TurnLoop::new(world, config);
    for index in 0..actors {
        let actor = turn_loop.spawn_actor();
        let world = turn_loop.world_mut();

        let mut name = world.create("name")?;
        name.set("value", json!(format!("combatant-{index}")))?;
        world.attach(actor, name)?;
        let health = world.create("health")?;
        world.attach(actor, health)?;

        match index % 3 {
            0 => {
                let poison = world.create("poisoned")?;
                let wrapper = Duration::wrap(world.registry(), poison, 6, None)?;
                world.attach(actor, wrapper)?;
            }
            1 => {
                let haste = world.create("hasted")?;
                let haste = world.attach(actor, haste)?;
                Expiration::add_effect(world, actor, haste, 8, Some("Your movements slow.".into()))?;
            }
            _ => {
                let regen = world.create("regenerating")?;
                let wrapper = Duration::wrap(world.registry(), regen, 10, None)?;
                world.attach(actor, wrapper)?;
            }
        }
        info!(%actor, index, "combatant ready");
    }
    target_neighbours(&mut turn_loop)?;
    Ok(turn_loop)
}

/// Point each combatant at the next one, so saves carry entity references.
fn target_neighbours(turn_loop: &mut TurnLoop) -> Result<()> {
    let world = turn_loop.world_mut();
    let combatants: Vec<Entity> = world.query(&["health"]);
    for (index, &actor) in combatants.iter().enumerate() {
        let Some(&other) = combatants.get((index + 1) % combatants.len()) else {
            continue;
        };
        if other == actor {
            continue;
        }
        let mut target = world.create("target")?;
        target.set("who", json!(other.id()))?;
        world.attach(actor, target)?;
    }
    Ok(())
}
