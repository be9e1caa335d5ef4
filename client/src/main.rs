//! Drops a stack of crates onto a plane and prints where they come to rest.

use client::PhysicsClient;
use serde_json::json;
use shared::constants::DEFAULT_STEP_SIZE;
use shared::{BodyProps, InitProps, StepProps, instance_ids};
use std::cell::Cell;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;
use worker::WorkerSettings;

struct Options {
    crates: usize,
    steps: usize,
}

/// Reads `--crates <n>` and `--steps <n>` (or `--crates=<n>`), falling back to the
/// `DROP_TEST_CRATES` / `DROP_TEST_STEPS` environment variables.
fn read_options() -> Options {
    let mut options = Options {
        crates: env_or("DROP_TEST_CRATES", 5),
        steps: env_or("DROP_TEST_STEPS", 240),
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let (key, value) = match arg.split_once('=') {
            Some((key, value)) => (key.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let Some(value) = value.or_else(|| args.next()) else {
            break;
        };
        match key.as_str() {
            "--crates" | "-c" => options.crates = value.parse().unwrap_or(options.crates),
            "--steps" | "-s" => options.steps = value.parse().unwrap_or(options.steps),
            other => tracing::warn!("ignoring unknown argument `{other}`"),
        }
    }
    options
}

fn env_or(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let options = read_options();

    let mut client = PhysicsClient::spawn(WorkerSettings::default())?;
    client.init(InitProps {
        allow_sleep: Some(true),
        size: Some(options.crates + 1),
        ..InitProps::default()
    })?;
    client.add_bodies("Plane", vec!["ground".into()], vec![BodyProps::default()])?;

    let impacts = Rc::new(Cell::new(0usize));
    let counter = impacts.clone();
    client.handlers.on_collide("crates", move |event| {
        counter.set(counter.get() + 1);
        if let Some(contact) = &event.contact {
            tracing::debug!(
                target_id = %event.target,
                other = %event.body,
                speed = contact.impact_velocity,
                "impact"
            );
        }
    });

    let ids = instance_ids("crates", options.crates);
    let props = (0..options.crates)
        .map(|i| BodyProps {
            mass: Some(1.0),
            position: Some([0.1 * i as f32, 1.0 + 1.1 * i as f32, 0.0]),
            args: json!([1.0, 1.0, 1.0]),
            ..BodyProps::default()
        })
        .collect();
    client.add_bodies("Box", ids.clone(), props)?;

    for _ in 0..options.steps {
        client.step(StepProps {
            step_size: DEFAULT_STEP_SIZE,
            time_since_last_called: None,
            max_sub_steps: None,
        })?;
        client.wait_frame()?;
    }

    tracing::info!(impacts = impacts.get(), "simulated {} steps", options.steps);
    for id in &ids {
        if let Some([x, y, z]) = client.position(id) {
            println!("{id}: ({x:.3}, {y:.3}, {z:.3})");
        }
    }
    for report in client.take_errors() {
        tracing::error!(op = %report.op, "{}", report.message);
    }
    Ok(())
}
