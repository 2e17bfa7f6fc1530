use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use wavetrace::engine::{SimulationEvent, SimulationHandler, SimulationRun};
use wavetrace::optimizer::{CoverageOptimizer, EmitterTemplate};
use wavetrace::scene::{self, Scene};
use wavetrace::scenefile;
use wavetrace::settings::{self, CliArgs};

fn main() -> Result<()> {
    env_logger::init();

    let args = CliArgs::parse();

    let mut config = settings::load_config(Some(Path::new("config")))?;
    settings::apply_cli_overrides(&mut config, &args);
    config.validate()?;

    let document = scenefile::load(&args.scene)
        .with_context(|| format!("failed to load scene {:?}", args.scene))?;
    let scene = document.to_scene();
    info!(
        "loaded scene: {} buildings, {} emitters, {} receivers",
        scene.buildings.len(),
        scene.emitters.len(),
        scene.receivers.len()
    );

    if args.optimize {
        optimize(config, scene, &args)
    } else {
        simulate(config, scene, &args)
    }
}

fn simulate(config: settings::Settings, scene: Scene, args: &CliArgs) -> Result<()> {
    let handler = SimulationHandler::new(config.clone());
    let events = handler.events();

    let area = scene.bounding_area();
    handler.start_simulation(SimulationRun {
        buildings: scene.buildings.clone(),
        emitters: scene.emitters.clone(),
        receivers: scene.receivers.clone(),
        area,
        reset: true,
    })?;

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {percent:>3}% {msg}",
        )?
        .progress_chars("█▇▆▅▄▃▂▁"),
    );
    bar.set_message("receivers");

    loop {
        match events.recv()? {
            SimulationEvent::Started => {}
            SimulationEvent::Progress(fraction) => bar.set_position((fraction * 100.0) as u64),
            SimulationEvent::Finished => {
                bar.finish_with_message("done");
                break;
            }
            SimulationEvent::Cancelled => {
                bar.abandon_with_message("cancelled");
                return Ok(());
            }
        }
    }

    println!("{config}");
    println!(
        "{:>10} {:>10} {:>12} {:>10} {:>12} {:>12} {:>8}",
        "x [m]", "y [m]", "power [dBm]", "SNR [dB]", "spread [ns]", "rice [dB]", "covered"
    );
    for receiver in &scene.receivers {
        let power = scene::power_to_dbm(receiver.received_power());
        let snr = receiver.user_end_snr(&config);
        let spread = receiver
            .delay_spread()
            .map(|s| format!("{:.3}", s * 1e9))
            .unwrap_or_else(|| "-".into());
        let rice = receiver
            .rice_factor()
            .filter(|k| k.is_finite())
            .map(|k| format!("{k:.2}"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:>10.2} {:>10.2} {:>12.2} {:>10.2} {:>12} {:>12} {:>8}",
            receiver.position.x,
            receiver.position.y,
            power,
            snr,
            spread,
            rice,
            receiver.is_covered(args.fade_margin, &config),
        );
    }

    Ok(())
}

fn optimize(config: settings::Settings, scene: Scene, args: &CliArgs) -> Result<()> {
    let template = match scene.emitters.first() {
        Some(e) => EmitterTemplate {
            frequency: e.frequency,
            eirp: e.eirp,
            efficiency: e.antenna.efficiency,
            antenna: e.antenna.kind,
        },
        None => anyhow::bail!("the scene needs one emitter to use as the placement template"),
    };

    let area = scene
        .bounding_area()
        .context("an empty scene has no area to optimize over")?;

    let mut optimizer = CoverageOptimizer::new(
        config,
        scene.buildings.clone(),
        area,
        scene.receivers.clone(),
        template,
        args.coverage_target,
        args.fade_margin,
    );

    let outcome = optimizer.optimize()?;

    println!(
        "optimizer: {} transmitters placed over {} iterations, coverage {:.1}%{}",
        outcome.placed.len(),
        outcome.iterations,
        outcome.coverage * 100.0,
        if outcome.feasible { "" } else { " (target unreachable)" },
    );
    for emitter in &outcome.placed {
        println!(
            "  transmitter at ({:.2}, {:.2}) m, {:.2} GHz, EIRP {:.2} W",
            emitter.position.x,
            emitter.position.y,
            emitter.frequency * 1e-9,
            emitter.eirp,
        );
    }

    Ok(())
}
