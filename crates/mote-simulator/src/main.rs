//! Desktop simulator for the mote sensor telemetry node.
//!
//! Runs one station's sampling loop on the host against synthetic sensors.
//! Uploads are printed instead of sent. The battery rig renders its OLED page
//! in an SDL2 window via `embedded-graphics-simulator`; the other stations
//! run headless and log their records.
//!
//! ```text
//! mote-simulator [battery|environment|pulse]
//! ```
//!
//! # Key bindings (battery rig)
//!
//! | Key | Supply                 |
//! |-----|------------------------|
//! | D   | Discharging            |
//! | C   | Charging               |
//! | R   | Resting (no current)   |
//! | U   | Battery unplugged      |
//! | Q   | Quit                   |

mod devices;

use std::cell::Cell;
use std::rc::Rc;

use embassy_futures::block_on;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics_simulator::{
    BinaryColorTheme, OutputSettingsBuilder, SimulatorDisplay, SimulatorEvent, Window,
    sdl2::Keycode,
};
use log::{debug, error, info};

use mote_core::battery::ClampPolicy;
use mote_core::config::Config;
use mote_core::display::{BatteryDisplay, DISPLAY_HEIGHT_PX, DISPLAY_WIDTH_PX};
use mote_core::network::{ConnectPolicy, Connector};
use mote_core::sampling::{LoopDevices, SamplingLoop, Station};
use mote_core::sensors::{GasReadPolicy, WakeReason};
use mote_core::station::{
    BATTERY_FILE, BATTERY_SCHEDULE, BATTERY_SLEEP, BatteryStation, ENVIRONMENT_FILE,
    ENVIRONMENT_SCHEDULE, ENVIRONMENT_SLEEP, EnvironmentStation, PULSE_FILE, PULSE_SCHEDULE,
    PULSE_SLEEP, PulseStation,
};
use mote_core::upload::UploadTarget;

use devices::{
    CompressedSleep, DryRunTransport, HostLink, LogStatus, SimBattery, SimClimate, SimGas,
    SimGauge, SimLight, SimPulse, StdClock, StdDelay, Supply,
};

/// Pixel scale factor for the simulator window.
const WINDOW_SCALE: u32 = 4;

/// Deep sleeps are this many times shorter than on the board.
const SLEEP_TIME_SCALE: u64 = 100;

const SIM_BPM: u32 = 72;

/// The synthetic gas sensor is ready after a handful of polls; anything
/// longer means the warm-up model is broken, so give up instead of hanging.
const SIM_GAS_MAX_POLLS: u32 = 20;

type SimLoop<'a, St> =
    SamplingLoop<'a, St, HostLink, DryRunTransport, CompressedSleep, LogStatus, StdClock, StdDelay>;

fn devices() -> LoopDevices<DryRunTransport, CompressedSleep, LogStatus, StdClock, StdDelay> {
    LoopDevices {
        transport: DryRunTransport::default(),
        power: CompressedSleep {
            time_scale: SLEEP_TIME_SCALE,
        },
        status: LogStatus,
        clock: StdClock::new(),
        delay: StdDelay,
    }
}

fn start<St: Station>(sampler: &mut SimLoop<'_, St>) {
    if let Err(e) = block_on(sampler.start(WakeReason::ColdBoot)) {
        error!("Station start failed: {}", e);
    }
}

/// Map an SDL keycode to a supply mode.
fn keycode_to_supply(keycode: Keycode) -> Option<Supply> {
    match keycode {
        Keycode::D => Some(Supply::Discharging),
        Keycode::C => Some(Supply::Charging),
        Keycode::R => Some(Supply::Resting),
        Keycode::U => Some(Supply::Unplugged),
        _ => None,
    }
}

fn run_battery(config: &Config<'_>) {
    let supply = Rc::new(Cell::new(Supply::Discharging));

    let output_settings = OutputSettingsBuilder::new()
        .theme(BinaryColorTheme::OledBlue)
        .scale(WINDOW_SCALE)
        .build();
    let mut window = Window::new("Mote battery rig", &output_settings);

    // A charging cell reads above 4.2 V; keep the label at 100 %
    let mut page = BatteryDisplay::new(SimulatorDisplay::<BinaryColor>::new(Size::new(
        DISPLAY_WIDTH_PX,
        DISPLAY_HEIGHT_PX,
    )))
    .with_clamp(ClampPolicy::Bounded);
    let _ = page.draw_splash();
    // The SDL window is lazily initialized on the first `update()` call.
    window.update(page.target());

    let station = BatteryStation::new(SimBattery::new(supply.clone()), SimGauge::default(), page);
    let mut sampler = SamplingLoop::new(
        station,
        Connector::new(HostLink, config.internet, ConnectPolicy::default()),
        devices(),
        UploadTarget::from_config(config, BATTERY_FILE, true, true),
        BATTERY_SCHEDULE,
        BATTERY_SLEEP,
    );
    start(&mut sampler);

    info!("Keys: D=Discharge  C=Charge  R=Rest  U=Unplug  Q=Quit");

    'running: loop {
        for event in window.events() {
            match event {
                SimulatorEvent::Quit => break 'running,
                SimulatorEvent::KeyDown { keycode, .. } => {
                    if keycode == Keycode::Q || keycode == Keycode::Escape {
                        break 'running;
                    }
                    if let Some(next) = keycode_to_supply(keycode) {
                        info!("Supply → {:?}", next);
                        supply.set(next);
                    }
                }
                _ => {}
            }
        }

        // includes the rest of the one second frame
        let outcome = block_on(sampler.run_cycle());
        debug!("Cycle {}: {:?}", sampler.cycles(), outcome);

        window.update(sampler.station().display().target());
    }

    info!(
        "Simulator exiting after {} cycles, {} uploads",
        sampler.cycles(),
        sampler.devices().transport.posts
    );
}

fn run_environment(config: &Config<'_>) -> ! {
    let station =
        EnvironmentStation::new(SimClimate::new(), SimGas::new(), SimLight::new(), SimLight::new())
            .with_gas_policy(GasReadPolicy {
                max_polls: Some(SIM_GAS_MAX_POLLS),
                ..GasReadPolicy::default()
            });
    let mut sampler = SamplingLoop::new(
        station,
        Connector::new(HostLink, config.internet, ConnectPolicy::default()),
        devices(),
        UploadTarget::from_config(config, ENVIRONMENT_FILE, true, true),
        ENVIRONMENT_SCHEDULE,
        ENVIRONMENT_SLEEP,
    );
    start(&mut sampler);
    block_on(sampler.run())
}

fn run_pulse(config: &Config<'_>) -> ! {
    let mut sampler = SamplingLoop::new(
        PulseStation::new(SimPulse::new(SIM_BPM)),
        Connector::new(HostLink, config.internet, ConnectPolicy::default()),
        devices(),
        UploadTarget::from_config(config, PULSE_FILE, true, true),
        PULSE_SCHEDULE,
        PULSE_SLEEP,
    );
    start(&mut sampler);
    block_on(sampler.run())
}

fn main() {
    env_logger::init();

    let hostname = std::env::var("MOTE_HOSTNAME").unwrap_or_else(|_| "mote-sim".into());
    let collector = std::env::var("MOTE_COLLECTOR").unwrap_or_else(|_| "localhost:8080".into());
    let config = Config::new("", "", &hostname, &collector);

    let station = std::env::args().nth(1).unwrap_or_else(|| "battery".into());
    info!("Starting mote simulator: {} station as {}", station, hostname);

    match station.as_str() {
        "battery" => run_battery(&config),
        "environment" => run_environment(&config),
        "pulse" => run_pulse(&config),
        other => {
            error!("Unknown station \"{}\" (battery, environment or pulse)", other);
            std::process::exit(2);
        }
    }
}
