#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

//! Battery test rig: INA219 charge accounting with an SSD1306 status page,
//! sampled every second and uploaded once a minute.

use embassy_executor::Spawner;
use embassy_time::Delay;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::rtc_cntl::Rtc;
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info};
use mote_core::network::{ConnectPolicy, Connector};
use mote_core::sampling::{LoopDevices, SamplingLoop};
use mote_core::shared_i2c::SharedI2c;
use mote_core::station::{BATTERY_FILE, BATTERY_SCHEDULE, BATTERY_SLEEP, BatteryStation};
use mote_core::upload::UploadTarget;
use mote_firmware::hardware::{
    EmbassyClock, EspPower, OledRenderer, share_sensor_bus, status_led, wake_reason,
};
use mote_firmware::http::TcpTransport;
use mote_firmware::secrets::CONFIG;
use mote_firmware::sensors::Ina219;
use mote_firmware::wifi::start_network;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
esp_bootloader_esp_idf::esp_app_desc!();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    let wake = wake_reason();

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    let led = Output::new(peripherals.GPIO2, Level::High, OutputConfig::default());

    let i2c0 = I2c::new(
        peripherals.I2C0,
        I2cConfig::default().with_frequency(Rate::from_khz(400)),
    )
    .expect("Failed to initialize I2C0")
    .with_sda(peripherals.GPIO8)
    .with_scl(peripherals.GPIO9)
    .into_async();
    let bus = share_sensor_bus(i2c0);

    // The OLED gets its own bus so a full-frame flush never holds up the monitor
    let i2c1 = I2c::new(
        peripherals.I2C1,
        I2cConfig::default().with_frequency(Rate::from_khz(400)),
    )
    .expect("Failed to initialize I2C1")
    .with_sda(peripherals.GPIO10)
    .with_scl(peripherals.GPIO11);
    let display = OledRenderer::new(i2c1).expect("Failed to initialize display");

    info!("Display initialized!");

    // Monitor and gauge are two handles on the same chip; the station brings
    // the monitor up before the first cycle
    let monitor = Ina219::new(SharedI2c::new(bus));
    let gauge = Ina219::attached(SharedI2c::new(bus));
    let station = BatteryStation::new(monitor, gauge, display);

    let link = start_network(&spawner, peripherals.WIFI).expect("Failed to initialize Wi-Fi");
    let transport = TcpTransport::new(link.stack());
    let connector = Connector::new(link, CONFIG.internet, ConnectPolicy::default());

    let devices = LoopDevices {
        transport,
        power: EspPower::new(Rtc::new(peripherals.LPWR)),
        status: status_led(led),
        clock: EmbassyClock,
        delay: Delay,
    };

    let mut sampler = SamplingLoop::new(
        station,
        connector,
        devices,
        UploadTarget::from_config(&CONFIG, BATTERY_FILE, true, true),
        BATTERY_SCHEDULE,
        BATTERY_SLEEP,
    );

    if let Err(e) = sampler.start(wake).await {
        error!("Station start failed: {}", e);
    }
    sampler.run().await
}
