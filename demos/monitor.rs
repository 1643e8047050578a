use std::{
    env,
    time::{Duration, Instant},
};

use inquire::Select;
use korad_psu::{
    command::Event,
    config::{ControllerConfig, SerialConfig},
    controller::Controller,
    port::{KORAD_PID, KORAD_VID, SerialPortIo, scan_devices},
    psu::KoradPsu,
    transport::Transport,
};

// How long to stream output readings for.
const MONITOR_DURATION: Duration = Duration::from_secs(10);
const DISPLAY_INTERVAL: Duration = Duration::from_millis(500);

fn main() {
    env_logger::init();

    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        let candidates =
            scan_devices(KORAD_VID, KORAD_PID).expect("Failed to enumerate serial ports");

        match candidates.len() {
            0 => {
                eprintln!("No supported devices found!");
                std::process::exit(1);
            }
            1 => candidates[0].clone(),
            _ => Select::new("Select a power supply:", candidates)
                .prompt()
                .expect("Failed to select port"),
        }
    });

    println!("Using port: {}", port_name);

    let serial = SerialConfig::default();
    let port = SerialPortIo::open(&port_name, &serial).expect("Failed to open serial port");
    let mut psu: KoradPsu<SerialPortIo> = KoradPsu::new(Transport::new(port, &serial));

    println!("Model: {}", psu.model().unwrap());
    println!("Status: {}", psu.status().unwrap());

    // Hand the PSU over to a controller and stream from the background.
    let controller = Controller::new(psu, ControllerConfig::default());
    controller.read_settings();
    controller.set_stream_output(true);
    controller.start().expect("Failed to start controller");

    let started = Instant::now();
    while started.elapsed() < MONITOR_DURATION {
        std::thread::sleep(DISPLAY_INTERVAL);

        while let Some(event) = controller.read_event() {
            match event {
                Event::ReadFinished => {
                    let desired = controller.desired();
                    println!(
                        "Setpoint: {:.2}V {:.3}A, output {}",
                        desired.setpoint.voltage,
                        desired.setpoint.current,
                        if desired.output { "on" } else { "off" }
                    );
                }
                Event::Disconnected(err) => {
                    eprintln!("Lost connection: {}", err);
                    controller.close().ok();
                    std::process::exit(1);
                }
            }
        }

        let samples = controller.read_output_data();
        if let Some(last) = samples.last() {
            println!(
                "{} samples, latest {:?}V {:?}A",
                samples.len(),
                last.voltage,
                last.current
            );
        }
    }

    controller.set_stream_output(false);
    controller.close().expect("Failed to close serial port");
}
