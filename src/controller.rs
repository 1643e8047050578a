//! Background control of a PSU.
//!
//! A [Controller] owns a [KoradPsu] and hands it to a single worker thread. Callers queue
//! commands and poll for events and streamed samples, so nothing on the caller's side ever
//! waits on the serial line.
//!
//! # Example
//!
//! ```no_run
//! use korad_psu::{
//!     config::{ControllerConfig, SerialConfig},
//!     controller::Controller,
//!     command::Event,
//!     port::{KORAD_PID, KORAD_VID, scan_devices},
//! };
//!
//! let path = scan_devices(KORAD_VID, KORAD_PID).unwrap().remove(0);
//! let controller =
//!     Controller::open(&path, &SerialConfig::default(), ControllerConfig::default()).unwrap();
//! controller.start().unwrap();
//!
//! controller.set_voltage(5.0);
//! controller.set_current(0.1);
//! controller.write_setpoint();
//! controller.read_settings();
//!
//! loop {
//!     match controller.read_event() {
//!         Some(Event::ReadFinished) => break,
//!         Some(Event::Disconnected(err)) => panic!("{err}"),
//!         None => std::thread::sleep(std::time::Duration::from_millis(10)),
//!     }
//! }
//! println!("{:?}", controller.desired());
//! controller.close().unwrap();
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::{
    command::{Command, Desired, Event, Options, Sample, Transfer},
    config::{ControllerConfig, SerialConfig, to_std},
    error::{Error, Result},
    port::SerialPortIo,
    psu::{CHANNELS, KoradPsu, OutputPair},
    status::Status,
    transport::Transport,
};

/// State shared between the caller and the worker.
struct Shared {
    /// Set for the duration of every command the worker executes.
    pending: AtomicBool,
    streaming: AtomicBool,
    values: Mutex<Values>,
}

#[derive(Default)]
struct Values {
    desired: Desired,
    measured: OutputPair,
    status: Option<Status>,
}

enum Lifecycle<S, const L: usize>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write,
{
    Idle(Worker<S, L>),
    Running(JoinHandle<KoradPsu<S, L>>),
    Stopped,
}

/// Thread-safe, non-blocking handle on a PSU.
///
/// Setters such as [Controller::set_voltage] only change the locally held desired state. Use
/// one of the `write_*` methods to send it, and the `read_*` methods to request fresh values.
/// Completion of reads and link failures are reported through [Controller::read_event].
pub struct Controller<S, const L: usize = 64>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write + Send + 'static,
    S::Error: Send + 'static,
{
    shared: Arc<Shared>,
    commands: Sender<Command>,
    events: Receiver<Event<S::Error>>,
    samples: Receiver<Sample>,
    lifecycle: Mutex<Lifecycle<S, L>>,
}

impl Controller<SerialPortIo> {
    /// Open the serial port at `path` and wrap it in a controller. Call [Controller::start] to
    /// begin processing commands.
    pub fn open(
        path: &str,
        serial: &SerialConfig,
        config: ControllerConfig,
    ) -> core::result::Result<Self, serialport::Error> {
        let port = SerialPortIo::open(path, serial)?;
        let psu = KoradPsu::new(Transport::new(port, serial));
        Ok(Self::new(psu, config))
    }
}

impl<S, const L: usize> Controller<S, L>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write + Send + 'static,
    S::Error: Send + 'static,
{
    pub fn new(psu: KoradPsu<S, L>, config: ControllerConfig) -> Self {
        assert!(
            CHANNELS.contains(&config.channel),
            "channel {} out of range",
            config.channel
        );

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (sample_tx, sample_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            pending: AtomicBool::new(false),
            streaming: AtomicBool::new(false),
            values: Mutex::new(Values::default()),
        });

        let worker = Worker {
            psu,
            channel: config.channel,
            poll_interval: to_std(config.poll_interval),
            commands: command_rx,
            events: event_tx,
            samples: sample_tx,
            shared: Arc::clone(&shared),
        };

        Self {
            shared,
            commands: command_tx,
            events: event_rx,
            samples: sample_rx,
            lifecycle: Mutex::new(Lifecycle::Idle(worker)),
        }
    }

    /// Spawn the worker thread. Commands queued before this are executed once it runs.
    ///
    /// Does nothing if already started or closed.
    pub fn start(&self) -> std::io::Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match core::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle(worker) => {
                // If spawning fails the worker and its port are dropped and we stay stopped.
                let handle = thread::Builder::new()
                    .name("korad-psu".to_owned())
                    .spawn(move || worker.run())?;
                *lifecycle = Lifecycle::Running(handle);
                info!("Controller started");
            }
            other => *lifecycle = other,
        }
        Ok(())
    }

    /// Stop the worker and release the serial port.
    ///
    /// Commands already queued are executed first. Blocks until the worker has exited.
    /// Calling this again is a no-op.
    pub fn close(&self) -> Result<(), S::Error> {
        let lifecycle = core::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Stopped);
        let psu = match lifecycle {
            Lifecycle::Stopped => return Ok(()),
            Lifecycle::Idle(worker) => worker.psu,
            Lifecycle::Running(handle) => {
                self.enqueue(Command::Stop);
                match handle.join() {
                    Ok(psu) => psu,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
        };
        psu.close()?;
        info!("Controller closed");
        Ok(())
    }

    pub fn closed(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Stopped)
    }

    /// True while the worker is executing a command. Interactive edits should wait for this to
    /// clear.
    pub fn pending(&self) -> bool {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Continuously poll the output between commands, see [Controller::read_output_data].
    pub fn set_stream_output(&self, enabled: bool) {
        self.shared.streaming.store(enabled, Ordering::SeqCst);
    }

    pub fn stream_output(&self) -> bool {
        self.shared.streaming.load(Ordering::SeqCst)
    }

    pub fn read_output(&self) {
        self.enqueue(Command::Read(Transfer::OutputReading.into()));
    }

    pub fn read_settings(&self) {
        self.enqueue(Command::Read(Transfer::Setpoint | Transfer::Status));
    }

    pub fn write_setpoint(&self) {
        self.write_custom(Transfer::Setpoint.into());
    }

    /// Send the locally held lock state. The device can't report its lock state, so the local
    /// value is assumed to be correct.
    pub fn write_lock(&self) {
        self.write_custom(Transfer::Lock.into());
    }

    /// Send the parts of the desired state named by `options`, as they are right now.
    pub fn write_custom(&self, options: Options) {
        self.enqueue(Command::Write(options, self.desired()));
    }

    pub fn write_all(&self) {
        self.write_custom(Transfer::Setpoint | Transfer::Lock | Transfer::Status);
    }

    /// Take all samples streamed since the last call, oldest first.
    pub fn read_output_data(&self) -> Vec<Sample> {
        self.samples.try_iter().collect()
    }

    /// Take the oldest unread event, if any.
    pub fn read_event(&self) -> Option<Event<S::Error>> {
        self.events.try_recv().ok()
    }

    pub fn desired(&self) -> Desired {
        self.shared.values.lock().desired
    }

    pub fn set_desired(&self, desired: Desired) {
        self.shared.values.lock().desired = desired;
    }

    pub fn set_voltage(&self, volts: f32) {
        self.shared.values.lock().desired.setpoint.voltage = volts;
    }

    pub fn set_current(&self, amps: f32) {
        self.shared.values.lock().desired.setpoint.current = amps;
    }

    pub fn set_lock(&self, locked: bool) {
        self.shared.values.lock().desired.lock = locked;
    }

    pub fn set_beep(&self, enabled: bool) {
        self.shared.values.lock().desired.beep = enabled;
    }

    pub fn set_ocp(&self, enabled: bool) {
        self.shared.values.lock().desired.ocp = enabled;
    }

    pub fn set_ovp(&self, enabled: bool) {
        self.shared.values.lock().desired.ovp = enabled;
    }

    pub fn set_output(&self, enabled: bool) {
        self.shared.values.lock().desired.output = enabled;
    }

    /// Output voltage & current from the latest output reading.
    pub fn measured(&self) -> OutputPair {
        self.shared.values.lock().measured
    }

    /// Status from the latest settings read.
    pub fn status(&self) -> Option<Status> {
        self.shared.values.lock().status
    }

    fn enqueue(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Dropping {:?}, controller is closed", command);
        }
    }
}

impl<S, const L: usize> Drop for Controller<S, L>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write + Send + 'static,
    S::Error: Send + 'static,
{
    fn drop(&mut self) {
        if thread::panicking() {
            return;
        }
        if let Err(e) = self.close() {
            warn!("Failed to close PSU: {}", e);
        }
    }
}

/// The only code which touches the PSU once the controller is started.
struct Worker<S, const L: usize>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write,
{
    psu: KoradPsu<S, L>,
    channel: u8,
    poll_interval: Duration,
    commands: Receiver<Command>,
    events: Sender<Event<S::Error>>,
    samples: Sender<Sample>,
    shared: Arc<Shared>,
}

impl<S, const L: usize> Worker<S, L>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write,
{
    fn run(mut self) -> KoradPsu<S, L> {
        loop {
            if self.shared.streaming.load(Ordering::SeqCst) {
                self.stream_sample();
            }

            let command = match self.commands.recv_timeout(self.poll_interval) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            debug!("{:?}", command);

            match command {
                Command::Stop => break,
                Command::Read(options) => {
                    self.execute(|worker| worker.read(options));
                    self.publish(Event::ReadFinished);
                }
                Command::Write(options, desired) => {
                    self.execute(|worker| worker.write(options, &desired));
                }
            }
        }
        self.psu
    }

    /// Run one command with `pending` raised. Failures become a disconnect event.
    fn execute(&mut self, command: impl FnOnce(&mut Self) -> Result<(), S::Error>) {
        self.shared.pending.store(true, Ordering::SeqCst);
        if let Err(e) = command(self) {
            self.disconnected(e);
        }
        self.shared.pending.store(false, Ordering::SeqCst);
    }

    fn read(&mut self, options: Options) -> Result<(), S::Error> {
        for transfer in options.iter() {
            match transfer {
                Transfer::Setpoint => {
                    let mut channel = self.psu.channel_unchecked(self.channel);
                    let voltage = channel.get_voltage()?;
                    let current = channel.get_current()?;
                    let mut values = self.shared.values.lock();
                    if let Some(voltage) = voltage {
                        values.desired.setpoint.voltage = voltage;
                    }
                    if let Some(current) = current {
                        values.desired.setpoint.current = current;
                    }
                }
                Transfer::OutputReading => {
                    let pair = self.psu.channel_unchecked(self.channel).read_output_pair()?;
                    self.shared.values.lock().measured = pair;
                }
                // There is no query for the lock state.
                Transfer::Lock => {}
                Transfer::Status => {
                    let status = self.psu.status()?;
                    let mut values = self.shared.values.lock();
                    values.status = Some(status);
                    values.desired.beep = status.beep;
                    values.desired.ocp = status.ocp;
                    values.desired.ovp = status.ovp;
                    values.desired.output = status.output;
                }
            }
        }
        Ok(())
    }

    fn write(&mut self, options: Options, desired: &Desired) -> Result<(), S::Error> {
        for transfer in options.iter() {
            match transfer {
                Transfer::Setpoint => {
                    let mut channel = self.psu.channel_unchecked(self.channel);
                    channel.set_voltage(desired.setpoint.voltage)?;
                    channel.set_current(desired.setpoint.current)?;
                }
                // Measurements are never written back.
                Transfer::OutputReading => {}
                Transfer::Lock => self.psu.lock().set(desired.lock)?,
                Transfer::Status => {
                    self.psu.ocp().set(desired.ocp)?;
                    self.psu.ovp().set(desired.ovp)?;
                    self.psu.output().set(desired.output)?;
                }
            }
        }
        Ok(())
    }

    /// Pushes one sample per poll. A failed read repeats the last measured pair.
    fn stream_sample(&mut self) {
        let pair = match self.psu.channel_unchecked(self.channel).read_output_pair() {
            Ok(pair) => {
                self.shared.values.lock().measured = pair;
                pair
            }
            Err(e) => {
                self.disconnected(e);
                self.shared.values.lock().measured
            }
        };
        let (voltage, current) = pair;
        // The controller may already be gone, in which case nobody wants the sample.
        let _ = self.samples.send(Sample {
            voltage,
            current,
            at: Instant::now(),
        });
    }

    fn disconnected(&self, error: Error<S::Error>) {
        warn!("PSU link failure: {}", error);
        self.publish(Event::Disconnected(error));
    }

    fn publish(&self, event: Event<S::Error>) {
        let _ = self.events.send(event);
    }
}
