//! The core application state and logic.
//!
//! [`LoggerApp`] is the one explicit context object of the pipeline: it owns
//! the session state machine (Idle / Running), the channel endpoints to the
//! reader thread, the rolling series store, the persistence batcher and its
//! daily log writer, the per-channel unit table, and the latest-value cache.
//! A rendering layer consumes it exclusively through the snapshot/command
//! methods; everything here runs on the single foreground consumer, so none
//! of this state needs locking.

use crate::{
    config::Settings,
    convert,
    core::{
        Channel, ConvertedSample, LatestValues, Measurement, OutboundCommand, Quantity, RawFrame,
        ReaderEvent, Unit, CHANNEL_COUNT, TIMESTAMP_FORMAT,
    },
    data::{batcher::PersistenceBatcher, series::SeriesStore, storage::DailyLogWriter},
    error::{AppResult, DaqError},
    instrument::{self, fluke1529::FrameReader, LinePort},
};
use chrono::NaiveDateTime;
use log::{error, info, warn};
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::{mpsc, watch};

/// Channel endpoints and thread handle of a live session.
struct ActiveSession {
    event_rx: mpsc::Receiver<ReaderEvent>,
    command_tx: mpsc::UnboundedSender<OutboundCommand>,
    cancel_tx: watch::Sender<bool>,
    reader: JoinHandle<()>,
}

enum SessionState {
    Idle,
    Running(ActiveSession),
}

/// Orchestrates one acquisition session end to end.
pub struct LoggerApp {
    settings: Settings,
    state: SessionState,
    series: SeriesStore,
    batcher: PersistenceBatcher,
    writer: DailyLogWriter,
    latest: [LatestValues; CHANNEL_COUNT],
    status: String,
}

impl LoggerApp {
    /// Builds an idle application from validated settings.
    ///
    /// # Errors
    ///
    /// [`DaqError::InvalidParameter`] when the settings fail validation.
    pub fn new(settings: Settings) -> AppResult<Self> {
        settings.validate()?;
        let series = SeriesStore::new(settings.acquisition.series_capacity);
        let batcher = PersistenceBatcher::new(
            settings.storage.flush_records,
            settings.storage.flush_interval,
            Instant::now(),
        );
        let writer = DailyLogWriter::new(
            settings.storage.save_dir.clone(),
            settings.storage.file_prefix.clone(),
        );
        Ok(Self {
            settings,
            state: SessionState::Idle,
            series,
            batcher,
            writer,
            latest: std::array::from_fn(|_| LatestValues::default()),
            status: "Ready".to_string(),
        })
    }

    /// True while a session is running.
    pub fn is_running(&self) -> bool {
        matches!(self.state, SessionState::Running(_))
    }

    /// The current human-readable status line.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// The settings the application was built with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Opens the configured serial port and starts a session on it.
    ///
    /// # Errors
    ///
    /// [`DaqError::AlreadyRunning`] while a session is active;
    /// [`DaqError::InvalidParameter`] for an unusable port configuration;
    /// [`DaqError::Connection`] when the port cannot be opened. A failed
    /// start leaves the application Idle.
    pub fn start(&mut self) -> AppResult<()> {
        if self.is_running() {
            return Err(DaqError::AlreadyRunning);
        }
        if self.settings.serial.port.trim().is_empty() {
            return Err(DaqError::InvalidParameter(
                "serial.port must be set".to_string(),
            ));
        }
        if self.settings.serial.baud_rate == 0 {
            return Err(DaqError::InvalidParameter(
                "serial.baud_rate must be positive".to_string(),
            ));
        }
        let port = instrument::open_serial(
            &self.settings.serial.port,
            self.settings.serial.baud_rate,
            self.settings.serial.read_timeout,
        )?;
        self.start_with_port(port)
    }

    /// Starts a session on an already-open transport.
    ///
    /// This is the seam used by `--mock` runs and by tests; [`start`] feeds
    /// it the real serial port.
    ///
    /// [`start`]: LoggerApp::start
    ///
    /// # Errors
    ///
    /// [`DaqError::AlreadyRunning`] while a session is active, or settings
    /// validation failures.
    pub fn start_with_port(&mut self, port: Box<dyn LinePort>) -> AppResult<()> {
        if self.is_running() {
            return Err(DaqError::AlreadyRunning);
        }
        self.settings.validate()?;

        let acquisition = &self.settings.acquisition;
        let (event_tx, event_rx) = mpsc::channel(acquisition.queue_capacity);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        // Queued before the reader starts, so it is written ahead of the
        // first read and the instrument streams at the configured cadence.
        command_tx
            .send(OutboundCommand::MeasurePeriod(acquisition.measure_period))
            .map_err(|_| DaqError::Connection("reader command queue closed".to_string()))?;

        let reader = FrameReader::new(
            port,
            acquisition.channel_units,
            event_tx,
            command_rx,
            cancel_rx,
            self.settings.serial.command_gap,
            self.settings.serial.retry_backoff,
        );
        let handle = reader.spawn()?;

        // Fresh session: clear the windows and the readout, drop any stale
        // unflushed rows, restart the flush clock.
        self.series.reset(acquisition.series_capacity);
        self.batcher.reset(Instant::now());
        self.latest = std::array::from_fn(|_| LatestValues::default());

        self.state = SessionState::Running(ActiveSession {
            event_rx,
            command_tx,
            cancel_tx,
            reader: handle,
        });
        self.status = "Logging started".to_string();
        info!("Logging session started.");
        Ok(())
    }

    /// One foreground consumer step: drains pending reader status events plus
    /// at most one frame, converts it, updates the series store, the readout
    /// cache and the persistence buffer, then flushes if a threshold fired.
    ///
    /// Per-sample conversion failures and flush failures are logged and
    /// reflected in [`status`](LoggerApp::status); neither ends the session.
    pub fn tick(&mut self, now: Instant) {
        let session = match &mut self.state {
            SessionState::Running(session) => session,
            SessionState::Idle => return,
        };

        let mut frame = None;
        while frame.is_none() {
            match session.event_rx.try_recv() {
                Ok(ReaderEvent::Frame(f)) => frame = Some(f),
                Ok(ReaderEvent::Degraded(detail)) => {
                    warn!("Serial link degraded: {}", detail);
                    self.status = "Serial error, retrying".to_string();
                }
                Err(_) => break,
            }
        }

        if let Some(frame) = frame {
            match convert_frame(&frame) {
                Ok(sample) => {
                    self.series.append(&sample);
                    self.latest[sample.channel.index()] = LatestValues::from_sample(&sample);
                    self.status = format!("Received channel {}", sample.channel);
                    self.batcher.record(sample);
                }
                Err(e) => {
                    warn!("Dropping frame from channel {}: {}", frame.channel, e);
                }
            }
        }

        match self.batcher.maybe_flush(&self.writer, now) {
            Ok(Some(outcome)) => {
                info!(
                    "Saved {} records to '{}'.",
                    outcome.records,
                    outcome.path.display()
                );
                self.status = format!(
                    "Saved {} records to {}",
                    outcome.records,
                    outcome.path.display()
                );
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    "Save failed; retaining {} buffered records: {}",
                    self.batcher.len(),
                    e
                );
                self.status = format!("Save failed: {}", e);
            }
        }
    }

    /// Stops the running session: signals cancellation, joins the reader
    /// (which releases the port), and force-flushes whatever is buffered.
    /// A no-op when Idle.
    ///
    /// # Errors
    ///
    /// The final flush's failure. The session is Idle on return either way;
    /// the error reports records that could not be persisted.
    pub fn stop(&mut self) -> AppResult<()> {
        let session = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Running(session) => session,
            SessionState::Idle => return Ok(()),
        };
        info!("Stopping logging session.");
        let _ = session.cancel_tx.send(true);
        // Dropping the inbox unblocks a reader stuck on a full queue; frames
        // still in flight are discarded, like the cleared queue on stop.
        drop(session.event_rx);
        drop(session.command_tx);
        if session.reader.join().is_err() {
            error!("Reader thread panicked during shutdown.");
        }

        match self.batcher.flush(&self.writer, Instant::now()) {
            Ok(outcome) => {
                if let Some(outcome) = outcome {
                    info!(
                        "Saved {} records to '{}'.",
                        outcome.records,
                        outcome.path.display()
                    );
                }
                self.status = "Logging stopped".to_string();
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Final save failed; {} records were not persisted: {}",
                    self.batcher.len(),
                    e
                );
                self.status = format!("Save failed: {}", e);
                Err(e)
            }
        }
    }

    /// Preformatted readout strings for a channel's most recent sample.
    pub fn latest_values(&self, channel: Channel) -> &LatestValues {
        &self.latest[channel.index()]
    }

    /// Ordered (timestamp, value) pairs for one channel and quantity,
    /// most-recent-last.
    pub fn series_snapshot(
        &self,
        channel: Channel,
        quantity: Quantity,
    ) -> Vec<(NaiveDateTime, f64)> {
        self.series.snapshot(channel, quantity)
    }

    /// Queues a raw command line for the instrument.
    ///
    /// # Errors
    ///
    /// [`DaqError::NotConnected`] when no session is running.
    pub fn send_command(&mut self, text: &str) -> AppResult<()> {
        self.enqueue(OutboundCommand::Raw(text.trim().to_string()))
    }

    /// Reconfigures a channel's input kind. While running, the matching
    /// `UNIT:CHAN` command is queued and the reader retags frames once it has
    /// gone out; when idle, the new kind takes effect on the next start.
    pub fn set_channel_unit(&mut self, channel: Channel, unit: Unit) -> AppResult<()> {
        self.settings.acquisition.channel_units[channel.index()] = unit;
        if self.is_running() {
            self.enqueue(OutboundCommand::SetUnit { channel, unit })?;
            info!("Channel {} switched to {:?}.", channel, unit);
        }
        Ok(())
    }

    /// Pushes the instrument's date and time to the supplied wall-clock
    /// value.
    ///
    /// # Errors
    ///
    /// [`DaqError::NotConnected`] when no session is running.
    pub fn calibrate_clock(&mut self, now: NaiveDateTime) -> AppResult<()> {
        self.enqueue(OutboundCommand::SetDate(now.date()))?;
        self.enqueue(OutboundCommand::SetTime(now.time()))?;
        info!("Instrument clock calibration queued for {}.", now);
        Ok(())
    }

    fn enqueue(&mut self, command: OutboundCommand) -> AppResult<()> {
        match &self.state {
            SessionState::Running(session) => session
                .command_tx
                .send(command)
                .map_err(|_| DaqError::NotConnected),
            SessionState::Idle => Err(DaqError::NotConnected),
        }
    }
}

/// Converts a raw frame into a fully populated sample.
///
/// The quantities of the other input kind are NaN. An undefined resistance
/// conversion also comes back as NaN; an EMF outside the thermocouple table
/// is the one conversion failure that is an error rather than a value.
fn convert_frame(frame: &RawFrame) -> AppResult<ConvertedSample> {
    let timestamp = NaiveDateTime::parse_from_str(&frame.timestamp, TIMESTAMP_FORMAT)
        .map_err(|e| {
            DaqError::MalformedFrame(format!("bad timestamp '{}': {}", frame.timestamp, e))
        })?;
    let (emf, tc_temp, resistance, prt_temp) = match frame.measurement {
        Measurement::Resistance(ohms) => {
            let temp = convert::prt_temperature(ohms, convert::DEFAULT_RTPW);
            (f64::NAN, f64::NAN, ohms, temp)
        }
        Measurement::Emf(mv) => {
            let temp = convert::type_s_temperature(mv)?;
            (mv, temp, f64::NAN, f64::NAN)
        }
    };
    Ok(ConvertedSample {
        channel: frame.channel,
        timestamp,
        emf,
        tc_temp,
        resistance,
        prt_temp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::mock::MockFluke;
    use std::time::Duration;

    fn test_app() -> (LoggerApp, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.acquisition.series_capacity = 16;
        settings.acquisition.queue_capacity = 64;
        settings.storage.save_dir = dir.path().to_path_buf();
        (LoggerApp::new(settings).unwrap(), dir)
    }

    fn resistance_frame(channel: u8, ohms: f64) -> RawFrame {
        RawFrame {
            channel: Channel::try_from(channel).unwrap(),
            measurement: Measurement::Resistance(ohms),
            timestamp: "25/08/2026 10:00:00".to_string(),
        }
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    #[test]
    fn starts_idle_and_ready() {
        let (app, _dir) = test_app();
        assert!(!app.is_running());
        assert_eq!(app.status(), "Ready");
        for channel in Channel::all() {
            assert_eq!(app.latest_values(channel).resistance, "N/A");
        }
    }

    #[test]
    fn second_start_is_rejected() {
        let (mut app, _dir) = test_app();
        app.start_with_port(Box::new(MockFluke::scripted(&[])))
            .unwrap();
        let err = app.start_with_port(Box::new(MockFluke::scripted(&[])));
        assert!(matches!(err, Err(DaqError::AlreadyRunning)));
        app.stop().unwrap();
    }

    #[test]
    fn stop_when_idle_is_a_noop() {
        let (mut app, _dir) = test_app();
        app.stop().unwrap();
        assert_eq!(app.status(), "Ready");
    }

    #[test]
    fn start_requires_a_port_name() {
        let (mut app, _dir) = test_app();
        assert!(matches!(
            app.start(),
            Err(DaqError::InvalidParameter(_))
        ));
        assert!(!app.is_running());
    }

    #[test]
    fn commands_require_a_running_session() {
        let (mut app, _dir) = test_app();
        assert!(matches!(
            app.send_command("FETCH?"),
            Err(DaqError::NotConnected)
        ));
        assert!(matches!(
            app.calibrate_clock(
                NaiveDateTime::parse_from_str("25/08/2026 10:00:00", TIMESTAMP_FORMAT).unwrap()
            ),
            Err(DaqError::NotConnected)
        ));
    }

    #[test]
    fn raw_commands_reach_the_wire() {
        let (mut app, _dir) = test_app();
        let port = MockFluke::scripted(&[]);
        let written = port.written();
        app.start_with_port(Box::new(port)).unwrap();
        app.send_command("FETCH?").unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            written.lock().unwrap().iter().any(|w| w == "FETCH?\n")
        }));
        app.stop().unwrap();
    }

    #[test]
    #[cfg(feature = "storage_csv")]
    fn frames_flow_into_series_and_readout() {
        let (mut app, _dir) = test_app();
        let port = MockFluke::scripted(&["1 100.0000 O 10:00:00 25/08/2026"]);
        app.start_with_port(Box::new(port)).unwrap();

        let channel = Channel::try_from(1).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            app.tick(Instant::now());
            app.latest_values(channel).resistance != "N/A"
        }));

        assert_eq!(app.latest_values(channel).resistance, "100.0000 Ω");
        assert_eq!(app.latest_values(channel).emf, "N/A");
        let snapshot = app.series_snapshot(channel, Quantity::Resistance);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].1, 100.0);
        assert!(app.status().starts_with("Received channel 1"));
        app.stop().unwrap();
    }

    #[test]
    #[cfg(feature = "storage_csv")]
    fn out_of_range_emf_drops_only_that_sample() {
        let (mut app, _dir) = test_app();
        app.settings.acquisition.channel_units = [Unit::Emf; CHANNEL_COUNT];
        let port = MockFluke::scripted(&[
            "1 25.0 MV 10:00:00 25/08/2026",
            "1 9.587 MV 10:00:01 25/08/2026",
        ]);
        app.start_with_port(Box::new(port)).unwrap();

        let channel = Channel::try_from(1).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            app.tick(Instant::now());
            app.latest_values(channel).emf != "N/A"
        }));

        // Only the in-range sample was stored.
        assert_eq!(app.series_snapshot(channel, Quantity::Emf).len(), 1);
        assert_eq!(app.latest_values(channel).emf, "9.5870 mV");
        app.stop().unwrap();
    }

    #[test]
    fn resistance_frame_converts_with_nan_emf_side() {
        let sample = convert_frame(&resistance_frame(2, 100.0)).unwrap();
        assert!(sample.emf.is_nan());
        assert!(sample.tc_temp.is_nan());
        assert_eq!(sample.resistance, 100.0);
        assert!(sample.prt_temp.abs() < 1e-9);
    }

    #[test]
    fn emf_frame_converts_with_nan_resistance_side() {
        let frame = RawFrame {
            channel: Channel::try_from(3).unwrap(),
            measurement: Measurement::Emf(9.587),
            timestamp: "25/08/2026 10:00:00".to_string(),
        };
        let sample = convert_frame(&frame).unwrap();
        assert!(sample.resistance.is_nan());
        assert!(sample.prt_temp.is_nan());
        assert_eq!(sample.emf, 9.587);
        assert!((sample.tc_temp - 1000.0).abs() < 1.0);
    }

    #[test]
    fn out_of_range_emf_frame_is_an_error() {
        let frame = RawFrame {
            channel: Channel::try_from(1).unwrap(),
            measurement: Measurement::Emf(25.0),
            timestamp: "25/08/2026 10:00:00".to_string(),
        };
        assert!(matches!(
            convert_frame(&frame),
            Err(DaqError::EmfOutOfRange { .. })
        ));
    }

    #[test]
    fn undefined_resistance_stays_nan_not_error() {
        let sample = convert_frame(&resistance_frame(1, -5.0)).unwrap();
        assert!(sample.prt_temp.is_nan());
        assert_eq!(sample.resistance, -5.0);
    }
}
