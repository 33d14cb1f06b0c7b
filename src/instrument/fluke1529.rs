//! Frame reader for the Fluke 1529 thermometer readout.
//!
//! The instrument streams one whitespace-delimited line per channel per
//! measurement period:
//!
//! ```text
//! 1 100.0345 O 14:23:05 25/08/2026
//! ```
//!
//! The reader owns the transport on a dedicated thread. Each iteration first
//! drains the outbound command queue, writing each command with a short
//! turnaround gap, then reads pending bytes and emits one
//! [`ReaderEvent::Frame`] per well-formed line. Malformed lines are skipped.
//! A transient I/O failure is reported as [`ReaderEvent::Degraded`] and the
//! reader retries after a fixed backoff; only cancellation or a dropped
//! consumer ends the loop. The port closes when the loop returns.

use crate::core::{
    Channel, Measurement, OutboundCommand, RawFrame, ReaderEvent, Unit, CHANNEL_COUNT,
    TIMESTAMP_FORMAT,
};
use crate::instrument::LinePort;
use chrono::NaiveDateTime;
use std::io;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// Pause after an empty read so an immediately-returning port cannot spin the
/// loop hot.
const POLL_PAUSE: Duration = Duration::from_millis(10);

/// Blocking serial worker; see the module docs for the loop contract.
pub struct FrameReader {
    port: Box<dyn LinePort>,
    units: [Unit; CHANNEL_COUNT],
    event_tx: mpsc::Sender<ReaderEvent>,
    command_rx: mpsc::UnboundedReceiver<OutboundCommand>,
    cancel: watch::Receiver<bool>,
    command_gap: Duration,
    retry_backoff: Duration,
    pending: Vec<u8>,
}

impl FrameReader {
    /// Wires a reader to an open port and its queues.
    ///
    /// `units` seeds the per-channel tagging table; the reader keeps it
    /// current as `UNIT:CHAN` commands go out, so no state is shared with the
    /// consumer.
    pub fn new(
        port: Box<dyn LinePort>,
        units: [Unit; CHANNEL_COUNT],
        event_tx: mpsc::Sender<ReaderEvent>,
        command_rx: mpsc::UnboundedReceiver<OutboundCommand>,
        cancel: watch::Receiver<bool>,
        command_gap: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            port,
            units,
            event_tx,
            command_rx,
            cancel,
            command_gap,
            retry_backoff,
            pending: Vec::new(),
        }
    }

    /// Moves the reader onto its own thread.
    ///
    /// # Errors
    ///
    /// Forwards the OS error when the thread cannot be spawned.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("fluke1529-reader".to_string())
            .spawn(move || self.run())
    }

    /// Runs the blocking loop until cancelled or the consumer goes away.
    pub fn run(mut self) {
        log::info!("Reader thread started.");
        while !*self.cancel.borrow() {
            if !self.step() {
                break;
            }
        }
        log::info!("Reader thread stopped; releasing the port.");
    }

    /// One loop iteration. Returns `false` once the consumer has hung up.
    fn step(&mut self) -> bool {
        if let Err(e) = self.drain_commands() {
            return self.back_off(&e);
        }
        match self.fill_pending() {
            Ok(0) => {
                // Read timeout with nothing buffered: the instrument only
                // talks once per measurement period.
                std::thread::sleep(POLL_PAUSE);
                true
            }
            Ok(_) => {
                while let Some(line) = self.take_line() {
                    if !self.handle_line(&line) {
                        return false;
                    }
                }
                true
            }
            Err(e) => self.back_off(&e),
        }
    }

    /// Writes every queued command, newline-terminated, pausing for the
    /// instrument's turnaround time between commands. The unit table is
    /// updated only after a `UNIT:CHAN` command actually went out.
    fn drain_commands(&mut self) -> io::Result<()> {
        while let Ok(command) = self.command_rx.try_recv() {
            let line = format!("{}\n", command.to_scpi());
            log::debug!("-> {}", line.trim_end());
            self.port.write_all(line.as_bytes())?;
            self.port.flush()?;
            if let OutboundCommand::SetUnit { channel, unit } = &command {
                self.units[channel.index()] = *unit;
            }
            std::thread::sleep(self.command_gap);
        }
        Ok(())
    }

    /// Reads whatever bytes are available into the carry buffer.
    ///
    /// A port read timeout is a normal outcome between measurement periods
    /// and maps to `Ok(0)`, as does a zero-length read.
    fn fill_pending(&mut self) -> io::Result<usize> {
        let mut chunk = [0u8; 256];
        match self.port.read(&mut chunk) {
            Ok(0) => Ok(0),
            Ok(n) => {
                self.pending.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Extracts the next complete line from the carry buffer, trimmed of the
    /// terminator and surrounding whitespace.
    fn take_line(&mut self) -> Option<String> {
        let nl = self.pending.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=nl).collect();
        Some(String::from_utf8_lossy(&raw).trim().to_string())
    }

    /// Parses and forwards one line. Returns `false` once the consumer has
    /// hung up.
    fn handle_line(&mut self, line: &str) -> bool {
        if line.is_empty() {
            return true;
        }
        match parse_frame(line, &self.units) {
            Some(frame) => self.send(ReaderEvent::Frame(frame)),
            None => {
                log::debug!("Skipping malformed line: '{}'", line);
                true
            }
        }
    }

    /// Reports a transient I/O failure and waits out the backoff, polling the
    /// cancel flag so a stop does not have to ride out the full delay.
    /// Returns `false` once the consumer has hung up.
    fn back_off(&mut self, error: &io::Error) -> bool {
        log::warn!(
            "Serial I/O failed ({}); retrying in {:?}.",
            error,
            self.retry_backoff
        );
        if !self.send(ReaderEvent::Degraded(error.to_string())) {
            return false;
        }
        let deadline = Instant::now() + self.retry_backoff;
        while Instant::now() < deadline && !*self.cancel.borrow() {
            std::thread::sleep(POLL_PAUSE);
        }
        true
    }

    /// Pushes an event to the consumer, blocking while the queue is full.
    fn send(&mut self, event: ReaderEvent) -> bool {
        self.event_tx.blocking_send(event).is_ok()
    }
}

/// Parses one instrument line into a frame.
///
/// A valid line carries at least five whitespace-delimited tokens:
/// `<channel> <value> <unit> <time> <date>`. The line's own unit token is
/// ignored; the channel's configured unit decides how the value is tagged.
/// Returns `None` for anything that does not parse, including timestamps not
/// matching [`TIMESTAMP_FORMAT`].
fn parse_frame(line: &str, units: &[Unit; CHANNEL_COUNT]) -> Option<RawFrame> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 5 {
        return None;
    }
    let channel = tokens[0]
        .parse::<u8>()
        .ok()
        .and_then(|n| Channel::try_from(n).ok())?;
    let value = tokens[1].parse::<f64>().ok()?;
    let timestamp = format!("{} {}", tokens[4], tokens[3]);
    NaiveDateTime::parse_from_str(&timestamp, TIMESTAMP_FORMAT).ok()?;
    Some(RawFrame {
        channel,
        measurement: Measurement::tagged(units[channel.index()], value),
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::mock::MockFluke;

    const ALL_RESISTANCE: [Unit; CHANNEL_COUNT] = [Unit::Resistance; CHANNEL_COUNT];

    #[test]
    fn parses_a_well_formed_line() {
        let frame = parse_frame("1 100.0345 O 14:23:05 25/08/2026", &ALL_RESISTANCE).unwrap();
        assert_eq!(frame.channel.number(), 1);
        assert_eq!(frame.measurement, Measurement::Resistance(100.0345));
        assert_eq!(frame.timestamp, "25/08/2026 14:23:05");
    }

    #[test]
    fn tagging_follows_channel_config_not_the_line_token() {
        let mut units = ALL_RESISTANCE;
        units[1] = Unit::Emf;
        // The line claims ohms; channel 2 is configured for millivolts.
        let frame = parse_frame("2 9.587 O 14:23:05 25/08/2026", &units).unwrap();
        assert_eq!(frame.measurement, Measurement::Emf(9.587));
    }

    #[test]
    fn short_line_is_rejected() {
        assert!(parse_frame("1 100.0 O", &ALL_RESISTANCE).is_none());
        assert!(parse_frame("", &ALL_RESISTANCE).is_none());
    }

    #[test]
    fn extra_trailing_tokens_are_tolerated() {
        let frame =
            parse_frame("3 9.587 MV 14:23:05 25/08/2026 OK", &ALL_RESISTANCE).unwrap();
        assert_eq!(frame.channel.number(), 3);
    }

    #[test]
    fn unparseable_tokens_are_rejected() {
        // Channel outside 1..=4.
        assert!(parse_frame("9 100.0 O 14:23:05 25/08/2026", &ALL_RESISTANCE).is_none());
        // Non-numeric value.
        assert!(parse_frame("1 ohms O 14:23:05 25/08/2026", &ALL_RESISTANCE).is_none());
        // Timestamp in the wrong format.
        assert!(parse_frame("1 100.0 O 14:23:05 2026-08-25", &ALL_RESISTANCE).is_none());
    }

    #[test]
    fn reader_skips_garbage_and_continues() {
        let port = MockFluke::scripted(&["bogus line", "1 100.0345 O 14:23:05 25/08/2026"]);
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (_command_tx, command_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let reader = FrameReader::new(
            Box::new(port),
            ALL_RESISTANCE,
            event_tx,
            command_rx,
            cancel_rx,
            Duration::from_millis(1),
            Duration::from_millis(1),
        );
        let handle = reader.spawn().unwrap();

        match event_rx.blocking_recv().unwrap() {
            ReaderEvent::Frame(frame) => {
                assert_eq!(frame.channel.number(), 1);
                assert_eq!(frame.measurement, Measurement::Resistance(100.0345));
            }
            other => panic!("expected a frame, got {:?}", other),
        }

        cancel_tx.send(true).unwrap();
        drop(event_rx);
        handle.join().unwrap();
    }

    #[test]
    fn commands_go_out_before_reads_and_retag_frames() {
        let port = MockFluke::scripted(&["2 9.587 O 14:23:05 25/08/2026"]);
        let written = port.written();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        // Queued before the reader starts, so both are drained ahead of the
        // first read.
        command_tx
            .send(OutboundCommand::SetUnit {
                channel: Channel::try_from(2).unwrap(),
                unit: Unit::Emf,
            })
            .unwrap();
        command_tx
            .send(OutboundCommand::MeasurePeriod(Duration::from_secs(1)))
            .unwrap();

        let reader = FrameReader::new(
            Box::new(port),
            ALL_RESISTANCE,
            event_tx,
            command_rx,
            cancel_rx,
            Duration::from_millis(1),
            Duration::from_millis(1),
        );
        let handle = reader.spawn().unwrap();

        match event_rx.blocking_recv().unwrap() {
            ReaderEvent::Frame(frame) => {
                assert_eq!(frame.measurement, Measurement::Emf(9.587));
            }
            other => panic!("expected a frame, got {:?}", other),
        }
        assert_eq!(
            *written.lock().unwrap(),
            vec!["UNIT:CHAN2 MV\n".to_string(), "MEAS:PER 1\n".to_string()]
        );

        cancel_tx.send(true).unwrap();
        drop(event_rx);
        handle.join().unwrap();
    }

    #[test]
    fn io_failure_degrades_then_recovers() {
        let port = MockFluke::scripted(&["1 100.0 O 14:23:05 25/08/2026"]).failing_reads(1);
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (_command_tx, command_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let reader = FrameReader::new(
            Box::new(port),
            ALL_RESISTANCE,
            event_tx,
            command_rx,
            cancel_rx,
            Duration::from_millis(1),
            Duration::from_millis(1),
        );
        let handle = reader.spawn().unwrap();

        assert!(matches!(
            event_rx.blocking_recv().unwrap(),
            ReaderEvent::Degraded(_)
        ));
        assert!(matches!(
            event_rx.blocking_recv().unwrap(),
            ReaderEvent::Frame(_)
        ));

        cancel_tx.send(true).unwrap();
        drop(event_rx);
        handle.join().unwrap();
    }
}
