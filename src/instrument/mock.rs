//! An in-memory instrument double for tests and `--mock` runs.

use crate::core::{Channel, Unit, CHANNEL_COUNT};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Matches a quiet serial line's read-timeout pacing.
const QUIET_PAUSE: Duration = Duration::from_millis(10);

/// Stands in for the readout behind the [`LinePort`](crate::instrument::LinePort)
/// seam.
///
/// In scripted mode it serves a fixed sequence of lines and then goes quiet.
/// In synthetic mode it emits one noisy reading per channel per period,
/// switching between ohm-like and millivolt-like values as `UNIT:CHAN`
/// commands arrive, so a demo run exercises both conversion paths. Every
/// write is recorded for inspection.
pub struct MockFluke {
    script: VecDeque<String>,
    pending: VecDeque<u8>,
    written: Arc<Mutex<Vec<String>>>,
    units: [Unit; CHANNEL_COUNT],
    failing_reads: usize,
    synth_period: Option<Duration>,
    next_emit: Instant,
}

impl MockFluke {
    /// A mock that replays `lines` in order, then times out forever.
    pub fn scripted(lines: &[&str]) -> Self {
        Self {
            script: lines.iter().map(|l| format!("{}\n", l)).collect(),
            pending: VecDeque::new(),
            written: Arc::new(Mutex::new(Vec::new())),
            units: [Unit::default(); CHANNEL_COUNT],
            failing_reads: 0,
            synth_period: None,
            next_emit: Instant::now(),
        }
    }

    /// A mock that generates one reading per channel every `period`,
    /// timestamped with the local wall clock.
    pub fn synthetic(period: Duration, units: [Unit; CHANNEL_COUNT]) -> Self {
        Self {
            script: VecDeque::new(),
            pending: VecDeque::new(),
            written: Arc::new(Mutex::new(Vec::new())),
            units,
            failing_reads: 0,
            synth_period: Some(period),
            next_emit: Instant::now(),
        }
    }

    /// Makes the next `count` reads fail with a hard I/O error.
    pub fn failing_reads(mut self, count: usize) -> Self {
        self.failing_reads = count;
        self
    }

    /// Shared record of everything written to the mock.
    pub fn written(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.written)
    }

    fn refill(&mut self) {
        if let Some(line) = self.script.pop_front() {
            self.pending.extend(line.bytes());
            return;
        }
        let period = match self.synth_period {
            Some(period) => period,
            None => return,
        };
        let now = Instant::now();
        if now < self.next_emit {
            return;
        }
        self.next_emit = now + period;

        use rand::Rng;
        let stamp = chrono::Local::now().naive_local();
        let time = stamp.format("%H:%M:%S");
        let date = stamp.format("%d/%m/%Y");
        let mut rng = rand::thread_rng();
        for channel in Channel::all() {
            let unit = self.units[channel.index()];
            let value = match unit {
                // A PRT sitting near the triple point of water.
                Unit::Resistance => 100.0 + rng.gen_range(-0.02..0.02),
                // A Type-S couple near 1000 °C.
                Unit::Emf => 9.585 + rng.gen_range(-0.005..0.005),
            };
            let line = format!(
                "{} {:.4} {} {} {}\n",
                channel,
                value,
                unit.scpi_token(),
                time,
                date
            );
            self.pending.extend(line.bytes());
        }
    }
}

impl Read for MockFluke {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "injected read failure",
            ));
        }
        if self.pending.is_empty() {
            self.refill();
        }
        if self.pending.is_empty() {
            // Behave like a serial read timeout on a quiet line.
            std::thread::sleep(QUIET_PAUSE);
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockFluke {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf).to_string();
        if let Some((channel, unit)) = parse_unit_command(&text) {
            self.units[channel.index()] = unit;
        }
        if let Ok(mut written) = self.written.lock() {
            written.push(text);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Recognizes `UNIT:CHAN<n> <O|MV>` so the mock's synthesized values track
/// the commanded input kind.
fn parse_unit_command(line: &str) -> Option<(Channel, Unit)> {
    let rest = line.trim().strip_prefix("UNIT:CHAN")?;
    let mut parts = rest.split_whitespace();
    let channel = Channel::try_from(parts.next()?.parse::<u8>().ok()?).ok()?;
    let unit = match parts.next()? {
        "O" => Unit::Resistance,
        "MV" => Unit::Emf,
        _ => return None,
    };
    Some((channel, unit))
}
