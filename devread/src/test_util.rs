use std::{cell::Cell, io, time::Duration};

use devread_common::BlockDevice;

use crate::timing::Clock;

/// Replays fixed wall and cpu readings (in seconds), repeating the last one when exhausted.
pub(crate) struct ScriptedClock {
    walls: Vec<f64>,
    cpus: Vec<f64>,
    wall_idx: Cell<usize>,
    cpu_idx: Cell<usize>,
}

impl ScriptedClock {
    pub(crate) fn new(walls: &[f64], cpus: &[f64]) -> Self {
        assert!(!walls.is_empty() && !cpus.is_empty());
        ScriptedClock {
            walls: walls.to_vec(),
            cpus: cpus.to_vec(),
            wall_idx: Cell::new(0),
            cpu_idx: Cell::new(0),
        }
    }

    fn next(values: &[f64], idx: &Cell<usize>) -> f64 {
        let i = idx.get();
        idx.set(i + 1);
        values[i.min(values.len() - 1)]
    }
}

impl Clock for ScriptedClock {
    fn wall(&self) -> Duration {
        Duration::from_secs_f64(Self::next(&self.walls, &self.wall_idx))
    }

    fn cpu(&self) -> io::Result<Duration> {
        Ok(Duration::from_secs_f64(Self::next(&self.cpus, &self.cpu_idx)))
    }
}

/// Advances wall time by `step` and cpu time by a quarter of that on every reading.
pub(crate) struct StepClock {
    step: Duration,
    walls: Cell<u32>,
    cpus: Cell<u32>,
}

impl StepClock {
    pub(crate) fn new(step: Duration) -> Self {
        StepClock {
            step,
            walls: Cell::new(0),
            cpus: Cell::new(0),
        }
    }
}

impl Clock for StepClock {
    fn wall(&self) -> Duration {
        self.walls.set(self.walls.get() + 1);
        self.step * self.walls.get()
    }

    fn cpu(&self) -> io::Result<Duration> {
        self.cpus.set(self.cpus.get() + 1);
        Ok(self.step / 4 * self.cpus.get())
    }
}

/// A clock whose cpu reading always fails.
pub(crate) struct BrokenCpuClock;

impl Clock for BrokenCpuClock {
    fn wall(&self) -> Duration {
        Duration::ZERO
    }

    fn cpu(&self) -> io::Result<Duration> {
        Err(io::Error::new(io::ErrorKind::Other, "getrusage unavailable"))
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Failure {
    /// Return this many bytes instead of a full block.
    Short(usize),
    Error(io::ErrorKind),
}

/// In-memory device that records every read it serves.
pub(crate) struct MemDevice {
    data: Vec<u8>,
    reads: Vec<(u64, usize)>,
    /// Fail the read with this (zero-based) sequence number.
    fail_at: Option<(usize, Failure)>,
}

impl MemDevice {
    pub(crate) fn new(size: usize) -> Self {
        MemDevice {
            data: (0..size).map(|i| (i % 251) as u8).collect(),
            reads: Vec::new(),
            fail_at: None,
        }
    }

    pub(crate) fn failing_at(mut self, read_no: usize, failure: Failure) -> Self {
        self.fail_at = Some((read_no, failure));
        self
    }

    pub(crate) fn reads(&self) -> &[(u64, usize)] {
        &self.reads
    }
}

impl BlockDevice for MemDevice {
    fn read_block(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let read_no = self.reads.len();
        self.reads.push((offset, buf.len()));
        match self.fail_at {
            Some((n, Failure::Error(kind))) if n == read_no => return Err(kind.into()),
            Some((n, Failure::Short(len))) if n == read_no => return Ok(len.min(buf.len())),
            _ => {}
        }
        let start = usize::try_from(offset).unwrap().min(self.data.len());
        let end = (start + buf.len()).min(self.data.len());
        let n = end - start;
        buf[..n].copy_from_slice(&self.data[start..end]);
        Ok(n)
    }
}
