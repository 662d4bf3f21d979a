//! Typed, latency-carrying, bandwidth-limited pipeline port fabric.
//!
//! Grounded on the original simulator's `infra/ports/ports.h`: a writer
//! carries `(bandwidth, fanout)`, a reader carries `latency`, and delivery is
//! a FIFO of `(value, ready_cycle)` pairs. Per Design Note "Globally
//! addressable port registry", the process-wide `PortMap` singleton of the
//! original becomes an explicit [`PortMap`] owned by the simulator context;
//! name-based linking between writer and reader is preserved, but nothing
//! lives in process-global storage.
//!
//! A writer and its readers share a name (`key`). [`PortMap::write_port`] and
//! [`PortMap::read_port`] register that name's type and multiplicity;
//! [`PortMap::init`] validates the registry (every writer has ≥1 reader of
//! the same element type, every reader has exactly one writer), after which
//! each [`WritePort`] must be connected to its readers with [`WritePort::bind`].
//!
//! A branch-flush notification is modeled as an ordinary `WritePort<bool>`
//! with zero latency: downstream stages read it on the same cycle it was
//! written and `clean_up` their own ports to that cycle. No separate
//! "flush" type is needed.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::common::SimError;
pub use crate::common::error::PortError;

/// A monotonically increasing simulation cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cycle(pub u64);

impl Cycle {
    /// Returns the next cycle.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Delivery delay of a [`ReadPort`], in cycles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Latency(pub u64);

type Queue<T> = Rc<RefCell<VecDeque<(T, Cycle)>>>;

/// Default single-cycle latency used by most intra-pipeline ports.
pub const PORT_LATENCY: Latency = Latency(1);
/// Long latency used by ports that model a multi-cycle memory round trip.
pub const PORT_LONG_LATENCY: Latency = Latency(30);
/// Default fanout of an intra-pipeline port.
pub const PORT_FANOUT: u32 = 1;
/// Default bandwidth of an intra-pipeline port.
pub const PORT_BANDWIDTH: u32 = 1;

/// The writing end of a named, typed channel.
#[derive(Debug)]
pub struct WritePort<T> {
    key: String,
    bandwidth: u32,
    fanout: u32,
    last_cycle: Option<Cycle>,
    write_counter: u32,
    destinations: Vec<(Queue<T>, Latency)>,
}

impl<T: Clone + 'static> WritePort<T> {
    /// Delivers `value` to every bound reader, with ready-cycle
    /// `cycle + reader.latency`.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Overloaded`] if more writes occur in `cycle` than
    /// this port's configured bandwidth.
    pub fn write(&mut self, value: T, cycle: Cycle) -> Result<(), PortError> {
        self.write_counter = if self.last_cycle == Some(cycle) {
            self.write_counter + 1
        } else {
            0
        };
        self.last_cycle = Some(cycle);
        if self.write_counter > self.bandwidth {
            return Err(PortError::Overloaded {
                key: self.key.clone(),
                attempted: self.write_counter,
                bandwidth: self.bandwidth,
            });
        }
        for (queue, latency) in &self.destinations {
            queue
                .borrow_mut()
                .push_back((value.clone(), Cycle(cycle.0 + latency.0)));
        }
        Ok(())
    }

    /// Connects this writer to every reader registered under the same key
    /// in `map`.
    ///
    /// Must be called after [`PortMap::init`] has validated the registry.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Port`] with [`PortError::Dangling`] if no reader
    /// is registered under this port's key, or [`PortError::TypeMismatch`] if
    /// a registered reader's element type does not match `T`.
    pub fn bind(&mut self, map: &PortMap) -> Result<(), SimError> {
        let readers = map
            .readers
            .get(&self.key)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| PortError::Dangling(self.key.clone()))?;
        self.destinations.clear();
        for reader in readers {
            let queue = Rc::clone(&reader.queue)
                .downcast::<RefCell<VecDeque<(T, Cycle)>>>()
                .map_err(|_| PortError::TypeMismatch(self.key.clone()))?;
            self.destinations.push((queue, reader.latency));
        }
        Ok(())
    }

    /// The port's registration key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Configured bandwidth (maximum writes accepted per cycle).
    #[must_use]
    pub fn bandwidth(&self) -> u32 {
        self.bandwidth
    }

    /// Configured fanout (number of distinct readers this port feeds).
    #[must_use]
    pub fn fanout(&self) -> u32 {
        self.fanout
    }
}

/// The reading end of a named, typed channel.
#[derive(Debug)]
pub struct ReadPort<T> {
    key: String,
    latency: Latency,
    queue: Queue<T>,
}

impl<T: 'static> ReadPort<T> {
    /// True iff the head of the queue is ready for delivery at `cycle`.
    #[must_use]
    pub fn is_ready(&self, cycle: Cycle) -> bool {
        self.queue
            .borrow()
            .front()
            .is_some_and(|(_, ready)| *ready == cycle)
    }

    /// Consumes the head of the queue if ready.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotReady`] if the head is absent or not yet due.
    pub fn read(&mut self, cycle: Cycle) -> Result<T, PortError> {
        if !self.is_ready(cycle) {
            return Err(PortError::NotReady {
                key: self.key.clone(),
                cycle: cycle.0,
            });
        }
        Ok(self.queue.borrow_mut().pop_front().unwrap().0)
    }

    /// Drops queued items with ready-cycle strictly less than `cycle`: they
    /// missed their delivery slot.
    pub fn clean_up(&mut self, cycle: Cycle) {
        let mut queue = self.queue.borrow_mut();
        while queue.front().is_some_and(|(_, ready)| ready.0 < cycle.0) {
            queue.pop_front();
        }
    }

    /// True iff no value is queued for any future cycle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// The port's registration key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Configured delivery latency.
    #[must_use]
    pub fn latency(&self) -> Latency {
        self.latency
    }
}

struct ReaderRecord {
    type_id: TypeId,
    latency: Latency,
    queue: Rc<dyn Any>,
    cleanup: Rc<dyn Fn(Cycle)>,
}

struct WriterRecord {
    type_id: TypeId,
    bandwidth: u32,
}

/// Context-owned registry linking named writers and readers.
///
/// Per Design Note "Globally addressable port registry", this replaces the
/// original's process-wide singleton; the simulator owns one `PortMap` and
/// must construct a fresh one for each independent simulator instance.
#[derive(Default)]
pub struct PortMap {
    writers: HashMap<String, WriterRecord>,
    readers: HashMap<String, Vec<ReaderRecord>>,
}

impl PortMap {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new writer under `key` and returns its handle.
    ///
    /// The returned [`WritePort`] is unbound until [`PortMap::init`] and
    /// [`WritePort::bind`] are called.
    pub fn write_port<T: 'static>(&mut self, key: &str, bandwidth: u32, fanout: u32) -> WritePort<T> {
        self.writers.insert(
            key.to_string(),
            WriterRecord {
                type_id: TypeId::of::<T>(),
                bandwidth,
            },
        );
        WritePort {
            key: key.to_string(),
            bandwidth,
            fanout,
            last_cycle: None,
            write_counter: 0,
            destinations: Vec::new(),
        }
    }

    /// Registers a new reader under `key` and returns its handle.
    pub fn read_port<T: 'static>(&mut self, key: &str, latency: Latency) -> ReadPort<T> {
        let queue: Queue<T> = Rc::new(RefCell::new(VecDeque::new()));
        let cleanup_handle = Rc::clone(&queue);
        let cleanup: Rc<dyn Fn(Cycle)> = Rc::new(move |cycle: Cycle| {
            let mut q = cleanup_handle.borrow_mut();
            while q.front().is_some_and(|(_, ready)| ready.0 < cycle.0) {
                q.pop_front();
            }
        });
        self.readers.entry(key.to_string()).or_default().push(ReaderRecord {
            type_id: TypeId::of::<T>(),
            latency,
            queue: queue.clone(),
            cleanup,
        });
        ReadPort {
            key: key.to_string(),
            latency,
            queue,
        }
    }

    /// Validates every registered key: each writer must have at least one
    /// reader of matching element type, and every reader must have exactly
    /// one writer.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Port`] with [`PortError::Dangling`] for a writer
    /// with no readers or a reader with no writer, or [`PortError::TypeMismatch`]
    /// for a reader whose element type does not match its writer's.
    pub fn init(&self) -> Result<(), SimError> {
        for (key, writer) in &self.writers {
            let readers = self
                .readers
                .get(key)
                .filter(|r| !r.is_empty())
                .ok_or_else(|| PortError::Dangling(key.clone()))?;
            for reader in readers {
                if reader.type_id != writer.type_id {
                    return Err(PortError::TypeMismatch(key.clone()).into());
                }
            }
        }
        for key in self.readers.keys() {
            if !self.writers.contains_key(key) {
                return Err(PortError::Dangling(key.clone()).into());
            }
        }
        Ok(())
    }

    /// Runs per-cycle maintenance on every registered reader queue, dropping
    /// items that missed their delivery slot.
    pub fn clean_up(&self, cycle: Cycle) {
        for readers in self.readers.values() {
            for reader in readers {
                (reader.cleanup)(cycle);
            }
        }
    }

    /// Releases the registry. Readers and writers already constructed remain
    /// individually usable but can no longer be (re-)bound via this map.
    pub fn destroy(&mut self) {
        self.writers.clear();
        self.readers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire<T: Clone + 'static>(
        map: &mut PortMap,
        key: &str,
        bandwidth: u32,
        latency: Latency,
    ) -> (WritePort<T>, ReadPort<T>) {
        let mut w = map.write_port::<T>(key, bandwidth, 1);
        let r = map.read_port::<T>(key, latency);
        map.init().unwrap();
        w.bind(map).unwrap();
        (w, r)
    }

    #[test]
    fn delivers_after_latency() {
        let mut map = PortMap::new();
        let (mut w, mut r) = wire::<u32>(&mut map, "a", 1, Latency(2));
        w.write(7, Cycle(0)).unwrap();
        assert!(!r.is_ready(Cycle(0)));
        assert!(!r.is_ready(Cycle(1)));
        assert!(r.is_ready(Cycle(2)));
        assert_eq!(r.read(Cycle(2)).unwrap(), 7);
    }

    #[test]
    fn overload_beyond_bandwidth_fails() {
        let mut map = PortMap::new();
        let (mut w, _r) = wire::<u32>(&mut map, "b", 1, Latency(0));
        w.write(1, Cycle(0)).unwrap();
        w.write(2, Cycle(0)).unwrap();
        assert!(matches!(
            w.write(3, Cycle(0)),
            Err(PortError::Overloaded { .. })
        ));
    }

    #[test]
    fn read_before_ready_fails() {
        let mut map = PortMap::new();
        let (mut w, mut r) = wire::<u32>(&mut map, "c", 1, Latency(1));
        w.write(9, Cycle(0)).unwrap();
        assert!(matches!(r.read(Cycle(0)), Err(PortError::NotReady { .. })));
    }

    #[test]
    fn dangling_writer_detected() {
        let mut map = PortMap::new();
        let _w = map.write_port::<u32>("d", 1, 1);
        assert!(matches!(
            map.init(),
            Err(SimError::Port(PortError::Dangling(_)))
        ));
    }

    #[test]
    fn dangling_reader_detected() {
        let mut map = PortMap::new();
        let _r = map.read_port::<u32>("e", Latency(1));
        assert!(matches!(
            map.init(),
            Err(SimError::Port(PortError::Dangling(_)))
        ));
    }

    #[test]
    fn type_mismatch_detected() {
        let mut map = PortMap::new();
        let _w = map.write_port::<u32>("f", 1, 1);
        let _r = map.read_port::<u64>("f", Latency(1));
        assert!(matches!(
            map.init(),
            Err(SimError::Port(PortError::TypeMismatch(_)))
        ));
    }

    #[test]
    fn fanout_delivers_to_every_reader() {
        let mut map = PortMap::new();
        let mut w = map.write_port::<u32>("g", 1, 2);
        let r1 = map.read_port::<u32>("g", Latency(0));
        let r2 = map.read_port::<u32>("g", Latency(0));
        map.init().unwrap();
        w.bind(&map).unwrap();
        w.write(42, Cycle(5)).unwrap();
        let mut r1 = r1;
        let mut r2 = r2;
        assert_eq!(r1.read(Cycle(5)).unwrap(), 42);
        assert_eq!(r2.read(Cycle(5)).unwrap(), 42);
    }

    #[test]
    fn clean_up_drops_missed_slot() {
        let mut map = PortMap::new();
        let (mut w, mut r) = wire::<u32>(&mut map, "h", 1, Latency(1));
        w.write(1, Cycle(0)).unwrap();
        r.clean_up(Cycle(5));
        assert!(r.is_empty());
        assert!(matches!(r.read(Cycle(1)), Err(PortError::NotReady { .. })));
    }
}
