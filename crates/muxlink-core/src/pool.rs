use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use muxlink_frame::{FrameError, FrameSink, FrameWriter};
use muxlink_transport::LocalStream;
use tracing::{debug, info, warn};

use crate::channel::{self, RelaySettings};
use crate::config::MuxConfig;
use crate::error::{MuxError, Result};
use crate::stats::{SessionStats, StatsSnapshot};

/// Free-list terminator. Never a valid slot index (capacity ≤ 65536).
const NIL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Active,
}

#[derive(Debug)]
struct Slot {
    state: SlotState,
    prev: u32,
    next: u32,
    /// Bumped on every release; relays compare it to detect reuse.
    generation: u64,
    /// This side already sent the close frame for the current generation.
    closing: bool,
    /// Producer end of the delivery queue. `None` for reserved slots.
    delivery: Option<SyncSender<Bytes>>,
}

/// Slot arena with an intrusive doubly-linked free list.
///
/// A slot is linked into the list iff its state is `Free`.
#[derive(Debug)]
struct PoolState {
    slots: Vec<Slot>,
    head: u32,
    tail: u32,
    free: usize,
}

impl PoolState {
    fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|i| Slot {
                state: SlotState::Free,
                prev: if i == 0 { NIL } else { (i - 1) as u32 },
                next: if i + 1 == capacity { NIL } else { (i + 1) as u32 },
                generation: 0,
                closing: false,
                delivery: None,
            })
            .collect();
        let (head, tail) = if capacity == 0 {
            (NIL, NIL)
        } else {
            (0, (capacity - 1) as u32)
        };
        Self {
            slots,
            head,
            tail,
            free: capacity,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn active(&self) -> usize {
        self.slots.len() - self.free
    }

    fn unlink(&mut self, id: u32) {
        let (prev, next) = {
            let slot = &self.slots[id as usize];
            (slot.prev, slot.next)
        };
        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev as usize].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slots[next as usize].prev = prev;
        }
        let slot = &mut self.slots[id as usize];
        slot.prev = NIL;
        slot.next = NIL;
        self.free -= 1;
    }

    fn push_back(&mut self, id: u32) {
        let tail = self.tail;
        {
            let slot = &mut self.slots[id as usize];
            slot.prev = tail;
            slot.next = NIL;
        }
        if tail == NIL {
            self.head = id;
        } else {
            self.slots[tail as usize].next = id;
        }
        self.tail = id;
        self.free += 1;
    }

    fn activate(&mut self, id: u32, delivery: Option<SyncSender<Bytes>>, closing: bool) -> u64 {
        self.unlink(id);
        let slot = &mut self.slots[id as usize];
        slot.state = SlotState::Active;
        slot.closing = closing;
        slot.delivery = delivery;
        slot.generation
    }

    fn claim_front(&mut self, delivery: Option<SyncSender<Bytes>>) -> Option<Channel> {
        if self.head == NIL {
            return None;
        }
        let id = self.head;
        let generation = self.activate(id, delivery, false);
        Some(Channel {
            id: id as u16,
            generation,
        })
    }

    fn claim_at(
        &mut self,
        id: u16,
        delivery: Option<SyncSender<Bytes>>,
        closing: bool,
    ) -> Result<Channel> {
        let capacity = self.capacity();
        let slot = self
            .slots
            .get(id as usize)
            .ok_or(MuxError::OutOfRange { id, capacity })?;
        if slot.state == SlotState::Active {
            return Err(MuxError::ChannelBusy(id));
        }
        let generation = self.activate(id as u32, delivery, closing);
        Ok(Channel { id, generation })
    }

    fn active_slot(&self, id: u16) -> Option<&Slot> {
        self.slots
            .get(id as usize)
            .filter(|slot| slot.state == SlotState::Active)
    }

    fn release(&mut self, id: u16) -> bool {
        let Some(slot) = self.slots.get_mut(id as usize) else {
            return false;
        };
        if slot.state != SlotState::Active {
            return false;
        }
        slot.state = SlotState::Free;
        slot.generation = slot.generation.wrapping_add(1);
        slot.closing = false;
        // Dropping the sender closes the queue once in-flight clones are gone.
        slot.delivery = None;
        self.push_back(id as u32);
        true
    }

    fn mark_closing(&mut self, channel: Channel) -> bool {
        match self.slots.get_mut(channel.id as usize) {
            Some(slot)
                if slot.state == SlotState::Active
                    && slot.generation == channel.generation
                    && !slot.closing =>
            {
                slot.closing = true;
                true
            }
            _ => false,
        }
    }

    fn is_current(&self, channel: Channel) -> bool {
        self.active_slot(channel.id)
            .is_some_and(|slot| slot.generation == channel.generation)
    }

    /// Current and no close frame sent yet.
    fn may_send(&self, channel: Channel) -> bool {
        self.active_slot(channel.id)
            .is_some_and(|slot| slot.generation == channel.generation && !slot.closing)
    }

    #[cfg(test)]
    fn free_list(&self) -> Vec<u16> {
        let mut ids = Vec::with_capacity(self.free);
        let mut cursor = self.head;
        while cursor != NIL {
            ids.push(cursor as u16);
            cursor = self.slots[cursor as usize].next;
        }
        ids
    }
}

/// One active channel slot at a given generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    id: u16,
    generation: u64,
}

impl Channel {
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Result of [`ChannelPool::lookup`].
///
/// Holds a clone of the delivery sender; drop it promptly so a later release
/// can close the queue.
#[derive(Debug, Clone)]
pub struct ChannelRef {
    channel: Channel,
    closing: bool,
    delivery: Option<SyncSender<Bytes>>,
}

impl ChannelRef {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn id(&self) -> u16 {
        self.channel.id
    }

    /// This side has already sent its close frame.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Whether payloads for this channel have somewhere to go.
    pub fn accepts_payloads(&self) -> bool {
        self.delivery.is_some()
    }

    /// Enqueue a payload for the inbound relay, blocking while the queue is full.
    ///
    /// Returns false if the relay has stopped consuming.
    pub fn deliver(&self, payload: Bytes) -> bool {
        match &self.delivery {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }
}

/// Fixed-capacity set of channel slots addressed by a 16-bit identifier.
///
/// Every mutation and lookup takes the pool lock. The lock is never held
/// across socket I/O. Where both are needed the transport lock is taken
/// first.
pub struct ChannelPool {
    state: Mutex<PoolState>,
    writer: FrameWriter,
    stats: Arc<SessionStats>,
    relay: RelaySettings,
}

impl ChannelPool {
    /// Create a pool sized by `config.max_channels`, all slots free.
    pub fn new(writer: FrameWriter, config: &MuxConfig) -> Arc<Self> {
        Self::with_stats(writer, config, Arc::new(SessionStats::default()))
    }

    pub fn with_stats(
        writer: FrameWriter,
        config: &MuxConfig,
        stats: Arc<SessionStats>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PoolState::new(config.max_channels)),
            writer,
            stats,
            relay: RelaySettings::from_config(config),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `stream` to the first free slot and start its relays.
    ///
    /// Used for locally accepted connections; the peer learns the identifier
    /// from the first frame.
    pub fn allocate<S: LocalStream>(self: &Arc<Self>, stream: S) -> Result<Channel> {
        let outbound = stream.try_clone_stream().map_err(MuxError::Local)?;
        let (tx, rx) = mpsc::sync_channel(self.relay.queue_depth);
        let claimed = self.lock().claim_front(Some(tx));
        let Some(channel) = claimed else {
            warn!(
                capacity = self.capacity(),
                "channel capacity exhausted; refusing local connection"
            );
            return Err(MuxError::CapacityExhausted);
        };
        self.start(channel, stream, outbound, rx)
    }

    /// Bind `stream` to slot `id` and start its relays.
    ///
    /// Used for identifiers chosen by the peer.
    pub fn allocate_at<S: LocalStream>(self: &Arc<Self>, id: u16, stream: S) -> Result<Channel> {
        let outbound = stream.try_clone_stream().map_err(MuxError::Local)?;
        let (tx, rx) = mpsc::sync_channel(self.relay.queue_depth);
        let channel = self.lock().claim_at(id, Some(tx), false)?;
        self.start(channel, stream, outbound, rx)
    }

    fn start<S: LocalStream>(
        self: &Arc<Self>,
        channel: Channel,
        stream: S,
        outbound: S,
        rx: Receiver<Bytes>,
    ) -> Result<Channel> {
        let local = stream.describe();
        if let Err(err) = channel::spawn_relays(Arc::clone(self), channel, stream, outbound, rx) {
            self.release(channel.id);
            return Err(MuxError::Spawn(err));
        }
        self.stats.record_opened();
        info!(
            channel = channel.id,
            generation = channel.generation,
            %local,
            "channel allocated"
        );
        Ok(channel)
    }

    /// Occupy slot `id` without a local stream, already in closing state.
    ///
    /// Payloads for it are discarded until the peer's close frame releases it.
    pub fn reserve_closing(&self, id: u16) -> bool {
        match self.lock().claim_at(id, None, true) {
            Ok(channel) => {
                debug!(channel = id, generation = channel.generation, "channel reserved for close");
                true
            }
            Err(err) => {
                debug!(channel = id, error = %err, "cannot reserve channel");
                false
            }
        }
    }

    /// The channel at `id`, if active.
    pub fn lookup(&self, id: u16) -> Option<ChannelRef> {
        let state = self.lock();
        state.active_slot(id).map(|slot| ChannelRef {
            channel: Channel {
                id,
                generation: slot.generation,
            },
            closing: slot.closing,
            delivery: slot.delivery.clone(),
        })
    }

    /// Return slot `id` to the free list, closing its delivery queue.
    ///
    /// Idempotent: releasing a free slot does nothing and returns false.
    pub fn release(&self, id: u16) -> bool {
        let released = self.lock().release(id);
        if released {
            self.stats.record_released();
            info!(channel = id, "channel released");
        } else {
            debug!(channel = id, "release of free channel ignored");
        }
        released
    }

    /// Claim the right to send this side's close frame for `channel`.
    ///
    /// True at most once per generation.
    pub fn mark_closing(&self, channel: Channel) -> bool {
        self.lock().mark_closing(channel)
    }

    /// Send this side's close frame for `channel` unless already sent or stale.
    pub(crate) fn announce_close(&self, channel: Channel) {
        let mut sink = self.writer.lock();
        if self.mark_closing(channel) {
            self.send_close_locked(&mut sink, channel.id);
        }
    }

    /// Answer the peer's close for `channel` and free the slot.
    ///
    /// Both happen under the transport lock, so no data frame for this
    /// generation can follow the acknowledgement onto the wire.
    pub(crate) fn acknowledge_close(&self, channel: Channel) {
        let mut sink = self.writer.lock();
        if self.mark_closing(channel) {
            self.send_close_locked(&mut sink, channel.id);
        }
        self.release(channel.id);
    }

    /// Send one prepared data frame if `channel` may still carry data.
    ///
    /// Returns false without writing once the slot is closing or reused.
    pub(crate) fn send_payload(
        &self,
        channel: Channel,
        buf: &mut [u8],
    ) -> std::result::Result<bool, FrameError> {
        let mut sink = self.writer.lock();
        if !self.lock().may_send(channel) {
            return Ok(false);
        }
        sink.send_prepared(channel.id, buf)?;
        Ok(true)
    }

    fn send_close_locked(&self, sink: &mut FrameSink<'_>, id: u16) {
        match sink.send_close(id) {
            Ok(()) => {
                self.stats.record_close_sent();
                debug!(channel = id, "sent close");
            }
            Err(err) => warn!(channel = id, error = %err, "failed to send close"),
        }
    }

    /// Whether `channel` still owns its slot.
    pub fn is_current(&self, channel: Channel) -> bool {
        self.lock().is_current(channel)
    }

    pub fn active_count(&self) -> usize {
        self.lock().active()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn writer(&self) -> &FrameWriter {
        &self.writer
    }

    pub fn stats(&self) -> &Arc<SessionStats> {
        &self.stats
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot(self.active_count())
    }

    pub(crate) fn relay_settings(&self) -> &RelaySettings {
        &self.relay
    }
}
