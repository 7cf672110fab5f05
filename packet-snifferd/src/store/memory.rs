use std::collections::HashMap;
use chrono::Utc;
use parking_lot::RwLock;
use shared::types::{Packet, PacketFilter, PacketResponse, Stats};

/// Fixed-capacity in-memory packet store.
///
/// Holds at most `capacity` packets keyed by id. Inserting a new id into a
/// full store first evicts the packet with the earliest timestamp. Readers
/// share the lock; inserts, deletes and clears take it exclusively.
pub struct PacketStore {
    packets: RwLock<HashMap<String, Packet>>,
    capacity: usize,
}

impl PacketStore {
    /// Create an empty store. A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            packets: RwLock::new(HashMap::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.packets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.read().is_empty()
    }

    /// Insert or overwrite a packet by id, evicting the oldest packet when a
    /// new id would push the store past capacity.
    pub fn insert(&self, packet: Packet) {
        let mut packets = self.packets.write();

        if packets.len() >= self.capacity && !packets.contains_key(&packet.id) {
            if let Some(evicted) = evict_oldest(&mut packets) {
                tracing::debug!("Evicted packet {} to make room", evicted.id);
            }
        }

        packets.insert(packet.id.clone(), packet);
    }

    /// Return the packets matching `filter`, sorted by (timestamp, id) and
    /// then paginated. `total` counts matches before pagination.
    pub fn query(&self, filter: Option<&PacketFilter>) -> PacketResponse {
        let mut matched: Vec<Packet> = {
            let packets = self.packets.read();
            packets
                .values()
                .filter(|p| filter.map_or(true, |f| f.matches(p)))
                .cloned()
                .collect()
        };

        matched.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        let total = matched.len();
        let packets = match filter {
            Some(f) if f.limit > 0 => paginate(matched, f.offset, f.limit),
            _ => matched,
        };

        PacketResponse {
            packets,
            total,
            timestamp: Utc::now(),
        }
    }

    pub fn get(&self, id: &str) -> Option<Packet> {
        self.packets.read().get(id).cloned()
    }

    /// Remove a packet. Returns whether it was present.
    pub fn delete(&self, id: &str) -> bool {
        self.packets.write().remove(id).is_some()
    }

    pub fn clear(&self) {
        self.packets.write().clear();
    }

    pub fn stats(&self) -> Stats {
        let packets = self.packets.read();

        let oldest_at = packets.values().map(|p| p.timestamp).min();
        let newest_at = packets.values().map(|p| p.timestamp).max();

        Stats {
            total_packets: packets.len(),
            capacity: self.capacity,
            oldest_at,
            newest_at,
        }
    }
}

/// Remove the packet with the smallest (timestamp, id).
/// The id comparison makes the choice deterministic when timestamps tie.
fn evict_oldest(packets: &mut HashMap<String, Packet>) -> Option<Packet> {
    let oldest_id = packets
        .values()
        .min_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)))
        .map(|p| p.id.clone())?;

    packets.remove(&oldest_id)
}

fn paginate(matched: Vec<Packet>, offset: usize, limit: usize) -> Vec<Packet> {
    if offset >= matched.len() {
        return Vec::new();
    }
    matched.into_iter().skip(offset).take(limit).collect()
}
