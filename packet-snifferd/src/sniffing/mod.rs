pub mod generator;
pub mod scheduler;

use anyhow::Result;
use shared::types::Packet;
use crate::store::PacketStore;

pub use scheduler::PacketSniffer;

/// Destination for packets produced by the sniffer
pub trait PacketSink: Send + Sync {
    fn store(&self, packet: Packet) -> Result<()>;
}

impl PacketSink for PacketStore {
    fn store(&self, packet: Packet) -> Result<()> {
        self.insert(packet);
        Ok(())
    }
}
