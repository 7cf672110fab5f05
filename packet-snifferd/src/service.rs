use std::sync::Arc;
use anyhow::Result;
use tokio_util::sync::CancellationToken;
use shared::types::{Packet, PacketFilter, PacketResponse, Stats};
use crate::sniffing::PacketSniffer;
use crate::store::PacketStore;

/// Entry point for the API layer: packet queries go to the store, lifecycle
/// calls go to the sniffer.
#[derive(Clone)]
pub struct PacketService {
    store: Arc<PacketStore>,
    sniffer: Arc<PacketSniffer>,
    /// Process-wide shutdown token; every sniffing run is a child of it
    shutdown: CancellationToken,
}

impl PacketService {
    pub fn new(store: Arc<PacketStore>, sniffer: Arc<PacketSniffer>, shutdown: CancellationToken) -> Self {
        Self {
            store,
            sniffer,
            shutdown,
        }
    }

    pub fn start_sniffing(&self) -> Result<()> {
        self.sniffer.start(&self.shutdown)
    }

    pub async fn stop_sniffing(&self) -> Result<()> {
        self.sniffer.stop().await
    }

    pub fn is_sniffing_running(&self) -> bool {
        self.sniffer.is_running()
    }

    pub fn get_packets(&self, filter: Option<&PacketFilter>) -> PacketResponse {
        self.store.query(filter)
    }

    pub fn get_packet(&self, id: &str) -> Option<Packet> {
        self.store.get(id)
    }

    pub fn delete_packet(&self, id: &str) {
        if self.store.delete(id) {
            tracing::debug!("Deleted packet {}", id);
        }
    }

    pub fn clear_packets(&self) {
        self.store.clear();
        tracing::info!("Cleared all packets");
    }

    pub fn stats(&self) -> Stats {
        self.store.stats()
    }
}
