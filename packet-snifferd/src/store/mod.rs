pub mod memory;

pub use memory::PacketStore;
