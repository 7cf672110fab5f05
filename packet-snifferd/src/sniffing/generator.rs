use rand::seq::SliceRandom;
use rand::Rng;
use shared::types::{Packet, Protocol, TcpFlag};

/// Representative hosts: LAN ranges, public DNS resolvers and a few large sites
pub const COMMON_IPS: [&str; 17] = [
    "192.168.1.1", "192.168.1.100", "192.168.1.101", "192.168.1.102",
    "10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4",
    "172.16.0.1", "172.16.0.2", "172.16.0.3",
    "8.8.8.8", "1.1.1.1", "208.67.222.222",
    "142.250.190.78", "151.101.1.69", "104.16.124.96",
];

/// Well-known service ports followed by common development ports
pub const COMMON_PORTS: [u16; 16] = [
    80, 443, 22, 21, 25, 53, 110, 143, 993, 995,
    8080, 8443, 3000, 5000, 8000, 9000,
];

/// ICMP is never synthesized
pub const GENERATED_PROTOCOLS: [Protocol; 4] = [
    Protocol::Tcp,
    Protocol::Udp,
    Protocol::Http,
    Protocol::Https,
];

pub const HTTP_PAYLOADS: [&str; 4] = [
    "GET / HTTP/1.1",
    "POST /api/data HTTP/1.1",
    "PUT /resource HTTP/1.1",
    "DELETE /item/123 HTTP/1.1",
];

pub const MIN_SIZE: u32 = 64;
pub const MAX_SIZE: u32 = 1500;

const TTL_OVERRIDE_PROBABILITY: f64 = 0.3;
const FLAG_OVERRIDE_PROBABILITY: f64 = 0.2;

fn pick<'a, T, R: Rng + ?Sized>(rng: &mut R, pool: &'a [T]) -> &'a T {
    pool.choose(rng).expect("sample pools are non-empty")
}

/// Synthesize one plausible packet.
///
/// Source and destination are drawn independently from [`COMMON_IPS`] and
/// never equal. Some packets get a randomized TTL or flag, and web traffic
/// carries a request line as payload.
pub fn generate_packet<R: Rng + ?Sized>(rng: &mut R) -> Packet {
    let source_ip = *pick(rng, &COMMON_IPS);
    let mut destination_ip = *pick(rng, &COMMON_IPS);
    while destination_ip == source_ip {
        destination_ip = *pick(rng, &COMMON_IPS);
    }

    let port = *pick(rng, &COMMON_PORTS);
    let protocol = *pick(rng, &GENERATED_PROTOCOLS);
    let size = rng.gen_range(MIN_SIZE..=MAX_SIZE);

    let mut packet = Packet::new(source_ip, destination_ip, protocol, port, size);

    if rng.gen_bool(TTL_OVERRIDE_PROBABILITY) {
        packet.ttl = Some(rng.gen_range(32..=95));
    }

    if rng.gen_bool(FLAG_OVERRIDE_PROBABILITY) {
        packet.flags = Some(*pick(rng, &TcpFlag::ALL));
    }

    if protocol.is_web() {
        packet.payload = Some(pick(rng, &HTTP_PAYLOADS).to_string());
    }

    packet
}
