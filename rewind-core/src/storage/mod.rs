pub mod memory_sink;
pub mod metadata;
pub mod wav_sink;

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
