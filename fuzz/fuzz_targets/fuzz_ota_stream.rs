//! Fuzz target: `OtaEngine::handle_chunk`
//!
//! Feeds arbitrary (offset, length) chunk headers into a streaming engine
//! backed by the simulated flash and asserts the boot slot only changes
//! after a fully contiguous image was written.
//!
//! cargo fuzz run fuzz_ota_stream

#![no_main]

use jura::adapters::flash::FlashAdapter;
use jura::ota::{Chunk, ChunkOutcome, OtaEngine};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&total, headers)) = data.split_first() else {
        return;
    };
    let total = u32::from(total);

    let mut ota = OtaEngine::new(FlashAdapter::new(), "1.0.0");
    ota.arm();
    ota.handle_version(b"2.0.0");

    let payload = [0u8; 256];
    let mut contiguous = 0u32;
    for header in headers.chunks(2) {
        let offset = u32::from(header[0]);
        let len = usize::from(*header.get(1).unwrap_or(&0));
        let chunk = Chunk { offset, total_len: total, data: &payload[..len] };
        match ota.handle_chunk(chunk) {
            Ok(ChunkOutcome::Accepted { bytes_written, .. }) => contiguous = bytes_written,
            Ok(ChunkOutcome::Restarting) => {
                assert!(contiguous + len as u32 >= total);
                assert_eq!(ota.flash().boot_slot(), 1);
                return;
            }
            _ => {}
        }
        assert_eq!(ota.flash().boot_slot(), 0);
    }
});
