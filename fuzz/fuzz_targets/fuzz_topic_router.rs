//! Fuzz target: `CommandRouter::route`
//!
//! Splits the input into a topic and a sequence of fragment headers and
//! asserts that routing never panics and never leaves a cached topic
//! behind after a terminal fragment.
//!
//! cargo fuzz run fuzz_topic_router

#![no_main]

use jura::adapters::device_id::DeviceIdentity;
use jura::app::events::InboundFragment;
use jura::router::{CommandRouter, Topic, MAX_SEGMENTS};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let split = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    let topic = String::from_utf8_lossy(&data[..split]);
    let rest = data.get(split + 1..).unwrap_or(&[]);

    if let Ok(parsed) = Topic::parse(&topic) {
        assert!(parsed.len() <= MAX_SEGMENTS);
        assert!(parsed.segments().all(|s| !s.is_empty() && !s.contains('/')));
    }

    let mut router = CommandRouter::new(DeviceIdentity::from_mac(&[0xA4, 0xCF, 0x12, 0xB3, 0xC4, 0xD5]));
    for header in rest.chunks(3) {
        let [offset, len, total] = [0, 1, 2].map(|i| usize::from(*header.get(i).unwrap_or(&0)));
        let fragment = InboundFragment {
            topic: (offset == 0).then(|| topic.clone().into_owned()),
            data: vec![0; len],
            offset,
            total_len: total,
        };
        let _ = router.route(&fragment);
        if fragment.is_terminal() {
            assert!(router.pending().is_none());
        }
    }
});
