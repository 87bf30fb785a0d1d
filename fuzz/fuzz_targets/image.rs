#![no_main]

use libfuzzer_sys::fuzz_target;
use modscope::image::{DebugHeader, ModuleImage};

fuzz_target!(|data: &[u8]| {
    if let Ok(image) = ModuleImage::parse(data) {
        let _ = ModuleImage::parse(&image.to_bytes());
    }
    let _ = DebugHeader::parse(data);
});
