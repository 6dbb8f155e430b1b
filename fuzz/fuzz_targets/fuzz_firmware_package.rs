#![no_main]

use ed25519_dalek::SigningKey;
use libfuzzer_sys::fuzz_target;
use multipart_ota::firmware::{Ed25519Verifier, FlashLayout, MemoryBootConfig, MemoryFlash, SlotTable};
use multipart_ota::FirmwareInstaller;

const FLASH_SIZE: u32 = 0x10_0000;

fuzz_target!(|data: &[u8]| {
    let key = SigningKey::from_bytes(&[7; 32]);
    let mut installer = FirmwareInstaller::new(
        MemoryFlash::new(FLASH_SIZE),
        MemoryBootConfig::new(SlotTable::new(vec![0x8_0000, 0x2000], 0)),
        Ed25519Verifier::new(key.verifying_key()),
        FlashLayout::new(FLASH_SIZE),
    );

    for chunk in data.chunks(61) {
        assert_eq!(installer.write(chunk), chunk.len());
    }

    // Random input never carries a valid signature.
    assert!(installer.finish().is_err());
    assert_eq!(installer.boot_config().committed(), None);
});
