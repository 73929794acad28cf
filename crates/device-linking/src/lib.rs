//! §4.9 Device-linking flow: Device1 (existing device, authorizes and
//! submits the `AddKey` + mapping batch) and Device2 (new device, generates
//! the QR, polls for the mapping, and completes the temporary-to-permanent
//! key swap and registration).

pub mod core;
pub mod device1;
pub mod device2;
pub mod keypair;
pub mod qr;
pub mod retry;

pub use core::{DeviceLinkingCore, DeviceLinkingProgress};
pub use device1::{run_device1_linking, Device1LinkingRequest, Device1LinkingResult, DeviceCounter};
pub use device2::{
    resolve_device2_keys, run_device2_linking, Device2Keys, Device2LinkingRequest, Device2LinkingResult,
    DeviceLinkingCleanup, MappingDetected, MappingPoller, PollDelay,
};
pub use keypair::TempKeypair;
pub use qr::QrPayload;
pub use retry::{classify_registration_error, BoundedRetry, RetryClass, RetryDecision};
