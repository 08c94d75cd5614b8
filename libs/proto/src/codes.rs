//! Platform error codes carried in rejection payloads.
//!
//! Codes in the 100xxx range identify request-level problems; codes in the
//! 200xxx range identify store-access failures by the read that failed.

/// The poll message failed structural validation.
pub const CODE_MALFORMED_REQUEST: u32 = 100003;

/// The application record exists but defines no token material.
pub const CODE_MISSING_TOKENS: u32 = 100023;

/// The application is not registered on the polling device.
pub const CODE_APP_NOT_REGISTERED: u32 = 100024;

/// The device id is unknown.
pub const CODE_UNKNOWN_DEVICE: u32 = 100025;

/// The application record does not exist.
pub const CODE_UNKNOWN_APPLICATION: u32 = 100016;

/// Reading the device record failed.
pub const CODE_STORE_DEVICES: u32 = 200001;

/// Reading the application record failed.
pub const CODE_STORE_APPLICATIONS: u32 = 200002;

/// Querying the actions collection failed.
pub const CODE_STORE_ACTIONS: u32 = 200005;
