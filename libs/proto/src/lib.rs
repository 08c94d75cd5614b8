//! # dmp-proto
//!
//! Wire types for the device poll channel of the dmp platform.
//!
//! ## Design Principles
//!
//! - Wire forms use camelCase field names and JSON-compatible scalars
//!   (strings, non-negative integers)
//! - Requests are immutable for the duration of a poll cycle, except the
//!   wait budget, which the coordinator zeroes after its single wait
//! - Rejections carry a numeric code identifying the exact failure
//!
//! ## Modules
//!
//! - Poll envelope (`PollRequest` and its header/body)
//! - Poll reply payload (`PollReply`, `ReplyAction`)
//! - Rejection payload and the platform error codes
//! - Encryption method labels and their negotiation order

mod codes;
mod encryption;
mod envelope;
mod rejection;
mod reply;

pub use codes::*;
pub use encryption::{EncryptionMethod, UnknownEncryptionMethod};
pub use envelope::{EnvelopeError, MessageType, PollBody, PollEncryption, PollHeader, PollRequest};
pub use rejection::{Rejection, RejectionKind};
pub use reply::{PollReply, ReplyAction};
