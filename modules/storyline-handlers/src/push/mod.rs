//! Push delivery. Failures are reported to the caller, which logs them and
//! carries on; derived state is never rolled back because a push failed.

pub mod backend;
pub mod fcm;
pub mod noop;
pub mod recording;

pub use backend::{DeliveryError, PushChannel, PushMessage};
pub use fcm::FcmChannel;
pub use noop::NoopChannel;
pub use recording::RecordingPush;
