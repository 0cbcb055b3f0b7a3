//! Client capability profiles.
//!
//! - [`ProfileResolver`]: ordered header rules → [`DeviceProfile`]
//! - [`DeviceProfile::playback_method`]: direct play, transcode or hidden
//! - [`builtin`]: profiles for common TVs and players

pub mod builtin;
mod model;
mod resolver;

pub use model::{
    DeviceProfile, DirectPlayRule, MediaInfo, MediaType, PlaybackMethod, TranscodeProtocol,
    TranscodingRule,
};
pub use resolver::{MatchKind, ProfileResolver, ProfileRule};
