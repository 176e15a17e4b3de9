pub mod bbox_fix;
pub mod detector;
pub mod matcher;
pub mod merge;
pub mod proximity;

pub use bbox_fix::{BBoxFixer, FixerConfig};
pub use detector::{DetectorConfig, PageDetection, RoomDetector, SkippedToken};
pub use matcher::{MatcherConfig, RoomMatcher, RoomNumberToken, SpanKind};
pub use merge::{merge_candidates, MergeConfig};
pub use proximity::Proximity;
