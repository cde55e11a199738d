//! Evaluation of query engines: feedback functions scored by a language
//! model, attached to an engine through a recorder that logs every query.

pub mod feedback;
pub mod provider;
pub mod recorder;
pub mod store;

pub use feedback::{default_feedbacks, Aggregation, Feedback, FeedbackFn, FeedbackProvider, RecordView, Scored, Selector};
pub use provider::{parse_score, LlmFeedbackProvider};
pub use recorder::{get_prebuilt_recorder, get_recorder, RecordHandle, Recorder};
pub use store::{FeedbackResult, FeedbackStatus, LeaderboardRow, Record, RecordStore};
