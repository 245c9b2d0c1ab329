//! Submission workflow for a single questionnaire session:
//! `Loading -> Ready -> Submitting -> Completed | Failed`, with restart back
//! to `Ready`.

pub mod error;
pub mod session;

pub use error::SessionError;
pub use session::{Failure, Phase, Session, SessionOptions};
