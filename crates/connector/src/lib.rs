//! HTTP clients for the systems a status change fans out to: the
//! learning-management service (course enrollment) and the search index
//! (member application documents).

pub mod error;
pub mod lms;
pub mod search;

pub use error::ConnectorError;
pub use lms::{Course, LearningService, LmsClient};
pub use search::{has_application, IndexUpdate, OpenSearchIndex, SearchIndex};
