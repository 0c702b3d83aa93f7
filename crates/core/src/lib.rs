pub mod cohort;
pub mod config;
pub mod error;
pub mod field;
pub mod form;
pub mod member;

pub use cohort::*;
pub use config::Config;
pub use error::*;
pub use field::*;
pub use form::*;
pub use member::*;
