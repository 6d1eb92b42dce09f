//! Core domain logic, UI-framework agnostic.

pub mod error;
pub mod recognition;
pub mod settings;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use types::{
    ImageData, ObjectDetails, ObjectInfo, RecognitionMethod, RecognitionSource, RecognitionState,
};
