//! Error taxonomy shared by the REST and gateway sides

mod error_class;

pub use error_class::ErrorClass;
