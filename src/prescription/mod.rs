//! Demo accounts and their prescriptions, bundled into the binary.

pub mod error;
pub mod store;
pub mod types;

pub use error::PrescriptionError;
pub use store::PrescriptionStore;
pub use types::{Medicine, Prescription, User};
