pub mod group;
pub mod input;
pub mod result;
pub mod runner;
pub mod verifier;

pub use group::{Group, GroupKind};
pub use input::*;
pub use result::*;
pub use runner::*;
pub use verifier::{OutputVerifier, VerifierError};
