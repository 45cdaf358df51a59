pub mod action;
pub mod plan;
pub mod run;

pub use action::*;
pub use plan::*;
pub use run::*;
