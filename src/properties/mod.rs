pub mod api;
pub mod error;
pub mod lister;
pub mod model;

pub use error::{ListError, Outcome};
pub use lister::PropertyLister;
pub use model::*;
