pub mod enums;
pub mod identity;
pub mod patient;
pub mod profile;
pub mod report;

pub use enums::*;
pub use identity::*;
pub use patient::*;
pub use profile::*;
pub use report::*;
