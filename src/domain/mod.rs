pub mod event;
pub mod lock;
pub mod outcome;
pub mod prediction;
pub mod score;
pub mod tenant;

pub use event::*;
pub use lock::*;
pub use outcome::*;
pub use prediction::*;
pub use score::*;
pub use tenant::*;
