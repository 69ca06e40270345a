pub mod ergast;
pub mod memory;
pub mod postgres;
mod traits;

pub use ergast::ErgastCalendar;
pub use memory::{MemoryStore, StaticCalendar};
pub use postgres::PostgresStore;
pub use traits::{CalendarSource, CompetitionStore};

#[cfg(test)]
pub use traits::MockCalendarSource;
