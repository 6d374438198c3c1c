pub mod calendar;
pub mod ft;
pub mod fundsquare;
pub mod util;

pub use calendar::{MadridCalendar, TradingCalendar, UtcCalendar};
pub use ft::FtProvider;
pub use fundsquare::FundsquareProvider;
