pub mod club;
pub mod member;
pub mod payment;
pub mod transaction;

pub use club::*;
pub use member::*;
pub use payment::*;
pub use transaction::*;
