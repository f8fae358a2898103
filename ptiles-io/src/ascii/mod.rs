//! Delimited text point clouds. Columns are described by a format string with one literal per column:
//!
//! | literal | column |
//! |---|---|
//! | `s` | skip this column |
//! | `x`, `y`, `z` | coordinates (mandatory) |
//! | `c` | classification code |
//! | `i` | intensity |
//! | `r` | return number |
//! | `n` | number of returns |
//! | `t` | GPS time |
//! | `u` | user data |
//! | `p` | point source ID |
//! | `R`, `G`, `B` | color channels |
//! | `I` | near infrared |
//! | `a` | scan angle rank |
mod format;
pub use self::format::*;

mod reader;
pub use self::reader::*;

mod writer;
pub use self::writer::*;
