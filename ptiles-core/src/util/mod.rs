mod cancel;
pub use self::cancel::*;
