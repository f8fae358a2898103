mod export;
pub use self::export::*;

mod segregate;
pub use self::segregate::*;

mod inference;
pub use self::inference::*;

mod fusion;
pub use self::fusion::*;
