// Operation enums and their gradient functions
pub mod binary;
pub mod conv;
pub mod movement;
pub mod reduce;
pub mod unary;

pub use binary::{BinaryGradFn, BinaryOp};
pub use conv::{ConvGeometry, ConvGradFn};
pub use movement::{ConcatGradFn, MovementGradFn, MovementOp};
pub use reduce::{ReduceGradFn, ReduceOp};
pub use unary::{UnaryGradFn, UnaryOp};
