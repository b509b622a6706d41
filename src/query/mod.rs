pub mod expr;
pub mod pattern;

pub use expr::{Expr, KeyQuery, MAX_EXPR_DEPTH};
pub use pattern::Pattern;
