//! the test_utils folder here will share utils or test components between unit
//! tests
mod common;
mod doubles;

pub use common::*;
pub use doubles::*;
