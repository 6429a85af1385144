//! Mutation — parametric perturbation, structural operators and the
//! legality table they share.

pub mod legality;
pub mod parameter;
pub mod structural;

pub use parameter::{mutate_value, random_value};
pub use structural::{Operator, mutate};
