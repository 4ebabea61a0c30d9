pub mod check;
pub mod convert;
pub mod evaluate;
pub mod status;
