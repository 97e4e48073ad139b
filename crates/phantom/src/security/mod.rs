//! Security facilities

pub mod replay;
