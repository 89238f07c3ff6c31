pub mod contact;
pub mod deal;
pub mod operation;
