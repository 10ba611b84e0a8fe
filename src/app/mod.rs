//! Study-level workflows that touch whole directories or external programs.

pub mod run;
pub mod study;
