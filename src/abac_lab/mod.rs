//! The ABAC-lab policy language: attribute records, conditions and the
//! line-oriented parser.

pub mod attr_val;
pub mod condition;
pub mod parser;
