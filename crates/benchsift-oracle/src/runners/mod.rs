//! Built-in runners.

mod cargo;
mod go;
mod jest;
mod pytest;

pub use cargo::CargoRunner;
pub use go::GoRunner;
pub use jest::JestRunner;
pub use pytest::PytestRunner;
