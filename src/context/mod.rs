//! Process context: working directory stack and command-line arguments.

mod cwd;
mod env;

pub use cwd::DirStack;
pub use env::Arguments;

#[cfg(test)]
mod tests;
